//! Dispatcher configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `config/pacer.{toml,yaml,json}` (optional)
//! 3. environment variables with the `PACER_` prefix (a `.env` file is loaded first if present)
//!
//! ```text
//! PACER_PAUSE_MS=1000
//! PACER_ADAPTIVE=true
//! PACER_GROWTH_FACTOR=1.5
//! PACER_MAX_PAUSE_MS=10000
//! PACER_LANE_SELECTION=strict
//! ```

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::dispatcher::DEFAULT_LANE_CAPACITY;
use crate::pacing::{GrowthPolicy, Pacing, PolicyError};
use crate::queue::LaneSelection;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid growth policy: {0}")]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Pause after each task (fixed mode) or the baseline pause (adaptive mode).
    pub pause_ms: u64,
    /// Use the adaptive pause instead of the fixed one.
    pub adaptive: bool,
    pub growth_factor: f64,
    /// Lower bound of a grown pause.
    pub min_grow_ms: u64,
    /// Upper bound of a grown pause.
    pub max_pause_ms: u64,
    /// Bound of each lane.
    pub lane_capacity: usize,
    pub lane_selection: LaneSelection,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pause_ms: 1000,
            adaptive: false,
            growth_factor: 1.5,
            min_grow_ms: 1000,
            max_pause_ms: 10_000,
            lane_capacity: DEFAULT_LANE_CAPACITY,
            lane_selection: LaneSelection::Fair,
        }
    }
}

impl DispatcherConfig {
    /// Load from `.env`, `config/pacer.*` and `PACER_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/pacer").required(false))
            .add_source(config::Environment::with_prefix("PACER").try_parsing(true));
        Self::from_builder(builder)
    }

    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lane_capacity == 0 {
            return Err(ConfigError::Invalid("lane_capacity must be at least 1".into()));
        }
        if self.adaptive {
            // growth policy 側でも検証するが、ここで早めに落とす
            self.growth_policy()?;
        }
        Ok(())
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn growth_policy(&self) -> Result<GrowthPolicy, ConfigError> {
        Ok(GrowthPolicy::new(
            self.growth_factor,
            Duration::from_millis(self.min_grow_ms),
            Duration::from_millis(self.max_pause_ms),
        )?)
    }

    pub fn pacing(&self) -> Result<Pacing, ConfigError> {
        if self.adaptive {
            Ok(Pacing::Adaptive {
                default: self.pause(),
                growth: self.growth_policy()?,
            })
        } else {
            Ok(Pacing::Fixed(self.pause()))
        }
    }
}

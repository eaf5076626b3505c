//! Reference growth policy: `clamp(current * factor, floor, ceiling)`.

use std::time::Duration;
use thiserror::Error;

use super::DelayGrowth;

/// Floor used by [`GrowthPolicy::with_max`].
pub const DEFAULT_FLOOR: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("growth factor must be finite and >= 1.0, got {0}")]
    InvalidFactor(f64),

    #[error("ceiling {ceiling:?} is below floor {floor:?}")]
    CeilingBelowFloor { floor: Duration, ceiling: Duration },
}

/// Multiplicative growth with a floor and a ceiling.
///
/// The floor applies even when the product is smaller than it, so a short default pause
/// jumps straight to the floor on the second back-to-back task.
///
/// Example with factor=1.5, floor=1s, ceiling=2s:
/// - 100ms -> 1s (150ms is below the floor)
/// - 1s -> 1.5s
/// - 1.5s -> 2s (2.25s is above the ceiling)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthPolicy {
    factor: f64,
    floor: Duration,
    ceiling: Duration,
}

impl GrowthPolicy {
    pub fn new(factor: f64, floor: Duration, ceiling: Duration) -> Result<Self, PolicyError> {
        if !factor.is_finite() || factor < 1.0 {
            return Err(PolicyError::InvalidFactor(factor));
        }
        if ceiling < floor {
            return Err(PolicyError::CeilingBelowFloor { floor, ceiling });
        }
        Ok(Self {
            factor,
            floor,
            ceiling,
        })
    }

    /// Policy with the default 1s floor.
    pub fn with_max(factor: f64, max: Duration) -> Result<Self, PolicyError> {
        Self::new(factor, DEFAULT_FLOOR, max)
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    pub fn next(&self, current: Duration) -> Duration {
        // Duration * f64 panics on overflow, so go through the checked conversion
        let scaled = Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .unwrap_or(Duration::MAX);
        if scaled < self.floor {
            return self.floor;
        }
        if scaled > self.ceiling {
            return self.ceiling;
        }
        scaled
    }
}

impl DelayGrowth for GrowthPolicy {
    fn grow(&self, current: Duration) -> Duration {
        self.next(current)
    }
}

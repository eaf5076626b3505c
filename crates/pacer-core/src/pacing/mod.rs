//! Pacing policies: how long the worker waits after each task.
//!
//! - Fixed: always the same pause.
//! - Adaptive: the pause grows while tasks keep coming back-to-back and snaps back to the
//!   default as soon as both lanes are found empty.

mod adaptive;
mod growth;

pub use adaptive::{AdaptivePacer, PacingState};
pub use growth::{DEFAULT_FLOOR, GrowthPolicy, PolicyError};

use std::time::Duration;

/// Computes the next delay from the current one.
///
/// Implementations must be pure and monotonic non-decreasing in `current`,
/// otherwise the adaptive pause can oscillate.
pub trait DelayGrowth: Send + Sync {
    fn grow(&self, current: Duration) -> Duration;
}

impl<F> DelayGrowth for F
where
    F: Fn(Duration) -> Duration + Send + Sync,
{
    fn grow(&self, current: Duration) -> Duration {
        self(current)
    }
}

/// Pacing mode picked at startup (usually from configuration).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    Fixed(Duration),
    Adaptive {
        default: Duration,
        growth: GrowthPolicy,
    },
}

impl Pacing {
    /// The delay applied after an isolated task.
    pub fn base_delay(&self) -> Duration {
        match self {
            Pacing::Fixed(pause) => *pause,
            Pacing::Adaptive { default, .. } => *default,
        }
    }
}

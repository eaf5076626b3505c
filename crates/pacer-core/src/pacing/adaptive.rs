//! Adaptive pacing state machine, kept free of timers so it can be tested directly.

use std::time::Duration;

use super::DelayGrowth;

/// Current delay plus how many tasks ran since the lanes were last found empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingState {
    pub delay: Duration,
    pub consecutive: u32,
}

/// Drives [`PacingState`] for the adaptive worker loop.
///
/// - `on_idle`: both lanes empty -> back to the default delay, count 0.
/// - `on_executed`: count += 1; the delay grows once the count exceeds 1.
#[derive(Debug, Clone)]
pub struct AdaptivePacer {
    default: Duration,
    state: PacingState,
}

impl AdaptivePacer {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            state: PacingState {
                delay: default,
                consecutive: 0,
            },
        }
    }

    pub fn state(&self) -> PacingState {
        self.state
    }

    /// Reset after finding both lanes empty. Returns the delay to sleep.
    pub fn on_idle(&mut self) -> Duration {
        self.state = PacingState {
            delay: self.default,
            consecutive: 0,
        };
        self.default
    }

    /// Record one executed task. Returns the delay to sleep before the next check.
    pub fn on_executed<G: DelayGrowth + ?Sized>(&mut self, growth: &G) -> Duration {
        self.state.consecutive = self.state.consecutive.saturating_add(1);
        self.state.delay = if self.state.consecutive > 1 {
            growth.grow(self.state.delay)
        } else {
            self.default
        };
        self.state.delay
    }
}

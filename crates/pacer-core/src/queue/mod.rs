//! Dual-lane queue: two independent hand-off channels (normal, low) feeding one worker.
//!
//! - Within one lane hand-off is FIFO.
//! - Across lanes there is no ordering; see [`LaneSelection`].

mod lanes;

pub(crate) use lanes::{LaneReceivers, LaneSenders, lane_pair};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which lane a task was submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Normal,
    Low,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Normal => "normal",
            Lane::Low => "low",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the worker picks between lanes when both have a task ready.
///
/// - `Fair`: unpredictable pick, the normal lane is preferred in name only.
/// - `Strict`: normal first, low only when normal is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneSelection {
    #[default]
    Fair,
    Strict,
}

use thiserror::Error;

use crate::queue::Lane;

/// What a task reports when it could not do its job.
///
/// The dispatcher only logs and counts these; nothing is handed back to the producer.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Why a hand-off into a lane did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("dispatcher is not running")]
    NotRunning,

    #[error("{lane} lane is full (capacity={capacity})")]
    LaneFull { lane: Lane, capacity: usize },

    #[error("{0} lane is closed")]
    Closed(Lane),
}

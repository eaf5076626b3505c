//! Task contract: a zero-argument, synchronous unit of work.
//!
//! dispatcher は Task の中身を知らない（black box として順番に実行するだけ）。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::error::TaskError;
use crate::queue::Lane;

/// A unit of work that reports success or failure.
///
/// Any `FnOnce() -> Result<(), TaskError>` closure is a task, so producers usually just
/// capture what they need and hand the closure over.
///
/// # Example
/// ```ignore
/// dispatcher.submit(move || transport.send(&message));
/// ```
pub trait Task: Send + 'static {
    fn run(self: Box<Self>) -> Result<(), TaskError>;
}

impl<F> Task for F
where
    F: FnOnce() -> Result<(), TaskError> + Send + 'static,
{
    fn run(self: Box<Self>) -> Result<(), TaskError> {
        (*self)()
    }
}

pub type BoxedTask = Box<dyn Task>;

/// Correlation id attached to an accepted submission. Only shows up in logs.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(Ulid);

impl SubmissionId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What actually travels through a lane.
pub(crate) struct Envelope {
    pub(crate) id: SubmissionId,
    pub(crate) lane: Lane,
    pub(crate) task: BoxedTask,
}

impl Envelope {
    pub(crate) fn new(lane: Lane, task: BoxedTask) -> Self {
        Self {
            id: SubmissionId::generate(),
            lane,
            task,
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("lane", &self.lane)
            .finish_non_exhaustive()
    }
}

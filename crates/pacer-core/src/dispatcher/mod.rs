//! Dispatcher: submission API and lifecycle.
//!
//! One dispatcher owns two lanes and at most one running worker loop
//! ([`Dispatcher::run`] / [`Dispatcher::run_adaptive`], see `worker.rs`).
//!
//! Submission is fire-and-forget: if the dispatcher is not running, or the lane is full, the task
//! is dropped with a warning and the caller is not told. Use [`Dispatcher::try_submit`] when the
//! caller needs to know.

mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::error::SubmitError;
use crate::observability::{Counters, DispatcherStats};
use crate::queue::{Lane, LaneReceivers, LaneSelection, LaneSenders, lane_pair};
use crate::task::{Envelope, SubmissionId, Task};

/// Default bound of each lane.
pub const DEFAULT_LANE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherState {
    Idle,
    Running,
}

#[derive(Debug)]
struct Lifecycle {
    state: DispatcherState,
    started_at: Option<DateTime<Utc>>,
}

/// Paced, serialized executor for side-effecting tasks.
///
/// # Example
/// ```ignore
/// let dispatcher = Arc::new(Dispatcher::builder().lane_capacity(128).build());
/// tokio::spawn({
///     let d = Arc::clone(&dispatcher);
///     async move { d.run(Duration::from_secs(1)).await }
/// });
/// dispatcher.submit(|| send_mail());
/// ```
///
/// `stop` is terminal: a stopped dispatcher never runs again.
pub struct Dispatcher {
    senders: LaneSenders,
    receivers: tokio::sync::Mutex<LaneReceivers>,
    lifecycle: Mutex<Lifecycle>,
    shutdown_tx: watch::Sender<bool>,
    selection: LaneSelection,
    counters: Counters,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self::builder()
            .lane_capacity(config.lane_capacity)
            .lane_selection(config.lane_selection)
            .build()
    }

    /// Queue a task on the normal lane. Dropped silently (warning only) when not running.
    pub fn submit<T: Task>(&self, task: T) {
        let _ = self.try_submit(Lane::Normal, task);
    }

    /// Queue a task on the low lane. Dropped silently (warning only) when not running.
    pub fn submit_low_priority<T: Task>(&self, task: T) {
        let _ = self.try_submit(Lane::Low, task);
    }

    /// Same hand-off as [`submit`](Self::submit), but tells the caller what happened.
    ///
    /// Never blocks: a full lane is reported as [`SubmitError::LaneFull`].
    pub fn try_submit<T: Task>(&self, lane: Lane, task: T) -> Result<SubmissionId, SubmitError> {
        // running チェックと hand-off を同じロック内で行う（stop と競合させない）
        let lifecycle = self.lifecycle();
        if lifecycle.state != DispatcherState::Running {
            drop(lifecycle);
            self.counters.record_dropped();
            warn!(lane = %lane, "dispatcher is not running, task discarded");
            return Err(SubmitError::NotRunning);
        }

        let envelope = Envelope::new(lane, Box::new(task));
        let id = envelope.id;
        let result = self.senders.try_send(envelope);
        drop(lifecycle);

        match result {
            Ok(()) => {
                self.counters.record_submitted();
                debug!(submission_id = %id, lane = %lane, "task queued");
                Ok(id)
            }
            Err(err) => {
                self.counters.record_dropped();
                warn!(lane = %lane, error = %err, "task discarded");
                Err(err)
            }
        }
    }

    /// Ask the worker to stop at its next readiness check.
    ///
    /// Does not wait for the worker, does not drain the lanes, and lets a task that is
    /// already executing run to completion. Safe to call any number of times.
    pub fn stop(&self) {
        let was_running = {
            let mut lifecycle = self.lifecycle();
            let was_running = lifecycle.state == DispatcherState::Running;
            lifecycle.state = DispatcherState::Idle;
            was_running
        };
        // send_replace: 受信側がいなくても値は残る
        let already_stopped = self.shutdown_tx.send_replace(true);

        if was_running {
            info!("dispatcher stop requested");
        } else if !already_stopped {
            debug!("stop called on a dispatcher that is not running");
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.lifecycle().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == DispatcherState::Running
    }

    /// Whether `stop` has been called at least once.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn lane_selection(&self) -> LaneSelection {
        self.selection
    }

    pub fn stats(&self) -> DispatcherStats {
        let (state, started_at) = {
            let lifecycle = self.lifecycle();
            (lifecycle.state, lifecycle.started_at)
        };
        let counters = self.counters.load();
        DispatcherStats {
            state,
            lane_selection: self.selection,
            started_at,
            submitted: counters.submitted,
            executed: counters.executed,
            failed: counters.failed,
            dropped: counters.dropped,
            pending_normal: self.senders.pending(Lane::Normal),
            pending_low: self.senders.pending(Lane::Low),
            lane_capacity: self.senders.capacity(),
            current_delay_ms: counters.current_delay_ms,
            consecutive: counters.consecutive,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        // the guarded data is two plain fields, a poisoned lock still holds a valid value
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherBuilder {
    lane_capacity: usize,
    selection: LaneSelection,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            lane_capacity: DEFAULT_LANE_CAPACITY,
            selection: LaneSelection::default(),
        }
    }

    /// Bound of each lane (zero is treated as one).
    pub fn lane_capacity(mut self, capacity: usize) -> Self {
        self.lane_capacity = capacity;
        self
    }

    pub fn lane_selection(mut self, selection: LaneSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn build(self) -> Dispatcher {
        let (senders, receivers) = lane_pair(self.lane_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        Dispatcher {
            senders,
            receivers: tokio::sync::Mutex::new(receivers),
            lifecycle: Mutex::new(Lifecycle {
                state: DispatcherState::Idle,
                started_at: None,
            }),
            shutdown_tx,
            selection: self.selection,
            counters: Counters::default(),
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

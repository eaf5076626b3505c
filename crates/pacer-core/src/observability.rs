//! Dispatcher status snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::dispatcher::DispatcherState;
use crate::pacing::PacingState;
use crate::queue::LaneSelection;

/// Point-in-time view of a dispatcher. Purely observational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub state: DispatcherState,
    pub lane_selection: LaneSelection,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted: u64,
    pub executed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub pending_normal: usize,
    pub pending_low: usize,
    pub lane_capacity: usize,
    pub current_delay_ms: u64,
    pub consecutive: u32,
}

impl DispatcherStats {
    /// Every accepted task has run. Dropped submissions are not waited for.
    pub fn is_drained(&self) -> bool {
        self.executed >= self.submitted
    }
}

/// Lock-free counters updated by producers and the worker.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    current_delay_ms: AtomicU64,
    consecutive: AtomicU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CounterValues {
    pub(crate) submitted: u64,
    pub(crate) executed: u64,
    pub(crate) failed: u64,
    pub(crate) dropped: u64,
    pub(crate) current_delay_ms: u64,
    pub(crate) consecutive: u32,
}

impl Counters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self, ok: bool) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_delay(&self, delay: Duration) {
        self.current_delay_ms
            .store(duration_ms(delay), Ordering::Relaxed);
    }

    pub(crate) fn record_pacing(&self, state: PacingState) {
        self.record_delay(state.delay);
        self.consecutive.store(state.consecutive, Ordering::Relaxed);
    }

    pub(crate) fn load(&self) -> CounterValues {
        CounterValues {
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            current_delay_ms: self.current_delay_ms.load(Ordering::Relaxed),
            consecutive: self.consecutive.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

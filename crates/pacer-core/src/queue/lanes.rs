//! Bounded lane channels.
//!
//! 送信側は `try_send` のみ（producer を絶対に block しない）。
//! 受信側は worker だけが持つ。

use tokio::sync::mpsc::{self, error::TrySendError};

use super::{Lane, LaneSelection};
use crate::error::SubmitError;
use crate::task::Envelope;

/// Create both lanes with the same bound.
pub(crate) fn lane_pair(capacity: usize) -> (LaneSenders, LaneReceivers) {
    // mpsc::channel panics on zero capacity
    let capacity = capacity.max(1);
    let (normal_tx, normal_rx) = mpsc::channel(capacity);
    let (low_tx, low_rx) = mpsc::channel(capacity);
    (
        LaneSenders {
            normal: normal_tx,
            low: low_tx,
            capacity,
        },
        LaneReceivers {
            normal: normal_rx,
            low: low_rx,
        },
    )
}

#[derive(Debug, Clone)]
pub(crate) struct LaneSenders {
    normal: mpsc::Sender<Envelope>,
    low: mpsc::Sender<Envelope>,
    capacity: usize,
}

impl LaneSenders {
    fn sender(&self, lane: Lane) -> &mpsc::Sender<Envelope> {
        match lane {
            Lane::Normal => &self.normal,
            Lane::Low => &self.low,
        }
    }

    /// Non-blocking hand-off into the envelope's lane.
    pub(crate) fn try_send(&self, envelope: Envelope) -> Result<(), SubmitError> {
        self.sender(envelope.lane)
            .try_send(envelope)
            .map_err(|e| match e {
                TrySendError::Full(env) => SubmitError::LaneFull {
                    lane: env.lane,
                    capacity: self.capacity,
                },
                TrySendError::Closed(env) => SubmitError::Closed(env.lane),
            })
    }

    /// Number of tasks sitting in `lane` that the worker has not taken yet.
    pub(crate) fn pending(&self, lane: Lane) -> usize {
        let tx = self.sender(lane);
        tx.max_capacity() - tx.capacity()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug)]
pub(crate) struct LaneReceivers {
    normal: mpsc::Receiver<Envelope>,
    low: mpsc::Receiver<Envelope>,
}

impl LaneReceivers {
    /// Wait until either lane has a task. Returns `None` once both lanes are closed.
    ///
    /// Cancel-safe: dropping the future never loses a task.
    pub(crate) async fn recv(&mut self, selection: LaneSelection) -> Option<Envelope> {
        match selection {
            LaneSelection::Fair => tokio::select! {
                Some(env) = self.normal.recv() => Some(env),
                Some(env) = self.low.recv() => Some(env),
                else => None,
            },
            LaneSelection::Strict => tokio::select! {
                biased;
                Some(env) = self.normal.recv() => Some(env),
                Some(env) = self.low.recv() => Some(env),
                else => None,
            },
        }
    }

    /// Take a task if one is ready right now, without waiting.
    pub(crate) fn try_recv(&mut self, selection: LaneSelection) -> Option<Envelope> {
        let normal_first = match selection {
            LaneSelection::Strict => true,
            LaneSelection::Fair => rand::random::<bool>(),
        };
        if normal_first {
            self.normal.try_recv().ok().or_else(|| self.low.try_recv().ok())
        } else {
            self.low.try_recv().ok().or_else(|| self.normal.try_recv().ok())
        }
    }
}

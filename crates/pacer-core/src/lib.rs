//! pacer-core
//!
//! Paced, serialized dispatcher for side-effecting tasks (outbound mail and the like).
//!
//! # モジュール構成
//! - **task**: Task trait（引数なし・同期・成功/失敗を返す）
//! - **queue**: normal / low の 2 レーン
//! - **pacing**: 固定ポーズと適応ポーズ（growth policy）
//! - **dispatcher**: submit API, lifecycle (run / stop), worker loops
//! - **observability**: stats snapshot
//! - **config**: env / file からの設定読み込み
//! - **mail**: dispatcher を使うメール送信側の境界

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mail;
pub mod observability;
pub mod pacing;
pub mod queue;
pub mod task;

pub use crate::config::{ConfigError, DispatcherConfig};
pub use crate::dispatcher::{Dispatcher, DispatcherBuilder, DispatcherState};
pub use crate::error::{SubmitError, TaskError};
pub use crate::observability::DispatcherStats;
pub use crate::pacing::{AdaptivePacer, DelayGrowth, GrowthPolicy, Pacing, PacingState};
pub use crate::queue::{Lane, LaneSelection};
pub use crate::task::{SubmissionId, Task};

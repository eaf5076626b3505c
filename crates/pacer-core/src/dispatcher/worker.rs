//! Worker loops: fixed pause and adaptive pause.
//!
//! Both loops:
//! 1. refuse to start if a loop is already running (error log, no-op)
//! 2. take one task at a time from either lane and run it to completion
//! 3. sleep the pacing delay
//! 4. leave as soon as stop is observed (between tasks, never during one)

use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::{Dispatcher, DispatcherState};
use crate::observability::duration_ms;
use crate::pacing::{AdaptivePacer, DelayGrowth, Pacing};
use crate::task::Envelope;

/// Puts the dispatcher back to idle when the loop ends, including when its future is dropped.
struct RunGuard<'a> {
    dispatcher: &'a Dispatcher,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.lifecycle().state = DispatcherState::Idle;
    }
}

impl Dispatcher {
    /// Run the worker with a constant pause after every task. Resolves once stopped.
    pub async fn run(&self, pause: Duration) {
        let Some(mut shutdown_rx) = self.begin("fixed") else {
            return;
        };
        let _guard = RunGuard { dispatcher: self };
        let mut lanes = self.receivers.lock().await;
        self.counters.record_delay(pause);

        info!(
            mode = "fixed",
            pause_ms = duration_ms(pause),
            lane_selection = ?self.selection,
            "dispatcher worker started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // stop を先に見る（stop 後に lane の残りを拾わない）
            let envelope = tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                envelope = lanes.recv(self.selection) => envelope,
            };
            let Some(envelope) = envelope else {
                break;
            };

            self.execute(envelope).await;

            if !sleep_unless_stopped(pause, &mut shutdown_rx).await {
                break;
            }
        }

        info!(mode = "fixed", "dispatcher worker stopped");
    }

    /// Run the worker with a pause that grows while tasks keep arriving back-to-back.
    ///
    /// When both lanes are empty the pause snaps back to `default_pause` and the worker
    /// polls again after sleeping it. After each task the pause is `default_pause` for the
    /// first task of a burst and `growth.grow(previous)` for every following one.
    pub async fn run_adaptive<G: DelayGrowth>(&self, default_pause: Duration, growth: G) {
        let Some(mut shutdown_rx) = self.begin("adaptive") else {
            return;
        };
        let _guard = RunGuard { dispatcher: self };
        let mut lanes = self.receivers.lock().await;
        let mut pacer = AdaptivePacer::new(default_pause);
        self.counters.record_pacing(pacer.state());

        info!(
            mode = "adaptive",
            default_pause_ms = duration_ms(default_pause),
            lane_selection = ?self.selection,
            "dispatcher worker started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let delay = match lanes.try_recv(self.selection) {
                None => {
                    trace!("lanes empty, pacing reset");
                    pacer.on_idle()
                }
                Some(envelope) => {
                    self.execute(envelope).await;
                    let delay = pacer.on_executed(&growth);
                    debug!(
                        delay_ms = duration_ms(delay),
                        consecutive = pacer.state().consecutive,
                        "pacing delay applied"
                    );
                    delay
                }
            };
            self.counters.record_pacing(pacer.state());

            if !sleep_unless_stopped(delay, &mut shutdown_rx).await {
                break;
            }
        }

        info!(mode = "adaptive", "dispatcher worker stopped");
    }

    /// Run in whichever mode `pacing` describes.
    pub async fn run_with(&self, pacing: Pacing) {
        match pacing {
            Pacing::Fixed(pause) => self.run(pause).await,
            Pacing::Adaptive { default, growth } => self.run_adaptive(default, growth).await,
        }
    }

    /// Idle -> Running, or `None` if this call must not start a loop.
    fn begin(&self, mode: &'static str) -> Option<watch::Receiver<bool>> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == DispatcherState::Running {
            error!(mode, "dispatcher is already running, start ignored");
            return None;
        }
        if *self.shutdown_tx.borrow() {
            warn!(mode, "dispatcher has been stopped and cannot be restarted");
            return None;
        }
        lifecycle.state = DispatcherState::Running;
        lifecycle.started_at = Some(chrono::Utc::now());
        Some(self.shutdown_tx.subscribe())
    }

    /// Run one task on the blocking pool and wait for it. Failures are logged, never returned.
    async fn execute(&self, envelope: Envelope) {
        let Envelope { id, lane, task } = envelope;
        debug!(submission_id = %id, lane = %lane, "executing task");

        let ok = match tokio::task::spawn_blocking(move || task.run()).await {
            Ok(Ok(())) => {
                debug!(submission_id = %id, lane = %lane, "task completed");
                true
            }
            Ok(Err(err)) => {
                error!(submission_id = %id, lane = %lane, error = %err, "task failed");
                false
            }
            Err(join_err) => {
                error!(submission_id = %id, lane = %lane, error = %join_err, "task panicked");
                false
            }
        };
        self.counters.record_executed(ok);
    }
}

/// Sleep for `delay` unless stop arrives first. Returns `false` when the worker should exit.
async fn sleep_unless_stopped(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        biased;
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;
    use crate::error::{SubmitError, TaskError};
    use crate::pacing::GrowthPolicy;
    use crate::queue::{Lane, LaneSelection};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    async fn wait_until_running(dispatcher: &Dispatcher) {
        timeout(Duration::from_secs(2), async {
            while !dispatcher.is_running() {
                tokio::time::sleep(ms(1)).await;
            }
        })
        .await
        .expect("dispatcher did not start");
    }

    async fn wait_for(counter: &AtomicUsize, n: usize) {
        timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < n {
                tokio::time::sleep(ms(2)).await;
            }
        })
        .await
        .expect("tasks did not run in time");
    }

    fn spawn_fixed(dispatcher: &Arc<Dispatcher>, pause: Duration) -> JoinHandle<()> {
        let d = Arc::clone(dispatcher);
        tokio::spawn(async move { d.run(pause).await })
    }

    fn counting_task(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> Result<(), TaskError> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn each_task_runs_exactly_once() {
        let dispatcher = Arc::new(Dispatcher::new());
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..20).map(|_| AtomicUsize::new(0)).collect());
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..20 {
            let hits = Arc::clone(&hits);
            let done = Arc::clone(&done);
            let task = move || {
                hits[i].fetch_add(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TaskError>(())
            };
            if i % 2 == 0 {
                dispatcher.submit(task);
            } else {
                dispatcher.submit_low_priority(task);
            }
        }

        wait_for(&done, 20).await;
        tokio::time::sleep(ms(20)).await;
        assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));

        dispatcher.stop();
        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
        let stats = dispatcher.stats();
        assert_eq!(stats.executed, 20);
        assert_eq!(stats.submitted, 20);
        assert_eq!(stats.state, DispatcherState::Idle);
    }

    #[tokio::test]
    async fn submit_before_start_is_dropped_without_blocking() {
        let dispatcher = Arc::new(Dispatcher::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let started = Instant::now();
        dispatcher.submit(counting_task(&counter));
        dispatcher.submit_low_priority(counting_task(&counter));
        assert!(started.elapsed() < ms(100));
        assert_eq!(
            dispatcher.try_submit(Lane::Normal, counting_task(&counter)),
            Err(SubmitError::NotRunning)
        );

        // dropped tasks must not run once the worker comes up
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;
        tokio::time::sleep(ms(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.stats().dropped, 3);

        dispatcher.stop();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let dispatcher = Arc::new(Dispatcher::new());
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        // 2 回目の run はすぐ戻り、1 本目には影響しない
        timeout(ms(200), dispatcher.run(ms(10)))
            .await
            .expect("second run must return immediately");
        timeout(ms(200), dispatcher.run_adaptive(ms(10), |d: Duration| d))
            .await
            .expect("second run_adaptive must return immediately");
        assert!(dispatcher.is_running());

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            dispatcher.submit(counting_task(&counter));
        }
        wait_for(&counter, 5).await;
        tokio::time::sleep(ms(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        dispatcher.stop();
        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_ends_worker_and_drops_later_submissions() {
        let dispatcher = Arc::new(Dispatcher::new());
        // long pause: stop must cut the sleep short
        let worker = spawn_fixed(&dispatcher, Duration::from_secs(30));
        wait_until_running(&dispatcher).await;

        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.submit(counting_task(&counter));
        wait_for(&counter, 1).await;

        dispatcher.stop();
        assert!(!dispatcher.is_running());
        timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker did not exit after stop")
            .unwrap();

        dispatcher.submit(counting_task(&counter));
        dispatcher.submit_low_priority(counting_task(&counter));
        tokio::time::sleep(ms(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_terminal() {
        let dispatcher = Dispatcher::new();
        dispatcher.stop();
        dispatcher.stop();
        assert!(dispatcher.is_stopped());

        timeout(ms(200), dispatcher.run(ms(10)))
            .await
            .expect("run after stop must return immediately");
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn in_flight_task_finishes_after_stop() {
        let dispatcher = Arc::new(Dispatcher::new());
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let finished = Arc::new(AtomicUsize::new(0));
        let task_finished = Arc::clone(&finished);
        dispatcher.submit(move || {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
            task_finished.fetch_add(1, Ordering::SeqCst);
            Ok::<(), TaskError>(())
        });

        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();
        dispatcher.stop();
        let _ = release_tx.send(());

        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_and_panics_do_not_stop_the_worker() {
        let dispatcher = Arc::new(Dispatcher::new());
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.submit(|| Err::<(), _>(TaskError::failed("smtp 421")));
        dispatcher.submit(|| -> Result<(), TaskError> { panic!("template bug") });
        dispatcher.submit(counting_task(&counter));
        wait_for(&counter, 1).await;
        tokio::time::sleep(ms(20)).await;

        let stats = dispatcher.stats();
        assert_eq!(stats.executed, 3);
        assert_eq!(stats.failed, 2);
        assert!(dispatcher.is_running());

        dispatcher.stop();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn fifo_within_lane_and_strict_priority_across_lanes() {
        let dispatcher = Arc::new(
            Dispatcher::builder()
                .lane_selection(LaneSelection::Strict)
                .build(),
        );
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        // 先頭の task で worker を塞いでから両 lane に積む
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        dispatcher.submit(move || {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
            Ok::<(), TaskError>(())
        });
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let record = |label: &'static str| {
            let order = Arc::clone(&order);
            move || {
                order.lock().unwrap().push(label);
                Ok::<(), TaskError>(())
            }
        };
        dispatcher.submit_low_priority(record("low-1"));
        dispatcher.submit_low_priority(record("low-2"));
        dispatcher.submit(record("normal-1"));
        dispatcher.submit(record("normal-2"));
        let _ = release_tx.send(());

        timeout(Duration::from_secs(2), async {
            while order.lock().unwrap().len() < 4 {
                tokio::time::sleep(ms(2)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            *order.lock().unwrap(),
            vec!["normal-1", "normal-2", "low-1", "low-2"]
        );

        dispatcher.stop();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn fixed_pause_is_applied_after_every_task() {
        let dispatcher = Arc::new(Dispatcher::new());
        let pause = ms(40);
        let worker = spawn_fixed(&dispatcher, pause);
        wait_until_running(&dispatcher).await;

        let stamps = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..4 {
            let stamps = Arc::clone(&stamps);
            dispatcher.submit(move || {
                stamps.lock().unwrap().push(Instant::now());
                Ok::<(), TaskError>(())
            });
        }

        timeout(Duration::from_secs(2), async {
            while stamps.lock().unwrap().len() < 4 {
                tokio::time::sleep(ms(2)).await;
            }
        })
        .await
        .unwrap();

        let stamps = stamps.lock().unwrap().clone();
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= pause);
        }
        assert_eq!(dispatcher.stats().current_delay_ms, 40);

        dispatcher.stop();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn adaptive_burst_grows_delay_then_resets_when_idle() {
        let dispatcher = Arc::new(Dispatcher::new());
        let inputs = Arc::new(Mutex::new(Vec::new()));
        let policy = GrowthPolicy::new(1.5, ms(20), ms(40)).unwrap();
        let growth = {
            let inputs = Arc::clone(&inputs);
            move |current: Duration| {
                inputs.lock().unwrap().push(current);
                policy.next(current)
            }
        };

        let worker = {
            let d = Arc::clone(&dispatcher);
            tokio::spawn(async move { d.run_adaptive(ms(10), growth).await })
        };
        wait_until_running(&dispatcher).await;

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            dispatcher.submit(counting_task(&counter));
        }
        wait_for(&counter, 3).await;
        // 10ms (1st) -> grow(10ms)=20ms floor (2nd) -> grow(20ms)=30ms (3rd)
        tokio::time::sleep(ms(5)).await;
        assert_eq!(*inputs.lock().unwrap(), vec![ms(10), ms(20)]);

        // let the lanes stay empty long enough for the idle branch to run
        tokio::time::sleep(ms(100)).await;
        let stats = dispatcher.stats();
        assert_eq!(stats.consecutive, 0);
        assert_eq!(stats.current_delay_ms, 10);

        // 新しい単発 task は default から
        dispatcher.submit(counting_task(&counter));
        wait_for(&counter, 4).await;
        tokio::time::sleep(ms(5)).await;
        assert_eq!(inputs.lock().unwrap().len(), 2);

        dispatcher.stop();
        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_with_uses_configured_mode() {
        let dispatcher = Arc::new(Dispatcher::new());
        let pacing = Pacing::Adaptive {
            default: ms(5),
            growth: GrowthPolicy::new(2.0, ms(5), ms(20)).unwrap(),
        };
        let worker = {
            let d = Arc::clone(&dispatcher);
            tokio::spawn(async move { d.run_with(pacing).await })
        };
        wait_until_running(&dispatcher).await;

        let counter = Arc::new(AtomicUsize::new(0));
        dispatcher.submit_low_priority(counting_task(&counter));
        wait_for(&counter, 1).await;

        dispatcher.stop();
        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
        assert!(dispatcher.stats().started_at.is_some());
    }

    #[tokio::test]
    async fn full_lane_is_reported_to_try_submit() {
        let dispatcher = Arc::new(Dispatcher::builder().lane_capacity(1).build());
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        dispatcher.submit(move || {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
            Ok::<(), TaskError>(())
        });
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        assert!(dispatcher.try_submit(Lane::Low, counting_task(&counter)).is_ok());
        assert_eq!(
            dispatcher.try_submit(Lane::Low, counting_task(&counter)),
            Err(SubmitError::LaneFull {
                lane: Lane::Low,
                capacity: 1
            })
        );
        assert_eq!(dispatcher.stats().pending_low, 1);

        let _ = release_tx.send(());
        wait_for(&counter, 1).await;
        dispatcher.stop();
        worker.await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drained_ignores_submissions_dropped_on_a_full_lane() {
        let dispatcher = Arc::new(Dispatcher::builder().lane_capacity(1).build());
        let worker = spawn_fixed(&dispatcher, ms(50));
        wait_until_running(&dispatcher).await;

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            dispatcher.submit(counting_task(&counter));
        }
        let after_submit = dispatcher.stats();
        assert!(after_submit.dropped >= 1);
        assert_eq!(after_submit.submitted + after_submit.dropped, 4);

        // executed は受理された件数までしか増えない
        timeout(Duration::from_secs(2), async {
            while !dispatcher.stats().is_drained() {
                tokio::time::sleep(ms(5)).await;
            }
        })
        .await
        .expect("accepted tasks were not all executed");

        let stats = dispatcher.stats();
        assert_eq!(stats.executed, stats.submitted);
        assert!(stats.executed < 4);

        dispatcher.stop();
        worker.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn producer_threads_submit_concurrently() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 200;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let dispatcher = Arc::new(Dispatcher::builder().lane_capacity(TOTAL).build());
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        let hits: Arc<Vec<AtomicUsize>> =
            Arc::new((0..TOTAL).map(|_| AtomicUsize::new(0)).collect());
        let done = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let d = Arc::clone(&dispatcher);
                let hits = Arc::clone(&hits);
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let slot = p * PER_PRODUCER + i;
                        let hits = Arc::clone(&hits);
                        let done = Arc::clone(&done);
                        let lane = if slot % 2 == 0 { Lane::Normal } else { Lane::Low };
                        d.try_submit(lane, move || {
                            hits[slot].fetch_add(1, Ordering::SeqCst);
                            done.fetch_add(1, Ordering::SeqCst);
                            Ok::<(), TaskError>(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        wait_for(&done, TOTAL).await;
        for producer in producers {
            producer.join().unwrap();
        }
        dispatcher.stop();
        timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker did not exit after stop")
            .unwrap();

        assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
        let stats = dispatcher.stats();
        assert_eq!(stats.submitted, TOTAL as u64);
        assert_eq!(stats.executed, TOTAL as u64);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn nothing_is_accepted_once_stop_has_returned() {
        let dispatcher = Arc::new(Dispatcher::builder().lane_capacity(4096).build());
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let d = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    let lane = if p % 2 == 0 { Lane::Normal } else { Lane::Low };
                    loop {
                        let stopped_before = d.is_stopped();
                        let result = d.try_submit(lane, || Ok::<(), TaskError>(()));
                        if stopped_before {
                            assert_eq!(result, Err(SubmitError::NotRunning));
                            break;
                        }
                        std::thread::yield_now();
                    }
                })
            })
            .collect();

        tokio::time::sleep(ms(20)).await;
        dispatcher.stop();
        for producer in producers {
            producer.join().unwrap();
        }
        timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker did not exit after stop")
            .unwrap();
        assert!(!dispatcher.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fair_selection_lets_low_lane_overtake_queued_normal_tasks() {
        const PER_LANE: usize = 20;

        let dispatcher = Arc::new(Dispatcher::new());
        assert_eq!(dispatcher.lane_selection(), LaneSelection::Fair);
        let worker = spawn_fixed(&dispatcher, Duration::ZERO);
        wait_until_running(&dispatcher).await;

        // 先頭タスクで worker を止めておき、その間に両 lane を埋める
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        dispatcher.submit(move || {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
            Ok::<(), TaskError>(())
        });
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..PER_LANE {
            for lane in [Lane::Normal, Lane::Low] {
                let order = Arc::clone(&order);
                dispatcher
                    .try_submit(lane, move || {
                        order.lock().unwrap().push(lane);
                        Ok::<(), TaskError>(())
                    })
                    .unwrap();
            }
        }
        let _ = release_tx.send(());

        timeout(Duration::from_secs(5), async {
            while order.lock().unwrap().len() < 2 * PER_LANE {
                tokio::time::sleep(ms(2)).await;
            }
        })
        .await
        .expect("queued tasks did not run");
        dispatcher.stop();
        worker.await.unwrap();

        let order = order.lock().unwrap().clone();
        let last_normal = order.iter().rposition(|l| *l == Lane::Normal).unwrap();
        let first_low = order.iter().position(|l| *l == Lane::Low).unwrap();
        assert!(
            first_low < last_normal,
            "low lane never ran while normal tasks were queued: {order:?}"
        );
    }
}

// [[MEMEOOORR]]/apps/agent-kernel/src/autonomy.rs
// Purpose: Autonomous loop. One startup trigger, then a repeating timer;
//          every tick is isolated, and ticks never overlap.
// Architecture: Domain Logic Layer
// Dependencies: Tokio, tokio-util, futures

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::DEFAULT_LOOP_INTERVAL_MS;
use crate::memory::{create_memory, Room};
use crate::runtime::AgentRuntime;
use crate::sequencer::{trigger_actions, TriggerError};
use crate::server::ControlServer;
use crate::store::StoreError;

/// Table every tick's memory is persisted to before acting on it.
pub const START_TABLE: &str = "start";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_LOOP_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TickPhase {
    Startup,
    Periodic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Publish succeeded and react ran
    Published,
    /// Publish returned a falsy result; react was skipped
    Declined,
    Failed { error: String },
    /// The previous tick was still in flight
    SkippedBusy,
    /// Interrupted by `LoopHandle::stop`
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub phase: TickPhase,
    pub outcome: TickOutcome,
    pub started_at: String,
    pub elapsed_ms: u64,
}

/// Sink for tick reports. Failures reach observers, never the caller.
pub trait TickObserver: Send + Sync {
    fn on_tick(&self, report: &TickReport);
}

#[derive(Error, Debug)]
pub enum TickError {
    #[error("Failed to persist memory: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

/// In-flight flag shared by all ticks of one loop.
#[derive(Default)]
struct TickGuard {
    busy: AtomicBool,
}

impl TickGuard {
    fn try_acquire(self: &Arc<Self>) -> Option<TickPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit(self.clone()))
    }
}

/// Releases the guard on drop, including when the tick panics.
struct TickPermit(Arc<TickGuard>);

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

/// Cache key holding the last memory the sequencer ran on.
pub const LAST_TRIGGER_KEY: &str = "autonomy:last_trigger";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastTrigger {
    pub memory_id: uuid::Uuid,
    pub published: bool,
    pub at: String,
}

/// One trigger cycle: build a memory, persist it, run the sequencer.
pub async fn run_tick(runtime: &AgentRuntime) -> Result<bool, TickError> {
    let mut memory = create_memory(runtime, Room::SocialInteraction, None);
    runtime.create_memory(&memory, START_TABLE, false).await?;
    let published = trigger_actions(runtime, &mut memory).await?;

    let last = LastTrigger {
        memory_id: memory.id,
        published,
        at: Utc::now().to_rfc3339(),
    };
    if let Err(e) = runtime.cache().set(LAST_TRIGGER_KEY, &last, None).await {
        tracing::warn!("Failed to cache last trigger: {}", e);
    }
    Ok(published)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn log_report(report: &TickReport) {
    match &report.outcome {
        TickOutcome::Published | TickOutcome::Declined => tracing::info!(
            "Tick {} ({:?}) finished in {}ms: {:?}",
            report.tick,
            report.phase,
            report.elapsed_ms,
            report.outcome
        ),
        TickOutcome::Failed { error } => {
            tracing::error!("Error in autonomous loop (tick {}): {}", report.tick, error)
        }
        TickOutcome::SkippedBusy => tracing::warn!(
            "Tick {} skipped: previous tick is still running",
            report.tick
        ),
        TickOutcome::Cancelled => tracing::info!("Tick {} cancelled by shutdown", report.tick),
    }
}

/// Owned handle to a running loop. Dropping it leaves the loop running until
/// the process exits; `stop` shuts it down.
pub struct LoopHandle {
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
    tracker: TaskTracker,
}

impl LoopHandle {
    /// Cancels the timer and any in-flight tick, then waits for both.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.scheduler.await {
            tracing::error!("Loop scheduler ended abnormally: {}", e);
        }
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Autonomous loop stopped");
    }
}

struct Scheduler {
    runtime: Arc<AgentRuntime>,
    observer: Arc<dyn TickObserver>,
    guard: Arc<TickGuard>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    next_tick: u64,
}

impl Scheduler {
    async fn run(mut self, interval: Duration) {
        self.fire(TickPhase::Startup);

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.fire(TickPhase::Periodic),
            }
        }
    }

    fn fire(&mut self, phase: TickPhase) {
        let tick = self.next_tick;
        self.next_tick += 1;
        let started_at = Utc::now().to_rfc3339();

        let Some(permit) = self.guard.try_acquire() else {
            let report = TickReport {
                tick,
                phase,
                outcome: TickOutcome::SkippedBusy,
                started_at,
                elapsed_ms: 0,
            };
            log_report(&report);
            self.observer.on_tick(&report);
            return;
        };

        let runtime = self.runtime.clone();
        let observer = self.observer.clone();
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let _permit = permit;
            let clock = std::time::Instant::now();
            tracing::info!(
                "[{:?}] {} is deciding what to do...",
                phase,
                runtime.character().name
            );

            let outcome = tokio::select! {
                _ = cancel.cancelled() => TickOutcome::Cancelled,
                result = AssertUnwindSafe(run_tick(&runtime)).catch_unwind() => match result {
                    Ok(Ok(true)) => TickOutcome::Published,
                    Ok(Ok(false)) => TickOutcome::Declined,
                    Ok(Err(e)) => TickOutcome::Failed { error: e.to_string() },
                    Err(panic) => TickOutcome::Failed {
                        error: format!("tick panicked: {}", panic_message(panic)),
                    },
                },
            };

            let report = TickReport {
                tick,
                phase,
                outcome,
                started_at,
                elapsed_ms: clock.elapsed().as_millis() as u64,
            };
            log_report(&report);
            observer.on_tick(&report);
        });
    }
}

/// Starts the loop for `runtime`, reporting every tick to `observer`.
pub fn spawn_loop(
    runtime: Arc<AgentRuntime>,
    config: LoopConfig,
    observer: Arc<dyn TickObserver>,
) -> LoopHandle {
    let interval = if config.interval.is_zero() {
        tracing::warn!("Loop interval of 0 is not allowed, using 1ms");
        Duration::from_millis(1)
    } else {
        config.interval
    };

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    let scheduler = Scheduler {
        runtime,
        observer,
        guard: Arc::new(TickGuard::default()),
        tracker: tracker.clone(),
        cancel: cancel.clone(),
        next_tick: 0,
    };

    tracing::info!("Autonomous loop armed with interval {:?}", interval);
    let scheduler = tokio::spawn(scheduler.run(interval));

    LoopHandle {
        cancel,
        scheduler,
        tracker,
    }
}

/// Registers the agent with the control server and starts its loop.
pub fn run_autonomously(
    runtime: Arc<AgentRuntime>,
    server: &ControlServer,
    config: LoopConfig,
    observer: Arc<dyn TickObserver>,
) -> LoopHandle {
    tracing::info!("Running {} in autonomous mode...", runtime.character().name);
    server.register_agent(runtime.clone());
    spawn_loop(runtime, config, observer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::ActionOutcome;
    use crate::testing::{self, ScriptedAction};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        reports: Mutex<Vec<TickReport>>,
    }

    impl Recorder {
        fn reports(&self) -> Vec<TickReport> {
            self.reports.lock().unwrap().clone()
        }

        async fn wait_for(&self, count: usize) -> Vec<TickReport> {
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            loop {
                let reports = self.reports();
                if reports.len() >= count {
                    return reports;
                }
                assert!(
                    std::time::Instant::now() < deadline,
                    "timed out waiting for {} reports, got {:?}",
                    count,
                    reports
                );
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    impl TickObserver for Recorder {
        fn on_tick(&self, report: &TickReport) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }

    fn config(ms: u64) -> LoopConfig {
        LoopConfig {
            interval: Duration::from_millis(ms),
        }
    }

    #[tokio::test]
    async fn test_startup_tick_runs_immediately() {
        let publish = ScriptedAction::always(ActionOutcome::Completed(true));
        let react = ScriptedAction::always(ActionOutcome::Completed(true));
        let runtime = Arc::new(testing::runtime_with_actions(publish, react.clone()));
        let recorder = Arc::new(Recorder::default());

        let handle = spawn_loop(runtime.clone(), config(3_600_000), recorder.clone());
        let reports = recorder.wait_for(1).await;

        assert_eq!(reports[0].tick, 0);
        assert_eq!(reports[0].phase, TickPhase::Startup);
        assert_eq!(reports[0].outcome, TickOutcome::Published);
        assert_eq!(react.rooms(), vec![Room::AssetInteraction]);

        let stored = runtime.recent_memories(START_TABLE, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].room, Room::SocialInteraction);

        let last: LastTrigger = runtime.cache().get(LAST_TRIGGER_KEY).await.unwrap().unwrap();
        assert_eq!(last.memory_id, stored[0].id);
        assert!(last.published);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_failed_tick_does_not_stop_the_timer() {
        let publish = ScriptedAction::new(|call| {
            if call == 0 {
                Err(anyhow::anyhow!("rate limited"))
            } else {
                Ok(ActionOutcome::Completed(true))
            }
        });
        let react = ScriptedAction::always(ActionOutcome::Completed(true));
        let runtime = Arc::new(testing::runtime_with_actions(publish, react.clone()));
        let recorder = Arc::new(Recorder::default());

        let handle = spawn_loop(runtime, config(20), recorder.clone());
        let reports = recorder.wait_for(2).await;

        assert!(matches!(
            &reports[0].outcome,
            TickOutcome::Failed { error } if error.contains("rate limited")
        ));
        assert_eq!(reports[1].phase, TickPhase::Periodic);
        assert_eq!(reports[1].outcome, TickOutcome::Published);
        assert!(react.calls() >= 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let publish = ScriptedAction::new(|call| {
            if call == 0 {
                panic!("handler exploded");
            }
            Ok(ActionOutcome::Completed(false))
        });
        let react = ScriptedAction::always(ActionOutcome::Completed(true));
        let runtime = Arc::new(testing::runtime_with_actions(publish, react.clone()));
        let recorder = Arc::new(Recorder::default());

        let handle = spawn_loop(runtime, config(20), recorder.clone());
        let reports = recorder.wait_for(2).await;

        assert!(matches!(
            &reports[0].outcome,
            TickOutcome::Failed { error } if error.contains("handler exploded")
        ));
        assert_eq!(reports[1].outcome, TickOutcome::Declined);
        assert_eq!(react.calls(), 0);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_overlapping_ticks_are_skipped() {
        let publish = ScriptedAction::slow(
            ActionOutcome::Completed(true),
            Duration::from_millis(150),
        );
        let react = ScriptedAction::always(ActionOutcome::Completed(true));
        let runtime = Arc::new(testing::runtime_with_actions(publish.clone(), react));
        let recorder = Arc::new(Recorder::default());

        let handle = spawn_loop(runtime, config(10), recorder.clone());
        tokio::time::sleep(Duration::from_millis(400)).await;
        handle.stop().await;

        let reports = recorder.reports();
        assert!(reports
            .iter()
            .any(|r| r.outcome == TickOutcome::SkippedBusy));
        assert!(reports
            .iter()
            .any(|r| r.outcome == TickOutcome::Published));
        assert_eq!(publish.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_stop_halts_further_ticks() {
        let publish = ScriptedAction::always(ActionOutcome::Completed(false));
        let react = ScriptedAction::always(ActionOutcome::Completed(true));
        let runtime = Arc::new(testing::runtime_with_actions(publish.clone(), react));
        let recorder = Arc::new(Recorder::default());

        let handle = spawn_loop(runtime, config(10), recorder.clone());
        recorder.wait_for(3).await;
        handle.stop().await;

        let calls = publish.calls();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(publish.calls(), calls);
    }

    #[tokio::test]
    async fn test_stop_cancels_hung_tick() {
        let publish = ScriptedAction::slow(
            ActionOutcome::Completed(true),
            Duration::from_secs(3_600),
        );
        let react = ScriptedAction::always(ActionOutcome::Completed(true));
        let runtime = Arc::new(testing::runtime_with_actions(publish.clone(), react));
        let recorder = Arc::new(Recorder::default());

        let handle = spawn_loop(runtime, config(3_600_000), recorder.clone());
        while publish.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop should not wait for a hung handler");
        assert_eq!(recorder.reports()[0].outcome, TickOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_run_autonomously_registers_agent_and_records_stats() {
        let publish = ScriptedAction::always(ActionOutcome::Completed(true));
        let react = ScriptedAction::always(ActionOutcome::Completed(true));
        let runtime = Arc::new(testing::runtime_with_actions(publish, react.clone()));
        let server = ControlServer::new();

        let handle = run_autonomously(runtime.clone(), &server, config(3_600_000), runtime.clone());
        assert!(server.agent(runtime.agent_id()).is_some());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while runtime.loop_stats().ticks == 0 {
            assert!(std::time::Instant::now() < deadline, "startup tick never reported");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(runtime.loop_stats().published, 1);
        assert_eq!(react.calls(), 1);
        handle.stop().await;
    }
}

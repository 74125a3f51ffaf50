use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{Batch, CommandKind, LatchId, Outcome, Outcomes, Request};
use crate::device::{is_bus_failure, BusStatus, EpsDevice};
use crate::dispatcher::{self, DispatcherState, DispatcherStats};
use crate::error::{EpsError, EpsResult};
use crate::queue::CommandQueue;
use crate::telemetry::{EpsConfig, Housekeeping, HousekeepingOut};

/// Default producer wait bound per request.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
/// Default hardware watchdog refresh period.
pub const DEFAULT_WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

/// Tunable timing for one core instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Upper bound a producer waits for its result before giving up.
    pub command_timeout: Duration,
    /// Period between hardware watchdog refreshes.
    pub watchdog_period: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            watchdog_period: DEFAULT_WATCHDOG_PERIOD,
        }
    }
}

impl CoreConfig {
    /// # Errors
    ///
    /// Returns [`EpsError::InvalidConfig`] if either duration is zero.
    pub fn validate(&self) -> EpsResult<()> {
        if self.command_timeout.is_zero() {
            return Err(EpsError::InvalidConfig("command_timeout must be non-zero"));
        }
        if self.watchdog_period.is_zero() {
            return Err(EpsError::InvalidConfig("watchdog_period must be non-zero"));
        }
        Ok(())
    }
}

/// Process-wide stop flag with broadcast wake.
///
/// Set exactly once; wakes the watchdog sleep directly, while queue close
/// wakes the dispatcher and every blocked producer. Shutdown latency is
/// bounded by wake latency, not by any configured timeout.
#[derive(Debug, Default)]
pub(crate) struct ShutdownSignal {
    triggered: AtomicBool,
    gate: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownSignal {
    /// Returns true only for the call that actually triggered shutdown.
    pub(crate) fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.gate.lock() = true;
        self.wake.notify_all();
        true
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Sleep for `period` or until shutdown, whichever comes first.
    /// Returns true once shutdown has been triggered.
    pub(crate) fn sleep(&self, period: Duration) -> bool {
        let mut gate = self.gate.lock();
        let _ = self
            .wake
            .wait_while_for(&mut gate, |triggered| !*triggered, period);
        *gate
    }
}

/// Point-in-time view of the core's counters for telemetry and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStatsSnapshot {
    pub dispatcher_state: DispatcherState,
    pub queued_requests: usize,
    pub batches_executed: u64,
    pub commands_executed: u64,
    pub bus_failures: u64,
    pub cancelled_requests: u64,
    pub watchdog_refreshes: u64,
}

/// The EPS control core: one bounded command queue, one dispatcher thread
/// with exclusive bus access, one watchdog thread, and the shutdown
/// coordination tying them together.
///
/// An instance owns all of its state; nothing is process-global. Producers
/// on any number of threads call [`EpsCore::submit`] (or the per-command
/// wrappers) and block until their batch executes, is cancelled, or their
/// wait bound elapses.
pub struct EpsCore {
    queue: Arc<CommandQueue>,
    shutdown: Arc<ShutdownSignal>,
    stats: Arc<DispatcherStats>,
    watchdog_refreshes: Arc<AtomicU64>,
    command_timeout: Duration,
    dispatcher: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl EpsCore {
    /// Take ownership of the device, start the dispatcher and watchdog
    /// threads, and return the running core.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if a worker thread cannot be
    /// spawned; the device is dropped in that case and nothing keeps
    /// running.
    pub fn spawn<D: EpsDevice + 'static>(device: D, config: CoreConfig) -> EpsResult<Self> {
        config.validate()?;

        let device = Arc::new(Mutex::new(device));
        let queue = Arc::new(CommandQueue::new());
        let shutdown = Arc::new(ShutdownSignal::default());
        let stats = Arc::new(DispatcherStats::default());
        let watchdog_refreshes = Arc::new(AtomicU64::new(0));

        let dispatcher = {
            let device = Arc::clone(&device);
            let queue = Arc::clone(&queue);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("eps-dispatcher".into())
                .spawn(move || dispatcher::run(device, queue, stats))
                .map_err(|_| EpsError::ThreadSpawn)?
        };

        let watchdog = {
            let device = Arc::clone(&device);
            let shutdown = Arc::clone(&shutdown);
            let refreshes = Arc::clone(&watchdog_refreshes);
            let period = config.watchdog_period;
            thread::Builder::new()
                .name("eps-watchdog".into())
                .spawn(move || watchdog_loop(&device, &shutdown, period, &refreshes))
        };
        let watchdog = match watchdog {
            Ok(handle) => handle,
            Err(_) => {
                shutdown.trigger();
                queue.close();
                let _ = dispatcher.join();
                return Err(EpsError::ThreadSpawn);
            }
        };

        Ok(Self {
            queue,
            shutdown,
            stats,
            watchdog_refreshes,
            command_timeout: config.command_timeout,
            dispatcher: Some(dispatcher),
            watchdog: Some(watchdog),
        })
    }

    /// Submit a batch and block until its results arrive, shutdown cancels
    /// it, or the configured wait bound elapses.
    ///
    /// Sub-commands execute strictly in the given order and a failing
    /// sub-command does not skip its successors; the returned set always
    /// holds one [`Outcome`] per sub-command.
    ///
    /// # Errors
    ///
    /// [`EpsError::EmptyBatch`], [`EpsError::BatchOverflow`],
    /// [`EpsError::QueueFull`], [`EpsError::ShuttingDown`],
    /// [`EpsError::Timeout`], or [`EpsError::Cancelled`].
    pub fn submit(&self, batch: &[CommandKind]) -> EpsResult<Outcomes> {
        self.submit_with_timeout(batch, self.command_timeout)
    }

    /// [`EpsCore::submit`] with an explicit wait bound for this request.
    ///
    /// A timeout is purely the producer giving up: the batch still executes
    /// when the dispatcher reaches it, and the late result is reclaimed
    /// internally.
    ///
    /// # Errors
    ///
    /// As for [`EpsCore::submit`].
    pub fn submit_with_timeout(
        &self,
        batch: &[CommandKind],
        timeout: Duration,
    ) -> EpsResult<Outcomes> {
        if batch.is_empty() {
            return Err(EpsError::EmptyBatch);
        }
        if self.shutdown.is_triggered() {
            return Err(EpsError::ShuttingDown);
        }

        let mut owned = Batch::new();
        owned
            .extend_from_slice(batch)
            .map_err(|()| EpsError::BatchOverflow)?;

        let request = Arc::new(Request::new(owned));
        self.queue.enqueue(Arc::clone(&request))?;
        request.wait(timeout)
    }

    pub fn ping(&self) -> EpsResult<BusStatus> {
        self.single_status(CommandKind::Ping)
    }

    pub fn reboot(&self) -> EpsResult<BusStatus> {
        self.single_status(CommandKind::Reboot)
    }

    pub fn hard_reset(&self) -> EpsResult<BusStatus> {
        self.single_status(CommandKind::HardReset)
    }

    pub fn toggle_latch(&self, latch: LatchId) -> EpsResult<BusStatus> {
        self.single_status(CommandKind::ToggleLatch { latch })
    }

    pub fn set_latch(&self, latch: LatchId, on: bool) -> EpsResult<BusStatus> {
        self.single_status(CommandKind::SetLatch { latch, on })
    }

    pub fn set_config(&self, config: EpsConfig) -> EpsResult<BusStatus> {
        self.single_status(CommandKind::SetConfig(config))
    }

    pub fn housekeeping(&self) -> EpsResult<(BusStatus, Housekeeping)> {
        match self.single(CommandKind::GetHousekeeping)? {
            Outcome::Housekeeping { status, telemetry } => Ok((status, telemetry)),
            other => unreachable!("housekeeping request produced {other:?}"),
        }
    }

    pub fn housekeeping_out(&self) -> EpsResult<(BusStatus, HousekeepingOut)> {
        match self.single(CommandKind::GetHousekeepingOut)? {
            Outcome::HousekeepingOut { status, telemetry } => Ok((status, telemetry)),
            other => unreachable!("output housekeeping request produced {other:?}"),
        }
    }

    pub fn config(&self) -> EpsResult<(BusStatus, EpsConfig)> {
        match self.single(CommandKind::GetConfig)? {
            Outcome::Config { status, config } => Ok((status, config)),
            other => unreachable!("config request produced {other:?}"),
        }
    }

    fn single(&self, kind: CommandKind) -> EpsResult<Outcome> {
        let outcomes = self.submit(&[kind])?;
        match outcomes.into_iter().next() {
            Some(outcome) => Ok(outcome),
            // A one-command batch always yields one outcome.
            None => Err(EpsError::EmptyBatch),
        }
    }

    fn single_status(&self, kind: CommandKind) -> EpsResult<BusStatus> {
        Ok(self.single(kind)?.status())
    }

    /// Trigger shutdown: reject new submissions, cancel every queued
    /// request (waking its producer), and wake the dispatcher and watchdog.
    /// An in-flight batch completes and delivers normally. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        info!("shutdown triggered");
        let cancelled = self.queue.close();
        self.stats.add_cancelled(cancelled as u64);
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    #[must_use]
    pub fn stats(&self) -> CoreStatsSnapshot {
        CoreStatsSnapshot {
            dispatcher_state: self.stats.state(),
            queued_requests: self.queue.len(),
            batches_executed: self.stats.batches_executed(),
            commands_executed: self.stats.commands_executed(),
            bus_failures: self.stats.bus_failures(),
            cancelled_requests: self.stats.cancelled_requests(),
            watchdog_refreshes: self.watchdog_refreshes.load(Ordering::Relaxed),
        }
    }
}

impl Drop for EpsCore {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
    }
}

/// Watchdog thread body: refresh the hardware watchdog every `period`
/// while idle, and exit promptly on shutdown.
///
/// Never touches the command queue; contends only for the device mutex,
/// one transaction per tick, so a deep queue cannot delay a refresh by
/// more than one in-flight transaction.
fn watchdog_loop<D: EpsDevice>(
    device: &Mutex<D>,
    shutdown: &ShutdownSignal,
    period: Duration,
    refreshes: &AtomicU64,
) {
    info!("watchdog started");
    loop {
        if shutdown.sleep(period) {
            break;
        }
        let status = {
            let mut dev = device.lock();
            dev.reset_watchdog()
        };
        if is_bus_failure(status) {
            warn!(status, "watchdog refresh failed");
        } else {
            refreshes.fetch_add(1, Ordering::Relaxed);
        }
    }
    info!("watchdog stopped");
}

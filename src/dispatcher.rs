use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{CommandKind, Outcome, Outcomes};
use crate::device::EpsDevice;
use crate::queue::CommandQueue;

/// Observable dispatcher state.
///
/// `Idle` while blocked on an empty queue, `Executing` while a dequeued
/// batch runs against the device, `ShuttingDown` once the queue is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatcherState {
    Idle,
    Executing,
    ShuttingDown,
}

impl DispatcherState {
    fn as_u8(self) -> u8 {
        match self {
            DispatcherState::Idle => 0,
            DispatcherState::Executing => 1,
            DispatcherState::ShuttingDown => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => DispatcherState::Idle,
            1 => DispatcherState::Executing,
            _ => DispatcherState::ShuttingDown,
        }
    }
}

/// Execution counters shared between the dispatcher thread and the core.
#[derive(Debug, Default)]
pub(crate) struct DispatcherStats {
    state: AtomicU8,
    batches_executed: AtomicU64,
    commands_executed: AtomicU64,
    bus_failures: AtomicU64,
    cancelled_requests: AtomicU64,
}

impl DispatcherStats {
    pub(crate) fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn batches_executed(&self) -> u64 {
        self.batches_executed.load(Ordering::Relaxed)
    }

    pub(crate) fn commands_executed(&self) -> u64 {
        self.commands_executed.load(Ordering::Relaxed)
    }

    pub(crate) fn bus_failures(&self) -> u64 {
        self.bus_failures.load(Ordering::Relaxed)
    }

    pub(crate) fn cancelled_requests(&self) -> u64 {
        self.cancelled_requests.load(Ordering::Relaxed)
    }

    pub(crate) fn add_cancelled(&self, count: u64) {
        self.cancelled_requests.fetch_add(count, Ordering::Relaxed);
    }
}

/// Dispatcher thread body: the queue's single consumer.
///
/// Requests execute in strict FIFO arrival order; within a batch,
/// sub-commands execute in submission order. A failing sub-command records
/// its status and never halts the loop. The loop exits only when the queue
/// reports closed.
pub(crate) fn run<D: EpsDevice>(
    device: Arc<Mutex<D>>,
    queue: Arc<CommandQueue>,
    stats: Arc<DispatcherStats>,
) {
    info!("dispatcher started");
    loop {
        stats.set_state(DispatcherState::Idle);
        let Some(request) = queue.wait_pop() else {
            break;
        };

        stats.set_state(DispatcherState::Executing);
        let outcomes = execute_batch(&device, request.batch(), &stats);
        request.complete(outcomes);
        stats.batches_executed.fetch_add(1, Ordering::Relaxed);
    }
    stats.set_state(DispatcherState::ShuttingDown);
    info!("dispatcher stopped");
}

fn execute_batch<D: EpsDevice>(
    device: &Mutex<D>,
    batch: &[CommandKind],
    stats: &DispatcherStats,
) -> Outcomes {
    let mut outcomes = Outcomes::new();
    for kind in batch {
        // One device lock per bus transaction, so the watchdog can refresh
        // between sub-commands of a long batch.
        let outcome = {
            let mut dev = device.lock();
            execute_command(&mut *dev, kind)
        };

        stats.commands_executed.fetch_add(1, Ordering::Relaxed);
        if outcome.is_failure() {
            stats.bus_failures.fetch_add(1, Ordering::Relaxed);
            warn!(status = outcome.status(), command = ?kind, "bus transaction failed");
        } else {
            debug!(status = outcome.status(), command = ?kind, "command executed");
        }

        // Outcome capacity equals batch capacity; this push cannot fail.
        let _ = outcomes.push(outcome);
    }
    outcomes
}

fn execute_command<D: EpsDevice>(device: &mut D, kind: &CommandKind) -> Outcome {
    match kind {
        CommandKind::Ping => Outcome::Status(device.ping()),
        CommandKind::Reboot => Outcome::Status(device.reboot()),
        CommandKind::ToggleLatch { latch } => Outcome::Status(device.toggle_latch(*latch)),
        CommandKind::SetLatch { latch, on } => Outcome::Status(device.set_latch(*latch, *on)),
        CommandKind::HardReset => Outcome::Status(device.hard_reset()),
        CommandKind::GetHousekeeping => {
            let (status, telemetry) = device.get_housekeeping();
            Outcome::Housekeeping { status, telemetry }
        }
        CommandKind::GetHousekeepingOut => {
            let (status, telemetry) = device.get_housekeeping_out();
            Outcome::HousekeepingOut { status, telemetry }
        }
        CommandKind::GetConfig => {
            let (status, config) = device.get_config();
            Outcome::Config { status, config }
        }
        CommandKind::SetConfig(config) => Outcome::Status(device.set_config(config)),
    }
}

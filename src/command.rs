use core::mem;
use core::time::Duration;

use heapless::Vec;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::device::{is_bus_failure, BusStatus};
use crate::error::EpsError;
use crate::telemetry::{EpsConfig, Housekeeping, HousekeepingOut};

/// Upper bound on sub-commands per request. The common case is one.
pub const MAX_BATCH_COMMANDS: usize = 8;

const_assert!(MAX_BATCH_COMMANDS >= 1);

pub type Batch = Vec<CommandKind, MAX_BATCH_COMMANDS>;
pub type Outcomes = Vec<Outcome, MAX_BATCH_COMMANDS>;

/// Switchable power rail on the distribution board.
///
/// Indices 0 through 5 map to the rails in board order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatchId {
    Rail5V1,
    Rail5V2,
    Rail5V3,
    Rail3V1,
    Rail3V2,
    Rail3V3,
}

impl LatchId {
    pub const ALL: [LatchId; 6] = [
        LatchId::Rail5V1,
        LatchId::Rail5V2,
        LatchId::Rail5V3,
        LatchId::Rail3V1,
        LatchId::Rail3V2,
        LatchId::Rail3V3,
    ];

    #[must_use]
    pub fn index(self) -> u8 {
        match self {
            LatchId::Rail5V1 => 0,
            LatchId::Rail5V2 => 1,
            LatchId::Rail5V3 => 2,
            LatchId::Rail3V1 => 3,
            LatchId::Rail3V2 => 4,
            LatchId::Rail3V3 => 5,
        }
    }

    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        LatchId::ALL.get(index as usize).copied()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LatchId::Rail5V1 => "5V1",
            LatchId::Rail5V2 => "5V2",
            LatchId::Rail5V3 => "5V3",
            LatchId::Rail3V1 => "3V1",
            LatchId::Rail3V2 => "3V2",
            LatchId::Rail3V3 => "3V3",
        }
    }
}

/// One command against the power distribution unit.
///
/// Each variant carries exactly the arguments its bus primitive needs, so a
/// malformed command cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Ping,
    Reboot,
    ToggleLatch { latch: LatchId },
    SetLatch { latch: LatchId, on: bool },
    HardReset,
    GetHousekeeping,
    GetHousekeepingOut,
    GetConfig,
    SetConfig(EpsConfig),
}

/// Result of one executed sub-command.
///
/// Action commands yield the raw bus status; get-commands pair the status
/// with the fetched payload. A negative status means the bus transaction
/// failed and the payload, if any, must not be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Status(BusStatus),
    Housekeeping {
        status: BusStatus,
        telemetry: Housekeeping,
    },
    HousekeepingOut {
        status: BusStatus,
        telemetry: HousekeepingOut,
    },
    Config {
        status: BusStatus,
        config: EpsConfig,
    },
}

impl Outcome {
    #[must_use]
    pub fn status(&self) -> BusStatus {
        match self {
            Outcome::Status(status)
            | Outcome::Housekeeping { status, .. }
            | Outcome::HousekeepingOut { status, .. }
            | Outcome::Config { status, .. } => *status,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        is_bus_failure(self.status())
    }
}

/// Completion slot state for one request.
///
/// `Pending` until the dispatcher or shutdown settles it; `Taken` once the
/// producer has consumed the outcomes.
#[derive(Debug)]
pub(crate) enum Completion {
    Pending,
    Done(Outcomes),
    Cancelled,
    Taken,
}

/// One queued unit of work: a batch of commands plus its result slot and
/// wait handle.
///
/// Shared as `Arc<Request>` between the producer and the queue/dispatcher.
/// Both sides must drop their reference before the slot is reclaimed, so a
/// producer that times out cannot leave the dispatcher writing into freed
/// memory.
#[derive(Debug)]
pub(crate) struct Request {
    batch: Batch,
    slot: Mutex<Completion>,
    done: Condvar,
}

impl Request {
    pub(crate) fn new(batch: Batch) -> Self {
        debug_assert!(!batch.is_empty(), "request batch must be non-empty");
        Self {
            batch,
            slot: Mutex::new(Completion::Pending),
            done: Condvar::new(),
        }
    }

    pub(crate) fn batch(&self) -> &[CommandKind] {
        &self.batch
    }

    /// Block the producer until completion, cancellation, or the bound.
    ///
    /// A timeout leaves the slot `Pending`: the dispatcher may still execute
    /// the batch and deliver late, in which case the outcomes are dropped
    /// with the last reference to the request.
    pub(crate) fn wait(&self, timeout: Duration) -> Result<Outcomes, EpsError> {
        let mut slot = self.slot.lock();
        let _ = self
            .done
            .wait_while_for(&mut slot, |state| matches!(state, Completion::Pending), timeout);

        match mem::replace(&mut *slot, Completion::Taken) {
            Completion::Done(outcomes) => Ok(outcomes),
            Completion::Cancelled => {
                // Keep the marker so a late complete() stays a no-op.
                *slot = Completion::Cancelled;
                Err(EpsError::Cancelled)
            }
            Completion::Pending => {
                *slot = Completion::Pending;
                Err(EpsError::Timeout)
            }
            // A request has exactly one waiter; a second wait observes Taken.
            Completion::Taken => Err(EpsError::Timeout),
        }
    }

    /// Dispatcher side: deliver the outcomes and signal the waiter once.
    pub(crate) fn complete(&self, outcomes: Outcomes) {
        let mut slot = self.slot.lock();
        if matches!(&*slot, Completion::Pending) {
            *slot = Completion::Done(outcomes);
            self.done.notify_one();
        }
    }

    /// Shutdown side: settle a never-executed request as cancelled.
    pub(crate) fn cancel(&self) {
        let mut slot = self.slot.lock();
        if matches!(&*slot, Completion::Pending) {
            *slot = Completion::Cancelled;
            self.done.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(kind: CommandKind) -> Batch {
        let mut batch = Batch::new();
        batch.push(kind).unwrap();
        batch
    }

    #[test]
    fn latch_indices_round_trip() {
        for latch in LatchId::ALL {
            assert_eq!(LatchId::from_index(latch.index()), Some(latch));
        }
        assert_eq!(LatchId::from_index(6), None);
    }

    #[test]
    fn outcome_failure_follows_status_sign() {
        assert!(Outcome::Status(-3).is_failure());
        assert!(!Outcome::Status(0).is_failure());
        let outcome = Outcome::Config {
            status: -7,
            config: EpsConfig::default(),
        };
        assert_eq!(outcome.status(), -7);
        assert!(outcome.is_failure());
    }

    #[test]
    fn completed_request_yields_outcomes() {
        let request = Request::new(single(CommandKind::Ping));
        let mut outcomes = Outcomes::new();
        outcomes.push(Outcome::Status(0)).unwrap();
        request.complete(outcomes);

        let delivered = request.wait(Duration::from_millis(10)).unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].status(), 0);
    }

    #[test]
    fn cancelled_request_reports_cancelled() {
        let request = Request::new(single(CommandKind::Ping));
        request.cancel();
        assert_eq!(
            request.wait(Duration::from_millis(10)),
            Err(EpsError::Cancelled)
        );
    }

    #[test]
    fn unsettled_request_times_out() {
        let request = Request::new(single(CommandKind::Ping));
        assert_eq!(
            request.wait(Duration::from_millis(5)),
            Err(EpsError::Timeout)
        );
    }

    #[test]
    fn late_completion_after_timeout_is_discarded() {
        let request = Request::new(single(CommandKind::Ping));
        assert_eq!(
            request.wait(Duration::from_millis(5)),
            Err(EpsError::Timeout)
        );

        // The dispatcher finishes afterwards; the slot is still valid and the
        // late result is simply retained until the request is dropped.
        let mut outcomes = Outcomes::new();
        outcomes.push(Outcome::Status(1)).unwrap();
        request.complete(outcomes);

        let delivered = request.wait(Duration::from_millis(5)).unwrap();
        assert_eq!(delivered[0].status(), 1);
    }

    #[test]
    fn cancel_after_completion_does_not_clobber_result() {
        let request = Request::new(single(CommandKind::Ping));
        let mut outcomes = Outcomes::new();
        outcomes.push(Outcome::Status(4)).unwrap();
        request.complete(outcomes);
        request.cancel();

        let delivered = request.wait(Duration::from_millis(10)).unwrap();
        assert_eq!(delivered[0].status(), 4);
    }
}

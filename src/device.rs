use crate::command::LatchId;
use crate::telemetry::{EpsConfig, Housekeeping, HousekeepingOut};

/// Raw status code returned by a bus transaction.
///
/// Non-negative values indicate success and carry a meaning specific to the
/// primitive (ping echoes, latch reads back its state, and so on). Negative
/// values are failure codes propagated verbatim from the bus layer.
pub type BusStatus = i32;

/// True when a bus status code indicates a failed transaction.
#[must_use]
pub fn is_bus_failure(status: BusStatus) -> bool {
    status < 0
}

/// Hardware access boundary for the power distribution unit.
///
/// Each method is one blocking bus transaction. The dispatcher is the only
/// command-path caller; the watchdog loop additionally calls
/// [`EpsDevice::reset_watchdog`]. Both go through a single shared mutex, so
/// implementations never see overlapping transactions and need no internal
/// locking.
pub trait EpsDevice: Send {
    fn ping(&mut self) -> BusStatus;

    fn reboot(&mut self) -> BusStatus;

    fn hard_reset(&mut self) -> BusStatus;

    fn toggle_latch(&mut self, latch: LatchId) -> BusStatus;

    fn set_latch(&mut self, latch: LatchId, on: bool) -> BusStatus;

    fn get_housekeeping(&mut self) -> (BusStatus, Housekeeping);

    fn get_housekeeping_out(&mut self) -> (BusStatus, HousekeepingOut);

    fn get_config(&mut self) -> (BusStatus, EpsConfig);

    fn set_config(&mut self, config: &EpsConfig) -> BusStatus;

    fn reset_watchdog(&mut self) -> BusStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_status_is_failure() {
        assert!(is_bus_failure(-1));
        assert!(is_bus_failure(i32::MIN));
        assert!(!is_bus_failure(0));
        assert!(!is_bus_failure(1));
    }
}

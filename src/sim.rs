use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::command::LatchId;
use crate::device::{BusStatus, EpsDevice};
use crate::telemetry::{
    EpsConfig, Housekeeping, HousekeepingOut, ResetCause, OUTPUT_CHANNEL_COUNT, RAIL_COUNT,
};

const NOMINAL_PV_MV: u16 = 4150;
const NOMINAL_PHOTO_CURRENT_MA: u16 = 780;
const NOMINAL_BATTERY_MV: u16 = 7420;
const NOMINAL_SYSTEM_CURRENT_MA: u16 = 510;
const NOMINAL_BOARD_TEMP_C: i16 = 21;
const NOMINAL_BATT_TEMP_C: i16 = 18;
const RAIL_ON_CURRENT_MA: u16 = 160;

#[derive(Debug, Default)]
struct ControlState {
    fault_code: AtomicI32,
    faults_remaining: AtomicU32,
    delay_us: AtomicU64,
    pings: AtomicU32,
    watchdog_resets: AtomicU32,
}

/// Shared handle onto a [`SimulatedEps`] that stays usable after the device
/// has been moved into the core: fault injection, bus stalling, and
/// transaction counters for assertions.
#[derive(Debug, Clone)]
pub struct SimControls {
    state: Arc<ControlState>,
}

impl SimControls {
    /// Make the next `count` bus transactions fail with `code`.
    pub fn inject_bus_fault(&self, code: BusStatus, count: u32) {
        debug_assert!(code < 0, "injected fault codes must be negative");
        self.state.fault_code.store(code, Ordering::Relaxed);
        self.state.faults_remaining.store(count, Ordering::Relaxed);
        debug!(code, count, "bus fault injected");
    }

    /// Stall every subsequent bus transaction by `delay`.
    pub fn set_transaction_delay(&self, delay: Duration) {
        self.state
            .delay_us
            .store(delay.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn clear_transaction_delay(&self) {
        self.state.delay_us.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn ping_count(&self) -> u32 {
        self.state.pings.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn watchdog_reset_count(&self) -> u32 {
        self.state.watchdog_resets.load(Ordering::Relaxed)
    }
}

/// Deterministic in-process stand-in for the power distribution board.
///
/// Faithful echo for configuration, live latch states reflected in the
/// output housekeeping, and synthetic but stable electrical readings.
#[derive(Debug)]
pub struct SimulatedEps {
    latches: [bool; RAIL_COUNT],
    config: EpsConfig,
    boot_count: u16,
    sw_error_count: u16,
    latchup_count: [u16; RAIL_COUNT],
    reset_cause: ResetCause,
    controls: Arc<ControlState>,
}

impl SimulatedEps {
    #[must_use]
    pub fn new() -> Self {
        let config = EpsConfig::default();
        let latches = Self::latches_from(&config.output_normal);
        Self {
            latches,
            config,
            boot_count: 1,
            sw_error_count: 0,
            latchup_count: [0; RAIL_COUNT],
            reset_cause: ResetCause::PowerOn,
            controls: Arc::new(ControlState::default()),
        }
    }

    /// Handle for steering the simulation after the device is moved into
    /// the core.
    #[must_use]
    pub fn controls(&self) -> SimControls {
        SimControls {
            state: Arc::clone(&self.controls),
        }
    }

    fn latches_from(outputs: &[u8; OUTPUT_CHANNEL_COUNT]) -> [bool; RAIL_COUNT] {
        let mut latches = [false; RAIL_COUNT];
        for (latch, output) in latches.iter_mut().zip(outputs.iter()) {
            *latch = *output != 0;
        }
        latches
    }

    /// Models the shared bus: applies any configured stall, then consumes
    /// one injected fault if armed.
    fn transact(&mut self) -> Option<BusStatus> {
        let delay_us = self.controls.delay_us.load(Ordering::Relaxed);
        if delay_us > 0 {
            thread::sleep(Duration::from_micros(delay_us));
        }

        let armed = self
            .controls
            .faults_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            self.sw_error_count = self.sw_error_count.saturating_add(1);
            return Some(self.controls.fault_code.load(Ordering::Relaxed));
        }
        None
    }

    fn channel_status(&self) -> u8 {
        self.latches
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, on)| acc | (u8::from(*on) << i))
    }
}

impl Default for SimulatedEps {
    fn default() -> Self {
        Self::new()
    }
}

impl EpsDevice for SimulatedEps {
    fn ping(&mut self) -> BusStatus {
        if let Some(code) = self.transact() {
            return code;
        }
        self.controls.pings.fetch_add(1, Ordering::Relaxed);
        0
    }

    fn reboot(&mut self) -> BusStatus {
        if let Some(code) = self.transact() {
            return code;
        }
        self.boot_count = self.boot_count.saturating_add(1);
        self.reset_cause = ResetCause::Software;
        self.latches = Self::latches_from(&self.config.output_normal);
        0
    }

    fn hard_reset(&mut self) -> BusStatus {
        if let Some(code) = self.transact() {
            return code;
        }
        self.boot_count = self.boot_count.saturating_add(1);
        self.reset_cause = ResetCause::PowerOn;
        self.latchup_count = [0; RAIL_COUNT];
        self.latches = Self::latches_from(&self.config.output_normal);
        0
    }

    fn toggle_latch(&mut self, latch: LatchId) -> BusStatus {
        if let Some(code) = self.transact() {
            return code;
        }
        let index = latch.index() as usize;
        self.latches[index] = !self.latches[index];
        BusStatus::from(self.latches[index])
    }

    fn set_latch(&mut self, latch: LatchId, on: bool) -> BusStatus {
        if let Some(code) = self.transact() {
            return code;
        }
        self.latches[latch.index() as usize] = on;
        BusStatus::from(on)
    }

    fn get_housekeeping(&mut self) -> (BusStatus, Housekeeping) {
        let status = self.transact().unwrap_or(0);
        let telemetry = Housekeeping {
            pv_mv: [NOMINAL_PV_MV; 3],
            pc_ma: NOMINAL_PHOTO_CURRENT_MA,
            bv_mv: NOMINAL_BATTERY_MV,
            sc_ma: NOMINAL_SYSTEM_CURRENT_MA,
            temp_c: [NOMINAL_BOARD_TEMP_C; 4],
            batt_temp_c: [NOMINAL_BATT_TEMP_C; 2],
            latchup_count: self.latchup_count,
            reset_cause: self.reset_cause,
            boot_count: self.boot_count,
            sw_error_count: self.sw_error_count,
            ppt_mode: self.config.ppt_mode,
            channel_status: self.channel_status(),
        };
        (status, telemetry)
    }

    fn get_housekeeping_out(&mut self) -> (BusStatus, HousekeepingOut) {
        let status = self.transact().unwrap_or(0);

        let mut current_ma = [0u16; RAIL_COUNT];
        let mut output_state = [0u8; OUTPUT_CHANNEL_COUNT];
        for (i, on) in self.latches.iter().enumerate() {
            current_ma[i] = if *on { RAIL_ON_CURRENT_MA } else { 0 };
            output_state[i] = u8::from(*on);
        }
        // Channels beyond the six switchable rails are the permanent rails.
        for state in output_state.iter_mut().skip(RAIL_COUNT) {
            *state = 1;
        }

        let telemetry = HousekeepingOut {
            current_ma,
            output_state,
            on_delay_s: self.config.output_on_delay_s,
            off_delay_s: self.config.output_off_delay_s,
            latchup_count: self.latchup_count,
        };
        (status, telemetry)
    }

    fn get_config(&mut self) -> (BusStatus, EpsConfig) {
        let status = self.transact().unwrap_or(0);
        (status, self.config.clone())
    }

    fn set_config(&mut self, config: &EpsConfig) -> BusStatus {
        if let Some(code) = self.transact() {
            return code;
        }
        self.config = config.clone();
        0
    }

    fn reset_watchdog(&mut self) -> BusStatus {
        if let Some(code) = self.transact() {
            return code;
        }
        self.controls.watchdog_resets.fetch_add(1, Ordering::Relaxed);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_commands_drive_output_state() {
        let mut device = SimulatedEps::new();
        assert_eq!(device.set_latch(LatchId::Rail3V1, false), 0);
        assert_eq!(device.set_latch(LatchId::Rail3V1, true), 1);
        assert_eq!(device.toggle_latch(LatchId::Rail3V1), 0);

        let (status, out) = device.get_housekeeping_out();
        assert_eq!(status, 0);
        assert_eq!(out.output_state[LatchId::Rail3V1.index() as usize], 0);
        assert_eq!(out.current_ma[LatchId::Rail3V1.index() as usize], 0);
    }

    #[test]
    fn config_echoes_field_for_field() {
        let mut device = SimulatedEps::new();
        let mut config = EpsConfig {
            ppt_mode: 2,
            vboost_mv: [3600, 3650, 3700],
            ..EpsConfig::default()
        };
        config.output_safe[2] = 1;

        assert_eq!(device.set_config(&config), 0);
        let (status, back) = device.get_config();
        assert_eq!(status, 0);
        assert_eq!(back, config);
    }

    #[test]
    fn injected_faults_are_consumed_in_order() {
        let mut device = SimulatedEps::new();
        device.controls().inject_bus_fault(-9, 2);

        assert_eq!(device.ping(), -9);
        assert_eq!(device.ping(), -9);
        assert_eq!(device.ping(), 0);
        assert_eq!(device.controls().ping_count(), 1);

        let (_, telemetry) = device.get_housekeeping();
        assert_eq!(telemetry.sw_error_count, 2);
    }

    #[test]
    fn reboot_bumps_boot_count_and_restores_normal_outputs() {
        let mut device = SimulatedEps::new();
        device.set_latch(LatchId::Rail5V2, false);
        assert_eq!(device.reboot(), 0);

        let (_, telemetry) = device.get_housekeeping();
        assert_eq!(telemetry.boot_count, 2);
        assert_eq!(telemetry.reset_cause, ResetCause::Software);

        let (_, out) = device.get_housekeeping_out();
        assert_eq!(out.output_state[LatchId::Rail5V2.index() as usize], 1);
    }
}

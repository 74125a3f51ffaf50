use serde::{Deserialize, Serialize};

// Record shapes follow the power board's housekeeping layout: six switchable
// output rails, eight output channels in the config tables, three
// photovoltaic inputs feeding three boost converters.
pub const RAIL_COUNT: usize = 6;
pub const OUTPUT_CHANNEL_COUNT: usize = 8;
pub const PV_INPUT_COUNT: usize = 3;

/// Cause of the board's last reset, decoded from the raw cause byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetCause {
    #[default]
    PowerOn,
    Watchdog,
    Software,
    External,
    BrownOut,
    Unknown,
}

impl ResetCause {
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => ResetCause::PowerOn,
            0x01 => ResetCause::Watchdog,
            0x02 => ResetCause::Software,
            0x03 => ResetCause::External,
            0x04 => ResetCause::BrownOut,
            _ => ResetCause::Unknown,
        }
    }
}

/// Point-in-time housekeeping snapshot of the whole board.
///
/// The dispatch core moves these records between the device and the caller
/// without interpreting any field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Housekeeping {
    /// Photovoltaic input voltages.
    pub pv_mv: [u16; PV_INPUT_COUNT],
    /// Total photo current.
    pub pc_ma: u16,
    /// Battery voltage.
    pub bv_mv: u16,
    /// Total system current.
    pub sc_ma: u16,
    /// Boost converter and onboard battery temperatures.
    pub temp_c: [i16; 4],
    /// External battery pack temperatures.
    pub batt_temp_c: [i16; 2],
    /// Latch-up counts per output rail.
    pub latchup_count: [u16; RAIL_COUNT],
    pub reset_cause: ResetCause,
    pub boot_count: u16,
    pub sw_error_count: u16,
    pub ppt_mode: u8,
    pub channel_status: u8,
}

/// Output-side housekeeping: per-channel currents, switch states and delays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousekeepingOut {
    pub current_ma: [u16; RAIL_COUNT],
    /// Switch state per output channel, 0 = off, 1 = on.
    pub output_state: [u8; OUTPUT_CHANNEL_COUNT],
    pub on_delay_s: [u16; OUTPUT_CHANNEL_COUNT],
    pub off_delay_s: [u16; OUTPUT_CHANNEL_COUNT],
    pub latchup_count: [u16; RAIL_COUNT],
}

/// Persistent board configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpsConfig {
    pub ppt_mode: u8,
    pub battheater_mode: u8,
    /// Battery heater turn-on threshold.
    pub battheater_low_c: i8,
    /// Battery heater turn-off threshold.
    pub battheater_high_c: i8,
    /// Startup switch state per channel in normal mode.
    pub output_normal: [u8; OUTPUT_CHANNEL_COUNT],
    /// Startup switch state per channel in safe mode.
    pub output_safe: [u8; OUTPUT_CHANNEL_COUNT],
    pub output_on_delay_s: [u16; OUTPUT_CHANNEL_COUNT],
    pub output_off_delay_s: [u16; OUTPUT_CHANNEL_COUNT],
    /// Boost converter output voltages.
    pub vboost_mv: [u16; PV_INPUT_COUNT],
}

impl Default for EpsConfig {
    fn default() -> Self {
        Self {
            ppt_mode: 1,
            battheater_mode: 1,
            battheater_low_c: 0,
            battheater_high_c: 5,
            output_normal: [1; OUTPUT_CHANNEL_COUNT],
            output_safe: [0; OUTPUT_CHANNEL_COUNT],
            output_on_delay_s: [0; OUTPUT_CHANNEL_COUNT],
            output_off_delay_s: [0; OUTPUT_CHANNEL_COUNT],
            vboost_mv: [3700; PV_INPUT_COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_cause_decodes_known_bytes() {
        assert_eq!(ResetCause::from_raw(0x00), ResetCause::PowerOn);
        assert_eq!(ResetCause::from_raw(0x01), ResetCause::Watchdog);
        assert_eq!(ResetCause::from_raw(0x04), ResetCause::BrownOut);
        assert_eq!(ResetCause::from_raw(0xff), ResetCause::Unknown);
    }

    #[test]
    fn config_default_round_trips_through_json() {
        let config = EpsConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EpsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

//! Platform hook surface.
//!
//! The supervisor core never touches hardware directly. Everything below
//! the board-support line is reached through [`PlatformHooks`], a
//! capability set of plain function pointers installed once at boot. A
//! deterministic in-memory implementation can be substituted for tests and
//! workstation bring-up without any dynamic dispatch in the hot path.

use fsw_shared::types::{ResetCause, SubsystemId};

/// Battery telemetry sampled from the EPS front-end.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatteryReadings {
    /// Pack voltage in millivolts.
    pub voltage_mv: u16,
    /// Pack current in milliamps; positive while charging.
    pub current_ma: i16,
    /// State of charge, 0-100 percent.
    pub soc_percent: u8,
    /// Pack temperature in degrees Celsius.
    pub temp_c: i8,
    /// Design capacity in milliamp-hours.
    pub capacity_mah: u32,
}

/// Power-chain readings consumed by the EPS policy each pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerReadings {
    /// Battery pack state.
    pub battery: BatteryReadings,
    /// Solar array generation in milliwatts.
    pub solar_mw: u32,
    /// Total platform consumption in milliwatts.
    pub consumption_mw: u32,
}

/// Platform quantities checked against health thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthReadings {
    /// OBC board temperature in degrees Celsius.
    pub temp_c: i16,
    /// CPU load, 0-100 percent.
    pub cpu_load_percent: u8,
    /// Smallest remaining stack headroom across kernel tasks, in bytes.
    pub min_stack_free: u32,
    /// Main bus voltage in millivolts.
    pub bus_voltage_mv: u16,
}

/// Radio link statistics carried in the beacon.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadioReadings {
    /// Last received signal strength in dBm.
    pub rssi_dbm: i8,
    /// Frames received in the last 24 hours.
    pub rx_24h: u8,
    /// Frames transmitted in the last 24 hours.
    pub tx_24h: u8,
    /// Estimated downlink margin in dB.
    pub link_margin_db: u8,
}

/// Board temperatures carried in the beacon: OBC, battery, comms, payload.
pub type BoardTemps = [i8; 4];

/// Attitude quaternion (w, x, y, z) in Q15 fixed point.
pub type AttitudeQ15 = [i16; 4];

/// The hardware capability set.
///
/// All pointers must be non-blocking. `reset_software` requests a software
/// reset and does not return on flight hardware; host implementations may
/// record the request and return so the supervisor remains testable.
#[derive(Clone, Copy)]
pub struct PlatformHooks {
    /// Service the hardware watchdog.
    pub watchdog_kick: fn(),
    /// Read the latched cause of the most recent reset.
    pub reset_get_cause: fn() -> ResetCause,
    /// Request an immediate software reset.
    pub reset_software: fn(),
    /// Pulse the reset line of one subsystem.
    pub reset_subsystem: fn(SubsystemId),
    /// Sample the safe-mode inhibit pin.
    pub safe_mode_pin_asserted: fn() -> bool,
    /// Close the load switch of the given power rail.
    pub power_enable_rail: fn(u8),
    /// Open the load switch of the given power rail.
    pub power_disable_rail: fn(u8),
    /// Emit one byte on the debug interface.
    pub debug_putchar: fn(u8),
    /// Monotonic milliseconds since boot; wraps modulo 2^32.
    pub time_ms_monotonic: fn() -> u32,
    /// Sample the power chain.
    pub read_power: fn() -> PowerReadings,
    /// Sample the health-threshold quantities.
    pub read_health: fn() -> HealthReadings,
    /// Current attitude estimate from the ADCS task.
    pub read_attitude_q15: fn() -> AttitudeQ15,
    /// Board temperatures for the beacon.
    pub read_temps_c: fn() -> BoardTemps,
    /// Radio link statistics for the beacon.
    pub read_radio: fn() -> RadioReadings,
}

impl core::fmt::Debug for PlatformHooks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlatformHooks").finish_non_exhaustive()
    }
}

fn noop() {}
fn noop_u8(_: u8) {}
fn noop_subsystem(_: SubsystemId) {}
fn cause_unknown() -> ResetCause {
    ResetCause::Unknown
}
fn pin_deasserted() -> bool {
    false
}
fn time_zero() -> u32 {
    0
}
fn power_nominal() -> PowerReadings {
    PowerReadings {
        battery: BatteryReadings {
            voltage_mv: 3900,
            current_ma: 120,
            soc_percent: 80,
            temp_c: 15,
            capacity_mah: 2600,
        },
        solar_mw: 2400,
        consumption_mw: 1800,
    }
}
fn health_nominal() -> HealthReadings {
    HealthReadings {
        temp_c: 20,
        cpu_load_percent: 35,
        min_stack_free: 2048,
        bus_voltage_mv: 3300,
    }
}
fn attitude_identity() -> AttitudeQ15 {
    [i16::MAX, 0, 0, 0]
}
fn temps_room() -> BoardTemps {
    [20, 15, 18, 17]
}
fn radio_quiet() -> RadioReadings {
    RadioReadings {
        rssi_dbm: -95,
        rx_24h: 0,
        tx_24h: 0,
        link_margin_db: 6,
    }
}

impl PlatformHooks {
    /// A deterministic stand-in: time frozen at zero, nominal sensor
    /// values, all actuation hooks no-ops. Intended for bring-up and as a
    /// base for test platforms that override individual capabilities.
    pub fn inert() -> Self {
        Self {
            watchdog_kick: noop,
            reset_get_cause: cause_unknown,
            reset_software: noop,
            reset_subsystem: noop_subsystem,
            safe_mode_pin_asserted: pin_deasserted,
            power_enable_rail: noop_u8,
            power_disable_rail: noop_u8,
            debug_putchar: noop_u8,
            time_ms_monotonic: time_zero,
            read_power: power_nominal,
            read_health: health_nominal,
            read_attitude_q15: attitude_identity,
            read_temps_c: temps_room,
            read_radio: radio_quiet,
        }
    }
}

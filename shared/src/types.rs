//! Common data types for the flight software.
//!
//! System-wide enums shared between the protocol layer and the supervisor.
//! All of them have stable `u8` representations so they can travel in packed
//! telemetry frames and the persistent boot record.

use serde::{Deserialize, Serialize};

use crate::error::{FswError, Result};

/// Spacecraft operational modes.
///
/// Exactly one mode is current at any time; the mode manager owns the
/// allowed-transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemMode {
    /// Initial state during supervisor bring-up.
    Boot = 0,
    /// Restricted protective state; only safe-listed telecommands execute.
    Safe = 1,
    /// Rate damping after separation or attitude loss.
    Detumble = 2,
    /// Full mission operations.
    Nominal = 3,
    /// Reduced-load operations on battery reserve.
    LowPower = 4,
    /// Post-anomaly checkout before returning to nominal.
    Recovery = 5,
}

impl SystemMode {
    /// Number of modes.
    pub const COUNT: usize = 6;

    /// All modes, in discriminant order.
    pub const ALL: [SystemMode; Self::COUNT] = [
        SystemMode::Boot,
        SystemMode::Safe,
        SystemMode::Detumble,
        SystemMode::Nominal,
        SystemMode::LowPower,
        SystemMode::Recovery,
    ];
}

impl TryFrom<u8> for SystemMode {
    type Error = FswError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SystemMode::Boot),
            1 => Ok(SystemMode::Safe),
            2 => Ok(SystemMode::Detumble),
            3 => Ok(SystemMode::Nominal),
            4 => Ok(SystemMode::LowPower),
            5 => Ok(SystemMode::Recovery),
            _ => Err(FswError::InvalidParam),
        }
    }
}

/// Cause of the most recent reset, latched once at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResetCause {
    /// Cause could not be determined (or the boot record was corrupt).
    Unknown = 0,
    /// Cold start from an unpowered state.
    PowerOn = 1,
    /// External reset pin.
    Pin = 2,
    /// Watchdog expiry.
    Watchdog = 3,
    /// Commanded software reset.
    Software = 4,
    /// Supply brown-out.
    BrownOut = 5,
    /// Low-power wakeup.
    LowPower = 6,
}

impl TryFrom<u8> for ResetCause {
    type Error = FswError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ResetCause::Unknown),
            1 => Ok(ResetCause::PowerOn),
            2 => Ok(ResetCause::Pin),
            3 => Ok(ResetCause::Watchdog),
            4 => Ok(ResetCause::Software),
            5 => Ok(ResetCause::BrownOut),
            6 => Ok(ResetCause::LowPower),
            _ => Err(FswError::InvalidParam),
        }
    }
}

/// Identifiers for the spacecraft subsystems FDIR can isolate or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SubsystemId {
    /// The on-board computer itself.
    Obc = 0,
    /// Electrical power system.
    Eps = 1,
    /// Attitude determination and control.
    Adcs = 2,
    /// Radio and link management.
    Comms = 3,
    /// Mission payload.
    Payload = 4,
    /// Sensor suite (sun sensors, magnetometer, IMU).
    Sensors = 5,
    /// Actuator suite (magnetorquers, wheels).
    Actuators = 6,
    /// Thermal control.
    Thermal = 7,
}

impl SubsystemId {
    /// Number of subsystems.
    pub const COUNT: usize = 8;
}

/// Power distribution rails switched by the EPS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rail {
    /// 3V3 core rail feeding the OBC. May never be disabled.
    Core = 0,
    /// 5V sensor rail.
    Sensors = 1,
    /// 12V actuator rail.
    Actuators = 2,
    /// 3V3 communications rail.
    Comms = 3,
    /// Payload rail.
    Payload = 4,
}

impl Rail {
    /// Number of rails.
    pub const COUNT: usize = 5;

    /// Rail index as passed to the platform enable/disable hooks.
    pub const fn index(self) -> u8 {
        self as u8
    }
}

/// Aggregated health status reported by the health monitor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum HealthState {
    /// All monitored quantities within limits.
    Ok = 0,
    /// At least one soft limit exceeded.
    Warning = 1,
    /// A hard limit exceeded or a monitored task died.
    Critical = 2,
}

/// Event severity levels for the event log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Severity {
    /// Diagnostic detail.
    Debug = 0,
    /// Normal operational milestones.
    Info = 1,
    /// Off-nominal but tolerable.
    Warning = 2,
    /// Operation failed.
    Error = 3,
    /// Spacecraft safety affected.
    Critical = 4,
}

/// Telemetry priority classes.
///
/// Queue insertion with `High` or above may evict a strictly lower-priority
/// entry when the queue is full.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum TmPriority {
    /// Routine housekeeping.
    Low = 0,
    /// Normal telemetry.
    Normal = 1,
    /// Important status; may preempt queue space.
    High = 2,
    /// Anomaly and safety data; may preempt queue space.
    Critical = 3,
}

/// Authorization levels for telecommand definitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum AuthLevel {
    /// No authorization required.
    None = 0,
    /// Routine operations.
    Basic = 1,
    /// Mode and configuration changes; verified when a key is installed.
    Elevated = 2,
    /// Irreversible actions (resets); verified when a key is installed.
    Critical = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        for mode in SystemMode::ALL {
            assert_eq!(SystemMode::try_from(mode as u8), Ok(mode));
        }
        assert_eq!(SystemMode::try_from(6), Err(FswError::InvalidParam));
    }

    #[test]
    fn test_reset_cause_round_trip() {
        for raw in 0..=6u8 {
            let cause = ResetCause::try_from(raw).expect("valid cause");
            assert_eq!(cause as u8, raw);
        }
        assert!(ResetCause::try_from(7).is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TmPriority::Critical > TmPriority::High);
        assert!(TmPriority::High > TmPriority::Normal);
        assert!(TmPriority::Normal > TmPriority::Low);
    }

    #[test]
    fn test_auth_level_ordering() {
        assert!(AuthLevel::Critical > AuthLevel::Elevated);
        assert!(AuthLevel::Elevated > AuthLevel::Basic);
        assert!(AuthLevel::Basic > AuthLevel::None);
    }

    #[test]
    fn test_health_state_ordering() {
        assert!(HealthState::Critical > HealthState::Warning);
        assert!(HealthState::Warning > HealthState::Ok);
    }
}

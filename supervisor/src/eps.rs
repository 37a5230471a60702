//! Electrical power system policy.
//!
//! Owns the commanded state of the five distribution rails and the battery
//! and power-budget bookkeeping. Each pass consumes fresh readings from the
//! opaque platform provider and walks the state-of-charge ladder: below
//! 10 % everything non-essential is shed and a `PowerCritical` fault is
//! raised, below 20 % the spacecraft is taken into low-power operations,
//! and above 50 % low-power is exited again. Decisions are returned as
//! values; the supervisor drives the load switches and the mode manager.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::platform::PowerReadings;
use fsw_shared::error::{FswError, Result};
use fsw_shared::types::Rail;

/// SOC at or below which the load-shed path runs, in percent.
pub const SOC_CRITICAL_PERCENT: u8 = 10;

/// SOC at or below which low-power operations begin, in percent.
pub const SOC_LOW_PERCENT: u8 = 20;

/// SOC at or above which low-power operations end, in percent.
pub const SOC_RECOVER_PERCENT: u8 = 50;

/// Largest load accepted while in low-power operations, in milliwatts.
pub const LOW_POWER_LOAD_LIMIT_MW: u32 = 100;

/// Battery pack state derived from the most recent readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryState {
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
    /// Remaining charge in milliamp-hours.
    pub remaining_mah: u32,
}

/// Generation/consumption balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerBudget {
    /// Solar array generation in milliwatts.
    pub generation_mw: u32,
    /// Platform consumption in milliwatts.
    pub consumption_mw: u32,
    /// `generation - consumption` in milliwatts.
    pub balance_mw: i32,
    /// Whether the balance is positive.
    pub positive: bool,
}

/// A commanded rail switch: `(rail, enabled)`.
pub type RailChange = (Rail, bool);

/// Decisions from one periodic pass, executed at supervisor level.
#[derive(Debug, Default)]
pub struct EpsOutcome {
    /// Load switches to drive, in order.
    pub rail_changes: Vec<RailChange, { Rail::COUNT }>,
    /// Raise `PowerCritical` with FDIR.
    pub report_power_critical: bool,
    /// Request the LowPower mode from the mode manager.
    pub request_low_power: bool,
    /// Low-power operations ended on this pass.
    pub exited_low_power: bool,
}

/// The EPS policy engine.
#[derive(Debug)]
pub struct Eps {
    rails_enabled: [bool; Rail::COUNT],
    battery: BatteryState,
    budget: PowerBudget,
    low_power: bool,
    critical_power: bool,
    load_sheds: u32,
}

impl Eps {
    /// Create the policy with every rail enabled.
    pub const fn new() -> Self {
        Self {
            rails_enabled: [true; Rail::COUNT],
            battery: BatteryState {
                voltage_mv: 0,
                current_ma: 0,
                soc_percent: 0,
                temp_c: 0,
                capacity_mah: 0,
                remaining_mah: 0,
            },
            budget: PowerBudget {
                generation_mw: 0,
                consumption_mw: 0,
                balance_mw: 0,
                positive: false,
            },
            low_power: false,
            critical_power: false,
            load_sheds: 0,
        }
    }

    /// Whether a rail is commanded on.
    pub const fn rail_enabled(&self, rail: Rail) -> bool {
        self.rails_enabled[rail as usize]
    }

    /// Command a rail. The core rail may never be disabled.
    pub fn set_rail(&mut self, rail: Rail, enabled: bool) -> Result<()> {
        if rail == Rail::Core && !enabled {
            return Err(FswError::Permission);
        }
        self.rails_enabled[rail as usize] = enabled;
        Ok(())
    }

    /// Most recent battery state.
    pub const fn battery(&self) -> BatteryState {
        self.battery
    }

    /// Most recent power budget.
    pub const fn budget(&self) -> PowerBudget {
        self.budget
    }

    /// Whether low-power operations are active.
    pub const fn low_power(&self) -> bool {
        self.low_power
    }

    /// Whether the battery is below the critical floor.
    pub const fn critical_power(&self) -> bool {
        self.critical_power
    }

    /// Completed load-shed passes since boot.
    pub const fn load_shed_count(&self) -> u32 {
        self.load_sheds
    }

    /// One policy pass over fresh readings.
    pub fn periodic(&mut self, readings: &PowerReadings) -> EpsOutcome {
        let battery = &readings.battery;
        self.battery = BatteryState {
            voltage_mv: battery.voltage_mv,
            current_ma: battery.current_ma,
            soc_percent: battery.soc_percent.min(100),
            temp_c: battery.temp_c,
            capacity_mah: battery.capacity_mah,
            remaining_mah: battery.capacity_mah
                * u32::from(battery.soc_percent.min(100))
                / 100,
        };

        let balance = readings.solar_mw as i32 - readings.consumption_mw as i32;
        self.budget = PowerBudget {
            generation_mw: readings.solar_mw,
            consumption_mw: readings.consumption_mw,
            balance_mw: balance,
            positive: balance > 0,
        };

        let mut outcome = EpsOutcome::default();
        let soc = self.battery.soc_percent;

        if soc <= SOC_CRITICAL_PERCENT {
            self.critical_power = true;
            outcome.report_power_critical = true;
            self.load_shed(&mut outcome.rail_changes);
        } else if soc <= SOC_LOW_PERCENT && !self.low_power {
            self.low_power = true;
            self.disable(Rail::Actuators, &mut outcome.rail_changes);
            self.disable(Rail::Payload, &mut outcome.rail_changes);
            outcome.request_low_power = true;
        } else if soc >= SOC_RECOVER_PERCENT && self.low_power {
            self.low_power = false;
            self.critical_power = false;
            self.enable(Rail::Actuators, &mut outcome.rail_changes);
            outcome.exited_low_power = true;
        }

        outcome
    }

    /// Whether an additional load can be accepted right now.
    pub fn can_support_load(&self, load_mw: u32) -> bool {
        if self.critical_power {
            return false;
        }
        if self.low_power {
            return load_mw < LOW_POWER_LOAD_LIMIT_MW;
        }
        self.budget.balance_mw + load_mw as i32 > 0
    }

    /// Shed every non-essential load: payload, actuators, sensors.
    fn load_shed(&mut self, changes: &mut Vec<RailChange, { Rail::COUNT }>) {
        self.disable(Rail::Payload, changes);
        self.disable(Rail::Actuators, changes);
        self.disable(Rail::Sensors, changes);
        self.load_sheds = self.load_sheds.saturating_add(1);
    }

    fn disable(
        &mut self,
        rail: Rail,
        changes: &mut Vec<RailChange, { Rail::COUNT }>,
    ) {
        if self.rails_enabled[rail as usize] {
            self.rails_enabled[rail as usize] = false;
            let _ = changes.push((rail, false));
        }
    }

    fn enable(
        &mut self,
        rail: Rail,
        changes: &mut Vec<RailChange, { Rail::COUNT }>,
    ) {
        if !self.rails_enabled[rail as usize] {
            self.rails_enabled[rail as usize] = true;
            let _ = changes.push((rail, true));
        }
    }
}

impl Default for Eps {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::BatteryReadings;

    fn readings(soc: u8, solar_mw: u32, consumption_mw: u32) -> PowerReadings {
        PowerReadings {
            battery: BatteryReadings {
                voltage_mv: 3800,
                current_ma: -150,
                soc_percent: soc,
                temp_c: 10,
                capacity_mah: 2600,
            },
            solar_mw,
            consumption_mw,
        }
    }

    #[test]
    fn test_battery_bookkeeping() {
        let mut eps = Eps::new();
        eps.periodic(&readings(80, 2000, 1500));

        let battery = eps.battery();
        assert_eq!(battery.remaining_mah, 2600 * 80 / 100);

        let budget = eps.budget();
        assert_eq!(budget.balance_mw, 500);
        assert!(budget.positive);
    }

    #[test]
    fn test_critical_soc_sheds_load() {
        let mut eps = Eps::new();
        let outcome = eps.periodic(&readings(9, 100, 900));

        assert!(eps.critical_power());
        assert!(outcome.report_power_critical);
        assert!(!eps.rail_enabled(Rail::Payload));
        assert!(!eps.rail_enabled(Rail::Actuators));
        assert!(!eps.rail_enabled(Rail::Sensors));
        assert!(eps.rail_enabled(Rail::Core));
        assert!(eps.rail_enabled(Rail::Comms));
        assert_eq!(eps.load_shed_count(), 1);
    }

    #[test]
    fn test_low_soc_enters_low_power_once() {
        let mut eps = Eps::new();
        let outcome = eps.periodic(&readings(18, 500, 700));

        assert!(eps.low_power());
        assert!(outcome.request_low_power);
        assert!(!eps.rail_enabled(Rail::Actuators));
        assert!(!eps.rail_enabled(Rail::Payload));
        assert!(eps.rail_enabled(Rail::Sensors));

        // Second pass at the same SOC must not re-request the mode
        let outcome = eps.periodic(&readings(18, 500, 700));
        assert!(!outcome.request_low_power);
        assert!(outcome.rail_changes.is_empty());
    }

    #[test]
    fn test_recovery_soc_exits_low_power() {
        let mut eps = Eps::new();
        eps.periodic(&readings(15, 500, 700));
        assert!(eps.low_power());

        let outcome = eps.periodic(&readings(55, 2500, 900));
        assert!(outcome.exited_low_power);
        assert!(!eps.low_power());
        assert!(!eps.critical_power());
        assert!(eps.rail_enabled(Rail::Actuators));
        // Payload stays down until commanded back on
        assert!(!eps.rail_enabled(Rail::Payload));
    }

    #[test]
    fn test_core_rail_is_immutable() {
        let mut eps = Eps::new();
        assert_eq!(
            eps.set_rail(Rail::Core, false),
            Err(FswError::Permission)
        );
        assert!(eps.set_rail(Rail::Payload, false).is_ok());
    }

    #[test]
    fn test_can_support_load_ladder() {
        let mut eps = Eps::new();

        eps.periodic(&readings(80, 2000, 1500));
        assert!(eps.can_support_load(400));

        eps.periodic(&readings(18, 500, 700));
        assert!(eps.can_support_load(99));
        assert!(!eps.can_support_load(100));

        eps.periodic(&readings(9, 100, 900));
        assert!(!eps.can_support_load(1));
    }

    #[test]
    fn test_soc_is_clamped() {
        let mut eps = Eps::new();
        eps.periodic(&readings(150, 1000, 500));
        assert_eq!(eps.battery().soc_percent, 100);
    }
}

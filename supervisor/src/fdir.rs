//! Fault detection, isolation and recovery.
//!
//! A fixed rule table maps each fault type to an occurrence threshold and a
//! recovery action. Faults are reported by the other components; the
//! periodic pass dispatches the action of every active fault whose counter
//! has reached its threshold. Actions are returned as values and executed
//! at supervisor level so FDIR never reaches into another component while
//! holding its own lock.
//!
//! The `window_ms` field of each rule is reserved for rate-limited
//! variants; the baseline triggers on cumulative counters only and never
//! consults it.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use fsw_shared::types::{ResetCause, SubsystemId};

/// Fault classes tracked by FDIR, one record per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FaultType {
    /// Watchdog expiry observed during this uptime.
    Watchdog = 0,
    /// Supply brown-out detected.
    Brownout = 1,
    /// Repeating watchdog reset cycle across boots.
    ResetLoop = 2,
    /// A sensor delivered out-of-range or stale data.
    SensorInvalid = 3,
    /// An actuator failed to respond.
    ActuatorFail = 4,
    /// I2C/SPI transaction failure.
    BusError = 5,
    /// Memory corruption detected.
    MemoryError = 6,
    /// Ground contact lost beyond the expected gap.
    CommLoss = 7,
    /// Battery below the critical floor.
    PowerCritical = 8,
    /// A temperature limit was exceeded.
    ThermalLimit = 9,
    /// Attitude determination diverged.
    AttitudeLost = 10,
}

impl FaultType {
    /// Number of fault classes (also the size of the record table).
    pub const COUNT: usize = 11;
}

/// Recovery actions dispatched when a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    /// No action.
    None,
    /// Leave recovery to the reporting component's own retry logic.
    Retry,
    /// Mark the subsystem isolated; its data is ignored until cleared.
    Isolate,
    /// Pulse the subsystem reset line.
    ResetSubsystem,
    /// Force the mode manager to Safe.
    SafeMode,
    /// Commanded software reset of the whole platform.
    SystemReset,
    /// Disable the payload rail.
    PayloadOff,
    /// Disable all non-essential rails.
    LoadShed,
}

/// One rule of the fault table.
#[derive(Debug, Clone, Copy)]
pub struct FdirRule {
    /// Fault class the rule applies to.
    pub fault: FaultType,
    /// Occurrence count at which the action dispatches.
    pub threshold_count: u32,
    /// Reserved for rate-limited variants; unused by the baseline.
    pub window_ms: u32,
    /// Action dispatched when the threshold is reached.
    pub action: RecoveryAction,
}

/// The mission fault table, indexed by `FaultType` discriminant.
pub const FAULT_RULES: [FdirRule; FaultType::COUNT] = [
    FdirRule { fault: FaultType::Watchdog, threshold_count: 1, window_ms: 0, action: RecoveryAction::SystemReset },
    FdirRule { fault: FaultType::Brownout, threshold_count: 2, window_ms: 60_000, action: RecoveryAction::LoadShed },
    FdirRule { fault: FaultType::ResetLoop, threshold_count: 3, window_ms: 60_000, action: RecoveryAction::SafeMode },
    FdirRule { fault: FaultType::SensorInvalid, threshold_count: 3, window_ms: 10_000, action: RecoveryAction::Isolate },
    FdirRule { fault: FaultType::ActuatorFail, threshold_count: 2, window_ms: 5_000, action: RecoveryAction::Isolate },
    FdirRule { fault: FaultType::BusError, threshold_count: 5, window_ms: 1_000, action: RecoveryAction::ResetSubsystem },
    FdirRule { fault: FaultType::MemoryError, threshold_count: 1, window_ms: 0, action: RecoveryAction::SafeMode },
    FdirRule { fault: FaultType::CommLoss, threshold_count: 10, window_ms: 60_000, action: RecoveryAction::Retry },
    FdirRule { fault: FaultType::PowerCritical, threshold_count: 1, window_ms: 0, action: RecoveryAction::LoadShed },
    FdirRule { fault: FaultType::ThermalLimit, threshold_count: 1, window_ms: 0, action: RecoveryAction::PayloadOff },
    FdirRule { fault: FaultType::AttitudeLost, threshold_count: 1, window_ms: 0, action: RecoveryAction::SafeMode },
];

/// Per-fault bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    /// Fault class.
    pub fault: FaultType,
    /// Subsystem named in the most recent report.
    pub subsystem: SubsystemId,
    /// Uptime milliseconds of the most recent report.
    pub timestamp_ms: u32,
    /// Cumulative reports since boot (or last clear).
    pub occurrence_count: u32,
    /// Whether the fault is currently active.
    pub active: bool,
    /// Action dispatched on the most recent periodic pass, if any.
    pub last_action: RecoveryAction,
}

impl FaultRecord {
    const fn empty(fault: FaultType) -> Self {
        Self {
            fault,
            subsystem: SubsystemId::Obc,
            timestamp_ms: 0,
            occurrence_count: 0,
            active: false,
            last_action: RecoveryAction::None,
        }
    }
}

/// An action due for execution at supervisor level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    /// The fault whose rule fired.
    pub fault: FaultType,
    /// Action to execute.
    pub action: RecoveryAction,
    /// Subsystem the action applies to.
    pub subsystem: SubsystemId,
}

/// The FDIR engine.
#[derive(Debug)]
pub struct Fdir {
    records: [FaultRecord; FaultType::COUNT],
    isolated: [bool; SubsystemId::COUNT],
    reset_cause: ResetCause,
    boot_count: u32,
}

impl Fdir {
    /// Create the engine with the boot context needed for reset-loop
    /// detection.
    pub fn new(reset_cause: ResetCause, boot_count: u32) -> Self {
        let mut records = [FaultRecord::empty(FaultType::Watchdog); FaultType::COUNT];
        for rule in FAULT_RULES {
            records[rule.fault as usize] = FaultRecord::empty(rule.fault);
        }
        Self {
            records,
            isolated: [false; SubsystemId::COUNT],
            reset_cause,
            boot_count,
        }
    }

    /// Record a fault occurrence.
    pub fn report_fault(
        &mut self,
        fault: FaultType,
        subsystem: SubsystemId,
        now_ms: u32,
    ) {
        let record = &mut self.records[fault as usize];
        record.subsystem = subsystem;
        record.timestamp_ms = now_ms;
        record.occurrence_count = record.occurrence_count.saturating_add(1);
        record.active = true;
    }

    /// Deactivate a fault and reset its counter.
    pub fn clear_fault(&mut self, fault: FaultType) {
        let record = &mut self.records[fault as usize];
        record.active = false;
        record.occurrence_count = 0;
        record.last_action = RecoveryAction::None;
    }

    /// The record for one fault class.
    pub fn record(&self, fault: FaultType) -> &FaultRecord {
        &self.records[fault as usize]
    }

    /// Whether any record is active.
    pub fn any_active(&self) -> bool {
        self.records.iter().any(|r| r.active)
    }

    /// Bitmask of the first eight active fault classes, for the beacon.
    pub fn active_mask(&self) -> u8 {
        let mut mask = 0u8;
        for record in &self.records {
            if record.active && (record.fault as u8) < 8 {
                mask |= 1 << (record.fault as u8);
            }
        }
        mask
    }

    /// Copy the currently active records into `out`.
    pub fn active_faults<const N: usize>(
        &self,
        out: &mut Vec<FaultRecord, N>,
    ) {
        for record in &self.records {
            if record.active && out.push(*record).is_err() {
                break;
            }
        }
    }

    /// Mark a subsystem isolated.
    pub fn isolate(&mut self, subsystem: SubsystemId) {
        self.isolated[subsystem as usize] = true;
    }

    /// Clear a subsystem isolation.
    pub fn deisolate(&mut self, subsystem: SubsystemId) {
        self.isolated[subsystem as usize] = false;
    }

    /// Whether a subsystem is currently isolated.
    pub const fn is_isolated(&self, subsystem: SubsystemId) -> bool {
        self.isolated[subsystem as usize]
    }

    /// Periodic pass: reset-loop detection, then rule dispatch.
    ///
    /// While the boot context shows a watchdog reset loop (`reset_cause`
    /// watchdog and `boot_count >= 3`), `ResetLoop` is re-reported on
    /// every pass so its cumulative counter climbs toward the rule
    /// threshold like any other repeating fault. Every active fault whose
    /// counter has reached its threshold contributes one pending action;
    /// the caller executes the actions after releasing the FDIR lock.
    ///
    /// Returns `true` when this pass newly activated the reset-loop
    /// fault, so the caller can emit the matching error event.
    pub fn periodic(
        &mut self,
        now_ms: u32,
        actions: &mut Vec<PendingAction, { FaultType::COUNT }>,
    ) -> bool {
        let mut reset_loop_activated = false;
        if self.reset_cause == ResetCause::Watchdog && self.boot_count >= 3 {
            reset_loop_activated =
                !self.records[FaultType::ResetLoop as usize].active;
            self.report_fault(FaultType::ResetLoop, SubsystemId::Obc, now_ms);
        }

        for rule in FAULT_RULES {
            let record = &mut self.records[rule.fault as usize];
            if record.active && record.occurrence_count >= rule.threshold_count
            {
                record.last_action = rule.action;
                let _ = actions.push(PendingAction {
                    fault: rule.fault,
                    action: rule.action,
                    subsystem: record.subsystem,
                });
            }
        }

        reset_loop_activated
    }
}

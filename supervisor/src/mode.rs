//! Operational mode manager.
//!
//! A finite state machine over the six spacecraft modes with a fixed
//! allowed-transition table, per-mode dwell timeouts and a forced-override
//! path for FDIR. Transitions are requested asynchronously and executed on
//! the next `process` pass; the executed transition is returned as a value
//! so the supervisor can run entry and exit side effects without the mode
//! manager holding any other lock.

use serde::{Deserialize, Serialize};

use crate::bootrec::BootRecord;
use fsw_shared::error::{FswError, Result};
use fsw_shared::types::{ResetCause, SystemMode};

/// Detumble dwell limit before the FSM forces Safe, in seconds.
pub const DETUMBLE_TIMEOUT_S: u32 = 1800;

/// Recovery dwell limit before the FSM forces Safe, in seconds.
pub const RECOVERY_TIMEOUT_S: u32 = 3600;

/// Watchdog reset count at which boot selection refuses anything but Safe.
pub const WATCHDOG_LOOP_LIMIT: u32 = 3;

/// An executed mode transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Mode exited.
    pub from: SystemMode,
    /// Mode entered.
    pub to: SystemMode,
    /// Whether the transition bypassed the allowed-transition table.
    pub forced: bool,
}

/// Snapshot of the FSM state for housekeeping telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeStatus {
    /// Current mode.
    pub current: SystemMode,
    /// Previous mode.
    pub previous: SystemMode,
    /// Seconds of uptime when the current mode was entered.
    pub entry_time_s: u32,
    /// Dwell limit for the current mode; zero means unlimited.
    pub timeout_s: u32,
    /// Whether a transition is waiting for the next `process` pass.
    pub transition_pending: bool,
}

/// The mode state machine.
#[derive(Debug)]
pub struct ModeManager {
    current: SystemMode,
    previous: SystemMode,
    requested: SystemMode,
    entry_time_s: u32,
    timeout_s: u32,
    transition_pending: bool,
    forced_override: bool,
    transition_count: u32,
}

impl ModeManager {
    /// Enter the initial mode directly. This is the only entry that leaves
    /// `previous == current`.
    pub fn new(initial: SystemMode, now_s: u32) -> Self {
        Self {
            current: initial,
            previous: initial,
            requested: initial,
            entry_time_s: now_s,
            timeout_s: timeout_for(initial),
            transition_pending: false,
            forced_override: false,
            transition_count: 0,
        }
    }

    /// Current mode.
    pub const fn current(&self) -> SystemMode {
        self.current
    }

    /// Mode before the last executed transition.
    pub const fn previous(&self) -> SystemMode {
        self.previous
    }

    /// Executed transitions since boot.
    pub const fn transition_count(&self) -> u32 {
        self.transition_count
    }

    /// Snapshot for housekeeping.
    pub const fn status(&self) -> ModeStatus {
        ModeStatus {
            current: self.current,
            previous: self.previous,
            entry_time_s: self.entry_time_s,
            timeout_s: self.timeout_s,
            transition_pending: self.transition_pending,
        }
    }

    /// Request a transition through the allowed-transition table.
    ///
    /// Fails with `Permission` when `(current, target)` is not in the
    /// table; the current mode is unchanged in that case.
    pub fn request(&mut self, target: SystemMode) -> Result<()> {
        if !transition_allowed(self.current, target) {
            return Err(FswError::Permission);
        }
        self.requested = target;
        self.transition_pending = true;
        self.forced_override = false;
        Ok(())
    }

    /// Schedule a transition bypassing the table. Used by FDIR and the
    /// dwell-timeout path; idempotent when the target equals the current
    /// mode.
    pub fn force(&mut self, target: SystemMode) {
        self.requested = target;
        self.transition_pending = true;
        self.forced_override = true;
    }

    /// Execute a pending transition and police the dwell timeout.
    ///
    /// When the dwell limit of the current mode has expired a forced
    /// transition to Safe is scheduled first. Returns the transition that
    /// was executed on this pass, if any.
    pub fn process(&mut self, now_s: u32) -> Option<Transition> {
        if self.timeout_s > 0
            && !self.transition_pending
            && now_s.wrapping_sub(self.entry_time_s) >= self.timeout_s
        {
            self.force(SystemMode::Safe);
        }

        if !self.transition_pending {
            return None;
        }

        let from = self.current;
        let forced = self.forced_override;
        self.previous = from;
        self.current = self.requested;
        self.entry_time_s = now_s;
        self.timeout_s = timeout_for(self.current);
        self.transition_pending = false;
        self.forced_override = false;
        self.transition_count = self.transition_count.saturating_add(1);

        Some(Transition {
            from,
            to: self.current,
            forced,
        })
    }
}

/// The complete allowed-transition table. Every pair not matched here is
/// disallowed, including all self-transitions.
pub const fn transition_allowed(from: SystemMode, to: SystemMode) -> bool {
    use SystemMode::{Boot, Detumble, LowPower, Nominal, Recovery, Safe};
    matches!(
        (from, to),
        (Boot, Safe | Detumble | LowPower | Recovery)
            | (Safe, Detumble | Nominal | LowPower)
            | (Detumble, Safe | Nominal | LowPower)
            | (Nominal, Safe | Detumble | LowPower | Recovery)
            | (LowPower, Safe | Detumble | Nominal)
            | (Recovery, Safe | Detumble | Nominal)
    )
}

/// Dwell limit for a mode, in seconds. Zero disables the timeout.
pub const fn timeout_for(mode: SystemMode) -> u32 {
    match mode {
        SystemMode::Detumble => DETUMBLE_TIMEOUT_S,
        SystemMode::Recovery => RECOVERY_TIMEOUT_S,
        _ => 0,
    }
}

/// Choose the mode to boot into from the persistent record and the
/// safe-mode inhibit pin.
pub fn boot_mode_select(record: &BootRecord, safe_pin: bool) -> SystemMode {
    if safe_pin {
        return SystemMode::Safe;
    }
    if record.reset_count_watchdog >= WATCHDOG_LOOP_LIMIT {
        return SystemMode::Safe;
    }
    match record.last_reset_cause {
        ResetCause::Watchdog => SystemMode::Recovery,
        ResetCause::BrownOut => SystemMode::LowPower,
        ResetCause::PowerOn => SystemMode::Detumble,
        ResetCause::Software => {
            if record.requested_mode == SystemMode::Boot {
                SystemMode::Nominal
            } else {
                record.requested_mode
            }
        }
        _ => SystemMode::Safe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsw_shared::types::SystemMode::{
        Boot, Detumble, LowPower, Nominal, Recovery, Safe,
    };

    /// Flat listing of every permitted pair, cross-checking the predicate.
    const ALLOWED: [(SystemMode, SystemMode); 20] = [
        (Boot, Safe),
        (Boot, Detumble),
        (Boot, LowPower),
        (Boot, Recovery),
        (Safe, Detumble),
        (Safe, Nominal),
        (Safe, LowPower),
        (Detumble, Safe),
        (Detumble, Nominal),
        (Detumble, LowPower),
        (Nominal, Safe),
        (Nominal, Detumble),
        (Nominal, LowPower),
        (Nominal, Recovery),
        (LowPower, Safe),
        (LowPower, Detumble),
        (LowPower, Nominal),
        (Recovery, Safe),
        (Recovery, Detumble),
        (Recovery, Nominal),
    ];

    #[test]
    fn test_transition_table_exhaustive() {
        for from in SystemMode::ALL {
            for to in SystemMode::ALL {
                let expected = ALLOWED.contains(&(from, to));
                assert_eq!(
                    transition_allowed(from, to),
                    expected,
                    "table mismatch for {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn test_every_allowed_pair_executes() {
        for (from, to) in ALLOWED {
            let mut fsm = ModeManager::new(from, 0);
            fsm.request(to).expect("allowed transition");
            let transition = fsm.process(1).expect("executes");
            assert_eq!(transition, Transition { from, to, forced: false });
            assert_eq!(fsm.current(), to);
            assert_eq!(fsm.previous(), from);
        }
    }

    #[test]
    fn test_every_disallowed_pair_rejected() {
        for from in SystemMode::ALL {
            for to in SystemMode::ALL {
                if ALLOWED.contains(&(from, to)) {
                    continue;
                }
                let mut fsm = ModeManager::new(from, 0);
                assert_eq!(fsm.request(to), Err(FswError::Permission));
                assert!(fsm.process(1).is_none());
                assert_eq!(fsm.current(), from);
            }
        }
    }

    #[test]
    fn test_force_bypasses_table() {
        // Safe -> Recovery is not in the table
        let mut fsm = ModeManager::new(Safe, 0);
        assert_eq!(fsm.request(Recovery), Err(FswError::Permission));
        fsm.force(Recovery);
        let transition = fsm.process(5).expect("forced transition executes");
        assert!(transition.forced);
        assert_eq!(fsm.current(), Recovery);
    }

    #[test]
    fn test_idempotent_force() {
        let mut fsm = ModeManager::new(Nominal, 0);
        fsm.force(Safe);
        fsm.process(1);
        fsm.force(Safe);
        fsm.process(2);
        assert_eq!(fsm.current(), Safe);
        assert_eq!(fsm.previous(), Safe);
    }

    #[test]
    fn test_detumble_timeout_forces_safe() {
        let mut fsm = ModeManager::new(Detumble, 0);
        assert_eq!(fsm.status().timeout_s, DETUMBLE_TIMEOUT_S);

        assert!(fsm.process(DETUMBLE_TIMEOUT_S - 1).is_none());

        // First pass at expiry schedules the forced transition, which
        // executes on the same pass.
        let transition = fsm.process(DETUMBLE_TIMEOUT_S).expect("timeout");
        assert_eq!(transition.to, Safe);
        assert!(transition.forced);
        assert_eq!(fsm.status().timeout_s, 0);
    }

    #[test]
    fn test_recovery_timeout_value() {
        let fsm = ModeManager::new(Recovery, 100);
        assert_eq!(fsm.status().timeout_s, RECOVERY_TIMEOUT_S);
        assert_eq!(fsm.status().entry_time_s, 100);
    }

    #[test]
    fn test_entry_time_updates_on_transition() {
        let mut fsm = ModeManager::new(Safe, 10);
        fsm.request(Nominal).expect("allowed");
        fsm.process(42);
        assert_eq!(fsm.status().entry_time_s, 42);
    }

    #[test]
    fn test_boot_selection_safe_pin_wins() {
        let mut record = BootRecord::fresh();
        record.record_reset(ResetCause::PowerOn);
        assert_eq!(boot_mode_select(&record, true), Safe);
    }

    #[test]
    fn test_boot_selection_watchdog_loop() {
        let mut record = BootRecord::fresh();
        record.reset_count_watchdog = 2;
        record.record_reset(ResetCause::Watchdog);
        assert_eq!(record.reset_count_watchdog, 3);
        assert_eq!(boot_mode_select(&record, false), Safe);
    }

    #[test]
    fn test_boot_selection_by_cause() {
        let cases = [
            (ResetCause::Watchdog, Recovery),
            (ResetCause::BrownOut, LowPower),
            (ResetCause::PowerOn, Detumble),
            (ResetCause::Pin, Safe),
            (ResetCause::Unknown, Safe),
            (ResetCause::LowPower, Safe),
        ];
        for (cause, expected) in cases {
            let mut record = BootRecord::fresh();
            record.record_reset(cause);
            assert_eq!(
                boot_mode_select(&record, false),
                expected,
                "cause {cause:?}"
            );
        }
    }

    #[test]
    fn test_boot_selection_software_reset_honors_request() {
        let mut record = BootRecord::fresh();
        record.requested_mode = LowPower;
        record.record_reset(ResetCause::Software);
        assert_eq!(boot_mode_select(&record, false), LowPower);

        // Default when nothing was requested
        let mut record = BootRecord::fresh();
        record.record_reset(ResetCause::Software);
        assert_eq!(boot_mode_select(&record, false), Nominal);
    }
}

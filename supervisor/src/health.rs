//! Health monitor.
//!
//! Tracks heartbeats for up to sixteen monitored tasks and checks platform
//! quantities against fixed thresholds. Each periodic pass recomputes the
//! aggregate status from scratch; the supervisor kicks the watchdog after
//! every pass regardless of the outcome.

use serde::{Deserialize, Serialize};

use crate::platform::HealthReadings;
use fsw_shared::error::{FswError, Result};
use fsw_shared::types::HealthState;

/// Maximum number of monitored tasks.
pub const MAX_TASKS: usize = 16;

/// Board temperature limits in degrees Celsius.
pub const TEMP_LIMIT_C: (i16, i16) = (-40, 85);

/// CPU load warning threshold in percent.
pub const CPU_LOAD_LIMIT_PERCENT: u8 = 80;

/// Minimum acceptable stack headroom in bytes.
pub const MIN_STACK_FREE_BYTES: u32 = 128;

/// Bus voltage limits in millivolts.
pub const VOLTAGE_LIMIT_MV: (u16, u16) = (3000, 4200);

/// Condition flags raised by a periodic pass, packed for the beacon.
pub mod flags {
    /// A monitored task missed its heartbeat deadline.
    pub const TASK_DEAD: u8 = 1 << 0;
    /// Board temperature out of limits.
    pub const TEMP: u8 = 1 << 1;
    /// CPU load above the warning threshold.
    pub const CPU_LOAD: u8 = 1 << 2;
    /// Stack headroom below the floor.
    pub const STACK: u8 = 1 << 3;
    /// Bus voltage out of limits.
    pub const VOLTAGE: u8 = 1 << 4;
}

#[derive(Debug, Clone, Copy)]
struct TaskSlot {
    name: &'static str,
    timeout_ms: u32,
    last_heartbeat_ms: u32,
    alive: bool,
    used: bool,
}

impl TaskSlot {
    const EMPTY: TaskSlot = TaskSlot {
        name: "",
        timeout_ms: 0,
        last_heartbeat_ms: 0,
        alive: false,
        used: false,
    };
}

/// Outcome of one periodic pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Aggregate status after this pass.
    pub status: HealthState,
    /// Condition flags (see [`flags`]).
    pub flags: u8,
    /// Number of monitored tasks that missed their deadline.
    pub dead_tasks: u8,
}

/// The health monitor.
#[derive(Debug)]
pub struct HealthMonitor {
    tasks: [TaskSlot; MAX_TASKS],
    status: HealthState,
    last_flags: u8,
    pass_count: u32,
}

impl HealthMonitor {
    /// Create a monitor with no registered tasks.
    pub const fn new() -> Self {
        Self {
            tasks: [TaskSlot::EMPTY; MAX_TASKS],
            status: HealthState::Ok,
            last_flags: 0,
            pass_count: 0,
        }
    }

    /// Register a task for heartbeat monitoring.
    ///
    /// Returns the task id to use with [`HealthMonitor::update_task`], or
    /// `NoMemory` when the table is full. A zero timeout is rejected.
    pub fn register_task(
        &mut self,
        name: &'static str,
        timeout_ms: u32,
        now_ms: u32,
    ) -> Result<u8> {
        if timeout_ms == 0 {
            return Err(FswError::InvalidParam);
        }
        for (i, slot) in self.tasks.iter_mut().enumerate() {
            if !slot.used {
                *slot = TaskSlot {
                    name,
                    timeout_ms,
                    last_heartbeat_ms: now_ms,
                    alive: true,
                    used: true,
                };
                return Ok(i as u8);
            }
        }
        Err(FswError::NoMemory)
    }

    /// Refresh a task's heartbeat.
    pub fn update_task(&mut self, id: u8, now_ms: u32) -> Result<()> {
        let slot = self
            .tasks
            .get_mut(id as usize)
            .filter(|s| s.used)
            .ok_or(FswError::NotFound)?;
        slot.last_heartbeat_ms = now_ms;
        slot.alive = true;
        Ok(())
    }

    /// Name of a registered task.
    pub fn task_name(&self, id: u8) -> Result<&'static str> {
        self.tasks
            .get(id as usize)
            .filter(|s| s.used)
            .map(|s| s.name)
            .ok_or(FswError::NotFound)
    }

    /// Aggregate status after the most recent pass.
    pub const fn status(&self) -> HealthState {
        self.status
    }

    /// Condition flags from the most recent pass.
    pub const fn last_flags(&self) -> u8 {
        self.last_flags
    }

    /// Completed periodic passes.
    pub const fn pass_count(&self) -> u32 {
        self.pass_count
    }

    /// One monitoring pass: heartbeat deadlines, then platform thresholds.
    ///
    /// A missed heartbeat or an out-of-limits bus voltage drives the
    /// status to `Critical`; the soft limits only degrade `Ok` to
    /// `Warning`.
    pub fn periodic(
        &mut self,
        now_ms: u32,
        readings: &HealthReadings,
    ) -> HealthReport {
        let mut status = HealthState::Ok;
        let mut flags = 0u8;
        let mut dead_tasks = 0u8;

        for slot in self.tasks.iter_mut().filter(|s| s.used) {
            if now_ms.wrapping_sub(slot.last_heartbeat_ms) > slot.timeout_ms {
                slot.alive = false;
                dead_tasks += 1;
                flags |= flags::TASK_DEAD;
                status = HealthState::Critical;
            }
        }

        let temp_bad = readings.temp_c < TEMP_LIMIT_C.0
            || readings.temp_c > TEMP_LIMIT_C.1;
        let cpu_bad = readings.cpu_load_percent > CPU_LOAD_LIMIT_PERCENT;
        let stack_bad = readings.min_stack_free < MIN_STACK_FREE_BYTES;
        if temp_bad {
            flags |= flags::TEMP;
        }
        if cpu_bad {
            flags |= flags::CPU_LOAD;
        }
        if stack_bad {
            flags |= flags::STACK;
        }
        if (temp_bad || cpu_bad || stack_bad) && status == HealthState::Ok {
            status = HealthState::Warning;
        }

        if readings.bus_voltage_mv < VOLTAGE_LIMIT_MV.0
            || readings.bus_voltage_mv > VOLTAGE_LIMIT_MV.1
        {
            flags |= flags::VOLTAGE;
            status = HealthState::Critical;
        }

        self.status = status;
        self.last_flags = flags;
        self.pass_count = self.pass_count.saturating_add(1);

        HealthReport {
            status,
            flags,
            dead_tasks,
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

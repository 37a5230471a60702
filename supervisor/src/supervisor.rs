//! Supervisor boot and tick loop.
//!
//! Wires every component together, selects the initial mode from the
//! persistent boot record, registers the periodic jobs and exposes the
//! single cooperative tick the hosting kernel drives at 100 Hz.
//!
//! Locking: every component sits behind its own mutex, acquired only for
//! the duration of a public operation and never nested. The fixed
//! acquisition order is event log, time, health, mode, FDIR, EPS,
//! telemetry, telecommand, scheduler; jobs gather data first, release the
//! lock, then act on later components. Cross-component reactions (EPS to
//! mode, FDIR to mode) travel as returned values, never as calls made
//! while holding the reporting component's lock.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use heapless::Vec;

use crate::beacon::{Beacon, BeaconInputs, BEACON_FRAME_LEN, EMERGENCY_FRAME_LEN};
use crate::bootrec::{BootRecord, BOOT_RECORD_LEN};
use crate::eps::{BatteryState, Eps, PowerBudget};
use crate::fdir::{FaultType, Fdir, PendingAction, RecoveryAction};
use crate::health::{HealthMonitor, HealthReport};
use crate::logging::{ByteLog, EventEntry, EventLog};
use crate::mode::{boot_mode_select, ModeManager, ModeStatus, Transition};
use crate::platform::PlatformHooks;
use crate::scheduler::Scheduler;
use crate::telecommand::{
    TcCounters, TcDefinition, Telecommand, AUTH_KEY_LEN, MAX_TC_RESPONSE,
};
use crate::telemetry::{Telemetry, TmDefinition};
use crate::time::TimeSource;
use fsw_shared::ccsds::Apid;
use fsw_shared::error::{FswError, Result};
use fsw_shared::pus::{
    TcPacket, MAX_DATA_LEN, MAX_PACKET_LEN, SERVICE_FUNCTION,
    SERVICE_HOUSEKEEPING, SERVICE_TEST, SERVICE_TIME, SERVICE_VERIFICATION,
    SUBTYPE_ACCEPT_OK, SUBTYPE_COMPLETE_FAIL, SUBTYPE_COMPLETE_OK,
    SUBTYPE_CONNECTION_TEST, SUBTYPE_HK_DISABLE, SUBTYPE_HK_ENABLE,
    SUBTYPE_MODE_CHANGE, SUBTYPE_PING, SUBTYPE_SYSTEM_RESET,
    SUBTYPE_TIME_SYNC,
};
use fsw_shared::time::UtcTime;
use fsw_shared::types::{
    AuthLevel, HealthState, Rail, Severity, SubsystemId, SystemMode,
    TmPriority,
};

/// Supervisor tick period driven by the hosting kernel, in milliseconds.
pub const TICK_PERIOD_MS: u32 = 10;

/// Health monitor cadence outside Safe mode.
pub const HEALTH_PERIOD_MS: u32 = 200;

/// Health monitor cadence in Safe mode.
pub const HEALTH_PERIOD_SAFE_MS: u32 = 500;

/// Event identifiers carried in service 5 reports.
pub mod events {
    /// Supervisor completed boot.
    pub const BOOT: u16 = 0x0001;
    /// Persistent boot record failed validation and was reinitialized.
    pub const BOOT_RECORD_INVALID: u16 = 0x0002;
    /// Mode transition executed.
    pub const MODE_TRANSITION: u16 = 0x0010;
    /// Fault reported to FDIR.
    pub const FAULT_REPORTED: u16 = 0x0020;
    /// FDIR dispatched a recovery action.
    pub const FDIR_ACTION: u16 = 0x0021;
    /// Battery crossed the critical floor.
    pub const POWER_CRITICAL: u16 = 0x0030;
    /// Low-power operations began.
    pub const LOW_POWER_ENTER: u16 = 0x0031;
    /// Low-power operations ended.
    pub const LOW_POWER_EXIT: u16 = 0x0032;
    /// Health status degraded.
    pub const HEALTH_DEGRADED: u16 = 0x0033;
    /// UTC synchronized from the ground.
    pub const TIME_SYNC: u16 = 0x0040;
    /// Software reset commanded.
    pub const RESET_COMMANDED: u16 = 0x0050;
}

/// Housekeeping packet identifiers registered at boot.
pub mod hk_ids {
    /// Supervisor/system report.
    pub const SYSTEM: u16 = 0x0101;
    /// Health report.
    pub const HEALTH: u16 = 0x0102;
    /// Power report.
    pub const POWER: u16 = 0x0103;
}

/// Static mission configuration applied at boot.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Beacon callsign, space-padded to eight bytes.
    pub callsign: &'static str,
    /// Ground key for telecommand verification; `None` leaves the
    /// verify hook fail-open.
    pub auth_key: Option<[u8; AUTH_KEY_LEN]>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            callsign: "CUBE3U-1",
            auth_key: None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The mission supervisor.
pub struct Supervisor {
    hooks: PlatformHooks,
    // Components, declared in lock-acquisition order
    event_log: Mutex<EventLog>,
    byte_log: Mutex<ByteLog>,
    time: Mutex<TimeSource>,
    health: Mutex<HealthMonitor>,
    mode: Mutex<ModeManager>,
    fdir: Mutex<Fdir>,
    eps: Mutex<Eps>,
    telemetry: Mutex<Telemetry>,
    telecommand: Mutex<Telecommand>,
    scheduler: Mutex<Scheduler<Supervisor>>,
    beacon: Mutex<Beacon>,
    boot_record: Mutex<BootRecord>,
    pending_beacon: Mutex<Option<[u8; BEACON_FRAME_LEN]>>,
    event_cursor: AtomicU32,
    in_tick: AtomicBool,
    health_job_slot: u8,
    tick_task: u8,
}

impl core::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Supervisor")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Boot the supervisor.
    ///
    /// Validates and updates the persistent image in place, latches the
    /// reset cause, selects the initial mode, initializes every component
    /// in the fixed order and registers the periodic jobs. The caller owns
    /// the persistent image and is responsible for keeping it in no-init
    /// memory.
    pub fn boot(
        hooks: PlatformHooks,
        config: SupervisorConfig,
        image: &mut [u8; BOOT_RECORD_LEN],
    ) -> Self {
        let (mut record, image_valid) = BootRecord::load_or_init(image);
        let cause = (hooks.reset_get_cause)();
        record.record_reset(cause);
        *image = record.to_bytes();

        let safe_pin = (hooks.safe_mode_pin_asserted)();
        let initial_mode = boot_mode_select(&record, safe_pin);
        let now_ms = (hooks.time_ms_monotonic)();

        // Init order: event log, byte log, time, health, mode, EPS,
        // telecommand, telemetry, beacon, scheduler.
        let event_log = EventLog::new();
        let byte_log = ByteLog::new();
        let time = TimeSource::new();
        let mut health = HealthMonitor::new();
        let mode = ModeManager::new(initial_mode, now_ms / 1000);
        let eps = Eps::new();

        let mut telecommand = Telecommand::new();
        telecommand.set_auth_key(config.auth_key);
        register_builtin_commands(&mut telecommand);

        let mut telemetry = Telemetry::new();
        register_builtin_housekeeping(&mut telemetry);

        let mut beacon = Beacon::new(config.callsign);
        beacon.apply_mode(initial_mode);

        let mut scheduler: Scheduler<Supervisor> = Scheduler::new();
        let tick_task = health
            .register_task("supervisor", 1000, now_ms)
            .unwrap_or(0);
        let (health_job_slot, _) = register_jobs(&mut scheduler, initial_mode);

        let supervisor = Self {
            hooks,
            event_log: Mutex::new(event_log),
            byte_log: Mutex::new(byte_log),
            time: Mutex::new(time),
            health: Mutex::new(health),
            mode: Mutex::new(mode),
            fdir: Mutex::new(Fdir::new(cause, record.boot_count)),
            eps: Mutex::new(eps),
            telemetry: Mutex::new(telemetry),
            telecommand: Mutex::new(telecommand),
            scheduler: Mutex::new(scheduler),
            beacon: Mutex::new(beacon),
            boot_record: Mutex::new(record),
            pending_beacon: Mutex::new(None),
            event_cursor: AtomicU32::new(0),
            in_tick: AtomicBool::new(false),
            health_job_slot,
            tick_task,
        };

        if !image_valid {
            supervisor.event(
                Severity::Warning,
                SubsystemId::Obc,
                events::BOOT_RECORD_INVALID,
                "boot record reinitialized",
            );
        }
        supervisor.event(
            Severity::Info,
            SubsystemId::Obc,
            events::BOOT,
            "supervisor boot",
        );

        supervisor
    }

    // ── Tick loop ─────────────────────────────────────────────────────

    /// Advance the scheduler by `elapsed_ms` and run the due jobs.
    ///
    /// The watchdog is kicked on every tick even when no job fires.
    /// Re-entry from a job is rejected with `Busy`.
    pub fn tick(&self, elapsed_ms: u32) -> Result<u8> {
        if self.in_tick.swap(true, Ordering::Acquire) {
            return Err(FswError::Busy);
        }

        let due = match lock(&self.scheduler).advance(elapsed_ms) {
            Ok(due) => due,
            Err(e) => {
                self.in_tick.store(false, Ordering::Release);
                return Err(e);
            }
        };
        for job in &due {
            job(self);
        }

        let now = self.now_ms();
        let _ = lock(&self.health).update_task(self.tick_task, now);
        (self.hooks.watchdog_kick)();

        self.in_tick.store(false, Ordering::Release);
        Ok(due.len() as u8)
    }

    /// Monotonic milliseconds since boot.
    pub fn now_ms(&self) -> u32 {
        (self.hooks.time_ms_monotonic)()
    }

    // ── Uplink / downlink surface ─────────────────────────────────────

    /// Queue an uplinked frame for the telecommand pass.
    pub fn uplink_frame(&self, raw: &[u8]) -> Result<()> {
        lock(&self.telecommand).push_frame(raw)
    }

    /// Dequeue the next telemetry packet for the radio.
    pub fn downlink_next(&self) -> Option<Vec<u8, MAX_PACKET_LEN>> {
        lock(&self.telemetry).dequeue_packet().map(|(packet, _)| packet)
    }

    /// Take the most recent beacon frame, if one was generated.
    pub fn take_beacon(&self) -> Option<[u8; BEACON_FRAME_LEN]> {
        lock(&self.pending_beacon).take()
    }

    /// Build an emergency beacon frame on demand.
    pub fn emergency_beacon(&self, codes: u16) -> Vec<u8, EMERGENCY_FRAME_LEN> {
        lock(&self.beacon).build_emergency(codes)
    }

    // ── Operations surface ────────────────────────────────────────────

    /// Current operational mode.
    pub fn mode(&self) -> SystemMode {
        lock(&self.mode).current()
    }

    /// Mode state snapshot.
    pub fn mode_status(&self) -> ModeStatus {
        lock(&self.mode).status()
    }

    /// Request a mode transition through the allowed-transition table.
    pub fn request_mode(&self, target: SystemMode) -> Result<()> {
        lock(&self.mode).request(target)?;
        lock(&self.boot_record).requested_mode = target;
        Ok(())
    }

    /// Aggregate health status.
    pub fn health_state(&self) -> HealthState {
        lock(&self.health).status()
    }

    /// Most recent health report flags.
    pub fn health_flags(&self) -> u8 {
        lock(&self.health).last_flags()
    }

    /// Register an externally hosted task for heartbeat monitoring.
    pub fn register_health_task(
        &self,
        name: &'static str,
        timeout_ms: u32,
    ) -> Result<u8> {
        let now = self.now_ms();
        lock(&self.health).register_task(name, timeout_ms, now)
    }

    /// Refresh a monitored task's heartbeat.
    pub fn heartbeat(&self, task: u8) -> Result<()> {
        let now = self.now_ms();
        lock(&self.health).update_task(task, now)
    }

    /// Battery state from the most recent EPS pass.
    pub fn battery(&self) -> BatteryState {
        lock(&self.eps).battery()
    }

    /// Power budget from the most recent EPS pass.
    pub fn power_budget(&self) -> PowerBudget {
        lock(&self.eps).budget()
    }

    /// Whether a rail is commanded on.
    pub fn rail_enabled(&self, rail: Rail) -> bool {
        lock(&self.eps).rail_enabled(rail)
    }

    /// Whether the EPS policy can accept an additional load.
    pub fn can_support_load(&self, load_mw: u32) -> bool {
        lock(&self.eps).can_support_load(load_mw)
    }

    /// Whether the battery is below the critical floor.
    pub fn critical_power(&self) -> bool {
        lock(&self.eps).critical_power()
    }

    /// Report a fault to FDIR and emit the matching error event.
    pub fn report_fault(&self, fault: FaultType, subsystem: SubsystemId) {
        let now = self.now_ms();
        lock(&self.fdir).report_fault(fault, subsystem, now);
        self.event(
            Severity::Error,
            subsystem,
            events::FAULT_REPORTED,
            "fault reported",
        );
    }

    /// Whether FDIR has isolated a subsystem.
    pub fn is_isolated(&self, subsystem: SubsystemId) -> bool {
        lock(&self.fdir).is_isolated(subsystem)
    }

    /// Whether a fault class is currently active.
    pub fn fault_active(&self, fault: FaultType) -> bool {
        lock(&self.fdir).record(fault).active
    }

    /// Telecommand counter snapshot.
    pub fn tc_counters(&self) -> TcCounters {
        lock(&self.telecommand).counters()
    }

    /// Telemetry queue depth.
    pub fn tm_queue_depth(&self) -> u8 {
        lock(&self.telemetry).queue_count()
    }

    /// Telemetry queue overflow count.
    pub fn tm_queue_overflows(&self) -> u32 {
        lock(&self.telemetry).queue_overflows()
    }

    /// Copy of the persistent boot record as updated at boot.
    pub fn boot_record(&self) -> BootRecord {
        *lock(&self.boot_record)
    }

    /// Serialized persistent image for the platform to store in no-init
    /// memory before a commanded reset.
    pub fn boot_record_image(&self) -> [u8; BOOT_RECORD_LEN] {
        lock(&self.boot_record).to_bytes()
    }

    /// Current UTC; `NotReady` before the first ground synchronization.
    pub fn utc(&self) -> Result<UtcTime> {
        let now = self.now_ms();
        lock(&self.time).get_utc(now)
    }

    /// Override the beacon cadence, clamped to the allowed range.
    pub fn set_beacon_period_s(&self, period_s: u16) {
        lock(&self.beacon).set_period_s(period_s);
    }

    /// Events recorded since boot.
    pub fn events_recorded(&self) -> u32 {
        lock(&self.event_log).total_recorded()
    }

    // ── Internals ─────────────────────────────────────────────────────

    /// Record an event and mirror a one-line message to the debug path.
    pub(crate) fn event(
        &self,
        severity: Severity,
        subsystem: SubsystemId,
        event_id: u16,
        message: &str,
    ) {
        let now = self.now_ms();
        lock(&self.event_log).record(now, severity, subsystem, event_id, message);

        let mut byte_log = lock(&self.byte_log);
        for &b in message.as_bytes() {
            (self.hooks.debug_putchar)(b);
            byte_log.write(&[b]);
        }
        (self.hooks.debug_putchar)(b'\n');
        byte_log.write(b"\n");
    }

    fn tm_timestamp(&self) -> (u32, u16) {
        let now = self.now_ms();
        lock(&self.time).tm_timestamp(now)
    }

    /// Build and queue a service 1 verification report for a command.
    fn send_verification(&self, packet: &TcPacket, subtype: u8, extra: &[u8]) {
        let ts = self.tm_timestamp();
        let (packet_id, sequence_control) = packet.verification_words();

        let mut data = Vec::<u8, MAX_DATA_LEN>::new();
        let _ = data.extend_from_slice(&packet_id.to_be_bytes());
        let _ = data.extend_from_slice(&sequence_control.to_be_bytes());
        let _ = data.extend_from_slice(extra);

        let mut telemetry = lock(&self.telemetry);
        if let Ok(wire) = telemetry.build_tm(
            Apid::System,
            SERVICE_VERIFICATION,
            subtype,
            ts,
            &data,
        ) {
            let _ = telemetry.queue_packet(&wire, TmPriority::High);
        }
    }

    /// Full disposition of one uplinked frame.
    fn process_telecommand(&self, raw: &[u8]) {
        let now = self.now_ms();

        let packet = match TcPacket::decode(raw) {
            Ok(packet) => packet,
            Err(_) => {
                lock(&self.telecommand).note_undecodable();
                return;
            }
        };

        let mode = self.mode();
        let authorized =
            lock(&self.telecommand).authorize(&packet, raw, mode, now);
        let (def, data_len) = match authorized {
            Ok(ok) => ok,
            Err(_rejected) => return,
        };

        self.send_verification(&packet, SUBTYPE_ACCEPT_OK, &[]);

        let mut response = Vec::<u8, MAX_TC_RESPONSE>::new();
        let outcome = (def.handler)(self, &packet.data[..data_len], &mut response);

        let now = self.now_ms();
        lock(&self.telecommand).note_result(&packet, now, outcome.is_ok());
        match outcome {
            Ok(()) => {
                self.send_verification(&packet, SUBTYPE_COMPLETE_OK, &response);
            }
            Err(e) => {
                self.send_verification(
                    &packet,
                    SUBTYPE_COMPLETE_FAIL,
                    &[e.code()],
                );
            }
        }
    }

    /// Entry and exit side effects of an executed transition.
    fn on_transition(&self, transition: Transition) {
        self.event(
            Severity::Info,
            SubsystemId::Obc,
            events::MODE_TRANSITION,
            "mode transition",
        );

        lock(&self.beacon).apply_mode(transition.to);

        let health_period = if transition.to == SystemMode::Safe {
            HEALTH_PERIOD_SAFE_MS
        } else {
            HEALTH_PERIOD_MS
        };
        let _ = lock(&self.scheduler)
            .set_period(self.health_job_slot, health_period);

        if transition.to == SystemMode::Safe {
            // Safe mode drops the non-essential rails
            let mut changes: Vec<(Rail, bool), 2> = Vec::new();
            {
                let mut eps = lock(&self.eps);
                for rail in [Rail::Actuators, Rail::Payload] {
                    if eps.rail_enabled(rail)
                        && eps.set_rail(rail, false).is_ok()
                    {
                        let _ = changes.push((rail, false));
                    }
                }
            }
            self.apply_rail_changes(&changes);
        }
    }

    fn apply_rail_changes(&self, changes: &[(Rail, bool)]) {
        for &(rail, enabled) in changes {
            if enabled {
                (self.hooks.power_enable_rail)(rail.index());
            } else {
                (self.hooks.power_disable_rail)(rail.index());
            }
        }
    }

    /// Execute one FDIR recovery action.
    fn execute_recovery(&self, pending: PendingAction) {
        self.event(
            Severity::Warning,
            pending.subsystem,
            events::FDIR_ACTION,
            "recovery action",
        );

        match pending.action {
            RecoveryAction::None | RecoveryAction::Retry => {}
            RecoveryAction::Isolate => {
                lock(&self.fdir).isolate(pending.subsystem);
            }
            RecoveryAction::ResetSubsystem => {
                (self.hooks.reset_subsystem)(pending.subsystem);
            }
            RecoveryAction::SafeMode => {
                lock(&self.mode).force(SystemMode::Safe);
            }
            RecoveryAction::SystemReset => {
                lock(&self.boot_record).requested_mode = self.mode();
                (self.hooks.reset_software)();
            }
            RecoveryAction::PayloadOff => {
                let _ = lock(&self.eps).set_rail(Rail::Payload, false);
                self.apply_rail_changes(&[(Rail::Payload, false)]);
            }
            RecoveryAction::LoadShed => {
                let rails = [Rail::Payload, Rail::Actuators, Rail::Sensors];
                {
                    let mut eps = lock(&self.eps);
                    for rail in rails {
                        let _ = eps.set_rail(rail, false);
                    }
                }
                self.apply_rail_changes(&[
                    (Rail::Payload, false),
                    (Rail::Actuators, false),
                    (Rail::Sensors, false),
                ]);
            }
        }
    }
}

// ── Periodic jobs (registration order is firing order) ───────────────

fn job_mode_process(sup: &Supervisor) {
    let now_s = sup.now_ms() / 1000;
    let transition = lock(&sup.mode).process(now_s);
    if let Some(transition) = transition {
        sup.on_transition(transition);
    }
}

fn job_health_periodic(sup: &Supervisor) {
    let readings = (sup.hooks.read_health)();
    let now = sup.now_ms();

    let (previous, report): (HealthState, HealthReport) = {
        let mut health = lock(&sup.health);
        let previous = health.status();
        (previous, health.periodic(now, &readings))
    };

    if report.status > previous {
        let severity = if report.status == HealthState::Critical {
            Severity::Critical
        } else {
            Severity::Warning
        };
        sup.event(
            severity,
            SubsystemId::Obc,
            events::HEALTH_DEGRADED,
            "health degraded",
        );
    }

    (sup.hooks.watchdog_kick)();
}

fn job_eps_periodic(sup: &Supervisor) {
    let readings = (sup.hooks.read_power)();
    let outcome = lock(&sup.eps).periodic(&readings);

    sup.apply_rail_changes(&outcome.rail_changes);

    if outcome.report_power_critical {
        sup.report_fault(FaultType::PowerCritical, SubsystemId::Eps);
        sup.event(
            Severity::Critical,
            SubsystemId::Eps,
            events::POWER_CRITICAL,
            "battery critical",
        );
    }
    if outcome.request_low_power {
        let _ = lock(&sup.mode).request(SystemMode::LowPower);
        sup.event(
            Severity::Warning,
            SubsystemId::Eps,
            events::LOW_POWER_ENTER,
            "entering low power",
        );
    }
    if outcome.exited_low_power {
        sup.event(
            Severity::Info,
            SubsystemId::Eps,
            events::LOW_POWER_EXIT,
            "leaving low power",
        );
    }
}

fn job_tc_periodic(sup: &Supervisor) {
    // Bounded work per pass: at most two frames
    for _ in 0..2 {
        let frame = lock(&sup.telecommand).pop_frame();
        let Some(frame) = frame else { break };
        sup.process_telecommand(&frame);
    }
}

fn job_tm_periodic(sup: &Supervisor) {
    let now = sup.now_ms();
    let ts = sup.tm_timestamp();

    // Housekeeping: collect due definitions, generate with the pipeline
    // lock released, queue the reports.
    let due = lock(&sup.telemetry).due_hk(now);
    for job in &due {
        let mut payload = Vec::<u8, MAX_DATA_LEN>::new();
        if (job.generator)(sup, &mut payload).is_err() {
            continue;
        }
        let mut telemetry = lock(&sup.telemetry);
        if let Ok(wire) =
            telemetry.build_tm(job.apid, job.service, job.subtype, ts, &payload)
        {
            let _ = telemetry.queue_packet(&wire, job.priority);
        }
    }

    // Drain newly recorded events into service 5 reports
    let mut fresh = Vec::<EventEntry, 8>::new();
    let cursor = sup.event_cursor.load(Ordering::Relaxed);
    let next = lock(&sup.event_log).collect_since(cursor, &mut fresh);
    sup.event_cursor.store(next, Ordering::Relaxed);

    for entry in &fresh {
        if entry.severity < Severity::Warning {
            continue;
        }
        let _ = lock(&sup.telemetry).send_event(
            apid_for(entry.subsystem),
            entry.event_id,
            ts,
            &[entry.severity as u8, entry.subsystem as u8],
        );
    }
}

fn job_beacon_periodic(sup: &Supervisor) {
    let now_s = sup.now_ms() / 1000;
    if !lock(&sup.beacon).due(now_s) {
        return;
    }

    let inputs = BeaconInputs {
        mode: sup.mode(),
        uptime_s: now_s,
        health_flags: lock(&sup.health).last_flags(),
        reset_count: lock(&sup.boot_record).boot_count.min(255) as u8,
        fault_flags: lock(&sup.fdir).active_mask(),
        battery: lock(&sup.eps).battery(),
        solar_mw: lock(&sup.eps).budget().generation_mw.min(65_535) as u16,
        quat: (sup.hooks.read_attitude_q15)(),
        temps_c: (sup.hooks.read_temps_c)(),
        radio: (sup.hooks.read_radio)(),
    };

    let frame = lock(&sup.beacon).build_frame(now_s, &inputs);
    *lock(&sup.pending_beacon) = Some(frame);
}

fn job_fdir_periodic(sup: &Supervisor) {
    let now = sup.now_ms();
    let mut actions = Vec::<PendingAction, { FaultType::COUNT }>::new();
    let reset_loop_activated = lock(&sup.fdir).periodic(now, &mut actions);
    if reset_loop_activated {
        sup.event(
            Severity::Error,
            SubsystemId::Obc,
            events::FAULT_REPORTED,
            "reset loop detected",
        );
    }
    for pending in actions {
        sup.execute_recovery(pending);
    }
}

/// Register the periodic jobs at their nominal cadences. Returns the
/// health job slot (its cadence is halved in Safe mode) and the total
/// registered.
fn register_jobs(
    scheduler: &mut Scheduler<Supervisor>,
    initial_mode: SystemMode,
) -> (u8, u8) {
    let health_period = if initial_mode == SystemMode::Safe {
        HEALTH_PERIOD_SAFE_MS
    } else {
        HEALTH_PERIOD_MS
    };

    let _ = scheduler.register(job_mode_process, 200);
    let health_slot =
        scheduler.register(job_health_periodic, health_period).unwrap_or(0);
    let _ = scheduler.register(job_eps_periodic, 1000);
    let _ = scheduler.register(job_tc_periodic, 50);
    let _ = scheduler.register(job_tm_periodic, 200);
    let _ = scheduler.register(job_beacon_periodic, 1000);
    // FDIR has no cadence named in the job table; it shares the 1 s tier.
    let _ = scheduler.register(job_fdir_periodic, 1000);

    (health_slot, 7)
}

/// APID used for event reports from a subsystem.
const fn apid_for(subsystem: SubsystemId) -> Apid {
    match subsystem {
        SubsystemId::Obc => Apid::System,
        SubsystemId::Eps => Apid::Power,
        SubsystemId::Adcs | SubsystemId::Sensors | SubsystemId::Actuators => {
            Apid::Adcs
        }
        SubsystemId::Comms => Apid::Comms,
        SubsystemId::Payload => Apid::Payload,
        SubsystemId::Thermal => Apid::Health,
    }
}

// ── Built-in telecommands ─────────────────────────────────────────────

fn tc_ping(
    _sup: &Supervisor,
    _data: &[u8],
    response: &mut Vec<u8, MAX_TC_RESPONSE>,
) -> Result<()> {
    response
        .extend_from_slice(b"PONG")
        .map_err(|()| FswError::NoMemory)
}

fn tc_connection_test(
    _sup: &Supervisor,
    data: &[u8],
    response: &mut Vec<u8, MAX_TC_RESPONSE>,
) -> Result<()> {
    let take = data.len().min(MAX_TC_RESPONSE);
    response
        .extend_from_slice(&data[..take])
        .map_err(|()| FswError::NoMemory)
}

fn tc_mode_change(
    sup: &Supervisor,
    data: &[u8],
    _response: &mut Vec<u8, MAX_TC_RESPONSE>,
) -> Result<()> {
    let &raw_mode = data.first().ok_or(FswError::InvalidParam)?;
    let target = SystemMode::try_from(raw_mode)?;
    sup.request_mode(target)
}

fn tc_system_reset(
    sup: &Supervisor,
    _data: &[u8],
    _response: &mut Vec<u8, MAX_TC_RESPONSE>,
) -> Result<()> {
    sup.event(
        Severity::Critical,
        SubsystemId::Obc,
        events::RESET_COMMANDED,
        "software reset commanded",
    );
    lock(&sup.boot_record).requested_mode = sup.mode();
    (sup.hooks.reset_software)();
    Ok(())
}

fn tc_hk_enable(
    sup: &Supervisor,
    data: &[u8],
    _response: &mut Vec<u8, MAX_TC_RESPONSE>,
) -> Result<()> {
    let packet_id = hk_packet_id(data)?;
    lock(&sup.telemetry).set_enabled(packet_id, true)
}

fn tc_hk_disable(
    sup: &Supervisor,
    data: &[u8],
    _response: &mut Vec<u8, MAX_TC_RESPONSE>,
) -> Result<()> {
    let packet_id = hk_packet_id(data)?;
    lock(&sup.telemetry).set_enabled(packet_id, false)
}

fn hk_packet_id(data: &[u8]) -> Result<u16> {
    if data.len() < 2 {
        return Err(FswError::InvalidParam);
    }
    Ok(u16::from_be_bytes([data[0], data[1]]))
}

fn tc_time_sync(
    sup: &Supervisor,
    data: &[u8],
    _response: &mut Vec<u8, MAX_TC_RESPONSE>,
) -> Result<()> {
    if data.len() < 6 {
        return Err(FswError::InvalidParam);
    }
    let seconds = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let subseconds_ms = u16::from_be_bytes([data[4], data[5]]);
    if subseconds_ms >= 1000 {
        return Err(FswError::InvalidParam);
    }

    let utc = UtcTime::new(seconds, u32::from(subseconds_ms) * 1000);
    let now = sup.now_ms();
    lock(&sup.time).sync_utc(utc, now);
    sup.event(
        Severity::Info,
        SubsystemId::Obc,
        events::TIME_SYNC,
        "utc synchronized",
    );
    Ok(())
}

fn register_builtin_commands(telecommand: &mut Telecommand) {
    let builtins = [
        TcDefinition {
            service: SERVICE_TEST,
            subtype: SUBTYPE_PING,
            auth_level: AuthLevel::None,
            handler: tc_ping,
            name: "ping",
            timeout_ms: 100,
        },
        TcDefinition {
            service: SERVICE_TEST,
            subtype: SUBTYPE_CONNECTION_TEST,
            auth_level: AuthLevel::None,
            handler: tc_connection_test,
            name: "connection_test",
            timeout_ms: 100,
        },
        TcDefinition {
            service: SERVICE_FUNCTION,
            subtype: SUBTYPE_MODE_CHANGE,
            auth_level: AuthLevel::Elevated,
            handler: tc_mode_change,
            name: "mode_change",
            timeout_ms: 500,
        },
        TcDefinition {
            service: SERVICE_FUNCTION,
            subtype: SUBTYPE_SYSTEM_RESET,
            auth_level: AuthLevel::Critical,
            handler: tc_system_reset,
            name: "system_reset",
            timeout_ms: 1000,
        },
        TcDefinition {
            service: SERVICE_HOUSEKEEPING,
            subtype: SUBTYPE_HK_ENABLE,
            auth_level: AuthLevel::Basic,
            handler: tc_hk_enable,
            name: "hk_enable",
            timeout_ms: 100,
        },
        TcDefinition {
            service: SERVICE_HOUSEKEEPING,
            subtype: SUBTYPE_HK_DISABLE,
            auth_level: AuthLevel::Basic,
            handler: tc_hk_disable,
            name: "hk_disable",
            timeout_ms: 100,
        },
        TcDefinition {
            service: SERVICE_TIME,
            subtype: SUBTYPE_TIME_SYNC,
            auth_level: AuthLevel::Elevated,
            handler: tc_time_sync,
            name: "time_sync",
            timeout_ms: 200,
        },
    ];
    for def in builtins {
        let _ = telecommand.register(def);
    }

    // Commands usable in Safe mode
    let _ = telecommand.safelist_add(SERVICE_TEST, SUBTYPE_PING);
    let _ = telecommand.safelist_add(SERVICE_TEST, SUBTYPE_CONNECTION_TEST);
    let _ = telecommand.safelist_add(SERVICE_HOUSEKEEPING, SUBTYPE_HK_ENABLE);
    let _ = telecommand.safelist_add(SERVICE_HOUSEKEEPING, SUBTYPE_HK_DISABLE);
}

// ── Built-in housekeeping ─────────────────────────────────────────────

fn hk_system(sup: &Supervisor, out: &mut Vec<u8, MAX_DATA_LEN>) -> Result<()> {
    let status = sup.mode_status();
    let record = sup.boot_record();
    let counters = sup.tc_counters();
    let uptime_s = sup.now_ms() / 1000;

    let push = |out: &mut Vec<u8, MAX_DATA_LEN>, bytes: &[u8]| {
        out.extend_from_slice(bytes).map_err(|()| FswError::NoMemory)
    };
    push(out, &[status.current as u8, status.previous as u8])?;
    push(out, &uptime_s.to_be_bytes())?;
    push(out, &record.boot_count.to_be_bytes())?;
    push(out, &[record.last_reset_cause as u8])?;
    push(out, &counters.accepted.to_be_bytes())?;
    push(out, &counters.rejected().to_be_bytes())?;
    push(out, &sup.tm_queue_overflows().to_be_bytes())?;
    Ok(())
}

fn hk_health(sup: &Supervisor, out: &mut Vec<u8, MAX_DATA_LEN>) -> Result<()> {
    let (status, flags, passes) = {
        let health = lock(&sup.health);
        (health.status(), health.last_flags(), health.pass_count())
    };

    out.extend_from_slice(&[status as u8, flags])
        .map_err(|()| FswError::NoMemory)?;
    out.extend_from_slice(&passes.to_be_bytes())
        .map_err(|()| FswError::NoMemory)?;
    out.extend_from_slice(&sup.events_recorded().to_be_bytes())
        .map_err(|()| FswError::NoMemory)?;
    Ok(())
}

fn hk_power(sup: &Supervisor, out: &mut Vec<u8, MAX_DATA_LEN>) -> Result<()> {
    let (battery, budget, low_power, critical) = {
        let eps = lock(&sup.eps);
        (eps.battery(), eps.budget(), eps.low_power(), eps.critical_power())
    };

    let push = |out: &mut Vec<u8, MAX_DATA_LEN>, bytes: &[u8]| {
        out.extend_from_slice(bytes).map_err(|()| FswError::NoMemory)
    };
    push(
        out,
        &[battery.soc_percent, u8::from(low_power), u8::from(critical)],
    )?;
    push(out, &battery.voltage_mv.to_be_bytes())?;
    push(out, &battery.current_ma.to_be_bytes())?;
    push(out, &budget.balance_mw.to_be_bytes())?;
    Ok(())
}

fn register_builtin_housekeeping(telemetry: &mut Telemetry) {
    let _ = telemetry.register(TmDefinition::housekeeping(
        hk_ids::SYSTEM,
        Apid::System,
        TmPriority::Normal,
        8000,
        hk_system,
    ));
    let _ = telemetry.register(TmDefinition::housekeeping(
        hk_ids::HEALTH,
        Apid::Health,
        TmPriority::Normal,
        4000,
        hk_health,
    ));
    let _ = telemetry.register(TmDefinition::housekeeping(
        hk_ids::POWER,
        Apid::Power,
        TmPriority::Normal,
        4000,
        hk_power,
    ));
}

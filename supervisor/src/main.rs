//! Workstation host for the mission supervisor.
//!
//! Runs the flight core against simulated hardware: the workstation
//! monotonic clock, a slowly cycling battery model and nominal sensor
//! values. The supervisor tick is driven at 100 Hz exactly as the flight
//! kernel would, downlinked packets and beacon frames are logged, and a
//! JSON status line is printed once per second.

use std::io::Write as _;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use fsw_supervisor::bootrec::BOOT_RECORD_LEN;
use fsw_supervisor::platform::{
    BatteryReadings, PlatformHooks, PowerReadings,
};
use fsw_supervisor::supervisor::TICK_PERIOD_MS;
use fsw_supervisor::{Supervisor, SupervisorConfig};
use fsw_shared::types::ResetCause;

static WATCHDOG_KICKS: AtomicU64 = AtomicU64::new(0);
static SIM_SECONDS: AtomicU32 = AtomicU32::new(0);

fn host_watchdog_kick() {
    WATCHDOG_KICKS.fetch_add(1, Ordering::Relaxed);
}

fn host_reset_cause() -> ResetCause {
    ResetCause::PowerOn
}

fn host_reset_software() {
    warn!("software reset requested by the core");
}

fn host_reset_subsystem(subsystem: fsw_shared::types::SubsystemId) {
    warn!(?subsystem, "subsystem reset requested");
}

fn host_safe_mode_pin() -> bool {
    false
}

fn host_enable_rail(rail: u8) {
    debug!(rail, "rail enabled");
}

fn host_disable_rail(rail: u8) {
    debug!(rail, "rail disabled");
}

fn host_debug_putchar(byte: u8) {
    let mut out = std::io::stderr().lock();
    let _ = out.write_all(&[byte]);
}

fn host_time_ms() -> u32 {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u32
}

/// Battery model: shallow discharge/charge cycle over ~20 simulated
/// minutes, never leaving the nominal band.
fn host_read_power() -> PowerReadings {
    let t = SIM_SECONDS.load(Ordering::Relaxed);
    let phase = (t % 1200) as i32;
    let soc = if phase < 600 {
        80 - phase / 60 // discharging
    } else {
        70 + (phase - 600) / 60 // charging
    };
    let charging = phase >= 600;
    PowerReadings {
        battery: BatteryReadings {
            voltage_mv: 3700 + (soc * 5) as u16,
            current_ma: if charging { 320 } else { -210 },
            soc_percent: soc as u8,
            temp_c: 12,
            capacity_mah: 2600,
        },
        solar_mw: if charging { 2800 } else { 900 },
        consumption_mw: 1600,
    }
}

fn hooks() -> PlatformHooks {
    PlatformHooks {
        watchdog_kick: host_watchdog_kick,
        reset_get_cause: host_reset_cause,
        reset_software: host_reset_software,
        reset_subsystem: host_reset_subsystem,
        safe_mode_pin_asserted: host_safe_mode_pin,
        power_enable_rail: host_enable_rail,
        power_disable_rail: host_disable_rail,
        debug_putchar: host_debug_putchar,
        time_ms_monotonic: host_time_ms,
        read_power: host_read_power,
        ..PlatformHooks::inert()
    }
}

#[derive(Serialize)]
struct StatusLine {
    uptime_s: u32,
    mode: String,
    health: String,
    soc_percent: u8,
    tm_queue: u8,
    tc_accepted: u32,
    tc_rejected: u32,
    watchdog_kicks: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Stands in for the no-init RAM section on flight hardware
    let mut persistent = [0u8; BOOT_RECORD_LEN];

    let supervisor =
        Supervisor::boot(hooks(), SupervisorConfig::default(), &mut persistent);
    let record = supervisor.boot_record();
    info!(
        boot_count = record.boot_count,
        cause = ?record.last_reset_cause,
        mode = ?supervisor.mode(),
        "supervisor booted"
    );

    let mut next_tick = Instant::now();
    let mut last_status = Instant::now();
    loop {
        next_tick += Duration::from_millis(u64::from(TICK_PERIOD_MS));
        if let Err(e) = supervisor.tick(TICK_PERIOD_MS) {
            warn!(error = %e, "tick rejected");
        }

        while let Some(packet) = supervisor.downlink_next() {
            debug!(len = packet.len(), "downlink packet");
        }
        if let Some(frame) = supervisor.take_beacon() {
            info!(len = frame.len(), seq = u16::from_le_bytes([frame[10], frame[11]]), "beacon");
        }

        if last_status.elapsed() >= Duration::from_secs(1) {
            last_status = Instant::now();
            SIM_SECONDS.fetch_add(1, Ordering::Relaxed);

            let counters = supervisor.tc_counters();
            let status = StatusLine {
                uptime_s: supervisor.now_ms() / 1000,
                mode: format!("{:?}", supervisor.mode()),
                health: format!("{:?}", supervisor.health_state()),
                soc_percent: supervisor.battery().soc_percent,
                tm_queue: supervisor.tm_queue_depth(),
                tc_accepted: counters.accepted,
                tc_rejected: counters.rejected(),
                watchdog_kicks: WATCHDOG_KICKS.load(Ordering::Relaxed),
            };
            match serde_json::to_string(&status) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "status serialization failed"),
            }
        }

        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // Fell behind; realign rather than bursting
            next_tick = now;
        }
    }
}

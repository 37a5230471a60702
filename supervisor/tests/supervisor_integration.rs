//! End-to-end scenarios for the mission supervisor.
//!
//! Each test boots a full supervisor against a deterministic platform
//! whose clock and sensors live in thread-local cells, so the scenarios
//! stay independent under the parallel test harness.

use std::cell::Cell;

use fsw_shared::pus::{
    TcPacket, TcSecondaryHeader, TmPacket, SERVICE_EVENT,
    SERVICE_HOUSEKEEPING, SERVICE_TEST, SERVICE_VERIFICATION,
    SUBTYPE_COMPLETE_OK, SUBTYPE_MODE_CHANGE, SUBTYPE_PING,
    SUBTYPE_TIME_SYNC,
};
use fsw_shared::types::{Rail, ResetCause, SystemMode};
use fsw_supervisor::beacon::BEACON_FRAME_LEN;
use fsw_supervisor::bootrec::{BootRecord, BOOT_RECORD_LEN};
use fsw_supervisor::fdir::FaultType;
use fsw_supervisor::mode::DETUMBLE_TIMEOUT_S;
use fsw_supervisor::platform::{
    BatteryReadings, PlatformHooks, PowerReadings,
};
use fsw_supervisor::{Supervisor, SupervisorConfig};

thread_local! {
    static NOW_MS: Cell<u32> = const { Cell::new(0) };
    static RESET_CAUSE: Cell<ResetCause> = const { Cell::new(ResetCause::PowerOn) };
    static SAFE_PIN: Cell<bool> = const { Cell::new(false) };
    static SOC_PERCENT: Cell<u8> = const { Cell::new(80) };
    static WATCHDOG_KICKS: Cell<u32> = const { Cell::new(0) };
    static SOFTWARE_RESETS: Cell<u32> = const { Cell::new(0) };
}

fn test_time_ms() -> u32 {
    NOW_MS.with(Cell::get)
}

fn test_reset_cause() -> ResetCause {
    RESET_CAUSE.with(Cell::get)
}

fn test_safe_pin() -> bool {
    SAFE_PIN.with(Cell::get)
}

fn test_watchdog_kick() {
    WATCHDOG_KICKS.with(|c| c.set(c.get() + 1));
}

fn test_reset_software() {
    SOFTWARE_RESETS.with(|c| c.set(c.get() + 1));
}

fn test_read_power() -> PowerReadings {
    let soc = SOC_PERCENT.with(Cell::get);
    PowerReadings {
        battery: BatteryReadings {
            voltage_mv: 3800,
            current_ma: -120,
            soc_percent: soc,
            temp_c: 10,
            capacity_mah: 2600,
        },
        solar_mw: 1200,
        consumption_mw: 1500,
    }
}

fn test_hooks() -> PlatformHooks {
    PlatformHooks {
        time_ms_monotonic: test_time_ms,
        reset_get_cause: test_reset_cause,
        safe_mode_pin_asserted: test_safe_pin,
        watchdog_kick: test_watchdog_kick,
        reset_software: test_reset_software,
        read_power: test_read_power,
        ..PlatformHooks::inert()
    }
}

fn boot_with(cause: ResetCause, image: &mut [u8; BOOT_RECORD_LEN]) -> Supervisor {
    RESET_CAUSE.with(|c| c.set(cause));
    Supervisor::boot(test_hooks(), SupervisorConfig::default(), image)
}

/// Advance the simulated clock and the supervisor tick in 10 ms steps.
fn run_ms(supervisor: &Supervisor, duration_ms: u32) {
    let steps = duration_ms / 10;
    for _ in 0..steps {
        NOW_MS.with(|c| c.set(c.get() + 10));
        supervisor.tick(10).expect("tick not re-entered");
    }
}

/// Drain the downlink, decoded.
fn drain_downlink(supervisor: &Supervisor) -> Vec<TmPacket> {
    let mut packets = Vec::new();
    while let Some(wire) = supervisor.downlink_next() {
        packets.push(TmPacket::decode(&wire).expect("well-formed downlink"));
    }
    packets
}

fn make_tc(service: u8, subtype: u8, seq: u16, data: &[u8]) -> Vec<u8> {
    TcPacket::new(
        1,
        seq,
        TcSecondaryHeader {
            service,
            subtype,
            source_id: 1,
            scheduled_time: 0,
            ack_flags: 0x000F,
        },
        data,
    )
    .expect("fits")
    .encode()
    .expect("encodes")
    .to_vec()
}

#[test]
fn cold_boot_enters_detumble() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);

    assert_eq!(supervisor.mode(), SystemMode::Detumble);
    let status = supervisor.mode_status();
    assert_eq!(status.entry_time_s, 0);
    assert_eq!(status.timeout_s, DETUMBLE_TIMEOUT_S);

    let record = supervisor.boot_record();
    assert_eq!(record.boot_count, 1);
    assert_eq!(record.last_reset_cause, ResetCause::PowerOn);

    // The persistent image was updated in place
    let stored = BootRecord::from_bytes(&image).expect("valid image");
    assert_eq!(stored.boot_count, 1);
}

#[test]
fn corrupt_image_is_reinitialized() {
    let mut image = [0x5Au8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);

    // Fresh record: this cold boot is the first one counted
    assert_eq!(supervisor.boot_record().boot_count, 1);
    assert!(BootRecord::from_bytes(&image).is_ok());
}

#[test]
fn three_watchdog_resets_enter_safe() {
    let mut record = BootRecord::fresh();
    record.boot_count = 2;
    record.reset_count_watchdog = 2;
    let mut image = record.to_bytes();

    let supervisor = boot_with(ResetCause::Watchdog, &mut image);

    assert_eq!(supervisor.mode(), SystemMode::Safe);
    assert_eq!(supervisor.boot_record().reset_count_watchdog, 3);

    // One FDIR pass later the reset loop is latched as an active fault
    run_ms(&supervisor, 1000);
    assert!(supervisor.fault_active(FaultType::ResetLoop));
}

#[test]
fn single_watchdog_reset_enters_recovery() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::Watchdog, &mut image);
    assert_eq!(supervisor.mode(), SystemMode::Recovery);
}

#[test]
fn reset_loop_dispatch_forces_safe() {
    // A watchdog reset on a platform with three boots behind it, but too
    // few consecutive watchdog resets for boot selection to refuse
    // Recovery. FDIR's own reset-loop rule must accumulate to its
    // threshold and force Safe from inside the running system.
    let mut record = BootRecord::fresh();
    record.boot_count = 4;
    let mut image = record.to_bytes();

    let supervisor = boot_with(ResetCause::Watchdog, &mut image);
    assert_eq!(supervisor.mode(), SystemMode::Recovery);

    // First FDIR pass latches the fault; the threshold of three is not
    // reached yet.
    run_ms(&supervisor, 1100);
    assert!(supervisor.fault_active(FaultType::ResetLoop));
    assert_eq!(supervisor.mode(), SystemMode::Recovery);

    // Two more passes reach the threshold and dispatch the safe-mode
    // action; the next mode pass executes the forced transition.
    run_ms(&supervisor, 2200);
    assert_eq!(supervisor.mode(), SystemMode::Safe);
}

#[test]
fn safe_pin_overrides_everything() {
    SAFE_PIN.with(|c| c.set(true));
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);
    assert_eq!(supervisor.mode(), SystemMode::Safe);
}

#[test]
fn safe_mode_filters_telecommands() {
    SAFE_PIN.with(|c| c.set(true));
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);
    assert_eq!(supervisor.mode(), SystemMode::Safe);
    drain_downlink(&supervisor);

    // Mode change is not on the safe-list: rejected without execution
    let mode_change = make_tc(
        8,
        SUBTYPE_MODE_CHANGE,
        1,
        &[SystemMode::Nominal as u8],
    );
    supervisor.uplink_frame(&mode_change).expect("queued");
    run_ms(&supervisor, 100);

    let counters = supervisor.tc_counters();
    assert_eq!(counters.rejected_auth, 1);
    assert_eq!(counters.accepted, 0);
    assert_eq!(supervisor.mode(), SystemMode::Safe);

    // Ping with the same header layout must execute and answer PONG
    let ping = make_tc(SERVICE_TEST, SUBTYPE_PING, 2, &[]);
    supervisor.uplink_frame(&ping).expect("queued");
    run_ms(&supervisor, 100);

    let counters = supervisor.tc_counters();
    assert_eq!(counters.accepted, 1);
    assert_eq!(counters.completed, 1);

    let packets = drain_downlink(&supervisor);
    let completion = packets
        .iter()
        .find(|p| {
            p.secondary.service == SERVICE_VERIFICATION
                && p.secondary.subtype == SUBTYPE_COMPLETE_OK
        })
        .expect("completion ack downlinked");
    assert!(completion.data.as_slice().ends_with(b"PONG"));
}

#[test]
fn nominal_mode_change_executes() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);
    assert_eq!(supervisor.mode(), SystemMode::Detumble);

    let mode_change = make_tc(
        8,
        SUBTYPE_MODE_CHANGE,
        1,
        &[SystemMode::Nominal as u8],
    );
    supervisor.uplink_frame(&mode_change).expect("queued");

    // Command pass at 50 ms, mode process pass at 200 ms
    run_ms(&supervisor, 400);
    assert_eq!(supervisor.mode(), SystemMode::Nominal);
    assert_eq!(supervisor.tc_counters().completed, 1);
}

#[test]
fn eps_critical_path_sheds_load() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);

    SOC_PERCENT.with(|c| c.set(9));
    run_ms(&supervisor, 1100);

    assert!(supervisor.critical_power());
    assert!(!supervisor.rail_enabled(Rail::Sensors));
    assert!(!supervisor.rail_enabled(Rail::Actuators));
    assert!(!supervisor.rail_enabled(Rail::Payload));
    assert!(supervisor.rail_enabled(Rail::Core));
    assert!(supervisor.fault_active(FaultType::PowerCritical));
    assert!(!supervisor.can_support_load(1));

    // The fault trail is visible on the downlink as service 5 reports
    let packets = drain_downlink(&supervisor);
    assert!(packets
        .iter()
        .any(|p| p.secondary.service == SERVICE_EVENT));
}

#[test]
fn low_power_entry_requests_mode() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);

    SOC_PERCENT.with(|c| c.set(18));
    // EPS pass at 1 s, mode process shortly after
    run_ms(&supervisor, 1300);

    assert_eq!(supervisor.mode(), SystemMode::LowPower);
    assert!(!supervisor.rail_enabled(Rail::Actuators));
}

#[test]
fn housekeeping_reaches_downlink() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);

    run_ms(&supervisor, 4500);
    let packets = drain_downlink(&supervisor);

    let hk: Vec<_> = packets
        .iter()
        .filter(|p| p.secondary.service == SERVICE_HOUSEKEEPING)
        .collect();
    assert!(!hk.is_empty(), "expected housekeeping reports");
    // Health HK (APID 2) runs on the 4 s period
    assert!(hk.iter().any(|p| p.apid == 2));
}

#[test]
fn beacon_follows_mode_cadence() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);

    // First beacon pass emits immediately
    run_ms(&supervisor, 1000);
    let frame = supervisor.take_beacon().expect("beacon generated");
    assert_eq!(frame.len(), BEACON_FRAME_LEN);
    assert_eq!(frame[16], SystemMode::Detumble as u8);
    fsw_supervisor::beacon::verify_frame(&frame).expect("valid CRC");

    // Detumble cadence is 30 s; nothing for the next pass
    run_ms(&supervisor, 1000);
    assert!(supervisor.take_beacon().is_none());

    // An operator override takes effect on the next pass
    supervisor.set_beacon_period_s(1);
    run_ms(&supervisor, 1000);
    assert!(supervisor.take_beacon().is_some());
}

#[test]
fn time_sync_telecommand_sets_utc() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);
    assert!(supervisor.utc().is_err());

    let seconds: u32 = 777_000_000;
    let mut data = seconds.to_be_bytes().to_vec();
    data.extend_from_slice(&500u16.to_be_bytes());
    let sync = make_tc(9, SUBTYPE_TIME_SYNC, 1, &data);
    supervisor.uplink_frame(&sync).expect("queued");

    run_ms(&supervisor, 100);
    let utc = supervisor.utc().expect("synchronized");
    assert!(utc.seconds >= seconds);
    assert!(utc.seconds < seconds + 5);
}

#[test]
fn watchdog_kicked_every_tick() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);

    let before = WATCHDOG_KICKS.with(Cell::get);
    // Single 10 ms tick fires no 50 ms-class jobs on an empty deadline,
    // but the watchdog is still serviced.
    run_ms(&supervisor, 10);
    let after = WATCHDOG_KICKS.with(Cell::get);
    assert!(after > before);
}

#[test]
fn detumble_times_out_into_safe() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);
    assert_eq!(supervisor.mode(), SystemMode::Detumble);

    // Jump the platform clock past the dwell limit; the next mode pass
    // forces Safe.
    NOW_MS.with(|c| c.set(DETUMBLE_TIMEOUT_S * 1000 + 10_000));
    run_ms(&supervisor, 200);
    assert_eq!(supervisor.mode(), SystemMode::Safe);
}

#[test]
fn uplink_queue_overflows_cleanly() {
    let mut image = [0u8; BOOT_RECORD_LEN];
    let supervisor = boot_with(ResetCause::PowerOn, &mut image);

    let ping = make_tc(SERVICE_TEST, SUBTYPE_PING, 1, &[]);
    for _ in 0..8 {
        supervisor.uplink_frame(&ping).expect("queue has room");
    }
    assert!(supervisor.uplink_frame(&ping).is_err());

    // The backlog drains at two frames per 50 ms pass
    run_ms(&supervisor, 250);
    assert_eq!(supervisor.tc_counters().accepted, 8);
}

//! Beacon generator.
//!
//! Builds the fixed 46-byte packed status frame broadcast independently of
//! the telemetry queue. Cadence follows the operational mode (faster when
//! the spacecraft is in trouble) and may be overridden within a clamped
//! range. An emergency form carries a bitmask of emergency codes and can
//! be produced on demand.
//!
//! Frame fields are little-endian; the trailing CRC-16/CCITT-FALSE covers
//! the 44 bytes before it.

use heapless::Vec;

use crate::eps::BatteryState;
use crate::platform::{AttitudeQ15, BoardTemps, RadioReadings};
use fsw_shared::ccsds::crc16;
use fsw_shared::error::{FswError, Result};
use fsw_shared::types::SystemMode;

/// Size of the nominal beacon frame.
pub const BEACON_FRAME_LEN: usize = 46;

/// Size of the emergency beacon frame.
pub const EMERGENCY_FRAME_LEN: usize = 16;

/// Callsign field width.
pub const CALLSIGN_LEN: usize = 8;

/// Nominal frame type tag.
pub const FRAME_TYPE_STATUS: u8 = 0x01;

/// Emergency frame type tag.
pub const FRAME_TYPE_EMERGENCY: u8 = 0xFF;

/// Frame layout version.
pub const FRAME_VERSION: u8 = 0x01;

/// Slowest allowed cadence, in seconds.
pub const PERIOD_MAX_S: u16 = 300;

/// Fastest allowed cadence, in seconds.
pub const PERIOD_MIN_S: u16 = 1;

/// Everything sampled into one status frame.
#[derive(Debug, Clone, Copy)]
pub struct BeaconInputs {
    /// Current operational mode.
    pub mode: SystemMode,
    /// Uptime in seconds.
    pub uptime_s: u32,
    /// Health condition flags.
    pub health_flags: u8,
    /// Boot count, saturated to one byte.
    pub reset_count: u8,
    /// Active-fault bitmask from FDIR.
    pub fault_flags: u8,
    /// Battery state from the EPS policy.
    pub battery: BatteryState,
    /// Solar generation in milliwatts, saturated to 16 bits.
    pub solar_mw: u16,
    /// Attitude quaternion (w, x, y, z) in Q15.
    pub quat: AttitudeQ15,
    /// Board temperatures: OBC, battery, comms, payload.
    pub temps_c: BoardTemps,
    /// Radio link statistics.
    pub radio: RadioReadings,
}

/// The beacon generator.
#[derive(Debug)]
pub struct Beacon {
    callsign: [u8; CALLSIGN_LEN],
    sequence: u16,
    period_s: u16,
    last_tx_s: u32,
    armed: bool,
}

impl Beacon {
    /// Create a generator. The callsign is space-padded or truncated to
    /// eight bytes.
    pub fn new(callsign: &str) -> Self {
        let mut field = [b' '; CALLSIGN_LEN];
        for (slot, byte) in field.iter_mut().zip(callsign.bytes()) {
            *slot = byte;
        }
        Self {
            callsign: field,
            sequence: 0,
            period_s: period_for_mode(SystemMode::Boot),
            last_tx_s: 0,
            armed: false,
        }
    }

    /// Frames generated since boot.
    pub const fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Current cadence in seconds.
    pub const fn period_s(&self) -> u16 {
        self.period_s
    }

    /// Override the cadence, clamped to the allowed range.
    pub fn set_period_s(&mut self, period_s: u16) {
        self.period_s = period_s.clamp(PERIOD_MIN_S, PERIOD_MAX_S);
    }

    /// Adopt the cadence tied to the given mode.
    pub fn apply_mode(&mut self, mode: SystemMode) {
        self.period_s = period_for_mode(mode);
    }

    /// Whether a frame is due at the given uptime.
    pub fn due(&self, now_s: u32) -> bool {
        !self.armed || now_s.wrapping_sub(self.last_tx_s) >= u32::from(self.period_s)
    }

    /// Build the 46-byte status frame and advance the sequence counter.
    pub fn build_frame(
        &mut self,
        now_s: u32,
        inputs: &BeaconInputs,
    ) -> [u8; BEACON_FRAME_LEN] {
        let mut frame = [0u8; BEACON_FRAME_LEN];
        frame[0..8].copy_from_slice(&self.callsign);
        frame[8] = FRAME_TYPE_STATUS;
        frame[9] = FRAME_VERSION;
        frame[10..12].copy_from_slice(&self.sequence.to_le_bytes());
        frame[12..16].copy_from_slice(&inputs.uptime_s.to_le_bytes());
        frame[16] = inputs.mode as u8;
        frame[17] = inputs.health_flags;
        frame[18] = inputs.reset_count;
        frame[19] = inputs.fault_flags;
        frame[20..22].copy_from_slice(&inputs.battery.voltage_mv.to_le_bytes());
        frame[22..24].copy_from_slice(&inputs.battery.current_ma.to_le_bytes());
        frame[24] = inputs.battery.soc_percent;
        frame[25] = inputs.battery.temp_c as u8;
        frame[26..28].copy_from_slice(&inputs.solar_mw.to_le_bytes());
        for (i, q) in inputs.quat.iter().enumerate() {
            let at = 28 + i * 2;
            frame[at..at + 2].copy_from_slice(&q.to_le_bytes());
        }
        for (i, t) in inputs.temps_c.iter().enumerate() {
            frame[36 + i] = *t as u8;
        }
        frame[40] = inputs.radio.rssi_dbm as u8;
        frame[41] = inputs.radio.rx_24h;
        frame[42] = inputs.radio.tx_24h;
        frame[43] = inputs.radio.link_margin_db;

        let crc = crc16(&frame[..44]);
        frame[44..46].copy_from_slice(&crc.to_le_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        self.last_tx_s = now_s;
        self.armed = true;
        frame
    }

    /// Build the packed emergency frame carrying a code bitmask.
    pub fn build_emergency(
        &mut self,
        codes: u16,
    ) -> Vec<u8, EMERGENCY_FRAME_LEN> {
        let mut frame = Vec::new();
        let mut push = |b: u8| {
            let _ = frame.push(b);
        };
        for b in self.callsign {
            push(b);
        }
        push(FRAME_TYPE_EMERGENCY);
        push(FRAME_VERSION);
        for b in self.sequence.to_le_bytes() {
            push(b);
        }
        for b in codes.to_le_bytes() {
            push(b);
        }
        let crc = crc16(&frame);
        let _ = frame.extend_from_slice(&crc.to_le_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        frame
    }
}

/// Mode-dependent beacon cadence in seconds.
pub const fn period_for_mode(mode: SystemMode) -> u16 {
    match mode {
        SystemMode::Safe => 10,
        SystemMode::Recovery => 5,
        _ => 30,
    }
}

/// Verify a received status frame's CRC (ground-side and test mirror).
pub fn verify_frame(frame: &[u8]) -> Result<()> {
    if frame.len() != BEACON_FRAME_LEN {
        return Err(FswError::InvalidParam);
    }
    let stored = u16::from_le_bytes([frame[44], frame[45]]);
    if crc16(&frame[..44]) != stored {
        return Err(FswError::Crc);
    }
    Ok(())
}

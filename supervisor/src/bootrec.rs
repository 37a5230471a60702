//! Persistent boot record.
//!
//! A 32-byte image kept in no-init RAM so it survives everything short of
//! power loss. It counts resets by cause and carries the mode the previous
//! image requested before a commanded software reset. The image is
//! validated with a magic word and an additive checksum; a corrupt image is
//! re-initialized and the corruption is reported to the caller.
//!
//! Wire layout (little-endian, 32 bytes):
//!
//! ```text
//! magic u32 | boot_count u32 | rc_watchdog u32 | rc_brownout u32 |
//! rc_software u32 | last_cause u8 | pad[3] | requested_mode u8 | pad[3] |
//! checksum u32
//! ```

use fsw_shared::error::{FswError, Result};
use fsw_shared::types::{ResetCause, SystemMode};

/// Size of the persistent image in bytes.
pub const BOOT_RECORD_LEN: usize = 32;

/// Magic word marking a valid image.
pub const BOOT_RECORD_MAGIC: u32 = 0xB007_C0DE;

/// Sentinel XORed into the byte-sum checksum.
const CHECKSUM_SENTINEL: u32 = 0xDEAD_BEEF;

/// Offset of the checksum field within the image.
const CHECKSUM_OFFSET: usize = 28;

/// Decoded persistent boot record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootRecord {
    /// Total boots since the record was last initialized.
    pub boot_count: u32,
    /// Resets caused by watchdog expiry.
    pub reset_count_watchdog: u32,
    /// Resets caused by supply brown-out.
    pub reset_count_brownout: u32,
    /// Commanded software resets.
    pub reset_count_software: u32,
    /// Cause of the most recent reset.
    pub last_reset_cause: ResetCause,
    /// Mode requested by the previous image before a software reset.
    pub requested_mode: SystemMode,
}

impl BootRecord {
    /// A freshly initialized record: all counters zero, cause unknown.
    pub const fn fresh() -> Self {
        Self {
            boot_count: 0,
            reset_count_watchdog: 0,
            reset_count_brownout: 0,
            reset_count_software: 0,
            last_reset_cause: ResetCause::Unknown,
            requested_mode: SystemMode::Boot,
        }
    }

    /// Serialize to the persistent image, computing the checksum.
    pub fn to_bytes(&self) -> [u8; BOOT_RECORD_LEN] {
        let mut bytes = [0u8; BOOT_RECORD_LEN];
        bytes[0..4].copy_from_slice(&BOOT_RECORD_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.boot_count.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.reset_count_watchdog.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.reset_count_brownout.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.reset_count_software.to_le_bytes());
        bytes[20] = self.last_reset_cause as u8;
        bytes[24] = self.requested_mode as u8;
        let checksum = checksum_of(&bytes);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Deserialize and validate a persistent image.
    ///
    /// Fails with `Crc` on a bad magic or checksum and with
    /// `InvalidParam` on an out-of-range enum byte.
    pub fn from_bytes(bytes: &[u8; BOOT_RECORD_LEN]) -> Result<Self> {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != BOOT_RECORD_MAGIC {
            return Err(FswError::Crc);
        }
        let stored = u32::from_le_bytes([
            bytes[28], bytes[29], bytes[30], bytes[31],
        ]);
        if checksum_of(bytes) != stored {
            return Err(FswError::Crc);
        }

        Ok(Self {
            boot_count: u32::from_le_bytes([
                bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
            reset_count_watchdog: u32::from_le_bytes([
                bytes[8], bytes[9], bytes[10], bytes[11],
            ]),
            reset_count_brownout: u32::from_le_bytes([
                bytes[12], bytes[13], bytes[14], bytes[15],
            ]),
            reset_count_software: u32::from_le_bytes([
                bytes[16], bytes[17], bytes[18], bytes[19],
            ]),
            last_reset_cause: ResetCause::try_from(bytes[20])?,
            requested_mode: SystemMode::try_from(bytes[24])?,
        })
    }

    /// Load an image, falling back to a fresh record when invalid.
    ///
    /// Returns the record and whether the stored image validated.
    pub fn load_or_init(bytes: &[u8; BOOT_RECORD_LEN]) -> (Self, bool) {
        match Self::from_bytes(bytes) {
            Ok(record) => (record, true),
            Err(_) => (Self::fresh(), false),
        }
    }

    /// Fold the current reset into the record.
    ///
    /// Latches the cause, bumps the matching per-cause counter and the boot
    /// count. `requested_mode` is only meaningful across a commanded
    /// software reset; any other cause clears it.
    pub fn record_reset(&mut self, cause: ResetCause) {
        self.last_reset_cause = cause;
        match cause {
            ResetCause::Watchdog => {
                self.reset_count_watchdog =
                    self.reset_count_watchdog.saturating_add(1);
            }
            ResetCause::BrownOut => {
                self.reset_count_brownout =
                    self.reset_count_brownout.saturating_add(1);
            }
            ResetCause::Software => {
                self.reset_count_software =
                    self.reset_count_software.saturating_add(1);
            }
            _ => {}
        }
        if cause != ResetCause::Software {
            self.requested_mode = SystemMode::Boot;
        }
        self.boot_count = self.boot_count.saturating_add(1);
    }
}

impl Default for BootRecord {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Byte sum of everything before the checksum field, XOR the sentinel.
fn checksum_of(bytes: &[u8; BOOT_RECORD_LEN]) -> u32 {
    let sum: u32 = bytes[..CHECKSUM_OFFSET]
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)));
    sum ^ CHECKSUM_SENTINEL
}

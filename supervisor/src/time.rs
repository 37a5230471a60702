//! On-board time source.
//!
//! Uptime comes from the platform's monotonic millisecond counter and is
//! wrap-agnostic within a single uptime (2^32 ms is about 49 days; all
//! interval arithmetic uses wrapping subtraction). UTC becomes available
//! after the first ground synchronization and is corrected by a
//! configurable oscillator drift in parts per million.

use fsw_shared::error::{FswError, Result};
use fsw_shared::time::UtcTime;

/// UTC anchor captured at synchronization.
#[derive(Debug, Clone, Copy)]
struct UtcAnchor {
    utc: UtcTime,
    sync_uptime_s: u32,
}

/// Uptime and UTC bookkeeping.
#[derive(Debug, Default)]
pub struct TimeSource {
    anchor: Option<UtcAnchor>,
    drift_ppm: i32,
    sync_count: u32,
}

impl TimeSource {
    /// Create an unsynchronized time source.
    pub const fn new() -> Self {
        Self {
            anchor: None,
            drift_ppm: 0,
            sync_count: 0,
        }
    }

    /// Whether a UTC synchronization has been received.
    pub const fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    /// Number of synchronizations received since boot.
    pub const fn sync_count(&self) -> u32 {
        self.sync_count
    }

    /// Set the oscillator drift correction in parts per million.
    pub fn set_drift_ppm(&mut self, drift_ppm: i32) {
        self.drift_ppm = drift_ppm;
    }

    /// Anchor UTC to the current uptime.
    pub fn sync_utc(&mut self, utc: UtcTime, now_ms: u32) {
        self.anchor = Some(UtcAnchor {
            utc,
            sync_uptime_s: now_ms / 1000,
        });
        self.sync_count = self.sync_count.saturating_add(1);
    }

    /// Current UTC, drift-corrected.
    ///
    /// Fails with `NotReady` before the first synchronization. The fine
    /// field carries the sub-second fraction of the monotonic clock in
    /// microseconds.
    pub fn get_utc(&self, now_ms: u32) -> Result<UtcTime> {
        let anchor = self.anchor.ok_or(FswError::NotReady)?;

        let elapsed_s = (now_ms / 1000).wrapping_sub(anchor.sync_uptime_s);
        let correction_s =
            (i64::from(self.drift_ppm) * i64::from(elapsed_s)) / 1_000_000;
        let seconds = anchor
            .utc
            .seconds
            .wrapping_add(elapsed_s)
            .wrapping_add(correction_s as u32);

        Ok(UtcTime {
            seconds,
            subseconds_us: (now_ms % 1000) * 1000,
        })
    }

    /// The `(coarse, fine)` pair stamped into PUS TM secondary headers:
    /// UTC seconds when synchronized, uptime seconds otherwise, plus the
    /// millisecond fraction.
    pub fn tm_timestamp(&self, now_ms: u32) -> (u32, u16) {
        let coarse = match self.get_utc(now_ms) {
            Ok(utc) => utc.seconds,
            Err(_) => now_ms / 1000,
        };
        (coarse, (now_ms % 1000) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_before_sync() {
        let time = TimeSource::new();
        assert_eq!(time.get_utc(5000), Err(FswError::NotReady));
        assert!(!time.is_synced());
    }

    #[test]
    fn test_utc_advances_with_uptime() {
        let mut time = TimeSource::new();
        time.sync_utc(UtcTime::new(1_000_000, 0), 10_000);

        let utc = time.get_utc(25_500).expect("synced");
        assert_eq!(utc.seconds, 1_000_015);
        assert_eq!(utc.subseconds_us, 500_000);
    }

    #[test]
    fn test_drift_correction_applies() {
        let mut time = TimeSource::new();
        time.sync_utc(UtcTime::new(0, 0), 0);
        // 100 ppm over 1_000_000 elapsed seconds is 100 seconds
        time.set_drift_ppm(100);
        let now_ms = 1_000_000_000;
        let utc = time.get_utc(now_ms).expect("synced");
        assert_eq!(utc.seconds, 1_000_000 + 100);
    }

    #[test]
    fn test_resync_replaces_anchor() {
        let mut time = TimeSource::new();
        time.sync_utc(UtcTime::new(100, 0), 0);
        time.sync_utc(UtcTime::new(500, 0), 20_000);
        assert_eq!(time.sync_count(), 2);

        let utc = time.get_utc(30_000).expect("synced");
        assert_eq!(utc.seconds, 510);
    }

    #[test]
    fn test_tm_timestamp_without_sync_uses_uptime() {
        let time = TimeSource::new();
        assert_eq!(time.tm_timestamp(12_345), (12, 345));
    }

    #[test]
    fn test_tm_timestamp_with_sync_uses_utc() {
        let mut time = TimeSource::new();
        time.sync_utc(UtcTime::new(7_000, 0), 2_000);
        assert_eq!(time.tm_timestamp(3_250), (7_001, 250));
    }
}

//! Error taxonomy for the flight software core.
//!
//! Every fallible operation across the supervisor returns the same compact
//! error enum. Failures are values; nothing in the core panics or unwinds.
//! The taxonomy is deliberately flat so error codes can travel in telemetry
//! and command acknowledgements as a single byte.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard result type for flight software operations.
pub type Result<T> = core::result::Result<T, FswError>;

/// Uniform error codes returned by fallible operations.
///
/// Recoverable classes (queue overflow, `NotReady`, `Timeout`) are counted
/// locally by the reporting component and surfaced to the caller; fatal
/// classes are escalated through FDIR.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize,
)]
#[non_exhaustive]
pub enum FswError {
    /// Generic failure with no more specific class.
    #[error("operation failed")]
    Failed,

    /// Operation exceeded its allowed time.
    #[error("operation timed out")]
    Timeout,

    /// An argument was outside its valid domain.
    #[error("invalid parameter")]
    InvalidParam,

    /// A fixed-capacity table or buffer is exhausted. The core never
    /// allocates; growth requests fail with this code instead.
    #[error("no memory: fixed-capacity store exhausted")]
    NoMemory,

    /// The resource is held by another operation.
    #[error("resource busy")]
    Busy,

    /// The component has not reached the required state yet.
    #[error("not ready")]
    NotReady,

    /// No entry matched the lookup key.
    #[error("not found")]
    NotFound,

    /// The operation is not allowed in the current state.
    #[error("permission denied")]
    Permission,

    /// Checksum or CRC verification failed.
    #[error("CRC mismatch")]
    Crc,

    /// A queue or counter would exceed its upper bound.
    #[error("overflow")]
    Overflow,

    /// A queue or counter would go below its lower bound.
    #[error("underflow")]
    Underflow,

    /// A peripheral bus transaction failed.
    #[error("bus error")]
    Bus,

    /// A hardware component reported a fault.
    #[error("hardware fault")]
    Hardware,
}

impl FswError {
    /// Check if the error indicates a condition worth retrying.
    ///
    /// Recoverable errors are counted locally; everything else is a
    /// candidate for FDIR escalation.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FswError::Timeout
                | FswError::Busy
                | FswError::NotReady
                | FswError::Overflow
        )
    }

    /// Error severity level (0 = info, 1 = warning, 2 = error, 3 = critical).
    pub const fn severity(&self) -> u8 {
        match self {
            FswError::Timeout | FswError::Busy | FswError::NotReady => 1,
            FswError::Failed
            | FswError::InvalidParam
            | FswError::NotFound
            | FswError::Permission
            | FswError::Crc
            | FswError::Overflow
            | FswError::Underflow => 2,
            FswError::NoMemory | FswError::Bus | FswError::Hardware => 3,
        }
    }

    /// Stable single-byte code for telemetry and acknowledgement reports.
    pub const fn code(&self) -> u8 {
        match self {
            FswError::Failed => 1,
            FswError::Timeout => 2,
            FswError::InvalidParam => 3,
            FswError::NoMemory => 4,
            FswError::Busy => 5,
            FswError::NotReady => 6,
            FswError::NotFound => 7,
            FswError::Permission => 8,
            FswError::Crc => 9,
            FswError::Overflow => 10,
            FswError::Underflow => 11,
            FswError::Bus => 12,
            FswError::Hardware => 13,
        }
    }
}

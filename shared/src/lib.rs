//! # CubeSat FSW Shared Library
//!
//! Shared protocol types for the on-board flight software: the uniform error
//! taxonomy, system-wide enums, the CCSDS Space Packet / ECSS-PUS codec, and
//! mission time conversion.
//!
//! ## Features
//! - CCSDS-compliant packet structures (CCSDS 133.0-B-1 primary header)
//! - PUS (ECSS-E-ST-70-41C) secondary headers for TM and TC
//! - CRC-16/CCITT-FALSE packet error control
//! - UTC/calendar conversion against the 2000-01-01 mission epoch
//!
//! Everything here is statically allocated; collections come from `heapless`
//! and every buffer has a compile-time capacity.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(trivial_casts, trivial_numeric_casts)]
#![warn(unused_qualifications)]

pub mod ccsds;
pub mod error;
pub mod pus;
pub mod time;
pub mod types;

// Re-export commonly used types
pub use ccsds::{Apid, PacketType, SpacePacketHeader};
pub use error::{FswError, Result};
pub use pus::{TcPacket, TmPacket};
pub use time::UtcTime;
pub use types::{ResetCause, SystemMode};

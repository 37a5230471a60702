//! # CubeSat Mission Supervisor
//!
//! Deterministic, statically-allocated supervisory control core for a 3U
//! CubeSat. The supervisor boots the platform, sequences it through the
//! operational modes, monitors health, detects and recovers from faults,
//! and exchanges CCSDS/PUS telemetry and telecommand packets with the
//! ground segment.
//!
//! # Architecture
//! - Single cooperative loop: [`supervisor::Supervisor::tick`] advances a
//!   fixed-table scheduler at 10 ms; jobs run to completion and never block.
//! - Every stateful component owns a lock held only for the duration of a
//!   public operation, in a fixed acquisition order (event log, time,
//!   health, mode, FDIR, EPS, telemetry, telecommand, scheduler).
//! - No heap: all queues, tables and buffers have compile-time capacities
//!   and growth requests fail with `NoMemory`.
//! - Hardware is reached only through the [`platform::PlatformHooks`]
//!   capability set installed at boot.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod beacon;
pub mod bootrec;
pub mod eps;
pub mod fdir;
pub mod health;
pub mod logging;
pub mod mode;
pub mod platform;
pub mod scheduler;
pub mod supervisor;
pub mod telecommand;
pub mod telemetry;
pub mod time;

// Re-export the boot surface
pub use platform::PlatformHooks;
pub use supervisor::{Supervisor, SupervisorConfig};

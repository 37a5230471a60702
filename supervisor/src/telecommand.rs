//! Telecommand pipeline.
//!
//! Uplinked frames pass through validate, authorize, dispatch and
//! acknowledge stages. The pipeline owns the handler registry (unique on
//! service/subtype), the Safe-mode safe-list, the ground-key verify hook
//! and the execution history ring; handler execution itself happens at
//! supervisor level with the pipeline lock released, serialized by the
//! supervisor tick.
//!
//! Authentication policy: commands at `Elevated` or above are verified
//! only when a ground key is installed (fail-open with no key). A verified
//! command carries an 8-byte truncated HMAC-SHA256 tag appended to its
//! application data, computed over the primary header, secondary header
//! and payload; the tag is stripped before dispatch.

use heapless::Vec;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::supervisor::Supervisor;
use fsw_shared::error::{FswError, Result};
use fsw_shared::pus::{TcPacket, CRC_LEN, MAX_PACKET_LEN};
use fsw_shared::types::{AuthLevel, SystemMode};

/// Maximum registered handlers.
pub const MAX_TC_HANDLERS: usize = 64;

/// Safe-list capacity.
pub const MAX_SAFE_LIST: usize = 16;

/// Execution history depth.
pub const TC_HISTORY_LEN: usize = 16;

/// Uplink frame queue depth.
pub const RX_QUEUE_DEPTH: usize = 8;

/// Maximum handler response bytes.
pub const MAX_TC_RESPONSE: usize = 64;

/// Length of the truncated HMAC tag carried by authenticated commands.
pub const AUTH_TAG_LEN: usize = 8;

/// Ground key length.
pub const AUTH_KEY_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// A telecommand handler: receives the application data and fills the
/// response buffer included in the completion acknowledgement.
pub type TcHandler =
    fn(&Supervisor, &[u8], &mut Vec<u8, MAX_TC_RESPONSE>) -> Result<()>;

/// One registered telecommand.
#[derive(Clone, Copy)]
pub struct TcDefinition {
    /// PUS service type.
    pub service: u8,
    /// PUS service subtype.
    pub subtype: u8,
    /// Authorization required to execute.
    pub auth_level: AuthLevel,
    /// Handler to run on dispatch.
    pub handler: TcHandler,
    /// Mnemonic for operator-facing reporting.
    pub name: &'static str,
    /// Advisory execution budget; the handler is responsible for
    /// honoring it.
    pub timeout_ms: u32,
}

impl core::fmt::Debug for TcDefinition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TcDefinition")
            .field("service", &self.service)
            .field("subtype", &self.subtype)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Final disposition of one telecommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcStatus {
    /// Executed, handler reported success.
    Completed,
    /// Executed, handler reported failure.
    Failed,
    /// Rejected before execution: bad frame or no registered handler.
    RejectedInvalid,
    /// Rejected before execution: safe-list or authentication.
    RejectedAuth,
}

/// One execution history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcRecord {
    /// Packet sequence count.
    pub sequence: u16,
    /// PUS service type.
    pub service: u8,
    /// PUS service subtype.
    pub subtype: u8,
    /// Uptime milliseconds at disposition.
    pub timestamp_ms: u32,
    /// Final disposition.
    pub status: TcStatus,
}

/// Counter snapshot for housekeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcCounters {
    /// Commands that passed validation and authorization.
    pub accepted: u32,
    /// Frames rejected as invalid.
    pub rejected_invalid: u32,
    /// Commands rejected by safe-list or authentication.
    pub rejected_auth: u32,
    /// Handlers that reported success.
    pub completed: u32,
    /// Handlers that reported failure.
    pub failed: u32,
}

impl TcCounters {
    /// All rejections, of either class.
    pub const fn rejected(&self) -> u32 {
        self.rejected_invalid + self.rejected_auth
    }
}

/// The telecommand pipeline.
#[derive(Debug)]
pub struct Telecommand {
    defs: [Option<TcDefinition>; MAX_TC_HANDLERS],
    safe_list: Vec<(u8, u8), MAX_SAFE_LIST>,
    history: [Option<TcRecord>; TC_HISTORY_LEN],
    history_head: usize,
    history_len: usize,
    counters: TcCounters,
    auth_key: Option<[u8; AUTH_KEY_LEN]>,
    rx: [Option<Vec<u8, MAX_PACKET_LEN>>; RX_QUEUE_DEPTH],
    rx_head: usize,
    rx_len: usize,
}

impl Telecommand {
    /// Create an empty pipeline with no key installed.
    pub fn new() -> Self {
        const NO_DEF: Option<TcDefinition> = None;
        const NO_RECORD: Option<TcRecord> = None;
        const NO_FRAME: Option<Vec<u8, MAX_PACKET_LEN>> = None;
        Self {
            defs: [NO_DEF; MAX_TC_HANDLERS],
            safe_list: Vec::new(),
            history: [NO_RECORD; TC_HISTORY_LEN],
            history_head: 0,
            history_len: 0,
            counters: TcCounters::default(),
            auth_key: None,
            rx: [NO_FRAME; RX_QUEUE_DEPTH],
            rx_head: 0,
            rx_len: 0,
        }
    }

    /// Register a handler, unique on `(service, subtype)`.
    pub fn register(&mut self, def: TcDefinition) -> Result<()> {
        if self
            .defs
            .iter()
            .flatten()
            .any(|d| d.service == def.service && d.subtype == def.subtype)
        {
            return Err(FswError::InvalidParam);
        }
        for slot in self.defs.iter_mut() {
            if slot.is_none() {
                *slot = Some(def);
                return Ok(());
            }
        }
        Err(FswError::NoMemory)
    }

    /// Look up the handler for a service/subtype pair.
    pub fn lookup(&self, service: u8, subtype: u8) -> Option<TcDefinition> {
        self.defs
            .iter()
            .flatten()
            .find(|d| d.service == service && d.subtype == subtype)
            .copied()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.defs.iter().flatten().count()
    }

    /// Add a command to the Safe-mode safe-list.
    pub fn safelist_add(&mut self, service: u8, subtype: u8) -> Result<()> {
        if self.safe_list.contains(&(service, subtype)) {
            return Ok(());
        }
        self.safe_list
            .push((service, subtype))
            .map_err(|_| FswError::NoMemory)
    }

    /// Whether a command may execute in Safe mode.
    pub fn is_safelisted(&self, service: u8, subtype: u8) -> bool {
        self.safe_list.contains(&(service, subtype))
    }

    /// Install (or clear) the ground key used by the verify hook.
    pub fn set_auth_key(&mut self, key: Option<[u8; AUTH_KEY_LEN]>) {
        self.auth_key = key;
    }

    /// Whether a ground key is installed.
    pub const fn has_auth_key(&self) -> bool {
        self.auth_key.is_some()
    }

    /// Queue an uplinked frame for the periodic pass.
    pub fn push_frame(&mut self, raw: &[u8]) -> Result<()> {
        if raw.len() > MAX_PACKET_LEN {
            return Err(FswError::InvalidParam);
        }
        if self.rx_len == RX_QUEUE_DEPTH {
            return Err(FswError::Overflow);
        }
        let mut frame = Vec::new();
        frame.extend_from_slice(raw).map_err(|()| FswError::NoMemory)?;
        let tail = (self.rx_head + self.rx_len) % RX_QUEUE_DEPTH;
        self.rx[tail] = Some(frame);
        self.rx_len += 1;
        Ok(())
    }

    /// Dequeue the oldest pending frame.
    pub fn pop_frame(&mut self) -> Option<Vec<u8, MAX_PACKET_LEN>> {
        if self.rx_len == 0 {
            return None;
        }
        let frame = self.rx[self.rx_head].take();
        self.rx_head = (self.rx_head + 1) % RX_QUEUE_DEPTH;
        self.rx_len -= 1;
        frame
    }

    /// Pending uplink frames.
    pub const fn pending_frames(&self) -> usize {
        self.rx_len
    }

    /// Validate and authorize a decoded command against the current mode.
    ///
    /// On success returns the definition and the application data length
    /// after stripping a verified authentication tag. On rejection the
    /// matching counter is bumped, the disposition is recorded, and the
    /// rejection class is returned.
    pub fn authorize(
        &mut self,
        packet: &TcPacket,
        raw: &[u8],
        mode: SystemMode,
        now_ms: u32,
    ) -> core::result::Result<(TcDefinition, usize), TcStatus> {
        let service = packet.secondary.service;
        let subtype = packet.secondary.subtype;

        let Some(def) = self.lookup(service, subtype) else {
            self.counters.rejected_invalid += 1;
            self.push_history(packet, now_ms, TcStatus::RejectedInvalid);
            return Err(TcStatus::RejectedInvalid);
        };

        if mode == SystemMode::Safe && !self.is_safelisted(service, subtype) {
            self.counters.rejected_auth += 1;
            self.push_history(packet, now_ms, TcStatus::RejectedAuth);
            return Err(TcStatus::RejectedAuth);
        }

        let mut data_len = packet.data.len();
        if def.auth_level >= AuthLevel::Elevated && self.auth_key.is_some() {
            match self.verify_auth(packet, raw) {
                Some(stripped) => data_len = stripped,
                None => {
                    self.counters.rejected_auth += 1;
                    self.push_history(packet, now_ms, TcStatus::RejectedAuth);
                    return Err(TcStatus::RejectedAuth);
                }
            }
        }

        self.counters.accepted += 1;
        Ok((def, data_len))
    }

    /// Record the handler outcome of an accepted command.
    pub fn note_result(&mut self, packet: &TcPacket, now_ms: u32, ok: bool) {
        let status = if ok { TcStatus::Completed } else { TcStatus::Failed };
        if ok {
            self.counters.completed += 1;
        } else {
            self.counters.failed += 1;
        }
        self.push_history(packet, now_ms, status);
    }

    /// Record an invalid frame that could not be decoded at all.
    pub fn note_undecodable(&mut self) {
        self.counters.rejected_invalid += 1;
    }

    /// Counter snapshot.
    pub const fn counters(&self) -> TcCounters {
        self.counters
    }

    /// Copy the history ring, oldest first.
    pub fn history<const N: usize>(&self, out: &mut Vec<TcRecord, N>) {
        for i in 0..self.history_len {
            let index = (self.history_head + i) % TC_HISTORY_LEN;
            if let Some(record) = self.history[index] {
                if out.push(record).is_err() {
                    break;
                }
            }
        }
    }

    /// Verify the truncated HMAC tag of an authenticated command.
    ///
    /// Returns the payload length with the tag stripped, or `None` when
    /// the tag is missing or wrong. Infallible when no key is installed.
    fn verify_auth(&self, packet: &TcPacket, raw: &[u8]) -> Option<usize> {
        let Some(key) = self.auth_key.as_ref() else {
            return Some(packet.data.len());
        };
        if packet.data.len() < AUTH_TAG_LEN
            || raw.len() < CRC_LEN + AUTH_TAG_LEN
        {
            return None;
        }

        let signed_len = raw.len() - CRC_LEN - AUTH_TAG_LEN;
        let tag = &raw[signed_len..signed_len + AUTH_TAG_LEN];

        let mut mac = HmacSha256::new_from_slice(key).ok()?;
        mac.update(&raw[..signed_len]);
        mac.verify_truncated_left(tag).ok()?;

        Some(packet.data.len() - AUTH_TAG_LEN)
    }

    fn push_history(&mut self, packet: &TcPacket, now_ms: u32, status: TcStatus) {
        let record = TcRecord {
            sequence: packet.sequence_count,
            service: packet.secondary.service,
            subtype: packet.secondary.subtype,
            timestamp_ms: now_ms,
            status,
        };
        let tail = (self.history_head + self.history_len) % TC_HISTORY_LEN;
        self.history[tail] = Some(record);
        if self.history_len < TC_HISTORY_LEN {
            self.history_len += 1;
        } else {
            self.history_head = (self.history_head + 1) % TC_HISTORY_LEN;
        }
    }
}

impl Default for Telecommand {
    fn default() -> Self {
        Self::new()
    }
}

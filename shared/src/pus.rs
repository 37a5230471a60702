//! ECSS-PUS packet layer on top of the CCSDS primary header.
//!
//! Both directions carry a 10-byte mission secondary header and a trailing
//! CRC-16/CCITT-FALSE over every preceding byte:
//!
//! ```text
//! TM: primary(6) | coarse u32 | fine u16 | service | subtype | dest | spare | data | crc16
//! TC: primary(6) | service | subtype | source | spare | sched u32 | ack u16 | data | crc16
//! ```
//!
//! Serialization is byte-by-byte big-endian; `packet_length` in the primary
//! header is the octet count after the primary header minus one, so a TM
//! packet with `n` data bytes carries `packet_length = n + 11`.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::ccsds::{
    crc16, PacketType, SpacePacketHeader, PRIMARY_HEADER_LEN,
};
use crate::error::{FswError, Result};

/// Size of the PUS secondary header (both TM and TC) in bytes.
pub const SEC_HEADER_LEN: usize = 10;

/// Size of the packet error control field in bytes.
pub const CRC_LEN: usize = 2;

/// Maximum application data bytes per packet.
pub const MAX_DATA_LEN: usize = 494;

/// Maximum total packet size on the wire.
pub const MAX_PACKET_LEN: usize =
    PRIMARY_HEADER_LEN + SEC_HEADER_LEN + MAX_DATA_LEN + CRC_LEN;

/// Minimum well-formed packet: headers plus CRC, no data.
pub const MIN_PACKET_LEN: usize =
    PRIMARY_HEADER_LEN + SEC_HEADER_LEN + CRC_LEN;

/// PUS service 1: request verification.
pub const SERVICE_VERIFICATION: u8 = 1;
/// Service 1 subtype: acceptance success.
pub const SUBTYPE_ACCEPT_OK: u8 = 1;
/// Service 1 subtype: execution completed.
pub const SUBTYPE_COMPLETE_OK: u8 = 7;
/// Service 1 subtype: execution failed.
pub const SUBTYPE_COMPLETE_FAIL: u8 = 8;

/// PUS service 3: housekeeping.
pub const SERVICE_HOUSEKEEPING: u8 = 3;
/// Service 3 subtype: enable periodic generation.
pub const SUBTYPE_HK_ENABLE: u8 = 5;
/// Service 3 subtype: disable periodic generation.
pub const SUBTYPE_HK_DISABLE: u8 = 6;
/// Service 3 subtype: periodic housekeeping report.
pub const SUBTYPE_HK_REPORT: u8 = 25;

/// PUS service 5: event reporting.
pub const SERVICE_EVENT: u8 = 5;
/// Service 5 subtype: event report.
pub const SUBTYPE_EVENT_REPORT: u8 = 5;

/// PUS service 8: function management.
pub const SERVICE_FUNCTION: u8 = 8;
/// Service 8 subtype: mode change.
pub const SUBTYPE_MODE_CHANGE: u8 = 1;
/// Service 8 subtype: system reset.
pub const SUBTYPE_SYSTEM_RESET: u8 = 4;

/// PUS service 9: time management.
pub const SERVICE_TIME: u8 = 9;
/// Service 9 subtype: time synchronization.
pub const SUBTYPE_TIME_SYNC: u8 = 1;

/// PUS service 17: test.
pub const SERVICE_TEST: u8 = 17;
/// Service 17 subtype: ping.
pub const SUBTYPE_PING: u8 = 1;
/// Service 17 subtype: connection test (echo).
pub const SUBTYPE_CONNECTION_TEST: u8 = 2;

/// PUS telemetry secondary header (10 bytes, big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmSecondaryHeader {
    /// On-board seconds (UTC when synchronized, uptime otherwise).
    pub coarse_time: u32,
    /// Milliseconds within the current second.
    pub fine_time: u16,
    /// PUS service type.
    pub service: u8,
    /// PUS service subtype.
    pub subtype: u8,
    /// Destination application identifier on the ground segment.
    pub destination_id: u8,
}

impl TmSecondaryHeader {
    /// Serialize to the 10-byte wire form. The last byte is spare.
    pub fn to_bytes(&self) -> [u8; SEC_HEADER_LEN] {
        let mut bytes = [0u8; SEC_HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.coarse_time.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.fine_time.to_be_bytes());
        bytes[6] = self.service;
        bytes[7] = self.subtype;
        bytes[8] = self.destination_id;
        bytes
    }

    /// Deserialize from the wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SEC_HEADER_LEN {
            return Err(FswError::Underflow);
        }
        Ok(Self {
            coarse_time: u32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]),
            fine_time: u16::from_be_bytes([bytes[4], bytes[5]]),
            service: bytes[6],
            subtype: bytes[7],
            destination_id: bytes[8],
        })
    }
}

/// PUS telecommand secondary header (10 bytes, big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcSecondaryHeader {
    /// PUS service type.
    pub service: u8,
    /// PUS service subtype.
    pub subtype: u8,
    /// Source application identifier on the ground segment.
    pub source_id: u8,
    /// Release time for time-tagged commands; zero executes immediately.
    pub scheduled_time: u32,
    /// Requested acknowledgement flags.
    pub ack_flags: u16,
}

impl TcSecondaryHeader {
    /// Serialize to the 10-byte wire form. Byte 3 is spare.
    pub fn to_bytes(&self) -> [u8; SEC_HEADER_LEN] {
        let mut bytes = [0u8; SEC_HEADER_LEN];
        bytes[0] = self.service;
        bytes[1] = self.subtype;
        bytes[2] = self.source_id;
        bytes[4..8].copy_from_slice(&self.scheduled_time.to_be_bytes());
        bytes[8..10].copy_from_slice(&self.ack_flags.to_be_bytes());
        bytes
    }

    /// Deserialize from the wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SEC_HEADER_LEN {
            return Err(FswError::Underflow);
        }
        Ok(Self {
            service: bytes[0],
            subtype: bytes[1],
            source_id: bytes[2],
            scheduled_time: u32::from_be_bytes([
                bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
            ack_flags: u16::from_be_bytes([bytes[8], bytes[9]]),
        })
    }
}

/// A decoded or to-be-encoded PUS telemetry packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmPacket {
    /// Application process identifier.
    pub apid: u16,
    /// Per-APID 14-bit sequence count.
    pub sequence_count: u16,
    /// Mission secondary header.
    pub secondary: TmSecondaryHeader,
    /// Application data.
    pub data: Vec<u8, MAX_DATA_LEN>,
}

impl TmPacket {
    /// Build a telemetry packet from parts.
    pub fn new(
        apid: u16,
        sequence_count: u16,
        secondary: TmSecondaryHeader,
        data: &[u8],
    ) -> Result<Self> {
        let mut packet_data = Vec::new();
        packet_data
            .extend_from_slice(data)
            .map_err(|()| FswError::NoMemory)?;
        Ok(Self {
            apid,
            sequence_count,
            secondary,
            data: packet_data,
        })
    }

    /// The primary-header `packet_length` value for this packet.
    pub fn packet_length(&self) -> u16 {
        (self.data.len() + SEC_HEADER_LEN + CRC_LEN - 1) as u16
    }

    /// Serialize to the wire: primary, secondary, data, CRC.
    pub fn encode(&self) -> Result<Vec<u8, MAX_PACKET_LEN>> {
        let header = SpacePacketHeader::new(
            PacketType::Telemetry,
            self.apid,
            self.sequence_count,
            self.packet_length(),
        )?;

        let mut bytes = Vec::new();
        bytes
            .extend_from_slice(&header.to_bytes())
            .map_err(|()| FswError::NoMemory)?;
        bytes
            .extend_from_slice(&self.secondary.to_bytes())
            .map_err(|()| FswError::NoMemory)?;
        bytes
            .extend_from_slice(&self.data)
            .map_err(|()| FswError::NoMemory)?;

        let crc = crc16(&bytes);
        bytes
            .extend_from_slice(&crc.to_be_bytes())
            .map_err(|()| FswError::NoMemory)?;
        Ok(bytes)
    }

    /// Parse a telemetry packet from the wire (ground-side and test mirror
    /// of [`TmPacket::encode`]).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, payload) = decode_common(bytes)?;
        if header.packet_type != PacketType::Telemetry {
            return Err(FswError::InvalidParam);
        }
        let secondary = TmSecondaryHeader::from_bytes(payload)?;
        let mut data = Vec::new();
        data.extend_from_slice(&payload[SEC_HEADER_LEN..])
            .map_err(|()| FswError::NoMemory)?;
        Ok(Self {
            apid: header.apid,
            sequence_count: header.sequence_count,
            secondary,
            data,
        })
    }
}

/// A decoded PUS telecommand packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcPacket {
    /// Application process identifier.
    pub apid: u16,
    /// Per-APID 14-bit sequence count.
    pub sequence_count: u16,
    /// Mission secondary header.
    pub secondary: TcSecondaryHeader,
    /// Application data.
    pub data: Vec<u8, MAX_DATA_LEN>,
}

impl TcPacket {
    /// Build a telecommand packet from parts (ground-side and test use).
    pub fn new(
        apid: u16,
        sequence_count: u16,
        secondary: TcSecondaryHeader,
        data: &[u8],
    ) -> Result<Self> {
        let mut packet_data = Vec::new();
        packet_data
            .extend_from_slice(data)
            .map_err(|()| FswError::NoMemory)?;
        Ok(Self {
            apid,
            sequence_count,
            secondary,
            data: packet_data,
        })
    }

    /// The primary-header `packet_length` value for this packet.
    pub fn packet_length(&self) -> u16 {
        (self.data.len() + SEC_HEADER_LEN + CRC_LEN - 1) as u16
    }

    /// Serialize to the wire: primary, secondary, data, CRC.
    pub fn encode(&self) -> Result<Vec<u8, MAX_PACKET_LEN>> {
        let header = SpacePacketHeader::new(
            PacketType::Command,
            self.apid,
            self.sequence_count,
            self.packet_length(),
        )?;

        let mut bytes = Vec::new();
        bytes
            .extend_from_slice(&header.to_bytes())
            .map_err(|()| FswError::NoMemory)?;
        bytes
            .extend_from_slice(&self.secondary.to_bytes())
            .map_err(|()| FswError::NoMemory)?;
        bytes
            .extend_from_slice(&self.data)
            .map_err(|()| FswError::NoMemory)?;

        let crc = crc16(&bytes);
        bytes
            .extend_from_slice(&crc.to_be_bytes())
            .map_err(|()| FswError::NoMemory)?;
        Ok(bytes)
    }

    /// Parse a telecommand packet from uplinked bytes.
    ///
    /// Rejects packets that are too short, carry a non-zero version, are
    /// not type Command, or whose trailing CRC does not match.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, payload) = decode_common(bytes)?;
        if header.packet_type != PacketType::Command {
            return Err(FswError::InvalidParam);
        }
        let secondary = TcSecondaryHeader::from_bytes(payload)?;
        let mut data = Vec::new();
        data.extend_from_slice(&payload[SEC_HEADER_LEN..])
            .map_err(|()| FswError::NoMemory)?;
        Ok(Self {
            apid: header.apid,
            sequence_count: header.sequence_count,
            secondary,
            data,
        })
    }

    /// The two primary-header words echoed in service 1 verification
    /// reports: `(packet_id, sequence_control)`.
    pub fn verification_words(&self) -> (u16, u16) {
        let packet_id = (1u16 << 12) | (1u16 << 11) | self.apid;
        let sequence_control = (0b11u16 << 14) | self.sequence_count;
        (packet_id, sequence_control)
    }
}

/// Shared length/CRC validation. Returns the primary header and the
/// payload slice (secondary header plus data, CRC stripped).
fn decode_common(bytes: &[u8]) -> Result<(SpacePacketHeader, &[u8])> {
    if bytes.len() < MIN_PACKET_LEN {
        return Err(FswError::Underflow);
    }

    let header = SpacePacketHeader::from_bytes(bytes)?;
    let total = header.total_length();
    if total < MIN_PACKET_LEN || total > bytes.len() {
        return Err(FswError::InvalidParam);
    }
    if total > MAX_PACKET_LEN {
        return Err(FswError::NoMemory);
    }

    let frame = &bytes[..total];
    let stored_crc =
        u16::from_be_bytes([frame[total - 2], frame[total - 1]]);
    if crc16(&frame[..total - CRC_LEN]) != stored_crc {
        return Err(FswError::Crc);
    }

    Ok((header, &frame[PRIMARY_HEADER_LEN..total - CRC_LEN]))
}

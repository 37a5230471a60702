//! CCSDS Space Packet Protocol primitives.
//!
//! Implements the primary header of CCSDS 133.0-B-1 and the
//! CRC-16/CCITT-FALSE packet error control used by the PUS layer. All wire
//! serialization is explicit and big-endian; nothing relies on host byte
//! order or struct layout.

use serde::{Deserialize, Serialize};

use crate::error::{FswError, Result};

/// Size of the primary header in bytes.
pub const PRIMARY_HEADER_LEN: usize = 6;

/// Maximum value of the 11-bit APID field.
pub const APID_MAX: u16 = 0x7FF;

/// Modulus of the 14-bit packet sequence counter.
pub const SEQ_COUNT_MODULUS: u16 = 0x4000;

/// Application Process Identifiers assigned to the mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Apid {
    /// Idle / fill packets.
    Idle = 0,
    /// Supervisor and mode management.
    System = 1,
    /// Health monitor.
    Health = 2,
    /// Electrical power system.
    Power = 3,
    /// Attitude determination and control.
    Adcs = 4,
    /// Communications subsystem.
    Comms = 5,
    /// Mission payload.
    Payload = 6,
    /// Time management.
    Time = 7,
    /// Fault detection, isolation and recovery.
    Fdir = 8,
    /// File and memory transfer.
    File = 9,
}

impl Apid {
    /// Number of assigned APIDs (also the size of per-APID counter tables).
    pub const COUNT: usize = 10;

    /// Raw 11-bit APID value.
    pub const fn value(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for Apid {
    type Error = FswError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Apid::Idle),
            1 => Ok(Apid::System),
            2 => Ok(Apid::Health),
            3 => Ok(Apid::Power),
            4 => Ok(Apid::Adcs),
            5 => Ok(Apid::Comms),
            6 => Ok(Apid::Payload),
            7 => Ok(Apid::Time),
            8 => Ok(Apid::Fdir),
            9 => Ok(Apid::File),
            _ => Err(FswError::InvalidParam),
        }
    }
}

/// CCSDS packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    /// Telemetry packet (spacecraft to ground).
    Telemetry = 0,
    /// Telecommand packet (ground to spacecraft).
    Command = 1,
}

/// CCSDS sequence flags.
///
/// The mission only transmits unsegmented packets; the other variants exist
/// for decode completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceFlags {
    /// Continuation segment (not first, not last).
    Continuation = 0b00,
    /// First segment of multi-packet data.
    FirstSegment = 0b01,
    /// Last segment of multi-packet data.
    LastSegment = 0b10,
    /// Complete data in a single packet.
    Unsegmented = 0b11,
}

/// CCSDS Space Packet primary header (6 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpacePacketHeader {
    /// Packet Version Number (3 bits) - always 000 for CCSDS.
    pub version: u8,

    /// Packet Type (1 bit) - 0 = telemetry, 1 = telecommand.
    pub packet_type: PacketType,

    /// Secondary Header Flag (1 bit). Always set for PUS packets.
    pub secondary_header_flag: bool,

    /// Application Process Identifier (11 bits).
    pub apid: u16,

    /// Sequence Flags (2 bits).
    pub sequence_flags: SequenceFlags,

    /// Packet Sequence Count (14 bits), per-APID.
    pub sequence_count: u16,

    /// Packet Data Length (16 bits): octets after the primary header minus 1.
    pub packet_length: u16,
}

impl SpacePacketHeader {
    /// Create a new primary header.
    pub fn new(
        packet_type: PacketType,
        apid: u16,
        sequence_count: u16,
        packet_length: u16,
    ) -> Result<Self> {
        if apid > APID_MAX {
            return Err(FswError::InvalidParam);
        }
        if sequence_count >= SEQ_COUNT_MODULUS {
            return Err(FswError::InvalidParam);
        }

        Ok(Self {
            version: 0, // Always 0 for CCSDS
            packet_type,
            secondary_header_flag: true,
            apid,
            sequence_flags: SequenceFlags::Unsegmented,
            sequence_count,
            packet_length,
        })
    }

    /// Serialize the header to bytes (big-endian, CCSDS bit layout).
    pub fn to_bytes(&self) -> [u8; PRIMARY_HEADER_LEN] {
        let mut bytes = [0u8; PRIMARY_HEADER_LEN];

        // First 16 bits: Version(3) + Type(1) + SecHdr(1) + APID(11)
        let first_word = (u16::from(self.version) << 13)
            | ((self.packet_type as u16) << 12)
            | (u16::from(self.secondary_header_flag) << 11)
            | self.apid;
        bytes[0] = (first_word >> 8) as u8;
        bytes[1] = first_word as u8;

        // Second 16 bits: SequenceFlags(2) + SequenceCount(14)
        let second_word =
            ((self.sequence_flags as u16) << 14) | self.sequence_count;
        bytes[2] = (second_word >> 8) as u8;
        bytes[3] = second_word as u8;

        // Third 16 bits: Packet Data Length
        bytes[4] = (self.packet_length >> 8) as u8;
        bytes[5] = self.packet_length as u8;

        bytes
    }

    /// Deserialize a header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PRIMARY_HEADER_LEN {
            return Err(FswError::Underflow);
        }

        let first_word = (u16::from(bytes[0]) << 8) | u16::from(bytes[1]);
        let version = ((first_word >> 13) & 0x07) as u8;
        let packet_type = if (first_word >> 12) & 0x01 == 0 {
            PacketType::Telemetry
        } else {
            PacketType::Command
        };
        let secondary_header_flag = ((first_word >> 11) & 0x01) != 0;
        let apid = first_word & APID_MAX;

        let second_word = (u16::from(bytes[2]) << 8) | u16::from(bytes[3]);
        let sequence_flags = match (second_word >> 14) & 0x03 {
            0b00 => SequenceFlags::Continuation,
            0b01 => SequenceFlags::FirstSegment,
            0b10 => SequenceFlags::LastSegment,
            _ => SequenceFlags::Unsegmented,
        };
        let sequence_count = second_word & (SEQ_COUNT_MODULUS - 1);

        let packet_length = (u16::from(bytes[4]) << 8) | u16::from(bytes[5]);

        if version != 0 {
            return Err(FswError::InvalidParam);
        }

        Ok(Self {
            version,
            packet_type,
            secondary_header_flag,
            apid,
            sequence_flags,
            sequence_count,
            packet_length,
        })
    }

    /// Total packet length on the wire, including the primary header.
    pub const fn total_length(&self) -> usize {
        // +1 because packet_length is stored as length - 1
        PRIMARY_HEADER_LEN + self.packet_length as usize + 1
    }
}

const CRC_POLY: u16 = 0x1021;

const fn build_crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u16; 256] = build_crc_table();

/// Continue a CRC-16/CCITT-FALSE computation over `data`.
pub fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        let index = ((crc >> 8) ^ u16::from(byte)) & 0xFF;
        crc = (crc << 8) ^ CRC_TABLE[index as usize];
    }
    crc
}

/// CRC-16/CCITT-FALSE: initial 0xFFFF, polynomial 0x1021, MSB-first,
/// no reflection, no final XOR.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0xFFFF, data)
}

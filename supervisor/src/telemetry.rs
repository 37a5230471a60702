//! Telemetry pipeline.
//!
//! Owns the housekeeping definition table, the per-APID sequence counters
//! and the downlink priority queue. Housekeeping generators are plain
//! function pointers over the supervisor; the periodic job collects the
//! due definitions, runs the generators with the pipeline lock released,
//! and queues the resulting service 3 reports at their configured
//! priority.
//!
//! The queue is a fixed array with explicit valid flags. Insertion at
//! `High` or above may evict one strictly lower-priority entry when the
//! queue is full; dequeue returns the highest-priority entry, ties
//! resolved by the first valid slot in scan order.

use heapless::Vec;

use crate::supervisor::Supervisor;
use fsw_shared::ccsds::Apid;
use fsw_shared::error::{FswError, Result};
use fsw_shared::pus::{
    TmPacket, TmSecondaryHeader, MAX_DATA_LEN, MAX_PACKET_LEN,
    SERVICE_EVENT, SERVICE_HOUSEKEEPING, SUBTYPE_EVENT_REPORT,
    SUBTYPE_HK_REPORT,
};
use fsw_shared::types::TmPriority;

/// Maximum registered housekeeping definitions.
pub const MAX_TM_DEFINITIONS: usize = 32;

/// Downlink queue depth.
pub const TM_QUEUE_DEPTH: usize = 16;

/// A housekeeping generator: fills `out` with the report payload.
pub type HkGenerator =
    fn(&Supervisor, &mut Vec<u8, MAX_DATA_LEN>) -> Result<()>;

/// One registered housekeeping packet.
#[derive(Clone, Copy)]
pub struct TmDefinition {
    /// Mission-unique packet identifier (used by enable/disable commands).
    pub packet_id: u16,
    /// APID the report is emitted under.
    pub apid: Apid,
    /// PUS service of the report.
    pub service: u8,
    /// PUS subtype of the report.
    pub subtype: u8,
    /// Queue priority of the report.
    pub priority: TmPriority,
    /// Generation period in milliseconds.
    pub period_ms: u32,
    /// Uptime of the most recent generation.
    pub last_sent_ms: u32,
    /// Whether periodic generation is enabled.
    pub enabled: bool,
    /// Payload generator.
    pub generator: HkGenerator,
}

impl TmDefinition {
    /// A periodic service 3/25 housekeeping definition.
    pub fn housekeeping(
        packet_id: u16,
        apid: Apid,
        priority: TmPriority,
        period_ms: u32,
        generator: HkGenerator,
    ) -> Self {
        Self {
            packet_id,
            apid,
            service: SERVICE_HOUSEKEEPING,
            subtype: SUBTYPE_HK_REPORT,
            priority,
            period_ms,
            last_sent_ms: 0,
            enabled: true,
            generator,
        }
    }
}

impl core::fmt::Debug for TmDefinition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TmDefinition")
            .field("packet_id", &self.packet_id)
            .field("apid", &self.apid)
            .field("period_ms", &self.period_ms)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// A due housekeeping job handed back to the supervisor for generation.
#[derive(Clone, Copy)]
pub struct DueHk {
    /// Packet identifier.
    pub packet_id: u16,
    /// APID to emit under.
    pub apid: Apid,
    /// PUS service.
    pub service: u8,
    /// PUS subtype.
    pub subtype: u8,
    /// Queue priority.
    pub priority: TmPriority,
    /// Payload generator to run.
    pub generator: HkGenerator,
}

impl core::fmt::Debug for DueHk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DueHk")
            .field("packet_id", &self.packet_id)
            .field("apid", &self.apid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct QueueEntry {
    packet: Vec<u8, MAX_PACKET_LEN>,
    priority: TmPriority,
    valid: bool,
}

impl QueueEntry {
    const EMPTY: QueueEntry = QueueEntry {
        packet: Vec::new(),
        priority: TmPriority::Low,
        valid: false,
    };
}

/// The telemetry pipeline.
#[derive(Debug)]
pub struct Telemetry {
    defs: [Option<TmDefinition>; MAX_TM_DEFINITIONS],
    queue: [QueueEntry; TM_QUEUE_DEPTH],
    queue_count: u8,
    queue_overflows: u32,
    seq: [u16; Apid::COUNT],
    built_total: u32,
}

impl Telemetry {
    /// Create an empty pipeline.
    pub const fn new() -> Self {
        const NO_DEF: Option<TmDefinition> = None;
        Self {
            defs: [NO_DEF; MAX_TM_DEFINITIONS],
            queue: [QueueEntry::EMPTY; TM_QUEUE_DEPTH],
            queue_count: 0,
            queue_overflows: 0,
            seq: [0; Apid::COUNT],
            built_total: 0,
        }
    }

    /// Register a housekeeping definition.
    ///
    /// Fails with `InvalidParam` on a duplicate packet id or zero period
    /// and `NoMemory` when the table is full.
    pub fn register(&mut self, def: TmDefinition) -> Result<()> {
        if def.period_ms == 0 {
            return Err(FswError::InvalidParam);
        }
        if self
            .defs
            .iter()
            .flatten()
            .any(|d| d.packet_id == def.packet_id)
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

    /// Enable or disable periodic generation of one packet.
    pub fn set_enabled(&mut self, packet_id: u16, enabled: bool) -> Result<()> {
        let def = self
            .defs
            .iter_mut()
            .flatten()
            .find(|d| d.packet_id == packet_id)
            .ok_or(FswError::NotFound)?;
        def.enabled = enabled;
        Ok(())
    }

    /// Whether periodic generation of one packet is enabled.
    pub fn is_enabled(&self, packet_id: u16) -> Result<bool> {
        self.defs
            .iter()
            .flatten()
            .find(|d| d.packet_id == packet_id)
            .map(|d| d.enabled)
            .ok_or(FswError::NotFound)
    }

    /// Number of registered definitions.
    pub fn definition_count(&self) -> usize {
        self.defs.iter().flatten().count()
    }

    /// Next sequence count for an APID, advancing the counter modulo 2^14.
    pub fn next_seq(&mut self, apid: Apid) -> u16 {
        let current = self.seq[apid as usize];
        self.seq[apid as usize] = (current + 1) % 0x4000;
        current
    }

    /// Current sequence counter of an APID without advancing it.
    pub const fn peek_seq(&self, apid: Apid) -> u16 {
        self.seq[apid as usize]
    }

    /// Packets built since boot.
    pub const fn built_total(&self) -> u32 {
        self.built_total
    }

    /// Build a TM packet under the pipeline's sequence counters.
    pub fn build_tm(
        &mut self,
        apid: Apid,
        service: u8,
        subtype: u8,
        timestamp: (u32, u16),
        data: &[u8],
    ) -> Result<Vec<u8, MAX_PACKET_LEN>> {
        let secondary = TmSecondaryHeader {
            coarse_time: timestamp.0,
            fine_time: timestamp.1,
            service,
            subtype,
            destination_id: 0,
        };
        let packet =
            TmPacket::new(apid.value(), self.next_seq(apid), secondary, data)?;
        let wire = packet.encode()?;
        self.built_total = self.built_total.saturating_add(1);
        Ok(wire)
    }

    /// Queue a packet for downlink.
    ///
    /// When the queue is full, a packet at `High` or above evicts the
    /// first lowest-priority entry strictly below it; anything else is
    /// counted and rejected with `Overflow`.
    pub fn queue_packet(
        &mut self,
        packet: &[u8],
        priority: TmPriority,
    ) -> Result<()> {
        if packet.len() > MAX_PACKET_LEN {
            return Err(FswError::InvalidParam);
        }

        if let Some(slot) = self.queue.iter_mut().find(|e| !e.valid) {
            slot.packet.clear();
            slot.packet
                .extend_from_slice(packet)
                .map_err(|()| FswError::NoMemory)?;
            slot.priority = priority;
            slot.valid = true;
            self.queue_count += 1;
            return Ok(());
        }

        if priority >= TmPriority::High {
            // Evict the lowest entry strictly below the incoming priority
            let victim = self
                .queue
                .iter_mut()
                .filter(|e| e.priority < priority)
                .min_by_key(|e| e.priority);
            if let Some(slot) = victim {
                slot.packet.clear();
                slot.packet
                    .extend_from_slice(packet)
                    .map_err(|()| FswError::NoMemory)?;
                slot.priority = priority;
                return Ok(());
            }
        }

        self.queue_overflows = self.queue_overflows.saturating_add(1);
        Err(FswError::Overflow)
    }

    /// Dequeue the highest-priority packet; ties resolve to the first
    /// valid slot in scan order.
    pub fn dequeue_packet(
        &mut self,
    ) -> Option<(Vec<u8, MAX_PACKET_LEN>, TmPriority)> {
        let mut best: Option<usize> = None;
        for (i, entry) in self.queue.iter().enumerate() {
            if !entry.valid {
                continue;
            }
            match best {
                Some(b) if self.queue[b].priority >= entry.priority => {}
                _ => best = Some(i),
            }
        }
        let index = best?;
        let entry = &mut self.queue[index];
        entry.valid = false;
        self.queue_count -= 1;
        Some((entry.packet.clone(), entry.priority))
    }

    /// Valid entries currently queued.
    pub const fn queue_count(&self) -> u8 {
        self.queue_count
    }

    /// Packets rejected because the queue was full.
    pub const fn queue_overflows(&self) -> u32 {
        self.queue_overflows
    }

    /// Collect the enabled definitions whose period has elapsed, stamping
    /// them as generated at `now_ms`.
    pub fn due_hk(
        &mut self,
        now_ms: u32,
    ) -> Vec<DueHk, MAX_TM_DEFINITIONS> {
        let mut due = Vec::new();
        for def in self.defs.iter_mut().flatten() {
            if def.enabled
                && now_ms.wrapping_sub(def.last_sent_ms) >= def.period_ms
            {
                def.last_sent_ms = now_ms;
                let _ = due.push(DueHk {
                    packet_id: def.packet_id,
                    apid: def.apid,
                    service: def.service,
                    subtype: def.subtype,
                    priority: def.priority,
                    generator: def.generator,
                });
            }
        }
        due
    }

    /// Build and queue a service 5 event report at `High` priority. The
    /// payload is `event_id` big-endian, the coarse timestamp big-endian,
    /// then the caller data.
    pub fn send_event(
        &mut self,
        apid: Apid,
        event_id: u16,
        timestamp: (u32, u16),
        data: &[u8],
    ) -> Result<()> {
        let mut payload = Vec::<u8, MAX_DATA_LEN>::new();
        payload
            .extend_from_slice(&event_id.to_be_bytes())
            .map_err(|()| FswError::NoMemory)?;
        payload
            .extend_from_slice(&timestamp.0.to_be_bytes())
            .map_err(|()| FswError::NoMemory)?;
        payload
            .extend_from_slice(data)
            .map_err(|()| FswError::NoMemory)?;

        let wire = self.build_tm(
            apid,
            SERVICE_EVENT,
            SUBTYPE_EVENT_REPORT,
            timestamp,
            &payload,
        )?;
        self.queue_packet(&wire, TmPriority::High)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsw_shared::pus::TmPacket;

    fn gen_stub(
        _sup: &Supervisor,
        out: &mut Vec<u8, MAX_DATA_LEN>,
    ) -> Result<()> {
        out.extend_from_slice(&[0xAA]).map_err(|()| FswError::NoMemory)
    }

    fn hk_def(packet_id: u16) -> TmDefinition {
        TmDefinition::housekeeping(
            packet_id,
            Apid::Health,
            TmPriority::Normal,
            1000,
            gen_stub,
        )
    }

    #[test]
    fn test_register_rejects_duplicates_and_overflow() {
        let mut tm = Telemetry::new();
        tm.register(hk_def(1)).expect("first registration");
        assert_eq!(tm.register(hk_def(1)), Err(FswError::InvalidParam));

        for id in 2..=MAX_TM_DEFINITIONS as u16 {
            tm.register(hk_def(id)).expect("table not yet full");
        }
        assert_eq!(tm.register(hk_def(99)), Err(FswError::NoMemory));
    }

    #[test]
    fn test_enable_disable_idempotent() {
        let mut tm = Telemetry::new();
        tm.register(hk_def(7)).expect("registers");

        tm.set_enabled(7, false).expect("known id");
        tm.set_enabled(7, true).expect("known id");
        assert_eq!(tm.is_enabled(7), Ok(true));

        // disable;enable leaves enabled regardless of starting state
        tm.set_enabled(7, false).expect("known id");
        tm.set_enabled(7, false).expect("known id");
        tm.set_enabled(7, true).expect("known id");
        assert_eq!(tm.is_enabled(7), Ok(true));

        assert_eq!(tm.set_enabled(8, true), Err(FswError::NotFound));
    }

    #[test]
    fn test_sequence_counters_per_apid() {
        let mut tm = Telemetry::new();
        assert_eq!(tm.next_seq(Apid::Health), 0);
        assert_eq!(tm.next_seq(Apid::Health), 1);
        assert_eq!(tm.next_seq(Apid::Power), 0);
        assert_eq!(tm.peek_seq(Apid::Health), 2);
    }

    #[test]
    fn test_sequence_counter_wraps_modulo_16384() {
        let mut tm = Telemetry::new();
        for _ in 0..0x3FFF {
            tm.next_seq(Apid::System);
        }
        assert_eq!(tm.next_seq(Apid::System), 0x3FFF);
        assert_eq!(tm.next_seq(Apid::System), 0);
    }

    #[test]
    fn test_built_packets_carry_consecutive_sequence() {
        let mut tm = Telemetry::new();
        let a = tm
            .build_tm(Apid::Health, 3, 25, (10, 0), &[1])
            .expect("builds");
        let b = tm
            .build_tm(Apid::Health, 3, 25, (11, 0), &[2])
            .expect("builds");

        let pa = TmPacket::decode(&a).expect("decodes");
        let pb = TmPacket::decode(&b).expect("decodes");
        assert_eq!(pb.sequence_count, (pa.sequence_count + 1) % 0x4000);
    }

    #[test]
    fn test_queue_fifo_when_space() {
        let mut tm = Telemetry::new();
        tm.queue_packet(&[1], TmPriority::Low).expect("queue has room");
        tm.queue_packet(&[2], TmPriority::Low).expect("queue has room");
        assert_eq!(tm.queue_count(), 2);

        let (first, _) = tm.dequeue_packet().expect("entries queued");
        assert_eq!(first.as_slice(), &[1]);
    }

    #[test]
    fn test_dequeue_returns_highest_priority() {
        let mut tm = Telemetry::new();
        tm.queue_packet(&[1], TmPriority::Low).expect("room");
        tm.queue_packet(&[2], TmPriority::Critical).expect("room");
        tm.queue_packet(&[3], TmPriority::Normal).expect("room");

        let (packet, priority) = tm.dequeue_packet().expect("queued");
        assert_eq!(priority, TmPriority::Critical);
        assert_eq!(packet.as_slice(), &[2]);

        let (packet, _) = tm.dequeue_packet().expect("queued");
        assert_eq!(packet.as_slice(), &[3]);
    }

    #[test]
    fn test_tie_break_is_first_scan_slot() {
        let mut tm = Telemetry::new();
        tm.queue_packet(&[1], TmPriority::Normal).expect("room");
        tm.queue_packet(&[2], TmPriority::Normal).expect("room");

        let (packet, _) = tm.dequeue_packet().expect("queued");
        assert_eq!(packet.as_slice(), &[1]);
    }

    #[test]
    fn test_critical_evicts_exactly_one_normal() {
        let mut tm = Telemetry::new();
        for i in 0..TM_QUEUE_DEPTH as u8 {
            tm.queue_packet(&[i], TmPriority::Normal).expect("filling");
        }
        assert_eq!(tm.queue_count(), TM_QUEUE_DEPTH as u8);

        tm.queue_packet(&[0xCC], TmPriority::Critical)
            .expect("evicts a Normal entry");
        assert_eq!(tm.queue_count(), TM_QUEUE_DEPTH as u8);
        assert_eq!(tm.queue_overflows(), 0);

        let (packet, priority) = tm.dequeue_packet().expect("queued");
        assert_eq!(priority, TmPriority::Critical);
        assert_eq!(packet.as_slice(), &[0xCC]);

        // The remaining entries are all Normal
        let mut remaining = 0;
        while let Some((_, priority)) = tm.dequeue_packet() {
            assert_eq!(priority, TmPriority::Normal);
            remaining += 1;
        }
        assert_eq!(remaining, TM_QUEUE_DEPTH - 1);
    }

    #[test]
    fn test_low_priority_overflow_rejected() {
        let mut tm = Telemetry::new();
        for i in 0..TM_QUEUE_DEPTH as u8 {
            tm.queue_packet(&[i], TmPriority::Normal).expect("filling");
        }

        assert_eq!(
            tm.queue_packet(&[0xEE], TmPriority::Normal),
            Err(FswError::Overflow)
        );
        assert_eq!(tm.queue_overflows(), 1);
    }

    #[test]
    fn test_high_cannot_evict_equal_priority() {
        let mut tm = Telemetry::new();
        for i in 0..TM_QUEUE_DEPTH as u8 {
            tm.queue_packet(&[i], TmPriority::High).expect("filling");
        }
        assert_eq!(
            tm.queue_packet(&[0xEE], TmPriority::High),
            Err(FswError::Overflow)
        );
    }

    #[test]
    fn test_due_hk_respects_period_and_enabled() {
        let mut tm = Telemetry::new();
        tm.register(hk_def(1)).expect("registers");
        tm.register(hk_def(2)).expect("registers");
        tm.set_enabled(2, false).expect("known id");

        assert_eq!(tm.due_hk(500).len(), 0);

        let due = tm.due_hk(1000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].packet_id, 1);

        // Stamped at 1000; not due again until 2000
        assert_eq!(tm.due_hk(1500).len(), 0);
        assert_eq!(tm.due_hk(2000).len(), 1);
    }

    #[test]
    fn test_send_event_payload_layout() {
        let mut tm = Telemetry::new();
        tm.send_event(Apid::Fdir, 0x0102, (0x0A0B0C0D, 0), &[0x55])
            .expect("queues");

        let (wire, priority) = tm.dequeue_packet().expect("queued");
        assert_eq!(priority, TmPriority::High);

        let packet = TmPacket::decode(&wire).expect("decodes");
        assert_eq!(packet.secondary.service, SERVICE_EVENT);
        assert_eq!(packet.secondary.subtype, SUBTYPE_EVENT_REPORT);
        assert_eq!(
            packet.data.as_slice(),
            &[0x01, 0x02, 0x0A, 0x0B, 0x0C, 0x0D, 0x55]
        );
    }
}

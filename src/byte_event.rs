use std::collections::VecDeque;

/// Kind of byte-offset milestone a transaction (or the session itself) wants to be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteEventKind {
    FirstHeaderByte,
    LastByteFlushed,
    PingReply,
}

impl ByteEventKind {
    /// First-header-byte and last-byte-flushed events hold a transaction open (§4.4); a ping
    /// reply is connection-scoped and never pins a transaction.
    fn pins_transaction(self) -> bool {
        match self {
            ByteEventKind::FirstHeaderByte | ByteEventKind::LastByteFlushed => true,
            ByteEventKind::PingReply => false,
        }
    }
}

#[derive(Debug, Clone)]
struct ByteEvent {
    offset: u64,
    kind: ByteEventKind,
    txn: Option<u32>,
}

/// Ordered queue of pending byte-offset milestones, drained as the transport confirms delivery.
///
/// Grounded on the teacher's `BTreeMap<u64, SentPacket>` + in-order `on_packet_acked` draining in
/// `Connection::on_ack_received`, here applied to egress byte offsets instead of packet numbers:
/// offsets are monotonic in insertion order, so a `VecDeque` drained from the front suffices.
#[derive(Debug, Default)]
pub struct ByteEventTracker {
    pending: VecDeque<ByteEvent>,
    next_offset: u64,
}

/// A fired byte event, returned to the caller so it can invoke the right transaction callback.
#[derive(Debug, Clone, Copy)]
pub struct FiredByteEvent {
    pub kind: ByteEventKind,
    pub txn: Option<u32>,
}

impl ByteEventTracker {
    pub fn new() -> Self {
        ByteEventTracker {
            pending: VecDeque::new(),
            next_offset: 0,
        }
    }

    /// Registers `len` bytes of egress as having been queued, optionally tagging the offset at
    /// the *end* of that span with an event. Returns the offset assigned (useful for tests).
    pub fn enqueue(&mut self, len: u64, kind: Option<ByteEventKind>, txn: Option<u32>) -> u64 {
        self.next_offset += len;
        let offset = self.next_offset;
        if let Some(kind) = kind {
            self.pending.push_back(ByteEvent { offset, kind, txn });
        }
        offset
    }

    /// Reports that the transport has confirmed delivery of bytes through `cumulative_ack`.
    /// Fires every entry whose offset is `<= cumulative_ack`, in order, removing them.
    pub fn on_bytes_acked(&mut self, cumulative_ack: u64) -> Vec<FiredByteEvent> {
        let mut fired = Vec::new();
        while let Some(front) = self.pending.front() {
            if front.offset > cumulative_ack {
                break;
            }
            let event = self.pending.pop_front().unwrap();
            fired.push(FiredByteEvent {
                kind: event.kind,
                txn: event.txn,
            });
        }
        fired
    }

    pub fn pending_count_for(&self, txn: u32) -> usize {
        self.pending
            .iter()
            .filter(|e| e.kind.pins_transaction() && e.txn == Some(txn))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_offset_order() {
        let mut t = ByteEventTracker::new();
        let off1 = t.enqueue(10, Some(ByteEventKind::FirstHeaderByte), Some(1));
        let off2 = t.enqueue(20, Some(ByteEventKind::LastByteFlushed), Some(1));
        assert!(off1 < off2);
        assert_eq!(t.on_bytes_acked(5).len(), 0);
        let fired = t.on_bytes_acked(off1);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, ByteEventKind::FirstHeaderByte);
        let fired = t.on_bytes_acked(off2);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, ByteEventKind::LastByteFlushed);
    }

    #[test]
    fn pending_count_gates_detach() {
        let mut t = ByteEventTracker::new();
        t.enqueue(1, Some(ByteEventKind::FirstHeaderByte), Some(7));
        assert_eq!(t.pending_count_for(7), 1);
        t.on_bytes_acked(1);
        assert_eq!(t.pending_count_for(7), 0);
    }

    #[test]
    fn ping_reply_does_not_pin_transaction() {
        let t = ByteEventTracker::new();
        assert_eq!(ByteEventKind::PingReply.pins_transaction(), false);
        let _ = t; // silence unused warning in case of future refactors
    }
}

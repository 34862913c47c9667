/// Three-phase drain dance (§4.5), modeled on the teacher's one-way `State` transitions
/// (`Handshake -> Established -> Draining -> Drained`): phase only ever advances, and
/// `lastReceivedGoodStreamId` only ever narrows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPhase {
    Open,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct DrainState {
    phase: Option<DrainPhase>,
    last_received_good_stream_id: Option<u32>,
    last_sent_good_stream_id: Option<u32>,
}

impl DrainState {
    pub fn new() -> Self {
        DrainState {
            phase: Some(DrainPhase::Open),
            last_received_good_stream_id: None,
            last_sent_good_stream_id: None,
        }
    }

    pub fn phase(&self) -> DrainPhase {
        self.phase.unwrap_or(DrainPhase::Open)
    }

    pub fn last_received_good_stream_id(&self) -> Option<u32> {
        self.last_received_good_stream_id
    }

    pub fn last_sent_good_stream_id(&self) -> Option<u32> {
        self.last_sent_good_stream_id
    }

    /// Locally initiated drain: records the id we're telling the peer is safe, moves Open ->
    /// Draining. A no-op if already draining or closed.
    pub fn begin_local_drain(&mut self, last_sent_good_stream_id: u32) {
        if self.phase() == DrainPhase::Open {
            self.phase = Some(DrainPhase::Draining);
        }
        self.last_sent_good_stream_id = Some(last_sent_good_stream_id);
    }

    /// Peer-initiated GOAWAY. Returns the set of locally-minted stream ids that must now be
    /// synthesized-failed: those strictly greater than `last_good`. May be called multiple
    /// times; a second GOAWAY with a smaller `last_good` is accepted and further narrows the
    /// survivor set (§4.5, §8 property 4) -- `last_good` only ever ratchets downward.
    pub fn on_peer_goaway(&mut self, last_good: u32) {
        self.last_received_good_stream_id = Some(match self.last_received_good_stream_id {
            Some(existing) => existing.min(last_good),
            None => last_good,
        });
        if self.phase() == DrainPhase::Open {
            self.phase = Some(DrainPhase::Draining);
        }
    }

    /// True if a locally-minted id is no longer acknowledged by the peer's GOAWAY(s).
    pub fn is_unacknowledged(&self, locally_minted_stream_id: u32) -> bool {
        match self.last_received_good_stream_id {
            Some(last_good) => locally_minted_stream_id > last_good,
            None => false,
        }
    }

    /// Called once no transactions remain and the drain is complete.
    pub fn close(&mut self) {
        self.phase = Some(DrainPhase::Closed);
    }

    pub fn is_draining(&self) -> bool {
        self.phase() == DrainPhase::Draining
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == DrainPhase::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_goaway_never_regresses_upward() {
        let mut d = DrainState::new();
        d.on_peer_goaway(101);
        assert_eq!(d.last_received_good_stream_id(), Some(101));
        assert!(!d.is_unacknowledged(3));
        d.on_peer_goaway(1);
        assert_eq!(d.last_received_good_stream_id(), Some(1));
        assert!(d.is_unacknowledged(3));
        // a later, larger GOAWAY must not move the watermark back up
        d.on_peer_goaway(50);
        assert_eq!(d.last_received_good_stream_id(), Some(1));
    }

    #[test]
    fn phase_only_advances() {
        let mut d = DrainState::new();
        assert_eq!(d.phase(), DrainPhase::Open);
        d.begin_local_drain(5);
        assert_eq!(d.phase(), DrainPhase::Draining);
        d.close();
        assert_eq!(d.phase(), DrainPhase::Closed);
    }
}

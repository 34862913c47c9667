/// A signed flow-control window pair for one stream, or for the whole connection.
///
/// Windows are 32-bit signed with a default initial value of 65535 (§9). A settings-driven delta
/// may legally drive `send` negative; it only blocks newly queued egress until replenished by a
/// WINDOW_UPDATE, mirroring the teacher's `max_data`/`data_sent` bookkeeping in
/// `Connection::process_payload`'s `Frame::MaxData`/`Frame::MaxStreamData` arms.
#[derive(Debug, Clone, Copy)]
pub struct FlowController {
    send_window: i64,
    recv_window: i64,
    recv_window_advertised: i64,
}

impl FlowController {
    pub fn new(initial_send: i64, initial_recv: i64) -> Self {
        FlowController {
            send_window: initial_send,
            recv_window: initial_recv,
            recv_window_advertised: initial_recv,
        }
    }

    pub fn send_window(&self) -> i64 {
        self.send_window
    }

    pub fn recv_window(&self) -> i64 {
        self.recv_window
    }

    /// True when no further egress bytes may be sent without blocking.
    pub fn send_blocked(&self) -> bool {
        self.send_window <= 0
    }

    /// Applied when the peer's WINDOW_UPDATE / initial-window SETTINGS ack grants more
    /// send-window. Returns whether the stream transitioned from blocked to unblocked.
    pub fn grant_send(&mut self, delta: i64) -> bool {
        let was_blocked = self.send_blocked();
        self.send_window += delta;
        was_blocked && !self.send_blocked()
    }

    /// Applied retroactively when a SETTINGS_INITIAL_WINDOW_SIZE change arrives; may legally
    /// drive the window negative (§9).
    pub fn apply_initial_window_delta(&mut self, delta: i64) -> bool {
        self.grant_send(delta)
    }

    /// Consumes `n` bytes of send-window for an outgoing DATA-bearing write.
    pub fn consume_send(&mut self, n: i64) {
        self.send_window -= n;
    }

    /// Consumes `n` bytes of receive-window for inbound DATA; returns `true` if this exhausted
    /// the window (drives `InfoCallback::on_flow_control_window_exhausted`).
    pub fn consume_recv(&mut self, n: i64) -> bool {
        self.recv_window -= n;
        self.recv_window <= 0
    }

    /// Replenishes the receive window after the application has consumed buffered bytes, and
    /// reports the WINDOW_UPDATE delta that should be sent to the peer, if any.
    pub fn replenish_recv(&mut self, consumed: i64) -> i64 {
        self.recv_window += consumed;
        let deficit = self.recv_window_advertised - self.recv_window;
        if deficit > 0 {
            self.recv_window += deficit;
            deficit
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_blocks_at_zero() {
        let mut fc = FlowController::new(10, 10);
        assert!(!fc.send_blocked());
        fc.consume_send(10);
        assert!(fc.send_blocked());
    }

    #[test]
    fn settings_delta_may_go_negative() {
        let mut fc = FlowController::new(5, 0);
        fc.consume_send(5);
        assert!(fc.send_blocked());
        // peer shrinks the initial window after we already sent up to the old limit
        let unblocked = fc.apply_initial_window_delta(-10);
        assert!(!unblocked);
        assert_eq!(fc.send_window(), -10);
        assert!(fc.send_blocked());
    }

    #[test]
    fn grant_reports_unblock_transition() {
        let mut fc = FlowController::new(0, 0);
        assert!(fc.send_blocked());
        let unblocked = fc.grant_send(100);
        assert!(unblocked);
        assert!(!fc.send_blocked());
        // a second grant while already unblocked is not a transition
        assert!(!fc.grant_send(1));
    }

    #[test]
    fn recv_window_exhaustion_is_reported() {
        let mut fc = FlowController::new(0, 10);
        assert!(!fc.consume_recv(5));
        assert!(fc.consume_recv(5));
    }
}

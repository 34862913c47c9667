use crate::codec::Message;
use crate::error::SessionError;
use crate::flow_control::FlowController;

/// Which role a transaction plays relative to the stream that carries it (§3 glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    /// A normal request/response the application initiated.
    Egress,
    /// A server-pushed stream associated with one of our request streams.
    Pushed { assoc_stream_id: u32 },
    /// A bidirectional "exchanged" stream the peer opened against an existing control stream.
    Exchanged { control_stream_id: u32 },
}

/// The application-supplied callbacks a `Transaction` drives (§6 "Transaction interface", the
/// Handler corner of the Session/Transaction/Handler triangle in §9). The session owns the
/// `Transaction`; the `Transaction` owns its `TransactionHandler` as an aggregated trait object,
/// per the teacher's pattern of storing per-stream state inline in the connection's stream
/// registry rather than behind a shared/aliased reference.
pub trait TransactionHandler {
    fn on_headers_complete(&mut self, msg: &Message, eom: bool);
    fn on_body(&mut self, data: &[u8]);
    fn on_eom(&mut self);
    fn on_error(&mut self, err: &SessionError);
    fn on_goaway(&mut self);
    fn on_egress_paused(&mut self);
    fn on_egress_resumed(&mut self);
}

/// Produces handlers for server-pushed streams. Returning `None` causes the session to refuse the
/// push with `RST_STREAM(REFUSED_STREAM)` (§4.1) without tearing down the session.
pub trait PushHandlerFactory {
    fn create_push_handler(
        &mut self,
        assoc_stream_id: u32,
        stream_id: u32,
    ) -> Option<Box<dyn TransactionHandler>>;
}

/// One request/response exchange on one stream (§3). Owned exclusively by the `Session`'s
/// transaction map; application code interacts with it through the stream id it was minted with,
/// calling back into `Session` methods rather than holding a reference into the map (the
/// Transaction -> Session edge is a non-owning back-reference per §9, modeled here as "the
/// application remembers the id" instead of an aliased pointer).
pub struct Transaction {
    stream_id: u32,
    role: StreamRole,
    flow: FlowController,
    egress_queue_size: usize,
    egress_paused: bool,
    ingress_paused: bool,
    idle_timeout_ms: u64,
    pending_byte_events: u32,
    ingress_complete: bool,
    egress_complete: bool,
    handler: Box<dyn TransactionHandler>,
}

impl Transaction {
    pub fn new(
        stream_id: u32,
        role: StreamRole,
        flow: FlowController,
        idle_timeout_ms: u64,
        handler: Box<dyn TransactionHandler>,
    ) -> Self {
        Transaction {
            stream_id,
            role,
            flow,
            egress_queue_size: 0,
            egress_paused: false,
            ingress_paused: false,
            idle_timeout_ms,
            pending_byte_events: 0,
            ingress_complete: false,
            egress_complete: false,
            handler,
        }
    }

    pub fn id(&self) -> u32 {
        self.stream_id
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    pub fn send_window(&self) -> i64 {
        self.flow.send_window()
    }

    pub fn flow_mut(&mut self) -> &mut FlowController {
        &mut self.flow
    }

    pub fn flow(&self) -> &FlowController {
        &self.flow
    }

    pub fn egress_queue_size(&self) -> usize {
        self.egress_queue_size
    }

    pub fn add_egress_queued(&mut self, n: usize) {
        self.egress_queue_size += n;
    }

    pub fn drain_egress_queued(&mut self, n: usize) {
        self.egress_queue_size = self.egress_queue_size.saturating_sub(n);
    }

    pub fn idle_timeout_ms(&self) -> u64 {
        self.idle_timeout_ms
    }

    pub fn set_idle_timeout_ms(&mut self, ms: u64) {
        self.idle_timeout_ms = ms;
    }

    pub fn increment_pending_byte_events(&mut self) {
        self.pending_byte_events += 1;
    }

    pub fn decrement_pending_byte_events(&mut self) {
        self.pending_byte_events = self.pending_byte_events.saturating_sub(1);
    }

    pub fn pending_byte_events(&self) -> u32 {
        self.pending_byte_events
    }

    pub fn is_ingress_complete(&self) -> bool {
        self.ingress_complete
    }

    pub fn is_egress_complete(&self) -> bool {
        self.egress_complete
    }

    pub fn mark_ingress_complete(&mut self) {
        self.ingress_complete = true;
    }

    pub fn mark_egress_complete(&mut self) {
        self.egress_complete = true;
    }

    /// §3 invariant 1/Transaction lifecycle: ready to leave the transaction map.
    pub fn is_detachable(&self) -> bool {
        self.ingress_complete && self.egress_complete && self.pending_byte_events == 0
    }

    pub fn pause_ingress(&mut self) {
        self.ingress_paused = true;
    }

    pub fn resume_ingress(&mut self) {
        self.ingress_paused = false;
    }

    pub fn is_ingress_paused(&self) -> bool {
        self.ingress_paused
    }

    pub fn is_egress_paused(&self) -> bool {
        self.egress_paused
    }

    pub fn on_egress_paused(&mut self) {
        if !self.egress_paused {
            self.egress_paused = true;
            self.handler.on_egress_paused();
        }
    }

    pub fn on_egress_resumed(&mut self) {
        if self.egress_paused {
            self.egress_paused = false;
            self.handler.on_egress_resumed();
        }
    }

    pub fn on_headers_complete(&mut self, msg: &Message, eom: bool) {
        self.handler.on_headers_complete(msg, eom);
        if eom {
            self.mark_ingress_complete();
        }
    }

    pub fn on_body(&mut self, data: &[u8]) {
        self.handler.on_body(data);
    }

    pub fn on_eom(&mut self) {
        self.mark_ingress_complete();
        self.handler.on_eom();
    }

    pub fn on_error(&mut self, err: &SessionError) {
        self.handler.on_error(err);
        self.mark_ingress_complete();
        self.mark_egress_complete();
    }

    pub fn on_goaway(&mut self) {
        self.handler.on_goaway();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingHandler {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl TransactionHandler for RecordingHandler {
        fn on_headers_complete(&mut self, msg: &Message, eom: bool) {
            self.events
                .borrow_mut()
                .push(format!("headers({:?},{})", msg.status(), eom));
        }
        fn on_body(&mut self, data: &[u8]) {
            self.events.borrow_mut().push(format!("body({})", data.len()));
        }
        fn on_eom(&mut self) {
            self.events.borrow_mut().push("eom".to_owned());
        }
        fn on_error(&mut self, err: &SessionError) {
            self.events.borrow_mut().push(format!("error({})", err));
        }
        fn on_goaway(&mut self) {
            self.events.borrow_mut().push("goaway".to_owned());
        }
        fn on_egress_paused(&mut self) {
            self.events.borrow_mut().push("paused".to_owned());
        }
        fn on_egress_resumed(&mut self) {
            self.events.borrow_mut().push("resumed".to_owned());
        }
    }

    #[test]
    fn detach_requires_both_directions_and_zero_byte_events() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let handler = Box::new(RecordingHandler {
            events: events.clone(),
        });
        let mut txn = Transaction::new(1, StreamRole::Egress, FlowController::new(100, 100), 0, handler);
        txn.increment_pending_byte_events();
        txn.mark_egress_complete();
        txn.on_eom();
        assert!(!txn.is_detachable(), "byte event still pending");
        txn.decrement_pending_byte_events();
        assert!(txn.is_detachable());
        assert_eq!(&*events.borrow(), &["eom".to_owned()]);
    }

    #[test]
    fn egress_pause_resume_is_idempotent_and_notifies_once() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let handler = Box::new(RecordingHandler {
            events: events.clone(),
        });
        let mut txn = Transaction::new(1, StreamRole::Egress, FlowController::new(100, 100), 0, handler);
        txn.on_egress_paused();
        txn.on_egress_paused();
        txn.on_egress_resumed();
        txn.on_egress_resumed();
        assert_eq!(&*events.borrow(), &["paused".to_owned(), "resumed".to_owned()]);
    }
}

//! A `TransactionHandler` that records every callback as a short descriptive string, shared
//! through an `Rc<RefCell<_>>` so the test driving the `Session` can inspect it after the fact.
//! No teacher analogue; grounded on the recording-handler pattern used by `transaction.rs`'s own
//! unit tests, promoted here so `tests/e2e.rs` can reuse it across scenarios.

use std::cell::RefCell;
use std::rc::Rc;

use crate::codec::Message;
use crate::error::SessionError;
use crate::transaction::TransactionHandler;

pub struct RecordingHandler {
    events: Rc<RefCell<Vec<String>>>,
}

impl RecordingHandler {
    pub fn new(events: Rc<RefCell<Vec<String>>>) -> Self {
        RecordingHandler { events }
    }
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

//! The conductor (§4.1). Owns the codec, the transaction arena, the write buffer, and every
//! leaf component, and drives them through the ingress/egress dance described in §2's control
//! flow diagram.
//!
//! Follows the teacher's sans-IO discipline throughout: `Session` never touches a socket or a
//! timer wheel directly. Transport writes and timer (re)arms are emitted as `Io` values drained
//! by `poll_transmit`, mirroring `quinn_proto::endpoint::Endpoint::poll_io`; completions are fed
//! back in via `on_write_complete` / `on_write_failed` / `on_timeout`, mirroring
//! `Connection::handle_packet` / timeout handling.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use bytes::BytesMut;
use fnv::FnvHashMap;
use slog::Logger;

use crate::byte_event::{ByteEventKind, ByteEventTracker, FiredByteEvent};
use crate::codec::{Codec, ErrorCode, IngressEvent, Message, Protocol, Settings};
use crate::config::Config;
use crate::drain::DrainState;
use crate::error::SessionError;
use crate::flow_control::FlowController;
use crate::info_callback::InfoCallback;
use crate::io::{Event, Io, Timer};
use crate::priority::{PriorityTree, PriorityUpdate};
use crate::transaction::{PushHandlerFactory, StreamRole, Transaction, TransactionHandler};
use crate::upgrade::UpgradeBridge;

/// Session-level state machine (§4.1 "State machine (session-level)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Running,
    Draining,
    Closing,
    Closed,
}

/// Arms the HTTP/1.1 -> HTTP/2 in-band upgrade path (§4.2). `make_codec` is invoked exactly once,
/// the instant a matching `101 Switching Protocols` response validates, to construct the codec
/// that takes over from that point on; constructing it lazily (rather than eagerly at session
/// start) avoids paying for an HTTP/2 codec on connections that never upgrade.
pub struct UpgradeConfig {
    pub known_protocols: Vec<String>,
    pub make_codec: Box<dyn FnMut() -> Box<dyn Codec>>,
}

/// The conductor. See module docs and §4.1.
pub struct Session {
    log: Logger,
    config: Arc<Config>,
    codec: Box<dyn Codec>,

    transactions: BTreeMap<u32, Transaction>,
    pending_pushes: FnvHashMap<u32, u32>,

    conn_flow: FlowController,
    priority: PriorityTree,
    byte_events: ByteEventTracker,
    drain: DrainState,
    state: SessionState,

    write_buffer: BytesMut,
    in_flight_len: usize,
    acked_bytes: u64,
    egress_paused: bool,
    read_paused: bool,
    io: VecDeque<Io>,
    events: VecDeque<Event>,

    info_callback: Box<dyn InfoCallback>,
    push_handler_factory: Option<Box<dyn PushHandlerFactory>>,

    outgoing_stream_count: u32,
    peer_max_concurrent_streams: Option<u32>,
    reported_streams_full: bool,
    /// Current send-window a newly minted transaction starts with; tracks the peer's
    /// SETTINGS_INITIAL_WINDOW_SIZE (default 65535, §9).
    default_send_window: i64,

    upgrade: Option<UpgradeConfig>,
    upgrade_bridge: Option<UpgradeBridge>,

    timer_epochs: FnvHashMap<u32, u64>,
    attached: bool,
    /// Bumped every time `self.codec` is replaced (currently only by `complete_upgrade`), so
    /// `on_ingress` knows to re-feed any bytes the old codec left unconsumed to the new one
    /// instead of discarding them (§4.2: "remaining transport bytes are fed to the new codec").
    codec_epoch: u64,
}

impl Session {
    pub fn new(
        codec: Box<dyn Codec>,
        config: Arc<Config>,
        mut info_callback: Box<dyn InfoCallback>,
        log: Logger,
    ) -> Self {
        let log = log.new(o!("side" => "upstream"));
        let default_send_window = codec.default_window_size() as i64;
        info_callback.on_create();
        Session {
            log,
            codec,
            transactions: BTreeMap::new(),
            pending_pushes: FnvHashMap::default(),
            conn_flow: FlowController::new(default_send_window, config.initial_conn_recv_window as i64),
            priority: PriorityTree::new(),
            byte_events: ByteEventTracker::new(),
            drain: DrainState::new(),
            state: SessionState::Unstarted,
            write_buffer: BytesMut::new(),
            in_flight_len: 0,
            acked_bytes: 0,
            egress_paused: false,
            read_paused: false,
            io: VecDeque::new(),
            events: VecDeque::new(),
            info_callback,
            push_handler_factory: None,
            outgoing_stream_count: 0,
            peer_max_concurrent_streams: None,
            reported_streams_full: false,
            default_send_window,
            upgrade: None,
            upgrade_bridge: None,
            timer_epochs: FnvHashMap::default(),
            attached: true,
            codec_epoch: 0,
            config,
        }
    }

    pub fn with_upgrade(mut self, upgrade: UpgradeConfig) -> Self {
        self.upgrade = Some(upgrade);
        self
    }

    pub fn with_push_handler_factory(mut self, factory: Box<dyn PushHandlerFactory>) -> Self {
        self.push_handler_factory = Some(factory);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn outgoing_stream_count(&self) -> u32 {
        self.outgoing_stream_count
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_egress_paused(&self) -> bool {
        self.egress_paused
    }

    pub fn wants_write(&self) -> bool {
        !self.write_buffer.is_empty() || !self.io.is_empty()
    }

    // ---- session-level state machine ---------------------------------------------------------

    /// `startNow()`: Unstarted -> Running (§4.1).
    pub fn start_now(&mut self) {
        if self.state != SessionState::Unstarted {
            return;
        }
        self.state = SessionState::Running;
        self.codec.generate_connection_preface(&mut self.write_buffer);
        self.codec.generate_settings(&mut self.write_buffer);

        if self.codec.protocol().is_multiplexed() {
            let created = self
                .priority
                .bootstrap_levels(self.config.priority_levels, self.config.priority_has_high_priority_level);
            for id in created {
                let node = *self.priority.node(id).expect("just-created node is present");
                let update = PriorityUpdate::new(node.parent_id, node.exclusive, node.weight);
                self.codec.generate_priority(id, update, &mut self.write_buffer);
            }

            let default_window = self.codec.default_window_size() as i64;
            let delta = self.config.initial_conn_recv_window as i64 - default_window;
            if delta > 0 {
                self.codec.generate_window_update(0, delta as u32, &mut self.write_buffer);
            }
        }

        self.note_egress_occupancy();
        debug!(self.log, "session started"; "protocol" => format!("{:?}", self.codec.protocol()));
    }

    /// `drain()`: Running|Draining -> Draining (§4.1, §4.5). The GOAWAY is appended to the write
    /// buffer synchronously, ahead of anything a transaction might queue later in this same turn
    /// (§9 open question (a)).
    pub fn drain(&mut self) {
        if self.drain.is_draining() || self.drain.is_closed() {
            return;
        }
        let last_sent_good = self.transactions.keys().next_back().copied().unwrap_or(0);
        self.drain.begin_local_drain(last_sent_good);
        self.codec.generate_goaway(last_sent_good, ErrorCode::NoError, &mut self.write_buffer);
        if self.state == SessionState::Running {
            self.state = SessionState::Draining;
        }
        self.note_egress_occupancy();
        info!(self.log, "drain started"; "last_sent_good_stream_id" => last_sent_good);
        self.maybe_close_if_drained();
    }

    /// `dropConnection()`: best-effort GOAWAY flush, then every remaining transaction fails with
    /// `Dropped` and the session closes (§4.1).
    pub fn drop_connection(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let last_sent_good = self.transactions.keys().next_back().copied().unwrap_or(0);
        self.codec
            .generate_goaway(last_sent_good, ErrorCode::InternalError, &mut self.write_buffer);
        let ids: Vec<u32> = self.transactions.keys().copied().collect();
        for id in ids {
            self.fail_transaction(id, SessionError::dropped(id));
        }
        self.transactions.clear();
        self.state = SessionState::Closing;
        self.note_egress_occupancy();
        warn!(self.log, "connection dropped; remaining transactions failed");
        self.finish_closing();
    }

    /// `destroy()`: graceful teardown once every transaction has detached (§4.1).
    pub fn destroy(&mut self) {
        if !self.transactions.is_empty() {
            warn!(self.log, "destroy called with transactions still attached"; "count" => self.transactions.len());
            return;
        }
        self.finish_closing();
    }

    /// Sends SETTINGS/WINDOW_UPDATE combinations expressing the desired flow-control posture
    /// (§4.1). `initial_recv_per_stream` governs future streams only; `conn_recv` is applied
    /// immediately as a connection-level WINDOW_UPDATE if it grants more than the codec default.
    pub fn set_flow_control(&mut self, _initial_recv: u32, initial_recv_per_stream: u32, conn_recv: u32) {
        let default = self.codec.default_window_size();
        if conn_recv > default {
            self.codec
                .generate_window_update(0, conn_recv - default, &mut self.write_buffer);
            self.conn_flow.replenish_recv((conn_recv - default) as i64);
        }
        self.codec.generate_settings(&mut self.write_buffer);
        self.note_egress_occupancy();
        debug!(self.log, "flow control updated"; "initial_recv_per_stream" => initial_recv_per_stream, "conn_recv" => conn_recv);
    }

    /// Rebinds the session to a different scheduler. Per §4.1/§9, this is only legal while no
    /// scheduler-bound state (pending writes, armed timers) is outstanding; callers must drain
    /// `poll_transmit` first.
    pub fn detach_thread_locals(&mut self) -> Result<(), &'static str> {
        if !self.io.is_empty() || self.in_flight_len > 0 || !self.write_buffer.is_empty() {
            return Err("session has pending scheduler-bound state");
        }
        self.attached = false;
        Ok(())
    }

    pub fn attach_thread_locals(&mut self) {
        self.attached = true;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // ---- transaction lifecycle ----------------------------------------------------------------

    /// `newTransaction(handler) → Transaction?` (§4.1). Returns the newly minted stream id, or
    /// `None` when draining, the transport is no longer good, or (for a serial codec) a
    /// transaction is already outstanding.
    pub fn new_transaction(&mut self, handler: Box<dyn TransactionHandler>) -> Option<u32> {
        if self.state != SessionState::Running {
            return None;
        }
        if self.drain.is_draining() || self.drain.is_closed() {
            return None;
        }

        let cap = self.effective_cap();
        let parallel = self.codec.supports_parallel_requests();
        let full = cap == 0 || self.outgoing_stream_count >= cap;
        if full {
            self.update_streams_full(true);
            if !parallel {
                return None;
            }
        } else {
            self.update_streams_full(false);
        }
        if !parallel && self.outgoing_stream_count >= 1 {
            return None;
        }

        let stream_id = self.codec.create_stream();
        let flow = FlowController::new(self.default_send_window, self.config.initial_recv_window as i64);
        let txn = Transaction::new(
            stream_id,
            StreamRole::Egress,
            flow,
            self.config.default_idle_timeout_ms,
            handler,
        );
        self.transactions.insert(stream_id, txn);
        self.outgoing_stream_count += 1;
        self.arm_idle_timeout(stream_id, self.config.default_idle_timeout_ms);
        trace!(self.log, "transaction created"; "stream" => stream_id);
        Some(stream_id)
    }

    pub fn set_idle_timeout(&mut self, stream_id: u32, ms: u64) {
        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.set_idle_timeout_ms(ms);
        } else {
            return;
        }
        let epoch_before = self.timer_epochs.get(&stream_id).copied().unwrap_or(0);
        self.io.push_back(Io::TimerStop {
            timer: Timer::Idle {
                stream_id,
                epoch: epoch_before,
            },
        });
        self.arm_idle_timeout(stream_id, ms);
    }

    fn arm_idle_timeout(&mut self, stream_id: u32, ms: u64) {
        if ms == 0 {
            return;
        }
        let epoch = self.timer_epochs.entry(stream_id).or_insert(0);
        *epoch += 1;
        let epoch = *epoch;
        self.io.push_back(Io::TimerStart {
            timer: Timer::Idle { stream_id, epoch },
            time_ms: ms,
        });
    }

    /// Fired by the driver when a previously armed timer elapses.
    pub fn on_timeout(&mut self, timer: Timer) {
        match timer {
            Timer::Idle { stream_id, epoch } => {
                if self.timer_epochs.get(&stream_id).copied() != Some(epoch) {
                    trace!(self.log, "ignoring stale idle timer"; "stream" => stream_id);
                    return;
                }
                if let Some(txn) = self.transactions.get(&stream_id) {
                    // Idle while egress is still outstanding means our own writes stalled;
                    // idle while only waiting on the peer means the read stalled (§5, §7).
                    let err = if txn.is_egress_complete() {
                        SessionError::read_timeout(stream_id)
                    } else {
                        SessionError::write_timeout(stream_id)
                    };
                    self.fail_transaction(stream_id, err);
                }
            }
            Timer::Read => {
                let ids: Vec<u32> = self.transactions.keys().copied().collect();
                for id in ids {
                    let err = SessionError::read_timeout(id);
                    self.fail_transaction(id, err);
                }
                self.state = SessionState::Closing;
                self.finish_closing();
            }
        }
    }

    fn effective_cap(&self) -> u32 {
        let configured = if self.upgrade_bridge.as_ref().map_or(false, |b| b.is_armed()) {
            self.config.max_concurrent_outgoing_streams_during_upgrade
        } else {
            self.config.max_concurrent_outgoing_streams
        };
        match self.peer_max_concurrent_streams {
            Some(peer) => peer.min(configured),
            None => configured,
        }
    }

    fn update_streams_full(&mut self, full: bool) {
        if full && !self.reported_streams_full {
            self.reported_streams_full = true;
            self.info_callback.on_settings_outgoing_streams_full();
        } else if !full && self.reported_streams_full {
            self.reported_streams_full = false;
            self.info_callback.on_settings_outgoing_streams_not_full();
        }
    }

    fn refresh_streams_full(&mut self) {
        let cap = self.effective_cap();
        let full = cap == 0 || self.outgoing_stream_count >= cap;
        self.update_streams_full(full);
    }

    fn fail_transaction(&mut self, stream_id: u32, err: SessionError) {
        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.on_error(&err);
        }
        self.maybe_detach(stream_id);
    }

    fn maybe_detach(&mut self, stream_id: u32) {
        let detachable = self.transactions.get(&stream_id).map_or(false, Transaction::is_detachable);
        if !detachable {
            return;
        }
        if let Some(txn) = self.transactions.remove(&stream_id) {
            if txn.role() == StreamRole::Egress {
                self.outgoing_stream_count = self.outgoing_stream_count.saturating_sub(1);
                self.refresh_streams_full();
            }
            trace!(self.log, "transaction detached"; "stream" => stream_id);
        }
        self.maybe_close_if_drained();
    }

    fn maybe_close_if_drained(&mut self) {
        if self.drain.is_draining() && self.transactions.is_empty() {
            self.drain.close();
            self.state = SessionState::Closing;
            self.finish_closing();
        }
    }

    fn finish_closing(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.io.push_back(Io::CloseTransport);
        self.info_callback.on_destroy();
        self.events.push_back(Event::SessionDestroyed);
        debug!(self.log, "session closed");
    }

    // ---- egress (application -> wire) ---------------------------------------------------------

    pub fn send_headers(&mut self, stream_id: u32, msg: &Message, eom: bool) -> Result<(), SessionError> {
        if !self.transactions.contains_key(&stream_id) {
            return Err(SessionError::dropped(stream_id));
        }

        if self.codec.protocol() == Protocol::Http1 && self.upgrade_bridge.is_none() {
            if let Some(upgrade) = self.upgrade.as_ref() {
                if let Some(value) = msg.header("Upgrade") {
                    let known: Vec<&str> = upgrade.known_protocols.iter().map(String::as_str).collect();
                    if let Some(protocol) = UpgradeBridge::pick_offered_protocol(value, &known) {
                        self.upgrade_bridge = Some(UpgradeBridge::arm(protocol, stream_id));
                        self.refresh_streams_full();
                    }
                }
            }
        }

        let before = self.write_buffer.len();
        self.codec.generate_header(stream_id, msg, eom, &mut self.write_buffer);
        let len = (self.write_buffer.len() - before) as u64;
        self.byte_events
            .enqueue(len, Some(ByteEventKind::FirstHeaderByte), Some(stream_id));

        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.increment_pending_byte_events();
            txn.add_egress_queued(len as usize);
            if eom {
                txn.mark_egress_complete();
            }
        }
        self.note_egress_occupancy();
        self.maybe_detach(stream_id);
        Ok(())
    }

    pub fn send_ex_headers(
        &mut self,
        stream_id: u32,
        control_stream_id: u32,
        msg: &Message,
        eom: bool,
    ) -> Result<(), SessionError> {
        if !self.transactions.contains_key(&stream_id) {
            return Err(SessionError::dropped(stream_id));
        }
        let before = self.write_buffer.len();
        self.codec
            .generate_ex_header(stream_id, msg, control_stream_id, eom, &mut self.write_buffer);
        let len = (self.write_buffer.len() - before) as u64;
        self.byte_events
            .enqueue(len, Some(ByteEventKind::FirstHeaderByte), Some(stream_id));
        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.increment_pending_byte_events();
            txn.add_egress_queued(len as usize);
            if eom {
                txn.mark_egress_complete();
            }
        }
        self.note_egress_occupancy();
        self.maybe_detach(stream_id);
        Ok(())
    }

    pub fn send_body(&mut self, stream_id: u32, data: &[u8], eom: bool) -> Result<(), SessionError> {
        if !self.transactions.contains_key(&stream_id) {
            return Err(SessionError::dropped(stream_id));
        }

        let before = self.write_buffer.len();
        self.codec.generate_body(stream_id, data, 0, eom, &mut self.write_buffer);
        let len = (self.write_buffer.len() - before) as u64;

        if self.codec.supports_stream_flow_control() {
            self.conn_flow.consume_send(len as i64);
            if let Some(txn) = self.transactions.get_mut(&stream_id) {
                txn.flow_mut().consume_send(len as i64);
            }
        }

        let kind = if eom { Some(ByteEventKind::LastByteFlushed) } else { None };
        self.byte_events.enqueue(len, kind, Some(stream_id));

        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.add_egress_queued(len as usize);
            if eom {
                txn.increment_pending_byte_events();
                txn.mark_egress_complete();
            }
        }
        self.note_egress_occupancy();
        self.maybe_detach(stream_id);
        Ok(())
    }

    pub fn send_eom(&mut self, stream_id: u32) -> Result<(), SessionError> {
        if !self.transactions.contains_key(&stream_id) {
            return Err(SessionError::dropped(stream_id));
        }
        let before = self.write_buffer.len();
        self.codec.generate_eom(stream_id, &mut self.write_buffer);
        let len = (self.write_buffer.len() - before) as u64;
        self.byte_events
            .enqueue(len, Some(ByteEventKind::LastByteFlushed), Some(stream_id));
        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.increment_pending_byte_events();
            txn.add_egress_queued(len as usize);
            txn.mark_egress_complete();
        }
        self.note_egress_occupancy();
        self.maybe_detach(stream_id);
        Ok(())
    }

    /// An abort request from a transaction (§7): enqueues `generateRstStream` and marks both
    /// directions complete so the transaction detaches as soon as its byte-event count drains.
    pub fn send_abort(&mut self, stream_id: u32, code: ErrorCode) -> Result<(), SessionError> {
        if !self.transactions.contains_key(&stream_id) {
            return Err(SessionError::dropped(stream_id));
        }
        self.codec.generate_rst_stream(stream_id, code, &mut self.write_buffer);
        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.mark_egress_complete();
            txn.mark_ingress_complete();
        }
        self.note_egress_occupancy();
        self.maybe_detach(stream_id);
        debug!(self.log, "transaction aborted"; "stream" => stream_id, "code" => code.name());
        Ok(())
    }

    /// `sendPriority(update) → streamId` (§4.1): mints a fresh virtual node.
    pub fn send_priority(&mut self, update: PriorityUpdate) -> u32 {
        let id = self.priority.create_virtual_node(update);
        self.codec.generate_priority(id, update, &mut self.write_buffer);
        self.note_egress_occupancy();
        id
    }

    /// `sendPriority(existingId, update) → streamId` (§4.1): updates (or creates on first
    /// reference, raw mode) an existing node.
    pub fn send_priority_update(&mut self, existing_id: u32, update: PriorityUpdate) -> u32 {
        self.priority.create_or_update(existing_id, update);
        self.codec.generate_priority(existing_id, update, &mut self.write_buffer);
        self.note_egress_occupancy();
        existing_id
    }

    pub fn send_window_update(&mut self, stream_id: Option<u32>, delta: u32) {
        match stream_id {
            None => {
                self.conn_flow.replenish_recv(delta as i64);
            }
            Some(id) => {
                if let Some(txn) = self.transactions.get_mut(&id) {
                    txn.flow_mut().replenish_recv(delta as i64);
                }
            }
        }
        self.codec
            .generate_window_update(stream_id.unwrap_or(0), delta, &mut self.write_buffer);
        self.note_egress_occupancy();
    }

    fn reset_stream(&mut self, stream_id: u32, code: ErrorCode) {
        self.codec.generate_rst_stream(stream_id, code, &mut self.write_buffer);
        self.note_egress_occupancy();
        debug!(self.log, "reset stream"; "stream" => stream_id, "code" => code.name());
    }

    /// §3 invariant 2 / §4.1 egress coordination step 2: every codec call that may have grown
    /// the write buffer funnels through here so the pause threshold is checked consistently.
    fn note_egress_occupancy(&mut self) {
        if !self.egress_paused && self.occupancy() > self.config.write_buffer_limit {
            self.egress_paused = true;
            for txn in self.transactions.values_mut() {
                txn.on_egress_paused();
            }
            debug!(self.log, "egress paused"; "occupancy" => self.occupancy());
        }
    }

    fn occupancy(&self) -> usize {
        self.write_buffer.len() + self.in_flight_len
    }

    /// §4.1 "Egress-pause semantics": resumption requires both buffer occupancy back under the
    /// limit and a successful write; iterates transactions in stream-id ascending order and
    /// tolerates a handler re-pausing the session mid-iteration.
    fn try_resume_egress(&mut self) {
        if !self.egress_paused {
            return;
        }
        if self.occupancy() > self.config.write_buffer_limit {
            return;
        }
        self.egress_paused = false;
        let ids: Vec<u32> = self.transactions.keys().copied().collect();
        for id in ids {
            if let Some(txn) = self.transactions.get_mut(&id) {
                txn.on_egress_resumed();
            }
            if !self.egress_paused && self.occupancy() > self.config.write_buffer_limit {
                self.egress_paused = true;
                debug!(self.log, "egress re-paused mid-resume"; "stream" => id);
            }
            if self.egress_paused {
                if let Some(txn) = self.transactions.get_mut(&id) {
                    txn.on_egress_paused();
                }
            }
        }
    }

    // ---- sans-IO driver surface ----------------------------------------------------------------

    /// Drains the next pending transport write or scheduler operation, if any. Prioritizes
    /// flushing queued egress bytes over timer/close operations, mirroring `drop_connection`'s
    /// "flush, then close" ordering.
    pub fn poll_transmit(&mut self) -> Option<Io> {
        if !self.write_buffer.is_empty() {
            let data = self.write_buffer.split_to(self.write_buffer.len()).freeze();
            self.in_flight_len += data.len();
            self.info_callback.on_write(data.len());
            return Some(Io::Transmit { data });
        }
        self.io.pop_front()
    }

    /// Drains the next pending connection-level event not delivered through a `TransactionHandler`
    /// callback (§9 Event enum), e.g. `SessionDestroyed` once `finish_closing` has run.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// The driver confirms `len` bytes of a previously returned `Io::Transmit` were delivered.
    pub fn on_write_complete(&mut self, len: usize) {
        self.in_flight_len = self.in_flight_len.saturating_sub(len);
        self.acked_bytes += len as u64;
        let fired = self.byte_events.on_bytes_acked(self.acked_bytes);
        for event in fired {
            self.dispatch_byte_event(event);
        }
        self.try_resume_egress();
        self.maybe_close_if_drained();
    }

    /// The driver reports the transport write failed outright. Fatal to the session (§7): every
    /// in-flight transaction receives `ConnectionReset` and the session transitions to Closed.
    pub fn on_write_failed(&mut self) {
        let ids: Vec<u32> = self.transactions.keys().copied().collect();
        for id in ids {
            self.fail_transaction(id, SessionError::connection_reset(id));
        }
        self.transactions.clear();
        self.state = SessionState::Closing;
        warn!(self.log, "write failed; session closing");
        self.finish_closing();
    }

    fn dispatch_byte_event(&mut self, event: FiredByteEvent) {
        match event.kind {
            ByteEventKind::FirstHeaderByte | ByteEventKind::LastByteFlushed => {
                if let Some(stream_id) = event.txn {
                    if let Some(txn) = self.transactions.get_mut(&stream_id) {
                        txn.decrement_pending_byte_events();
                    }
                    self.maybe_detach(stream_id);
                }
            }
            ByteEventKind::PingReply => {}
        }
    }

    // ---- ingress (wire -> application) ---------------------------------------------------------

    /// Feeds inbound bytes to the codec and dispatches whatever ingress events result (§2 control
    /// flow, §4.1 "Ingress dispatch"). Returns the number of bytes consumed across every codec
    /// that touched `buf`.
    ///
    /// If dispatching an event swaps `self.codec` (the upgrade path, §4.2), whatever the old
    /// codec left unconsumed is re-fed to the new codec in the same call rather than dropped: the
    /// spec requires "remaining transport bytes are fed to the new codec", and a caller reading
    /// one chunk off the wire that happens to contain both the `101` response and the first bytes
    /// of the new protocol must not lose the latter.
    pub fn on_ingress(&mut self, buf: &[u8]) -> Result<usize, SessionError> {
        if self.read_paused {
            return Ok(0);
        }
        let mut total_consumed = 0usize;
        let mut remaining = buf;
        loop {
            let epoch_before = self.codec_epoch;
            let outcome = self.codec.on_ingress(remaining);
            self.info_callback.on_read(outcome.consumed);
            total_consumed += outcome.consumed;
            remaining = &remaining[outcome.consumed..];
            for event in outcome.events {
                self.dispatch_ingress_event(event)?;
            }
            self.maybe_close_if_drained();
            if self.state == SessionState::Closed || self.codec_epoch == epoch_before || remaining.is_empty() {
                break;
            }
        }
        Ok(total_consumed)
    }

    pub fn pause_ingress(&mut self) {
        self.read_paused = true;
    }

    pub fn resume_ingress(&mut self) {
        self.read_paused = false;
    }

    fn dispatch_ingress_event(&mut self, event: IngressEvent) -> Result<(), SessionError> {
        match event {
            IngressEvent::HeadersComplete { stream_id, msg, eom } => {
                self.handle_headers_complete(stream_id, msg, eom)
            }
            IngressEvent::PushMessageBegin {
                stream_id,
                assoc_stream_id,
            } => {
                self.handle_push_message_begin(stream_id, assoc_stream_id);
                Ok(())
            }
            IngressEvent::ExHeadersComplete {
                stream_id,
                control_stream_id,
                msg,
                eom,
            } => {
                self.handle_ex_headers_complete(stream_id, control_stream_id, msg, eom);
                Ok(())
            }
            IngressEvent::Body { stream_id, data } => {
                self.forward_body(stream_id, &data);
                Ok(())
            }
            IngressEvent::ChunkHeader { .. } | IngressEvent::ChunkComplete { .. } => {
                // Body reassembly is an external collaborator (§1); these are pass-through.
                Ok(())
            }
            IngressEvent::Trailers { .. } => Ok(()),
            IngressEvent::MessageComplete { stream_id } => {
                self.handle_message_complete(stream_id);
                Ok(())
            }
            IngressEvent::Goaway { last_good, error_code } => {
                self.handle_goaway(last_good, error_code);
                Ok(())
            }
            IngressEvent::Settings { settings } => {
                self.handle_settings(settings);
                Ok(())
            }
            IngressEvent::SettingsAck => {
                self.info_callback.on_settings_ack();
                Ok(())
            }
            IngressEvent::WindowUpdate { stream_id, delta } => {
                self.handle_window_update(stream_id, delta);
                Ok(())
            }
            IngressEvent::Abort { stream_id, code } => {
                self.handle_abort(stream_id, code);
                Ok(())
            }
            IngressEvent::Error {
                stream_id,
                message,
                is_new,
            } => {
                self.handle_error(stream_id, message, is_new);
                Ok(())
            }
            IngressEvent::PingRequest { opaque } => {
                trace!(self.log, "ping request"; "opaque" => opaque);
                Ok(())
            }
            IngressEvent::PingReply { opaque } => {
                trace!(self.log, "ping reply"; "opaque" => opaque);
                Ok(())
            }
        }
    }

    fn handle_headers_complete(&mut self, stream_id: u32, msg: Message, eom: bool) -> Result<(), SessionError> {
        let is_switching_protocols = self.upgrade_bridge.as_ref().map_or(false, |bridge| {
            bridge.is_armed() && stream_id == bridge.pre_upgrade_stream_id() && msg.status() == Some(101)
        });
        if is_switching_protocols {
            let bridge = self.upgrade_bridge.take().expect("checked above");
            return match bridge.validate_switching_protocols(&msg) {
                Ok(()) => {
                    self.complete_upgrade(stream_id);
                    Ok(())
                }
                Err(e) => {
                    let ids: Vec<u32> = self.transactions.keys().copied().collect();
                    for id in ids {
                        self.fail_transaction(id, e.clone());
                    }
                    self.transactions.clear();
                    self.state = SessionState::Closing;
                    self.finish_closing();
                    Err(e)
                }
            };
        }

        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            self.info_callback.on_ingress_message(stream_id);
            txn.on_headers_complete(&msg, eom);
            self.maybe_detach(stream_id);
            return Ok(());
        }

        if let Some(assoc_stream_id) = self.pending_pushes.remove(&stream_id) {
            self.accept_pushed_headers(stream_id, assoc_stream_id, msg, eom);
            return Ok(());
        }

        Ok(())
    }

    fn accept_pushed_headers(&mut self, stream_id: u32, assoc_stream_id: u32, msg: Message, eom: bool) {
        let handler = self
            .push_handler_factory
            .as_mut()
            .and_then(|factory| factory.create_push_handler(assoc_stream_id, stream_id));
        let handler = match handler {
            Some(handler) => handler,
            None => {
                self.reset_stream(stream_id, ErrorCode::RefusedStream);
                return;
            }
        };
        let flow = FlowController::new(self.default_send_window, self.config.initial_recv_window as i64);
        let mut txn = Transaction::new(
            stream_id,
            StreamRole::Pushed { assoc_stream_id },
            flow,
            self.config.default_idle_timeout_ms,
            handler,
        );
        txn.on_headers_complete(&msg, eom);
        self.transactions.insert(stream_id, txn);
        self.arm_idle_timeout(stream_id, self.config.default_idle_timeout_ms);
        self.maybe_detach(stream_id);
    }

    fn handle_push_message_begin(&mut self, stream_id: u32, assoc_stream_id: u32) {
        if !self.transactions.contains_key(&assoc_stream_id) {
            self.reset_stream(stream_id, ErrorCode::ProtocolError);
            if self.codec.protocol() == Protocol::Http2 {
                self.reset_stream(stream_id, ErrorCode::ProtocolError);
            }
            return;
        }
        self.pending_pushes.insert(stream_id, assoc_stream_id);
    }

    fn handle_ex_headers_complete(&mut self, stream_id: u32, control_stream_id: u32, msg: Message, eom: bool) {
        if !self.transactions.contains_key(&control_stream_id) {
            // Server-initiated exchanged stream whose control stream is unknown: silently drop.
            return;
        }
        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.on_headers_complete(&msg, eom);
            self.maybe_detach(stream_id);
            return;
        }
        let handler = self
            .push_handler_factory
            .as_mut()
            .and_then(|factory| factory.create_push_handler(control_stream_id, stream_id));
        if let Some(handler) = handler {
            let flow = FlowController::new(self.default_send_window, self.config.initial_recv_window as i64);
            let mut txn = Transaction::new(
                stream_id,
                StreamRole::Exchanged { control_stream_id },
                flow,
                self.config.default_idle_timeout_ms,
                handler,
            );
            txn.on_headers_complete(&msg, eom);
            self.transactions.insert(stream_id, txn);
            self.arm_idle_timeout(stream_id, self.config.default_idle_timeout_ms);
            self.maybe_detach(stream_id);
        }
    }

    fn forward_body(&mut self, stream_id: u32, data: &[u8]) {
        let ingress_complete = self.transactions.get(&stream_id).map_or(true, Transaction::is_ingress_complete);
        if ingress_complete {
            if self.transactions.contains_key(&stream_id) {
                let err = SessionError::ingress_state_transition(stream_id);
                self.fail_transaction(stream_id, err);
            }
            return;
        }

        if self.codec.supports_stream_flow_control() {
            let conn_exhausted = self.conn_flow.consume_recv(data.len() as i64);
            let stream_exhausted = self
                .transactions
                .get_mut(&stream_id)
                .map_or(false, |txn| txn.flow_mut().consume_recv(data.len() as i64));
            if conn_exhausted {
                self.info_callback.on_flow_control_window_exhausted(None);
            }
            if stream_exhausted {
                self.info_callback.on_flow_control_window_exhausted(Some(stream_id));
            }
        }

        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.on_body(data);
        }
    }

    fn handle_message_complete(&mut self, stream_id: u32) {
        if let Some(txn) = self.transactions.get_mut(&stream_id) {
            txn.on_eom();
            self.maybe_detach(stream_id);
        }
    }

    fn handle_goaway(&mut self, last_good: u32, error_code: ErrorCode) {
        self.drain.on_peer_goaway(last_good);
        let ids: Vec<u32> = self.transactions.keys().copied().collect();
        for id in ids {
            if self.drain.is_unacknowledged(id) {
                let err = if error_code.is_no_error() {
                    SessionError::stream_unacknowledged(id)
                } else {
                    SessionError::stream_unacknowledged_with_codec_error(id, &error_code.name())
                };
                self.fail_transaction(id, err);
            } else if let Some(txn) = self.transactions.get_mut(&id) {
                txn.on_goaway();
            }
        }
        if self.state == SessionState::Running {
            self.state = SessionState::Draining;
        }
        info!(self.log, "goaway received"; "last_good" => last_good, "code" => error_code.name());
        self.maybe_close_if_drained();
    }

    fn handle_settings(&mut self, settings: Settings) {
        if let Some(max) = settings.max_concurrent_streams {
            self.peer_max_concurrent_streams = Some(max);
            self.refresh_streams_full();
        }
        if let Some(new_window) = settings.initial_window_size {
            let delta = new_window as i64 - self.default_send_window;
            self.default_send_window = new_window as i64;
            for txn in self.transactions.values_mut() {
                txn.flow_mut().apply_initial_window_delta(delta);
            }
        }
        self.info_callback.on_settings(&settings);
        self.codec.generate_settings_ack(&mut self.write_buffer);
        self.note_egress_occupancy();
    }

    fn handle_window_update(&mut self, stream_id: Option<u32>, delta: u32) {
        match stream_id {
            None | Some(0) => {
                self.conn_flow.grant_send(delta as i64);
            }
            Some(id) => {
                if let Some(txn) = self.transactions.get_mut(&id) {
                    txn.flow_mut().grant_send(delta as i64);
                }
            }
        }
    }

    fn handle_abort(&mut self, stream_id: u32, _code: ErrorCode) {
        let err = SessionError::connection_reset(stream_id);
        self.fail_transaction(stream_id, err);
    }

    fn handle_error(&mut self, stream_id: Option<u32>, message: String, is_new: bool) {
        match stream_id {
            Some(id) => {
                if self.transactions.contains_key(&id) {
                    let err = SessionError::parse_header_with_detail(id, &message);
                    self.fail_transaction(id, err);
                } else if is_new {
                    self.reset_stream(id, ErrorCode::ProtocolError);
                }
            }
            None => {
                let ids: Vec<u32> = self.transactions.keys().copied().collect();
                for id in ids {
                    let err = SessionError::parse_header_with_detail(id, &message);
                    self.fail_transaction(id, err);
                }
            }
        }
    }

    fn complete_upgrade(&mut self, stream_id: u32) {
        if let Some(upgrade) = self.upgrade.as_mut() {
            let mut new_codec = (upgrade.make_codec)();
            new_codec.generate_settings(&mut self.write_buffer);
            self.codec = new_codec;
            self.codec_epoch += 1;
        }
        self.upgrade_bridge = None;
        self.refresh_streams_full();
        self.info_callback.on_session_codec_change();
        self.note_egress_occupancy();
        info!(self.log, "codec swapped post-upgrade"; "stream" => stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_codec::MockHttp1Codec;
    use crate::testing::mock_handler::RecordingHandler;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn new_session() -> Session {
        Session::new(
            Box::new(MockHttp1Codec::new()),
            Config::default().shared(),
            Box::new(crate::info_callback::NullInfoCallback),
            test_logger(),
        )
    }

    #[test]
    fn new_transaction_refused_after_drain() {
        let mut session = new_session();
        session.start_now();
        let events = Rc::new(RefCell::new(Vec::new()));
        let handler = Box::new(RecordingHandler::new(events));
        assert!(session.new_transaction(handler).is_some());
        session.drain();
        let events2 = Rc::new(RefCell::new(Vec::new()));
        let handler2 = Box::new(RecordingHandler::new(events2));
        assert!(session.new_transaction(handler2).is_none());
    }

    #[test]
    fn egress_pause_fires_when_buffer_exceeds_limit() {
        let config = Config {
            write_buffer_limit: 16,
            ..Config::default()
        };
        let mut session = Session::new(
            Box::new(MockHttp1Codec::new()),
            config.shared(),
            Box::new(crate::info_callback::NullInfoCallback),
            test_logger(),
        );
        session.start_now();
        let events = Rc::new(RefCell::new(Vec::new()));
        let handler = Box::new(RecordingHandler::new(events.clone()));
        let stream_id = session.new_transaction(handler).unwrap();
        session
            .send_headers(stream_id, &Message::request("GET", "/"), false)
            .unwrap();
        session.send_body(stream_id, &[0u8; 64], true).unwrap();
        assert!(session.is_egress_paused());
        assert!(events.borrow().contains(&"paused".to_owned()));
    }

    #[test]
    fn write_failure_is_fatal_to_all_transactions() {
        let mut session = new_session();
        session.start_now();
        let events = Rc::new(RefCell::new(Vec::new()));
        let handler = Box::new(RecordingHandler::new(events.clone()));
        let stream_id = session.new_transaction(handler).unwrap();
        session
            .send_headers(stream_id, &Message::request("GET", "/"), true)
            .unwrap();
        session.on_write_failed();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(events.borrow().iter().any(|e| e.starts_with("error(")));
    }

    #[test]
    fn drop_connection_closes_and_fails_outstanding_transactions() {
        let mut session = new_session();
        session.start_now();
        let e1 = Rc::new(RefCell::new(Vec::new()));
        let h1 = Box::new(RecordingHandler::new(e1.clone()));
        let id1 = session.new_transaction(h1).unwrap();
        session.send_headers(id1, &Message::request("GET", "/a"), true).unwrap();

        session.drop_connection();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(e1.borrow().iter().any(|e| e.starts_with("error(Dropped")));
    }

    #[test]
    fn idle_timeout_reports_write_timeout_while_egress_still_outstanding() {
        let mut session = new_session();
        session.start_now();
        let events = Rc::new(RefCell::new(Vec::new()));
        let handler = Box::new(RecordingHandler::new(events.clone()));
        let stream_id = session.new_transaction(handler).unwrap();
        // Egress never completes (no `eom`): idling here means our own write stalled.
        session
            .send_headers(stream_id, &Message::request("GET", "/"), false)
            .unwrap();
        session.on_timeout(Timer::Idle { stream_id, epoch: 1 });
        assert!(events.borrow().iter().any(|e| e.starts_with("error(WriteTimeout")));
    }

    #[test]
    fn idle_timeout_reports_read_timeout_once_egress_is_complete() {
        let mut session = new_session();
        session.start_now();
        let events = Rc::new(RefCell::new(Vec::new()));
        let handler = Box::new(RecordingHandler::new(events.clone()));
        let stream_id = session.new_transaction(handler).unwrap();
        // Egress complete, still waiting on a response: idling here means the read stalled.
        session
            .send_headers(stream_id, &Message::request("GET", "/"), true)
            .unwrap();
        session.on_timeout(Timer::Idle { stream_id, epoch: 1 });
        assert!(events.borrow().iter().any(|e| e.starts_with("error(ReadTimeout")));
    }

    #[test]
    fn closing_the_session_emits_a_session_destroyed_event() {
        let mut session = new_session();
        session.start_now();
        session.drop_connection();
        assert!(matches!(session.poll_event(), Some(Event::SessionDestroyed)));
        assert!(session.poll_event().is_none());
    }
}

//! End-to-end scenarios exercising `Session` against the text-based mock codecs, transcribing
//! the walkthroughs from the specification this crate implements: a serial HTTP/1.1 exchange, a
//! multiplexed HTTP/2 exchange with double-GOAWAY narrowing, an in-band upgrade, egress
//! backpressure, server push, and connection-level ingress errors.

use std::cell::RefCell;
use std::rc::Rc;

use assert_matches::assert_matches;
use slog::{o, Logger};

use upstream_session::testing::mock_codec::{MockHttp1Codec, MockHttp2Codec};
use upstream_session::testing::mock_handler::RecordingHandler;
use upstream_session::{Config, Message, NullInfoCallback, Session, SessionState, UpgradeConfig};

fn test_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

fn recording() -> (Rc<RefCell<Vec<String>>>, Box<RecordingHandler>) {
    let events = Rc::new(RefCell::new(Vec::new()));
    (events.clone(), Box::new(RecordingHandler::new(events)))
}

/// Drains every pending `Io::Transmit` into one buffer, acking each as it goes, matching how a
/// real driver would flush before waiting on more ingress.
fn flush(session: &mut Session) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(io) = session.poll_transmit() {
        match io {
            upstream_session::Io::Transmit { data } => {
                let len = data.len();
                out.extend_from_slice(&data);
                session.on_write_complete(len);
            }
            upstream_session::Io::CloseTransport
            | upstream_session::Io::TimerStart { .. }
            | upstream_session::Io::TimerStop { .. } => {}
        }
    }
    out
}

// ---- E1: serial HTTP/1.1 request/response with a chunked body -----------------------------

#[test]
fn e1_http1_request_response_round_trip() {
    let mut session = Session::new(
        Box::new(MockHttp1Codec::new()),
        Config::default().shared(),
        Box::new(NullInfoCallback),
        test_logger(),
    );
    session.start_now();

    let (events, handler) = recording();
    let stream_id = session.new_transaction(handler).expect("first stream always admitted");
    session
        .send_headers(stream_id, &Message::request("GET", "/"), true)
        .unwrap();
    flush(&mut session);

    let wire = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
    let consumed = session.on_ingress(wire).unwrap();
    assert_eq!(consumed, wire.len());

    assert_eq!(
        events.borrow().as_slice(),
        &["headers(Some(200),false)".to_owned(), "body(5)".to_owned(), "eom".to_owned()]
    );
    assert_eq!(session.transaction_count(), 0, "transaction detaches once both directions complete");
}

// ---- E2: multiplexed HTTP/2 exchange with double-GOAWAY narrowing --------------------------

#[test]
fn e2_double_goaway_narrows_survivor_set() {
    let mut session = Session::new(
        Box::new(MockHttp2Codec::new()),
        Config::default().shared(),
        Box::new(NullInfoCallback),
        test_logger(),
    );
    session.start_now();

    let (events_a, handler_a) = recording();
    let id_a = session.new_transaction(handler_a).unwrap();
    session.send_headers(id_a, &Message::request("GET", "/a"), true).unwrap();

    let (events_b, handler_b) = recording();
    let id_b = session.new_transaction(handler_b).unwrap();
    session.send_headers(id_b, &Message::request("GET", "/b"), true).unwrap();
    assert_ne!(id_a, id_b);
    flush(&mut session);

    // First GOAWAY acknowledges both streams; neither should be failed.
    let last_good = id_a.max(id_b);
    session
        .on_ingress(format!("GOAWAY {} NO_ERROR\n", last_good).as_bytes())
        .unwrap();
    assert!(!events_a.borrow().iter().any(|e| e.starts_with("error(")));
    assert!(!events_b.borrow().iter().any(|e| e.starts_with("error(")));
    assert_matches!(session.state(), SessionState::Draining);

    // Second GOAWAY narrows the watermark below the higher-numbered stream: it must now fail.
    let narrower = id_a.min(id_b);
    session
        .on_ingress(format!("GOAWAY {} NO_ERROR\n", narrower).as_bytes())
        .unwrap();

    let (failed_events, survivor_events) = if id_a > id_b {
        (&events_a, &events_b)
    } else {
        (&events_b, &events_a)
    };
    assert!(failed_events.borrow().iter().any(|e| e.starts_with("error(")));
    assert!(!survivor_events.borrow().iter().any(|e| e.starts_with("error(")));
}

// ---- E3: HTTP/1.1 -> HTTP/2 in-band upgrade ------------------------------------------------

#[test]
fn e3_in_band_upgrade_swaps_codec_and_refeeds_trailing_bytes() {
    let upgrade = UpgradeConfig {
        known_protocols: vec!["h2c".to_owned()],
        make_codec: Box::new(|| Box::new(MockHttp2Codec::new()) as Box<dyn upstream_session::Codec>),
    };
    let mut session = Session::new(
        Box::new(MockHttp1Codec::new()),
        Config::default().shared(),
        Box::new(NullInfoCallback),
        test_logger(),
    )
    .with_upgrade(upgrade);
    session.start_now();

    let (events, handler) = recording();
    let stream_id = session.new_transaction(handler).unwrap();
    let request = Message::request("GET", "/").with_header("Upgrade", "h2c");
    session.send_headers(stream_id, &request, true).unwrap();
    flush(&mut session);

    // The 101 response and the first bytes of the new protocol (a HEADERS frame replying on the
    // very same stream) arrive in one read, exercising the codec re-feed path.
    let mut wire = Vec::new();
    wire.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: h2c\r\n\r\n");
    wire.extend_from_slice(format!("HEADERS {} status=200 eom=0\n", stream_id).as_bytes());
    wire.extend_from_slice(format!("DATA {} 2 1\nok\n", stream_id).as_bytes());

    let consumed = session.on_ingress(&wire).unwrap();
    assert_eq!(consumed, wire.len(), "trailing HTTP/2 bytes must be consumed by the swapped-in codec");

    assert_eq!(
        events.borrow().as_slice(),
        &[
            "headers(Some(200),false)".to_owned(),
            "body(2)".to_owned(),
            "eom".to_owned()
        ]
    );
}

// ---- E4: egress backpressure pauses and resumes a transaction ------------------------------

#[test]
fn e4_egress_pause_and_resume() {
    let config = Config {
        write_buffer_limit: 16,
        ..Config::default()
    };
    let mut session = Session::new(
        Box::new(MockHttp1Codec::new()),
        config.shared(),
        Box::new(NullInfoCallback),
        test_logger(),
    );
    session.start_now();

    let (events, handler) = recording();
    let stream_id = session.new_transaction(handler).unwrap();
    session
        .send_headers(stream_id, &Message::request("GET", "/"), false)
        .unwrap();
    session.send_body(stream_id, &[0u8; 64], false).unwrap();
    assert!(session.is_egress_paused());
    assert!(events.borrow().contains(&"paused".to_owned()));

    flush(&mut session);
    assert!(!session.is_egress_paused());
    assert!(events.borrow().contains(&"resumed".to_owned()));
}

// ---- E5: server push refused with no push handler installed --------------------------------

#[test]
fn e5_push_without_handler_factory_is_refused_exactly_once() {
    let mut session = Session::new(
        Box::new(MockHttp2Codec::new()),
        Config::default().shared(),
        Box::new(NullInfoCallback),
        test_logger(),
    );
    session.start_now();

    let (_events, handler) = recording();
    let assoc_id = session.new_transaction(handler).unwrap();
    session
        .send_headers(assoc_id, &Message::request("GET", "/"), true)
        .unwrap();
    flush(&mut session);

    let mut wire = format!("PUSH_PROMISE 2 assoc={}\n", assoc_id);
    wire.push_str("HEADERS 2 status=200 eom=0\n");
    session.on_ingress(wire.as_bytes()).unwrap();
    let out = flush(&mut session);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text.matches("RST_STREAM 2 REFUSED_STREAM").count(),
        1,
        "no handler factory installed: push must be refused, not silently dropped"
    );
}

// ---- E5b: server push with an unknown associated stream is reset, control stream unaffected -

#[test]
fn e5b_push_with_invalid_assoc_stream_is_reset_with_protocol_error() {
    let mut session = Session::new(
        Box::new(MockHttp2Codec::new()),
        Config::default().shared(),
        Box::new(NullInfoCallback),
        test_logger(),
    );
    session.start_now();

    let (events, handler) = recording();
    let control_id = session.new_transaction(handler).unwrap();
    session
        .send_headers(control_id, &Message::request("GET", "/"), true)
        .unwrap();
    flush(&mut session);

    let mut wire = String::new();
    wire.push_str("PUSH_PROMISE 3 assoc=5\n");
    wire.push_str(&format!("HEADERS {} status=200 eom=0\n", control_id));
    wire.push_str(&format!("DATA {} 0 1\n\n", control_id));
    session.on_ingress(wire.as_bytes()).unwrap();

    let out = flush(&mut session);
    let text = String::from_utf8(out).unwrap();
    assert!(
        text.contains("RST_STREAM 3 PROTOCOL_ERROR"),
        "pushed stream with an unresolvable associated stream must be reset"
    );
    assert_eq!(
        events.borrow().as_slice(),
        &["headers(Some(200),false)".to_owned(), "eom".to_owned()],
        "control stream completes normally despite the sibling push being refused"
    );
    assert_eq!(session.transaction_count(), 0);
}

// ---- E6: HTTP/1.1 100-continue interim response does not complete the transaction ----------

#[test]
fn e6_100_continue_then_final_response() {
    let mut session = Session::new(
        Box::new(MockHttp1Codec::new()),
        Config::default().shared(),
        Box::new(NullInfoCallback),
        test_logger(),
    );
    session.start_now();

    let (events, handler) = recording();
    let stream_id = session.new_transaction(handler).unwrap();
    session
        .send_headers(stream_id, &Message::request("POST", "/upload"), false)
        .unwrap();
    flush(&mut session);

    session.on_ingress(b"HTTP/1.1 100 Continue\r\n\r\n").unwrap();
    assert_eq!(events.borrow().as_slice(), &["headers(Some(100),false)".to_owned()]);

    session.send_eom(stream_id).unwrap();
    flush(&mut session);
    session
        .on_ingress(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
        .unwrap();

    assert_eq!(
        events.borrow().as_slice(),
        &[
            "headers(Some(100),false)".to_owned(),
            "headers(Some(204),false)".to_owned(),
            "eom".to_owned()
        ]
    );
    assert_eq!(session.transaction_count(), 0);
}

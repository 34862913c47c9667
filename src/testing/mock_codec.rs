//! Minimal `Codec` test doubles driving the §8 end-to-end scenarios without a real HPACK/HTTP2
//! implementation, which §1 places out of scope ("the concrete wire codecs ... are external
//! collaborators"). No teacher analogue ships in the retrieved pack; grounded on the general
//! "mock transport/codec for tests" pattern used across the `other_examples` HTTP/2 crates (e.g.
//! `h2`'s `io::Mock`).
//!
//! `MockHttp1Codec` parses real (if simplified: no trailers, no obs-fold) HTTP/1.1 response text,
//! since §8's literal scenarios spell out exact wire bytes for that protocol. `MockHttp2Codec`
//! speaks a small newline-delimited text framing of its own instead of binary HTTP/2, since framing
//! format is exactly the kind of thing that's out of scope to implement for real, so the mock
//! just needs *a* multiplexed, priority/flow-control-capable wire shape, not *the* HTTP/2 one.

use bytes::{Bytes, BytesMut};

use crate::codec::{Codec, ErrorCode, IngressEvent, IngressOutcome, Message, Protocol, Settings, StartLine};
use crate::priority::PriorityUpdate;

// ---- HTTP/1.x-ish -------------------------------------------------------------------------

/// Drives the HTTP/1.1 scenarios (E1, E3's pre-upgrade leg, E6). Serial: exactly one response is
/// expected in flight at a time, correlated to whichever stream id last had headers written for
/// it (`current_stream`), matching `Session`'s own refusal to mint a second stream id on a
/// non-parallel codec.
pub struct MockHttp1Codec {
    current_stream: Option<u32>,
    next_stream_id: u32,
}

impl MockHttp1Codec {
    pub fn new() -> Self {
        MockHttp1Codec {
            current_stream: None,
            next_stream_id: 1,
        }
    }

    /// Parses one complete HTTP/1.1 response (status line, headers, and whatever body framing
    /// its headers declare) starting at the front of `buf`. Returns `None` if `buf` doesn't yet
    /// contain a complete message, so the caller can wait for more bytes rather than misparse a
    /// partial one.
    fn try_parse_message(buf: &[u8]) -> Option<ParsedMessage> {
        let header_end = find_subslice(buf, b"\r\n\r\n")?;
        let head = std::str::from_utf8(&buf[..header_end]).ok()?;
        let mut lines = head.split("\r\n");
        let status_line = lines.next()?;
        let mut parts = status_line.split_whitespace();
        let _version = parts.next()?;
        let status: u16 = parts.next()?.parse().ok()?;

        let mut headers = Vec::new();
        let mut chunked = false;
        let mut content_length: Option<usize> = None;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let mut split = line.splitn(2, ':');
            let name = split.next()?.trim().to_owned();
            let value = split.next().unwrap_or("").trim().to_owned();
            if name.eq_ignore_ascii_case("Transfer-Encoding") && value.eq_ignore_ascii_case("chunked") {
                chunked = true;
            }
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = value.parse().ok();
            }
            headers.push((name, value));
        }

        let body_start = header_end + 4;

        // Informational responses (100 Continue, and 101 Switching Protocols, which `Session`
        // intercepts before it ever reaches a transaction) never carry a body.
        if (100..200).contains(&status) {
            return Some(ParsedMessage {
                consumed: body_start,
                status,
                headers,
                body: None,
            });
        }

        if chunked {
            let (len, data) = parse_chunked(&buf[body_start..])?;
            return Some(ParsedMessage {
                consumed: body_start + len,
                status,
                headers,
                body: Some(data),
            });
        }

        if let Some(n) = content_length {
            if buf.len() < body_start + n {
                return None;
            }
            return Some(ParsedMessage {
                consumed: body_start + n,
                status,
                headers,
                body: Some(Bytes::copy_from_slice(&buf[body_start..body_start + n])),
            });
        }

        Some(ParsedMessage {
            consumed: body_start,
            status,
            headers,
            body: Some(Bytes::new()),
        })
    }
}

struct ParsedMessage {
    consumed: usize,
    status: u16,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Chunked-transfer body parser: `<hex-size>\r\n<data>\r\n` repeated, terminated by a zero-size
/// chunk and its trailing `\r\n` (no trailer headers, matching the literal `"0\r\n\r\n"` in §8's
/// E1). Returns `None` on a short buffer so the caller waits for more bytes.
fn parse_chunked(buf: &[u8]) -> Option<(usize, Bytes)> {
    let mut pos = 0usize;
    let mut data = BytesMut::new();
    loop {
        let line_end = find_subslice(&buf[pos..], b"\r\n")?;
        let size_str = std::str::from_utf8(&buf[pos..pos + line_end]).ok()?;
        let size = u64::from_str_radix(size_str.trim(), 16).ok()? as usize;
        pos += line_end + 2;
        if size == 0 {
            if buf.len() < pos + 2 || &buf[pos..pos + 2] != b"\r\n" {
                return None;
            }
            pos += 2;
            return Some((pos, data.freeze()));
        }
        if buf.len() < pos + size + 2 {
            return None;
        }
        data.extend_from_slice(&buf[pos..pos + size]);
        pos += size;
        if &buf[pos..pos + 2] != b"\r\n" {
            return None;
        }
        pos += 2;
    }
}

impl Codec for MockHttp1Codec {
    fn protocol(&self) -> Protocol {
        Protocol::Http1
    }

    fn generate_connection_preface(&mut self, _out: &mut BytesMut) {}
    fn generate_settings(&mut self, _out: &mut BytesMut) {}
    fn generate_settings_ack(&mut self, _out: &mut BytesMut) {}

    fn generate_header(&mut self, stream_id: u32, msg: &Message, eom: bool, out: &mut BytesMut) {
        self.current_stream = Some(stream_id);
        match &msg.start {
            StartLine::Request { method, path } => {
                out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", method, path).as_bytes());
            }
            StartLine::Response { status } => {
                out.extend_from_slice(format!("HTTP/1.1 {}\r\n", status).as_bytes());
            }
        }
        for (name, value) in &msg.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        if !eom {
            out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
        }
        out.extend_from_slice(b"\r\n");
    }

    fn generate_ex_header(
        &mut self,
        _stream_id: u32,
        _msg: &Message,
        _control_stream_id: u32,
        _eom: bool,
        _out: &mut BytesMut,
    ) {
        // HTTP/1.x has no concept of an exchanged stream; never invoked by `Session` for this
        // codec's protocol.
    }

    fn generate_push_promise(&mut self, _stream_id: u32, _assoc_stream_id: u32, _msg: &Message, _out: &mut BytesMut) {}

    fn generate_body(&mut self, _stream_id: u32, buf: &[u8], _padding: u8, eom: bool, out: &mut BytesMut) {
        out.extend_from_slice(format!("{:x}\r\n", buf.len()).as_bytes());
        out.extend_from_slice(buf);
        out.extend_from_slice(b"\r\n");
        if eom {
            out.extend_from_slice(b"0\r\n\r\n");
        }
    }

    fn generate_eom(&mut self, _stream_id: u32, out: &mut BytesMut) {
        out.extend_from_slice(b"0\r\n\r\n");
    }

    fn generate_rst_stream(&mut self, _stream_id: u32, _code: ErrorCode, _out: &mut BytesMut) {}
    fn generate_goaway(&mut self, _last_good: u32, _code: ErrorCode, _out: &mut BytesMut) {}
    fn generate_window_update(&mut self, _stream_id: u32, _delta: u32, _out: &mut BytesMut) {}
    fn generate_priority(&mut self, _stream_id: u32, _update: PriorityUpdate, _out: &mut BytesMut) {}

    fn map_priority_to_dependency(&self, _level: u8) -> PriorityUpdate {
        PriorityUpdate::new(0, false, 1)
    }

    fn create_stream(&mut self) -> u32 {
        let id = self.next_stream_id;
        self.next_stream_id += 2;
        id
    }

    fn on_ingress(&mut self, buf: &[u8]) -> IngressOutcome {
        let mut pos = 0usize;
        let mut events = Vec::new();
        loop {
            let parsed = match Self::try_parse_message(&buf[pos..]) {
                Some(p) => p,
                None => break,
            };
            let stream_id = match self.current_stream {
                Some(id) => id,
                None => break,
            };
            let mut msg = Message::response(parsed.status);
            for (name, value) in parsed.headers {
                msg = msg.with_header(&name, &value);
            }
            events.push(IngressEvent::HeadersComplete {
                stream_id,
                msg,
                eom: false,
            });
            pos += parsed.consumed;

            if parsed.status == 101 {
                // Switching protocols: stop here and leave the rest of `buf` (which belongs to
                // whatever protocol we're switching to) unconsumed for `Session` to re-feed to
                // the new codec.
                break;
            }
            if (100..200).contains(&parsed.status) {
                // 100 Continue: more is coming for the same transaction; keep parsing `buf` in
                // case the final response is already in hand too (§4.2's E6).
                continue;
            }

            if let Some(data) = parsed.body {
                if !data.is_empty() {
                    events.push(IngressEvent::Body { stream_id, data });
                }
            }
            events.push(IngressEvent::MessageComplete { stream_id });
            break;
        }
        IngressOutcome { consumed: pos, events }
    }
}

// ---- HTTP/2-ish ---------------------------------------------------------------------------

/// Drives the multiplexed scenarios (E2, E3's post-upgrade leg, E4, E5). Speaks a newline-framed
/// text protocol instead of real HTTP/2 binary framing (out of scope per §1), but exercises the
/// same multiplexing, GOAWAY, RST_STREAM, and flow-control surface a real HTTP/2 codec would.
pub struct MockHttp2Codec {
    next_stream_id: u32,
}

impl MockHttp2Codec {
    pub fn new() -> Self {
        MockHttp2Codec { next_stream_id: 1 }
    }
}

fn parse_error_code(name: &str) -> ErrorCode {
    match name {
        "NO_ERROR" => ErrorCode::NoError,
        "PROTOCOL_ERROR" => ErrorCode::ProtocolError,
        "REFUSED_STREAM" => ErrorCode::RefusedStream,
        "CANCEL" => ErrorCode::Cancel,
        "INTERNAL_ERROR" => ErrorCode::InternalError,
        "FLOW_CONTROL_ERROR" => ErrorCode::FlowControlError,
        other => match other.strip_prefix("0x").and_then(|hex| u32::from_str_radix(hex, 16).ok()) {
            Some(code) => ErrorCode::Other(code),
            None => ErrorCode::Other(0),
        },
    }
}

impl Codec for MockHttp2Codec {
    fn protocol(&self) -> Protocol {
        Protocol::Http2
    }

    fn generate_connection_preface(&mut self, out: &mut BytesMut) {
        out.extend_from_slice(b"PRI * HTTP/2.0\n");
    }
    fn generate_settings(&mut self, out: &mut BytesMut) {
        out.extend_from_slice(b"SETTINGS\n");
    }
    fn generate_settings_ack(&mut self, out: &mut BytesMut) {
        out.extend_from_slice(b"SETTINGS_ACK\n");
    }

    fn generate_header(&mut self, stream_id: u32, msg: &Message, eom: bool, out: &mut BytesMut) {
        let line = match &msg.start {
            StartLine::Request { method, path } => {
                format!("HEADERS {} method={} path={} eom={}\n", stream_id, method, path, eom as u8)
            }
            StartLine::Response { status } => format!("HEADERS {} status={} eom={}\n", stream_id, status, eom as u8),
        };
        out.extend_from_slice(line.as_bytes());
    }

    fn generate_ex_header(
        &mut self,
        stream_id: u32,
        msg: &Message,
        control_stream_id: u32,
        eom: bool,
        out: &mut BytesMut,
    ) {
        let status = msg.status().unwrap_or(0);
        let line = format!(
            "EXHEADERS {} control={} status={} eom={}\n",
            stream_id, control_stream_id, status, eom as u8
        );
        out.extend_from_slice(line.as_bytes());
    }

    fn generate_push_promise(&mut self, stream_id: u32, assoc_stream_id: u32, _msg: &Message, out: &mut BytesMut) {
        out.extend_from_slice(format!("PUSH_PROMISE {} assoc={}\n", stream_id, assoc_stream_id).as_bytes());
    }

    fn generate_body(&mut self, stream_id: u32, buf: &[u8], _padding: u8, eom: bool, out: &mut BytesMut) {
        out.extend_from_slice(format!("DATA {} {} {}\n", stream_id, buf.len(), eom as u8).as_bytes());
        out.extend_from_slice(buf);
        out.extend_from_slice(b"\n");
    }

    fn generate_eom(&mut self, stream_id: u32, out: &mut BytesMut) {
        out.extend_from_slice(format!("DATA {} 0 1\n\n", stream_id).as_bytes());
    }

    fn generate_rst_stream(&mut self, stream_id: u32, code: ErrorCode, out: &mut BytesMut) {
        out.extend_from_slice(format!("RST_STREAM {} {}\n", stream_id, code.name()).as_bytes());
    }

    fn generate_goaway(&mut self, last_good: u32, code: ErrorCode, out: &mut BytesMut) {
        out.extend_from_slice(format!("GOAWAY {} {}\n", last_good, code.name()).as_bytes());
    }

    fn generate_window_update(&mut self, stream_id: u32, delta: u32, out: &mut BytesMut) {
        out.extend_from_slice(format!("WINDOW_UPDATE {} {}\n", stream_id, delta).as_bytes());
    }

    fn generate_priority(&mut self, stream_id: u32, update: PriorityUpdate, out: &mut BytesMut) {
        out.extend_from_slice(
            format!(
                "PRIORITY {} parent={} weight={} exclusive={}\n",
                stream_id, update.parent_id, update.weight, update.exclusive as u8
            )
            .as_bytes(),
        );
    }

    fn map_priority_to_dependency(&self, _level: u8) -> PriorityUpdate {
        PriorityUpdate::new(0, false, 16)
    }

    fn create_stream(&mut self) -> u32 {
        let id = self.next_stream_id;
        self.next_stream_id += 2;
        id
    }

    fn on_ingress(&mut self, buf: &[u8]) -> IngressOutcome {
        let mut pos = 0usize;
        let mut events = Vec::new();
        loop {
            let rest = &buf[pos..];
            let nl = match rest.iter().position(|&b| b == b'\n') {
                Some(i) => i,
                None => break,
            };
            let line = match std::str::from_utf8(&rest[..nl]) {
                Ok(s) => s,
                Err(_) => break,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                pos += nl + 1;
                continue;
            }
            match tokens[0] {
                "DATA" => {
                    if tokens.len() < 4 {
                        break;
                    }
                    let sid: u32 = match tokens[1].parse() {
                        Ok(v) => v,
                        Err(_) => break,
                    };
                    let len: usize = match tokens[2].parse() {
                        Ok(v) => v,
                        Err(_) => break,
                    };
                    let eom = tokens[3] == "1";
                    let payload_start = pos + nl + 1;
                    let payload_end = payload_start + len;
                    if buf.len() < payload_end + 1 || buf[payload_end] != b'\n' {
                        break;
                    }
                    if len > 0 {
                        events.push(IngressEvent::Body {
                            stream_id: sid,
                            data: Bytes::copy_from_slice(&buf[payload_start..payload_end]),
                        });
                    }
                    if eom {
                        events.push(IngressEvent::MessageComplete { stream_id: sid });
                    }
                    pos = payload_end + 1;
                }
                "HEADERS" => {
                    if tokens.len() < 2 {
                        pos += nl + 1;
                        continue;
                    }
                    let sid: u32 = tokens[1].parse().unwrap_or(0);
                    let mut status = 0u16;
                    for tok in &tokens[2..] {
                        if let Some(v) = tok.strip_prefix("status=") {
                            status = v.parse().unwrap_or(0);
                        }
                    }
                    events.push(IngressEvent::HeadersComplete {
                        stream_id: sid,
                        msg: Message::response(status),
                        eom: false,
                    });
                    pos += nl + 1;
                }
                "EXHEADERS" => {
                    if tokens.len() < 2 {
                        pos += nl + 1;
                        continue;
                    }
                    let sid: u32 = tokens[1].parse().unwrap_or(0);
                    let mut control = 0u32;
                    let mut status = 0u16;
                    for tok in &tokens[2..] {
                        if let Some(v) = tok.strip_prefix("control=") {
                            control = v.parse().unwrap_or(0);
                        }
                        if let Some(v) = tok.strip_prefix("status=") {
                            status = v.parse().unwrap_or(0);
                        }
                    }
                    events.push(IngressEvent::ExHeadersComplete {
                        stream_id: sid,
                        control_stream_id: control,
                        msg: Message::response(status),
                        eom: false,
                    });
                    pos += nl + 1;
                }
                "PUSH_PROMISE" => {
                    if tokens.len() < 2 {
                        pos += nl + 1;
                        continue;
                    }
                    let sid: u32 = tokens[1].parse().unwrap_or(0);
                    let mut assoc = 0u32;
                    for tok in &tokens[2..] {
                        if let Some(v) = tok.strip_prefix("assoc=") {
                            assoc = v.parse().unwrap_or(0);
                        }
                    }
                    events.push(IngressEvent::PushMessageBegin {
                        stream_id: sid,
                        assoc_stream_id: assoc,
                    });
                    pos += nl + 1;
                }
                "GOAWAY" => {
                    if tokens.len() < 3 {
                        pos += nl + 1;
                        continue;
                    }
                    let last_good: u32 = tokens[1].parse().unwrap_or(0);
                    let code = parse_error_code(tokens[2]);
                    events.push(IngressEvent::Goaway {
                        last_good,
                        error_code: code,
                    });
                    pos += nl + 1;
                }
                "RST_STREAM" => {
                    if tokens.len() < 3 {
                        pos += nl + 1;
                        continue;
                    }
                    let sid: u32 = tokens[1].parse().unwrap_or(0);
                    let code = parse_error_code(tokens[2]);
                    events.push(IngressEvent::Abort { stream_id: sid, code });
                    pos += nl + 1;
                }
                "WINDOW_UPDATE" => {
                    if tokens.len() < 3 {
                        pos += nl + 1;
                        continue;
                    }
                    let sid: u32 = tokens[1].parse().unwrap_or(0);
                    let delta: u32 = tokens[2].parse().unwrap_or(0);
                    events.push(IngressEvent::WindowUpdate {
                        stream_id: if sid == 0 { None } else { Some(sid) },
                        delta,
                    });
                    pos += nl + 1;
                }
                "SETTINGS" => {
                    let mut settings = Settings::default();
                    for tok in &tokens[1..] {
                        if let Some(v) = tok.strip_prefix("max_concurrent=") {
                            settings.max_concurrent_streams = v.parse().ok();
                        }
                        if let Some(v) = tok.strip_prefix("initial_window=") {
                            settings.initial_window_size = v.parse().ok();
                        }
                    }
                    events.push(IngressEvent::Settings { settings });
                    pos += nl + 1;
                }
                "SETTINGS_ACK" => {
                    events.push(IngressEvent::SettingsAck);
                    pos += nl + 1;
                }
                _ => {
                    pos += nl + 1;
                }
            }
        }
        IngressOutcome { consumed: pos, events }
    }
}

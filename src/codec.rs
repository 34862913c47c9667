//! The codec boundary (§6): out of scope to implement (HPACK/frame parsing, chunked encoding,
//! SPDY framing are external collaborators), but fully specified here as a narrow trait the
//! session drives. Modeled on the teacher's `Crypto`/`TlsSession` split: a small closed set of
//! protocol variants behind one capability set, rather than open polymorphism (§9 design note).

use bytes::{Bytes, BytesMut};

/// Which of the three wire protocols a codec instance speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http1,
    Spdy3,
    Http2,
}

impl Protocol {
    /// HTTP/1.x is serial; SPDY/3.x and HTTP/2 multiplex with priority and flow control.
    pub fn is_multiplexed(self) -> bool {
        match self {
            Protocol::Http1 => false,
            Protocol::Spdy3 | Protocol::Http2 => true,
        }
    }

    pub fn supports_flow_control(self) -> bool {
        match self {
            Protocol::Http1 => false,
            Protocol::Spdy3 | Protocol::Http2 => true,
        }
    }
}

/// Error codes carried on RST_STREAM / GOAWAY, collapsed to the subset this crate's session logic
/// cares about (§7); codecs may map their own wire error spaces onto this one or `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    RefusedStream,
    Cancel,
    InternalError,
    FlowControlError,
    Other(u32),
}

impl ErrorCode {
    pub fn is_no_error(self) -> bool {
        self == ErrorCode::NoError
    }

    /// A human name suitable for the `" with codec error: <name>"` suffix in §7.
    pub fn name(self) -> String {
        match self {
            ErrorCode::NoError => "NO_ERROR".to_owned(),
            ErrorCode::ProtocolError => "PROTOCOL_ERROR".to_owned(),
            ErrorCode::RefusedStream => "REFUSED_STREAM".to_owned(),
            ErrorCode::Cancel => "CANCEL".to_owned(),
            ErrorCode::InternalError => "INTERNAL_ERROR".to_owned(),
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR".to_owned(),
            ErrorCode::Other(n) => format!("0x{:x}", n),
        }
    }
}

/// Start line of a message: either an outgoing request or an incoming response/push-promise.
#[derive(Debug, Clone)]
pub enum StartLine {
    Request { method: String, path: String },
    Response { status: u16 },
}

/// A header/status line plus header fields, codec-agnostic (HPACK vs. text is the codec's job).
#[derive(Debug, Clone)]
pub struct Message {
    pub start: StartLine,
    pub headers: Vec<(String, String)>,
}

impl Message {
    pub fn request(method: &str, path: &str) -> Self {
        Message {
            start: StartLine::Request {
                method: method.to_owned(),
                path: path.to_owned(),
            },
            headers: Vec::new(),
        }
    }

    pub fn response(status: u16) -> Self {
        Message {
            start: StartLine::Response { status },
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn status(&self) -> Option<u16> {
        match self.start {
            StartLine::Response { status } => Some(status),
            _ => None,
        }
    }

    pub fn is_informational(&self) -> bool {
        self.status().map_or(false, |s| s >= 100 && s < 200)
    }
}

/// Peer-advertised SETTINGS this crate's session logic reacts to; codecs may track a richer set
/// internally but only report the fields that drive session behavior.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub initial_window_size: Option<u32>,
    pub max_concurrent_streams: Option<u32>,
}

/// Tagged ingress events a codec produces from inbound bytes (§4.1, §6). Deliberately a plain
/// enum rather than a callback-object boundary: "ingress is just tagged events" (§9).
#[derive(Debug, Clone)]
pub enum IngressEvent {
    HeadersComplete {
        stream_id: u32,
        msg: Message,
        eom: bool,
    },
    PushMessageBegin {
        stream_id: u32,
        assoc_stream_id: u32,
    },
    ExHeadersComplete {
        stream_id: u32,
        control_stream_id: u32,
        msg: Message,
        eom: bool,
    },
    Body {
        stream_id: u32,
        data: Bytes,
    },
    ChunkHeader {
        stream_id: u32,
        len: u64,
    },
    ChunkComplete {
        stream_id: u32,
    },
    Trailers {
        stream_id: u32,
        headers: Vec<(String, String)>,
    },
    MessageComplete {
        stream_id: u32,
    },
    Goaway {
        last_good: u32,
        error_code: ErrorCode,
    },
    Settings {
        settings: Settings,
    },
    SettingsAck,
    WindowUpdate {
        stream_id: Option<u32>,
        delta: u32,
    },
    Abort {
        stream_id: u32,
        code: ErrorCode,
    },
    Error {
        stream_id: Option<u32>,
        message: String,
        is_new: bool,
    },
    PingRequest {
        opaque: u64,
    },
    PingReply {
        opaque: u64,
    },
}

/// Outcome of feeding bytes to a codec: how many were consumed, and what ingress events resulted.
#[derive(Debug, Default)]
pub struct IngressOutcome {
    pub consumed: usize,
    pub events: Vec<IngressEvent>,
}

/// The codec interface the session consumes (§6). A codec is an external collaborator: this
/// crate defines the boundary only, per the Non-goals (HPACK dynamic table policy, chunked
/// encoding, SPDY framing are all out of scope to implement).
pub trait Codec {
    fn protocol(&self) -> Protocol;

    fn generate_connection_preface(&mut self, out: &mut BytesMut);
    fn generate_settings(&mut self, out: &mut BytesMut);
    fn generate_settings_ack(&mut self, out: &mut BytesMut);

    fn generate_header(&mut self, stream_id: u32, msg: &Message, eom: bool, out: &mut BytesMut);
    fn generate_ex_header(
        &mut self,
        stream_id: u32,
        msg: &Message,
        control_stream_id: u32,
        eom: bool,
        out: &mut BytesMut,
    );
    fn generate_push_promise(
        &mut self,
        stream_id: u32,
        assoc_stream_id: u32,
        msg: &Message,
        out: &mut BytesMut,
    );
    fn generate_body(&mut self, stream_id: u32, buf: &[u8], padding: u8, eom: bool, out: &mut BytesMut);
    fn generate_eom(&mut self, stream_id: u32, out: &mut BytesMut);
    fn generate_rst_stream(&mut self, stream_id: u32, code: ErrorCode, out: &mut BytesMut);
    fn generate_goaway(&mut self, last_good: u32, code: ErrorCode, out: &mut BytesMut);
    fn generate_window_update(&mut self, stream_id: u32, delta: u32, out: &mut BytesMut);
    fn generate_priority(&mut self, stream_id: u32, update: crate::priority::PriorityUpdate, out: &mut BytesMut);

    fn map_priority_to_dependency(&self, level: u8) -> crate::priority::PriorityUpdate;

    /// Mints the next stream id this codec would assign to a locally-initiated transaction,
    /// without side effects beyond the codec's own counter.
    fn create_stream(&mut self) -> u32;

    /// Feeds inbound bytes; returns how many were consumed and what ingress events resulted.
    fn on_ingress(&mut self, buf: &[u8]) -> IngressOutcome;

    fn supports_parallel_requests(&self) -> bool {
        self.protocol().is_multiplexed()
    }
    fn supports_stream_flow_control(&self) -> bool {
        self.protocol().supports_flow_control()
    }
    fn default_window_size(&self) -> u32 {
        crate::config::DEFAULT_INITIAL_WINDOW
    }
    fn is_reusable(&self) -> bool {
        true
    }
    fn is_waiting_to_drain(&self) -> bool {
        false
    }
}

use std::fmt;

/// Which direction of a transaction an error applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Ingress => write!(f, "ingress"),
            Direction::Egress => write!(f, "egress"),
            Direction::Both => write!(f, "ingress+egress"),
        }
    }
}

/// The kinds of error a transaction or the session may surface.
///
/// Message format is always `"<Kind> on transaction id: <N>"`, optionally suffixed with a codec
/// detail string (see `SessionError::with_detail`).
#[derive(Debug, Clone, Fail)]
pub enum SessionError {
    #[fail(display = "StreamUnacknowledged on transaction id: {}{}", stream_id, detail)]
    StreamUnacknowledged {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "WriteTimeout on transaction id: {}{}", stream_id, detail)]
    WriteTimeout {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "ReadTimeout on transaction id: {}{}", stream_id, detail)]
    ReadTimeout {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "ParseHeader on transaction id: {}{}", stream_id, detail)]
    ParseHeader {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "IngressStateTransition on transaction id: {}{}", stream_id, detail)]
    IngressStateTransition {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "Dropped on transaction id: {}{}", stream_id, detail)]
    Dropped {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "ClientRenegotiation on transaction id: {}{}", stream_id, detail)]
    ClientRenegotiation {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "ProtocolError on transaction id: {}{}", stream_id, detail)]
    ProtocolError {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "RefusedStream on transaction id: {}{}", stream_id, detail)]
    RefusedStream {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
    #[fail(display = "ConnectionReset on transaction id: {}{}", stream_id, detail)]
    ConnectionReset {
        stream_id: u32,
        direction: Direction,
        detail: Detail,
    },
}

/// Optional `" with codec error: <name>"` suffix appended to an error's `Display` output.
#[derive(Debug, Clone, Default)]
pub struct Detail(pub Option<String>);

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, " with codec error: {}", name),
            None => Ok(()),
        }
    }
}

impl SessionError {
    pub fn stream_id(&self) -> u32 {
        match self {
            SessionError::StreamUnacknowledged { stream_id, .. }
            | SessionError::WriteTimeout { stream_id, .. }
            | SessionError::ReadTimeout { stream_id, .. }
            | SessionError::ParseHeader { stream_id, .. }
            | SessionError::IngressStateTransition { stream_id, .. }
            | SessionError::Dropped { stream_id, .. }
            | SessionError::ClientRenegotiation { stream_id, .. }
            | SessionError::ProtocolError { stream_id, .. }
            | SessionError::RefusedStream { stream_id, .. }
            | SessionError::ConnectionReset { stream_id, .. } => *stream_id,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            SessionError::StreamUnacknowledged { direction, .. }
            | SessionError::WriteTimeout { direction, .. }
            | SessionError::ReadTimeout { direction, .. }
            | SessionError::ParseHeader { direction, .. }
            | SessionError::IngressStateTransition { direction, .. }
            | SessionError::Dropped { direction, .. }
            | SessionError::ClientRenegotiation { direction, .. }
            | SessionError::ProtocolError { direction, .. }
            | SessionError::RefusedStream { direction, .. }
            | SessionError::ConnectionReset { direction, .. } => *direction,
        }
    }

    pub fn stream_unacknowledged(stream_id: u32) -> Self {
        SessionError::StreamUnacknowledged {
            stream_id,
            direction: Direction::Both,
            detail: Detail(None),
        }
    }

    pub fn stream_unacknowledged_with_codec_error(stream_id: u32, codec_error: &str) -> Self {
        SessionError::StreamUnacknowledged {
            stream_id,
            direction: Direction::Both,
            detail: Detail(Some(codec_error.to_owned())),
        }
    }

    pub fn dropped(stream_id: u32) -> Self {
        SessionError::Dropped {
            stream_id,
            direction: Direction::Both,
            detail: Detail(None),
        }
    }

    pub fn ingress_state_transition(stream_id: u32) -> Self {
        SessionError::IngressStateTransition {
            stream_id,
            direction: Direction::Ingress,
            detail: Detail(None),
        }
    }

    pub fn write_timeout(stream_id: u32) -> Self {
        SessionError::WriteTimeout {
            stream_id,
            direction: Direction::Egress,
            detail: Detail(None),
        }
    }

    pub fn read_timeout(stream_id: u32) -> Self {
        SessionError::ReadTimeout {
            stream_id,
            direction: Direction::Ingress,
            detail: Detail(None),
        }
    }

    pub fn connection_reset(stream_id: u32) -> Self {
        SessionError::ConnectionReset {
            stream_id,
            direction: Direction::Both,
            detail: Detail(None),
        }
    }

    pub fn parse_header(stream_id: u32) -> Self {
        SessionError::ParseHeader {
            stream_id,
            direction: Direction::Ingress,
            detail: Detail(None),
        }
    }

    pub fn parse_header_with_detail(stream_id: u32, detail: &str) -> Self {
        SessionError::ParseHeader {
            stream_id,
            direction: Direction::Ingress,
            detail: Detail(Some(detail.to_owned())),
        }
    }

    pub fn protocol_error(stream_id: u32) -> Self {
        SessionError::ProtocolError {
            stream_id,
            direction: Direction::Both,
            detail: Detail(None),
        }
    }

    pub fn refused_stream(stream_id: u32) -> Self {
        SessionError::RefusedStream {
            stream_id,
            direction: Direction::Ingress,
            detail: Detail(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_grammar_matches_spec() {
        let e = SessionError::stream_unacknowledged(3);
        assert_eq!(e.to_string(), "StreamUnacknowledged on transaction id: 3");
    }

    #[test]
    fn message_grammar_with_codec_detail() {
        let e = SessionError::stream_unacknowledged_with_codec_error(3, "ENHANCE_YOUR_CALM");
        assert_eq!(
            e.to_string(),
            "StreamUnacknowledged on transaction id: 3 with codec error: ENHANCE_YOUR_CALM"
        );
    }
}

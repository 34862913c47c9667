use crate::codec::Message;
use crate::error::SessionError;

/// Transient state object holding the pre-upgrade codec's single transaction while the
/// post-upgrade codec takes over (§4.2). Grounded on the teacher's `mem::replace(self, new)`
/// codec-swap in `Connection::handle_connected_inner`'s `Header::Retry` arm, which discards one
/// transport-layer state wholesale in favor of a freshly constructed one while preserving the
/// stream-0 handshake transaction across the swap.
#[derive(Debug)]
pub struct UpgradeBridge {
    offered_protocol: String,
    pre_upgrade_stream_id: u32,
    armed: bool,
}

impl UpgradeBridge {
    /// Parses an `Upgrade:` header value (`<token>[, <token>]*`, possibly with stray whitespace
    /// and unknown tokens) and picks the first token the session supports. Case-insensitive, per
    /// §6.
    pub fn pick_offered_protocol(header_value: &str, known_protocols: &[&str]) -> Option<String> {
        header_value
            .split(',')
            .map(|tok| tok.trim())
            .filter(|tok| !tok.is_empty())
            .find_map(|tok| {
                known_protocols
                    .iter()
                    .find(|known| known.eq_ignore_ascii_case(tok))
                    .map(|known| (*known).to_owned())
            })
    }

    /// Arms the bridge: the session has sent an `Upgrade:` request naming a known protocol on
    /// `pre_upgrade_stream_id`, and must now cap outgoing streams at 1 until the exchange
    /// resolves (§4.2).
    pub fn arm(offered_protocol: String, pre_upgrade_stream_id: u32) -> Self {
        UpgradeBridge {
            offered_protocol,
            pre_upgrade_stream_id,
            armed: true,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn pre_upgrade_stream_id(&self) -> u32 {
        self.pre_upgrade_stream_id
    }

    pub fn offered_protocol(&self) -> &str {
        &self.offered_protocol
    }

    /// Validates a `101 Switching Protocols` response against the offered protocol. The
    /// `Upgrade:` response header MUST be present and MUST name the protocol we offered (§4.2,
    /// §6); anything else is an ingress error that closes the session.
    pub fn validate_switching_protocols(&self, msg: &Message) -> Result<(), SessionError> {
        match msg.header("Upgrade") {
            Some(value) if value.trim().eq_ignore_ascii_case(&self.offered_protocol) => Ok(()),
            Some(_) => Err(SessionError::ingress_state_transition(self.pre_upgrade_stream_id)),
            None => Err(SessionError::ingress_state_transition(self.pre_upgrade_stream_id)),
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_supported_token_case_insensitively_with_whitespace() {
        let picked = UpgradeBridge::pick_offered_protocol(" nonsense , H2C ,websocket", &["h2c"]);
        assert_eq!(picked.as_deref(), Some("h2c"));
    }

    #[test]
    fn no_supported_token_yields_none() {
        let picked = UpgradeBridge::pick_offered_protocol("websocket", &["h2c"]);
        assert_eq!(picked, None);
    }

    #[test]
    fn switching_protocols_requires_matching_upgrade_header() {
        let bridge = UpgradeBridge::arm("h2c".to_owned(), 1);
        let ok = Message::response(101).with_header("Upgrade", "h2c");
        assert!(bridge.validate_switching_protocols(&ok).is_ok());

        let missing = Message::response(101);
        assert!(bridge.validate_switching_protocols(&missing).is_err());

        let wrong = Message::response(101).with_header("Upgrade", "websocket");
        assert!(bridge.validate_switching_protocols(&wrong).is_err());
    }
}

use std::sync::Arc;

/// Parameters governing the session core, mirroring the teacher's flat `Default`-able `Config`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Initial per-stream receive window advertised to the peer, applied to every stream that
    /// doesn't carry its own override.
    pub initial_recv_window: u32,
    /// Initial connection-level receive window advertised to the peer.
    pub initial_conn_recv_window: u32,
    /// Maximum bytes the session will buffer for egress before pausing every transaction.
    pub write_buffer_limit: usize,
    /// Maximum number of transactions the local side may have outstanding concurrently on a
    /// multiplexed codec, before SETTINGS from the peer says otherwise.
    pub max_concurrent_outgoing_streams: u32,
    /// Outgoing stream cap used while straddling an HTTP/1.1 -> HTTP/2 upgrade.
    pub max_concurrent_outgoing_streams_during_upgrade: u32,
    /// Default idle timeout for a transaction with no override, in milliseconds. 0 disables it.
    pub default_idle_timeout_ms: u64,
    /// Number of priority levels used in "levels mode" (see `PriorityTree`).
    pub priority_levels: u8,
    /// Whether level 0 gets a distinguished high-priority virtual parent.
    pub priority_has_high_priority_level: bool,
}

/// RFC 7540 §6.9.2 default initial window; shared by HTTP/2 and SPDY/3.1.
pub const DEFAULT_INITIAL_WINDOW: u32 = 65_535;

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_recv_window: DEFAULT_INITIAL_WINDOW,
            initial_conn_recv_window: DEFAULT_INITIAL_WINDOW,
            write_buffer_limit: 64 * 1024,
            max_concurrent_outgoing_streams: 10,
            max_concurrent_outgoing_streams_during_upgrade: 1,
            default_idle_timeout_ms: 60_000,
            priority_levels: 4,
            priority_has_high_priority_level: true,
        }
    }
}

impl Config {
    pub fn shared(self) -> Arc<Config> {
        Arc::new(self)
    }
}

use crate::codec::Settings;

/// Observer interface (§6 "InfoCallback interface (produced)"). No direct teacher analogue exists
/// (the teacher observes its own state only through `slog`); grounded instead on the
/// observer-callback shape used across the HTTP/2 session crates in the retrieval pack, which
/// layer an application-visible notification surface alongside structured logging rather than
/// instead of it. Every method has a default no-op body so implementors only override what they
/// care about, matching how sparse most real `InfoCallback` implementations are in practice.
pub trait InfoCallback {
    fn on_create(&mut self) {}
    fn on_destroy(&mut self) {}
    fn on_ingress_message(&mut self, stream_id: u32) {
        let _ = stream_id;
    }
    fn on_read(&mut self, bytes: usize) {
        let _ = bytes;
    }
    fn on_write(&mut self, bytes: usize) {
        let _ = bytes;
    }
    fn on_settings(&mut self, settings: &Settings) {
        let _ = settings;
    }
    fn on_settings_ack(&mut self) {}
    fn on_session_codec_change(&mut self) {}
    fn on_settings_outgoing_streams_full(&mut self) {}
    fn on_settings_outgoing_streams_not_full(&mut self) {}
    fn on_flow_control_window_exhausted(&mut self, stream_id: Option<u32>) {
        let _ = stream_id;
    }
}

/// An `InfoCallback` that does nothing; the default when the application registers none.
#[derive(Default)]
pub struct NullInfoCallback;

impl InfoCallback for NullInfoCallback {}

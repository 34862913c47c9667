//! Sans-IO output surface, directly generalizing the teacher's
//! `quinn_proto::endpoint::{Io, Event, Timer}`: `Session` performs no socket I/O or timer-wheel
//! manipulation itself, it only emits `Io` values for an external driver to execute and accepts
//! completion notifications back in through `Session::on_write_complete` / `Session::on_timeout`.

use bytes::Bytes;

/// A timer a `Transaction` or the `Session` itself may have armed.
///
/// `Idle` carries an epoch tag (§9 "Timer composition"): each call to `Session::set_idle_timeout`
/// bumps the stream's epoch, so a `TimerStart` queued before the bump is recognized as stale and
/// ignored on firing rather than needing to be pulled back out of the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Per-transaction idle timeout.
    Idle { stream_id: u32, epoch: u64 },
    /// Session-wide read timeout, owned by an external connection manager but surfaced here so
    /// the same `Io` plumbing can arm/disarm it.
    Read,
}

/// An operation the embedding event loop must perform on the session's behalf.
#[derive(Debug, Clone)]
pub enum Io {
    /// Bytes ready to be written to the transport. The driver must report completion via
    /// `Session::on_write_complete(len)` once the bytes are actually flushed.
    Transmit { data: Bytes },
    /// Arm or re-arm a timer to fire at absolute `time_ms`.
    TimerStart { timer: Timer, time_ms: u64 },
    /// Cancel a previously armed timer.
    TimerStop { timer: Timer },
    /// The session has finished (graceful or not); the driver should close the transport.
    CloseTransport,
}

/// An application-facing event not delivered through a `TransactionHandler` callback (mirrors the
/// teacher's `Event` enum, which carries connection-level notifications alongside the per-stream
/// callbacks threaded through `Connection`).
#[derive(Debug, Clone)]
pub enum Event {
    SessionDestroyed,
}

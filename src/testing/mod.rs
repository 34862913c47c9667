//! Test-only doubles: no teacher analogue, built from scratch to exercise `Session` without a
//! real HPACK/HTTP2 implementation, which is explicitly out of scope (§1 "Out of scope"). Public
//! so integration tests in `tests/` can reuse them.

pub mod mock_codec;
pub mod mock_handler;

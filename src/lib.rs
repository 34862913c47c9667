//! Client-side HTTP session core multiplexing transactions over HTTP/1.x, SPDY/3.x, and HTTP/2
//! behind one codec boundary. See `Session` for the conductor and `session` module docs for the
//! control-flow overview.
//!
//! Sans-IO, like the teacher this crate is grounded on: nothing here touches a socket or a timer
//! wheel. An embedding event loop drains `Session::poll_transmit` and feeds bytes in through
//! `Session::on_ingress`, arming/firing timers via the `Io`/`Timer` types in `io`.

#[macro_use]
extern crate slog;
#[macro_use]
extern crate failure;

pub mod byte_event;
pub mod codec;
pub mod config;
pub mod drain;
pub mod error;
pub mod flow_control;
pub mod info_callback;
pub mod io;
pub mod priority;
pub mod session;
pub mod transaction;
pub mod upgrade;

pub mod testing;

pub use crate::codec::{Codec, ErrorCode, IngressEvent, IngressOutcome, Message, Protocol, Settings, StartLine};
pub use crate::config::Config;
pub use crate::error::{Detail, Direction, SessionError};
pub use crate::info_callback::{InfoCallback, NullInfoCallback};
pub use crate::io::{Event, Io, Timer};
pub use crate::priority::{PriorityMapFactory, PriorityNode, PriorityTree, PriorityUpdate};
pub use crate::session::{Session, SessionState, UpgradeConfig};
pub use crate::transaction::{PushHandlerFactory, StreamRole, Transaction, TransactionHandler};

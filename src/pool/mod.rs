//! Per-event-loop connection pooling and lifecycle: a slot per
//! `(protocol, remote, local)` key, HTTP/1 pipelining, `Connection:
//! close` / `initiate_connection_shutdown`, max connection age, and
//! HTTP/2 window & frame-size accounting.

pub mod connection;
pub mod http2;
pub mod key;
pub mod listener;
pub mod pool;

pub use self::connection::{Connection, ConnectionId};
pub use self::http2::{GoAwayReason, Http2Settings, Http2State, WindowUpdate};
pub use self::key::{ConnectionKey, SessionProtocol};
pub use self::listener::{ConnectionPoolListener, NullConnectionPoolListener};
pub use self::pool::{Dialer, Lease, Pool};

//! DNS: a shared positive/negative answer cache, a minimal RFC 1035
//! wire codec, a UDP transport, and the per-event-loop refreshing
//! resolver built on top of them.

pub mod cache;
pub mod client;
pub mod config;
pub mod message;
pub mod resolver;

pub use self::cache::{DnsCache, RemovalCause, WeakDnsCache};
pub use self::config::{RefreshBackoffConfig, ResolvedAddressTypes, ResolverConfig};
pub use self::message::{Answer, Question};
pub use self::resolver::RefreshingAddressResolver;

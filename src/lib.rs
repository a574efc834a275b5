//! Client-side networking core for a pooled, retrying HTTP/1 and
//! HTTP/2 client runtime: endpoints and endpoint groups, a refreshing
//! DNS resolver, connection pooling and lifecycle, a single-threaded
//! retry scheduler, and the `ClientOptions` bag that configures them.
//!
//! The HTTP codec itself (frame parsing, HPACK), the TLS stack, and
//! server-side routing are external collaborators; see each module's
//! docs for where its contract stops.

#[macro_use]
extern crate log;
#[macro_use]
extern crate futures;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate serde_yaml;
extern crate tacho;
extern crate tokio_core;
extern crate tokio_io;
extern crate tokio_timer;

pub mod config;
pub mod dns;
pub mod driver;
pub mod endpoint;
pub mod endpoint_group;
pub mod error;
pub mod metrics;
pub mod options;
pub mod pool;
pub mod retry;

pub use config::RuntimeConfig;
pub use driver::Runtime;
pub use endpoint::Endpoint;
pub use endpoint_group::EndpointGroup;
pub use error::{Error, Result};
pub use options::ClientOptions;
pub use retry::{RetryScheduler, RetryTask};

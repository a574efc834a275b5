//! `tacho`-backed metrics for the pool, resolver, and retry scheduler,
//! grounded on the teacher's `balancer::endpoints::Metrics` (gauges
//! scoped under a prefix) and `balancer::manager`'s `connect_latency`
//! timer.

use std::time::Instant;

use tacho;

/// Resolver gauges/counters: cache occupancy and refresh outcomes.
#[derive(Clone)]
pub struct ResolverMetrics {
    cache_size: tacho::Gauge,
    lookups: tacho::Counter,
    cache_hits: tacho::Counter,
    refresh_success: tacho::Counter,
    refresh_failure: tacho::Counter,
}

impl ResolverMetrics {
    pub fn new(base: &tacho::Scope) -> ResolverMetrics {
        let scope = base.clone().prefixed("resolver");
        ResolverMetrics {
            cache_size: scope.gauge("cache_size"),
            lookups: scope.counter("lookups"),
            cache_hits: scope.counter("cache_hits"),
            refresh_success: scope.counter("refresh_success"),
            refresh_failure: scope.counter("refresh_failure"),
        }
    }

    pub fn set_cache_size(&self, size: usize) {
        self.cache_size.set(size);
    }

    pub fn incr_lookup(&self) {
        self.lookups.incr(1);
    }

    pub fn incr_cache_hit(&self) {
        self.cache_hits.incr(1);
    }

    pub fn incr_refresh_success(&self) {
        self.refresh_success.incr(1);
    }

    pub fn incr_refresh_failure(&self) {
        self.refresh_failure.incr(1);
    }
}

/// Pool gauges and the connection-lifespan histogram required by §4.5
/// ("metrics must expose the connection lifespan distribution, at
/// minimum min/max/count").
#[derive(Clone)]
pub struct PoolMetrics {
    open_connections: tacho::Gauge,
    opens: tacho::Counter,
    closes: tacho::Counter,
    lifespan_us: tacho::Timer,
}

impl PoolMetrics {
    pub fn new(base: &tacho::Scope) -> PoolMetrics {
        let scope = base.clone().prefixed("connection");
        PoolMetrics {
            open_connections: scope.gauge("open"),
            opens: scope.counter("opens"),
            closes: scope.counter("closes"),
            lifespan_us: scope.timer_us("lifespan_us"),
        }
    }

    pub fn set_open_connections(&self, n: usize) {
        self.open_connections.set(n);
    }

    pub fn incr_opens(&self) {
        self.opens.incr(1);
    }

    /// Records one closed connection's lifespan, `since` being its
    /// `opened_at`.
    pub fn record_close(&self, since: Instant) {
        self.closes.incr(1);
        self.lifespan_us.record_since(since);
    }
}

/// Retry-scheduler counters: how often tasks ran, were overtaken, or
/// were cancelled on close.
#[derive(Clone)]
pub struct RetryMetrics {
    ran: tacho::Counter,
    overtaken: tacho::Counter,
    cancelled: tacho::Counter,
}

impl RetryMetrics {
    pub fn new(base: &tacho::Scope) -> RetryMetrics {
        let scope = base.clone().prefixed("retry");
        RetryMetrics {
            ran: scope.counter("ran"),
            overtaken: scope.counter("overtaken"),
            cancelled: scope.counter("cancelled"),
        }
    }

    pub fn incr_ran(&self) {
        self.ran.incr(1);
    }

    pub fn incr_overtaken(&self) {
        self.overtaken.incr(1);
    }

    pub fn incr_cancelled(&self) {
        self.cancelled.incr(1);
    }
}

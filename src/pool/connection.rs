//! A single pooled connection's lifecycle state, grounded on the
//! teacher's `connection::ctx` (per-connection accounting) and
//! `balancer::endpoint` (age/backoff-style bookkeeping), generalized to
//! the pipelining/max-age/shutdown rules this crate adds.

use std::time::{Duration, Instant};

use pool::http2::{Http2Settings, Http2State};
use pool::key::ConnectionKey;

/// Monotonically increasing, unique within a pool's lifetime.
pub type ConnectionId = u64;

pub struct Connection {
    id: ConnectionId,
    key: ConnectionKey,
    opened_at: Instant,
    max_age: Option<Duration>,
    pipelining_enabled: bool,
    in_flight: usize,
    /// Set once a request carries `Connection: close` or
    /// `initiate_connection_shutdown()` is called; the connection is
    /// closed as soon as `in_flight` returns to zero.
    shutdown_requested: bool,
    /// Under pipelining, true once the in-flight request(s) have been
    /// fully *sent* — the connection is reusable for the next request
    /// even though a response is still outstanding.
    available_for_next_send: bool,
    http2: Option<Http2State>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        key: ConnectionKey,
        pipelining_enabled: bool,
        max_age: Option<Duration>,
        http2_settings: Option<Http2Settings>,
    ) -> Connection {
        Connection {
            id: id,
            key: key,
            opened_at: Instant::now(),
            max_age: max_age,
            pipelining_enabled: pipelining_enabled,
            in_flight: 0,
            shutdown_requested: false,
            available_for_next_send: true,
            http2: http2_settings.map(Http2State::new),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn is_http2(&self) -> bool {
        self.http2.is_some()
    }

    pub fn pipelining_enabled(&self) -> bool {
        self.pipelining_enabled
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn http2_mut(&mut self) -> Option<&mut Http2State> {
        self.http2.as_mut()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_requested
    }

    /// Available for a new request to be assigned to it right now.
    ///
    /// HTTP/2 always reuses its single connection (streams interleave).
    /// HTTP/1 under pipelining is reusable once the previous request(s)
    /// finished *sending*; without pipelining it must be fully idle.
    pub fn is_acquirable(&self) -> bool {
        if self.shutdown_requested {
            return false;
        }
        if self.is_http2() {
            return true;
        }
        if self.pipelining_enabled {
            self.available_for_next_send
        } else {
            self.in_flight == 0
        }
    }

    pub fn begin_request(&mut self, force_close: bool) {
        self.in_flight += 1;
        if force_close {
            self.shutdown_requested = true;
        }
        if !self.is_http2() && self.pipelining_enabled {
            self.available_for_next_send = false;
        }
    }

    /// Marks the in-flight request as fully sent on the wire. Under
    /// HTTP/1 pipelining this is what makes the connection eligible for
    /// the next `acquire` even before the response arrives.
    pub fn mark_request_sent(&mut self) {
        if !self.is_http2() && self.pipelining_enabled {
            self.available_for_next_send = true;
        }
    }

    /// `initiate_connection_shutdown()` called on an already-assigned
    /// request: no header injection, the connection just closes once
    /// every in-flight request completes.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    /// Returns `true` if the response just completed leaves the
    /// connection with no reason to stay open (explicit shutdown, or
    /// the connection has exceeded `max_connection_age_millis` —
    /// evaluated only here, between requests, never mid-response).
    pub fn end_request(&mut self) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        if !self.is_http2() {
            self.available_for_next_send = true;
        }
        self.in_flight == 0 && (self.shutdown_requested || self.is_aged_out())
    }

    fn is_aged_out(&self) -> bool {
        match self.max_age {
            Some(max_age) => self.opened_at.elapsed() >= max_age,
            None => false,
        }
    }
}

//! Connection pool scenarios exercised through the public crate API
//! (see `SPEC_FULL.md` §8, scenarios on pipelining reuse and
//! `Connection: close`).

extern crate armeria_client;
extern crate tacho;

use std::net::SocketAddr;

use armeria_client::error::Result;
use armeria_client::pool::{ConnectionKey, Dialer, Http2Settings, Pool, SessionProtocol};

struct CountingDialer;

impl Dialer for CountingDialer {
    fn dial(&self, _key: &ConnectionKey) -> Result<()> {
        Ok(())
    }
}

fn key() -> ConnectionKey {
    ConnectionKey::new(SessionProtocol::Http1, "10.0.0.1:8080".parse::<SocketAddr>().unwrap(), None)
}

#[test]
fn n_consecutive_pipelined_requests_open_exactly_one_connection() {
    let pool = Pool::new(CountingDialer, true, None, Http2Settings::default(), &tacho::new().0);
    let k = key();

    let mut leases = Vec::new();
    for _ in 0..5 {
        let lease = pool.acquire(k, false).unwrap();
        pool.mark_request_sent(&lease);
        leases.push(lease);
    }

    assert_eq!(pool.connection_count(&k), 1);
    for lease in &leases {
        pool.release(lease);
    }
    // Pipelined requests without a shutdown request or max age never
    // become closeable on release (see `Connection::end_request`); the
    // connection stays pooled for reuse.
    assert_eq!(pool.connection_count(&k), 1);
}

#[test]
fn n_concurrent_connection_close_requests_open_and_close_n_connections() {
    let pool = Pool::new(CountingDialer, false, None, Http2Settings::default(), &tacho::new().0);
    let k = key();

    let leases: Vec<_> = (0..4).map(|_| pool.acquire(k, true).unwrap()).collect();
    assert_eq!(pool.connection_count(&k), 4);

    for lease in &leases {
        pool.release(lease);
    }
    assert_eq!(pool.connection_count(&k), 0);
}

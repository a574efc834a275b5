//! A per-event-loop connection pool keyed by `(protocol, remote, local)`,
//! grounded on the teacher's `balancer::endpoint` (per-destination
//! `Rc<RefCell<State>>`) generalized from one endpoint's backoff
//! bookkeeping to full connection lifecycle/pipelining/HTTP-2 window
//! management.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tacho;

use error::{Error, Result};
use metrics::PoolMetrics;
use pool::connection::{Connection, ConnectionId};
use pool::http2::Http2Settings;
use pool::key::ConnectionKey;
use pool::listener::{ConnectionPoolListener, NullConnectionPoolListener};

/// Dials a new physical connection for `key`. The wire handshake itself
/// (TCP connect, TLS, HTTP/2 preface bytes) is an external collaborator
/// per the crate's Non-goals; the pool only needs to know dialing
/// succeeded so it can start tracking lifecycle state.
pub trait Dialer {
    fn dial(&self, key: &ConnectionKey) -> Result<()>;
}

/// A leased connection, checked out of the pool for exactly one request
/// (or, under HTTP/2, one stream).
pub struct Lease {
    pub key: ConnectionKey,
    pub connection_id: ConnectionId,
}

pub struct Pool<D: Dialer> {
    dialer: D,
    listener: Rc<ConnectionPoolListener>,
    use_http1_pipelining: bool,
    max_connection_age: Option<::std::time::Duration>,
    http2_settings: Http2Settings,
    next_connection_id: RefCell<ConnectionId>,
    connections: RefCell<HashMap<ConnectionKey, Vec<Rc<RefCell<Connection>>>>>,
    metrics: PoolMetrics,
}

impl<D: Dialer> Pool<D> {
    pub fn new(
        dialer: D,
        use_http1_pipelining: bool,
        max_connection_age: Option<::std::time::Duration>,
        http2_settings: Http2Settings,
        metrics: &tacho::Scope,
    ) -> Pool<D> {
        Pool {
            dialer: dialer,
            listener: Rc::new(NullConnectionPoolListener),
            use_http1_pipelining: use_http1_pipelining,
            max_connection_age: max_connection_age,
            http2_settings: http2_settings,
            next_connection_id: RefCell::new(0),
            connections: RefCell::new(HashMap::new()),
            metrics: PoolMetrics::new(metrics),
        }
    }

    pub fn with_listener(mut self, listener: Rc<ConnectionPoolListener>) -> Pool<D> {
        self.listener = listener;
        self
    }

    /// Checks out a connection for `key`, dialing a new one if none in
    /// the pool is currently acquirable. `force_close` models a request
    /// whose headers already carry `Connection: close`, or an
    /// `initiate_connection_shutdown()` issued before assignment: the
    /// connection this returns will be closed once the request ends.
    pub fn acquire(&self, key: ConnectionKey, force_close: bool) -> Result<Lease> {
        let mut opened = false;
        let conn = {
            let mut connections = self.connections.borrow_mut();
            let slots = connections.entry(key).or_insert_with(Vec::new);

            let reusable = slots.iter().find(|c| c.borrow().is_acquirable()).cloned();
            match reusable {
                Some(conn) => conn,
                None => {
                    if key.protocol.is_http2() && !slots.is_empty() {
                        return Err(Error::IllegalState(
                            "HTTP/2 pool slot already holds a non-reusable connection".into(),
                        ));
                    }
                    self.dialer.dial(&key)?;
                    let id = {
                        let mut next = self.next_connection_id.borrow_mut();
                        let id = *next;
                        *next += 1;
                        id
                    };
                    let http2 = if key.protocol.is_http2() {
                        Some(self.http2_settings)
                    } else {
                        None
                    };
                    let conn = Rc::new(RefCell::new(Connection::new(
                        id,
                        key,
                        self.use_http1_pipelining,
                        self.max_connection_age,
                        http2,
                    )));
                    slots.push(conn.clone());
                    opened = true;
                    conn
                }
            }
        };

        if opened {
            self.listener.on_open(&key);
            self.metrics.incr_opens();
            self.metrics.set_open_connections(self.total_open());
        }

        let connection_id = conn.borrow().id();
        conn.borrow_mut().begin_request(force_close);
        Ok(Lease {
            key: key,
            connection_id: connection_id,
        })
    }

    fn total_open(&self) -> usize {
        self.connections.borrow().values().map(Vec::len).sum()
    }

    /// Call once the request has been fully written to the wire. Under
    /// HTTP/1 pipelining this frees the connection for the *next*
    /// `acquire` even though the response is still outstanding; it is a
    /// no-op otherwise.
    pub fn mark_request_sent(&self, lease: &Lease) {
        if let Some(conn) = self.find(lease) {
            conn.borrow_mut().mark_request_sent();
        }
    }

    /// `initiate_connection_shutdown()` called after the request is
    /// already on the wire: preserve the request as sent, close the
    /// connection once every in-flight request on it completes.
    pub fn request_shutdown(&self, lease: &Lease) {
        if let Some(conn) = self.find(lease) {
            conn.borrow_mut().request_shutdown();
        }
    }

    /// Call when the response for `lease` has fully completed. Closes
    /// and evicts the connection if it was marked for shutdown or has
    /// aged past `max_connection_age_millis` (checked only here, never
    /// mid-request).
    pub fn release(&self, lease: &Lease) {
        let should_close = match self.find(lease) {
            Some(conn) => conn.borrow_mut().end_request(),
            None => return,
        };
        if should_close {
            self.close(lease);
        }
    }

    fn close(&self, lease: &Lease) {
        let closed = {
            let mut connections = self.connections.borrow_mut();
            match connections.get_mut(&lease.key) {
                Some(slots) => match slots.iter().position(|c| c.borrow().id() == lease.connection_id) {
                    Some(pos) => Some(slots.remove(pos)),
                    None => None,
                },
                None => None,
            }
        };
        if let Some(conn) = closed {
            let opened_at = conn.borrow().opened_at();
            let lifespan = opened_at.elapsed();
            self.listener.on_close(&lease.key, lifespan);
            self.metrics.record_close(opened_at);
            self.metrics.set_open_connections(self.total_open());
        }
    }

    pub fn connection_count(&self, key: &ConnectionKey) -> usize {
        self.connections.borrow().get(key).map_or(0, Vec::len)
    }

    fn find(&self, lease: &Lease) -> Option<Rc<RefCell<Connection>>> {
        self.connections
            .borrow()
            .get(&lease.key)
            .and_then(|slots| slots.iter().find(|c| c.borrow().id() == lease.connection_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool::key::SessionProtocol;
    use std::net::SocketAddr;
    use std::time::Duration;

    struct AlwaysDial;
    impl Dialer for AlwaysDial {
        fn dial(&self, _key: &ConnectionKey) -> Result<()> {
            Ok(())
        }
    }

    fn key(protocol: SessionProtocol) -> ConnectionKey {
        ConnectionKey::new(protocol, "127.0.0.1:80".parse::<SocketAddr>().unwrap(), None)
    }

    #[test]
    fn pipelining_reuses_one_connection_for_consecutive_requests() {
        let pool = Pool::new(AlwaysDial, true, None, Http2Settings::default(), &tacho::new().0);
        let k = key(SessionProtocol::Http1);

        let lease1 = pool.acquire(k, false).unwrap();
        pool.mark_request_sent(&lease1);
        let lease2 = pool.acquire(k, false).unwrap();
        pool.mark_request_sent(&lease2);

        assert_eq!(lease1.connection_id, lease2.connection_id);
        assert_eq!(pool.connection_count(&k), 1);

        pool.release(&lease1);
        pool.release(&lease2);
    }

    #[test]
    fn without_pipelining_overlapping_requests_open_two_connections() {
        let pool = Pool::new(AlwaysDial, false, None, Http2Settings::default(), &tacho::new().0);
        let k = key(SessionProtocol::Http1);

        let lease1 = pool.acquire(k, false).unwrap();
        let lease2 = pool.acquire(k, false).unwrap();

        assert_ne!(lease1.connection_id, lease2.connection_id);
        assert_eq!(pool.connection_count(&k), 2);
    }

    #[test]
    fn connection_close_header_closes_after_response() {
        let pool = Pool::new(AlwaysDial, false, None, Http2Settings::default(), &tacho::new().0);
        let k = key(SessionProtocol::Http1);

        let lease = pool.acquire(k, true).unwrap();
        assert_eq!(pool.connection_count(&k), 1);
        pool.release(&lease);
        assert_eq!(pool.connection_count(&k), 0);
    }

    #[test]
    fn max_age_closes_between_requests_not_mid_request() {
        let pool = Pool::new(AlwaysDial, true, Some(Duration::from_millis(0)), Http2Settings::default(), &tacho::new().0);
        let k = key(SessionProtocol::Http1);

        let lease = pool.acquire(k, false).unwrap();
        assert_eq!(pool.connection_count(&k), 1);
        pool.release(&lease);
        assert_eq!(pool.connection_count(&k), 0);
    }

    #[test]
    fn http2_reuses_single_physical_connection() {
        let pool = Pool::new(AlwaysDial, false, None, Http2Settings::default(), &tacho::new().0);
        let k = key(SessionProtocol::Http2);

        let lease1 = pool.acquire(k, false).unwrap();
        let lease2 = pool.acquire(k, false).unwrap();
        assert_eq!(lease1.connection_id, lease2.connection_id);
        assert_eq!(pool.connection_count(&k), 1);
    }
}

use std::net::SocketAddr;

/// The wire protocol negotiated for a connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SessionProtocol {
    Http1,
    Http2,
}

impl SessionProtocol {
    pub fn is_http2(&self) -> bool {
        *self == SessionProtocol::Http2
    }
}

/// Identifies a pool slot: one physical connection for HTTP/2, a small
/// pipeline-capable set of connections for HTTP/1.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ConnectionKey {
    pub protocol: SessionProtocol,
    pub remote: SocketAddr,
    pub local: Option<SocketAddr>,
}

impl ConnectionKey {
    pub fn new(protocol: SessionProtocol, remote: SocketAddr, local: Option<SocketAddr>) -> ConnectionKey {
        ConnectionKey {
            protocol: protocol,
            remote: remote,
            local: local,
        }
    }
}

//! DNS transport: encodes a query, fans it out to every configured
//! upstream server over UDP, and resolves with the first well-formed
//! answer. A UDP response with the `TC` bit set is retried once over
//! TCP against the same upstream, length-prefixed per RFC 1035 §4.2.2.
//!
//! Per-query timeouts are enforced with `tokio_timer`, and
//! `future::select_ok` gives us the "all queries timed out" failure mode
//! for free: it only returns an error once every branch has.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::future::{self, Future};
use tokio_core::net::{TcpStream, UdpSocket};
use tokio_core::reactor::Handle;
use tokio_io::io::{read_exact, write_all};
use tokio_timer::Timer;

use dns::message::{self, Decoded, Question};
use error::Error;

const RECV_BUF_SIZE: usize = 512;
/// RFC 1035 §4.2.2: TCP messages are prefixed with a 2-byte length.
const TCP_MAX_MESSAGE_LEN: usize = 65_535;

/// Queries every address in `upstreams` for `question`, returning the
/// first decodable, id-matching response. Fails with
/// `Error::DnsTimeout` carrying `question` only once every upstream has
/// failed or timed out.
pub fn query(
    handle: &Handle,
    timer: &Timer,
    upstreams: &[SocketAddr],
    question: &Question,
    per_query_timeout: Duration,
) -> Box<Future<Item = Decoded, Error = Error>> {
    if upstreams.is_empty() {
        return Box::new(future::err(Error::DnsTimeout(vec![question.clone()])));
    }

    let attempts: Vec<_> = upstreams
        .iter()
        .map(|&upstream| single_query(handle, timer, upstream, question.clone(), per_query_timeout))
        .collect();

    let question = question.clone();
    Box::new(
        future::select_ok(attempts)
            .map(|(decoded, _still_pending)| decoded)
            .map_err(move |_last_err| Error::DnsTimeout(vec![question.clone()])),
    )
}

fn single_query(
    handle: &Handle,
    timer: &Timer,
    upstream: SocketAddr,
    question: Question,
    timeout: Duration,
) -> Box<Future<Item = Decoded, Error = Error>> {
    let (id, bytes) = message::encode_query(&question);

    let local: SocketAddr = "0.0.0.0:0".parse().unwrap();
    let socket = match UdpSocket::bind(&local, handle) {
        Ok(s) => s,
        Err(e) => return Box::new(future::err(Error::from(e))),
    };

    let handle = handle.clone();
    let timer = timer.clone();
    let timer_for_expire = timer.clone();
    let question_for_tcp = question.clone();

    let recv = socket
        .send_dgram(bytes, upstream)
        .and_then(move |(socket, _buf)| socket.recv_dgram(vec![0u8; RECV_BUF_SIZE]))
        .map_err(Error::from)
        .and_then(move |(_socket, buf, n, from)| {
            if from != upstream {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "dns response from unexpected address",
                )));
            }
            message::decode_response(&buf[..n]).map_err(Error::from)
        })
        .and_then(move |decoded| {
            if decoded.id != id {
                Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "dns response id mismatch",
                )))
            } else {
                Ok(decoded)
            }
        })
        .and_then(move |decoded| -> Box<Future<Item = Decoded, Error = Error>> {
            if decoded.truncated {
                // RFC 1035 §4.2.1/§4.2.2: a truncated UDP answer must be
                // retried over TCP, where there's no 512-byte limit.
                tcp_query(&handle, &timer, upstream, question_for_tcp.clone(), timeout)
            } else {
                Box::new(future::ok(decoded))
            }
        });

    let question_for_timeout = question.clone();
    let expire = timer_for_expire
        .sleep(timeout)
        .then(move |_| Err(Error::DnsTimeout(vec![question_for_timeout.clone()])));

    Box::new(recv.select(expire).map(|(item, _)| item).map_err(|(e, _)| e))
}

fn tcp_query(
    handle: &Handle,
    timer: &Timer,
    upstream: SocketAddr,
    question: Question,
    timeout: Duration,
) -> Box<Future<Item = Decoded, Error = Error>> {
    let (id, bytes) = message::encode_query(&question);
    if bytes.len() > TCP_MAX_MESSAGE_LEN {
        return Box::new(future::err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "dns query too large to frame over tcp",
        ))));
    }
    let mut framed = Vec::with_capacity(bytes.len() + 2);
    framed.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    framed.extend_from_slice(&bytes);

    let recv = TcpStream::connect(&upstream, handle)
        .map_err(Error::from)
        .and_then(move |stream| write_all(stream, framed).map_err(Error::from))
        .and_then(|(stream, _)| read_exact(stream, [0u8; 2]).map_err(Error::from))
        .and_then(move |(stream, len_buf)| {
            let len = (u16::from(len_buf[0]) << 8) | u16::from(len_buf[1]);
            read_exact(stream, vec![0u8; len as usize]).map_err(Error::from)
        })
        .and_then(move |(_stream, buf)| message::decode_response(&buf).map_err(Error::from))
        .and_then(move |decoded| {
            if decoded.id != id {
                Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "dns response id mismatch",
                )))
            } else {
                Ok(decoded)
            }
        });

    let question_for_timeout = question.clone();
    let expire = timer
        .sleep(timeout)
        .then(move |_| Err(Error::DnsTimeout(vec![question_for_timeout.clone()])));

    Box::new(recv.select(expire).map(|(item, _)| item).map_err(|(e, _)| e))
}

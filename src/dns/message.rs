//! A minimal RFC 1035 message codec: just enough to encode an A/AAAA
//! question and decode the answer section of a response. HPACK/HTTP
//! framing lives elsewhere in the runtime this crate plugs into; DNS
//! wire I/O is in scope because §4.3 requires real queries.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rand;
use rand::Rng;

pub const QTYPE_A: u16 = 1;
pub const QTYPE_AAAA: u16 = 28;
const QCLASS_IN: u16 = 1;

/// A (name, record-type) pair: the cache key and the unit of a DNS
/// query, independent of the particular wire query that carried it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Question {
    pub name: String,
    pub record_type: u16,
}

impl Question {
    pub fn new<S: Into<String>>(name: S, record_type: u16) -> Question {
        Question {
            name: name.into(),
            record_type: record_type,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Answer {
    pub address: IpAddr,
    pub ttl_secs: u32,
}

/// Encodes a single-question query for `question`, returning the wire
/// bytes and the transaction id used (so the caller can match the
/// response).
pub fn encode_query(question: &Question) -> (u16, Vec<u8>) {
    let id = rand::thread_rng().gen::<u16>();
    let mut buf = Vec::with_capacity(question.name.len() + 16);

    buf.extend_from_slice(&id.to_be_bytes());
    // flags: recursion desired, standard query
    buf.extend_from_slice(&[0x01, 0x00]);
    buf.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    buf.extend_from_slice(&0u16.to_be_bytes()); // ancount
    buf.extend_from_slice(&0u16.to_be_bytes()); // nscount
    buf.extend_from_slice(&0u16.to_be_bytes()); // arcount

    encode_name(&question.name, &mut buf);
    buf.extend_from_slice(&question.record_type.to_be_bytes());
    buf.extend_from_slice(&QCLASS_IN.to_be_bytes());

    (id, buf)
}

fn encode_name(name: &str, buf: &mut Vec<u8>) {
    let trimmed = name.trim_right_matches('.');
    if trimmed.is_empty() {
        buf.push(0);
        return;
    }
    for label in trimmed.split('.') {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

/// Decodes a response, checking the id matches and pulling out every
/// A/AAAA answer record along with the response's RCODE. Truncated
/// responses (`TC` bit set) are reported so the caller can retry over
/// TCP, per RFC 1035 §4.2.1/§4.2.2.
pub struct Decoded {
    pub id: u16,
    pub rcode: u8,
    pub truncated: bool,
    pub answers: Vec<Answer>,
}

pub fn decode_response(buf: &[u8]) -> io::Result<Decoded> {
    if buf.len() < 12 {
        return Err(bad("response shorter than a DNS header"));
    }
    let id = be16(buf, 0);
    let flags = be16(buf, 2);
    let truncated = flags & 0x0200 != 0;
    let rcode = (flags & 0x000f) as u8;
    let qdcount = be16(buf, 4);
    let ancount = be16(buf, 6);

    let mut pos = 12usize;
    for _ in 0..qdcount {
        pos = skip_name(buf, pos)?;
        pos += 4; // qtype + qclass
    }

    let mut answers = Vec::with_capacity(ancount as usize);
    for _ in 0..ancount {
        pos = skip_name(buf, pos)?;
        if pos + 10 > buf.len() {
            return Err(bad("truncated resource record"));
        }
        let rtype = be16(buf, pos);
        let ttl = be32(buf, pos + 4);
        let rdlength = be16(buf, pos + 8) as usize;
        let rdata_start = pos + 10;
        if rdata_start + rdlength > buf.len() {
            return Err(bad("resource record rdata overruns message"));
        }
        let rdata = &buf[rdata_start..rdata_start + rdlength];
        match rtype {
            QTYPE_A if rdlength == 4 => {
                let addr = Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]);
                answers.push(Answer {
                    address: IpAddr::V4(addr),
                    ttl_secs: ttl,
                });
            }
            QTYPE_AAAA if rdlength == 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(rdata);
                let addr = Ipv6Addr::from(octets);
                answers.push(Answer {
                    address: IpAddr::V6(addr),
                    ttl_secs: ttl,
                });
            }
            _ => {}
        }
        pos = rdata_start + rdlength;
    }

    Ok(Decoded {
        id: id,
        rcode: rcode,
        truncated: truncated,
        answers: answers,
    })
}

fn skip_name(buf: &[u8], mut pos: usize) -> io::Result<usize> {
    loop {
        if pos >= buf.len() {
            return Err(bad("name runs past end of message"));
        }
        let len = buf[pos] as usize;
        if len == 0 {
            return Ok(pos + 1);
        }
        if len & 0xc0 == 0xc0 {
            // Compression pointer: two bytes, doesn't recurse for our
            // purposes since we only need to skip past it here.
            return Ok(pos + 2);
        }
        pos += 1 + len;
    }
}

fn be16(buf: &[u8], at: usize) -> u16 {
    (u16::from(buf[at]) << 8) | u16::from(buf[at + 1])
}

fn be32(buf: &[u8], at: usize) -> u32 {
    (u32::from(buf[at]) << 24) | (u32::from(buf[at + 1]) << 16) | (u32::from(buf[at + 2]) << 8)
        | u32::from(buf[at + 3])
}

fn bad(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_name_as_length_prefixed_labels() {
        let mut buf = Vec::new();
        encode_name("foo.com", &mut buf);
        assert_eq!(buf, vec![3, b'f', b'o', b'o', 3, b'c', b'o', b'm', 0]);
    }

    #[test]
    fn encode_decode_round_trip_preserves_id() {
        let q = Question::new("foo.com", QTYPE_A);
        let (id, query) = encode_query(&q);
        assert_eq!(query[0..2], id.to_be_bytes()[..]);
    }
}

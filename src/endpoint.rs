//! Immutable network targets.
//!
//! An `Endpoint` names one addressable destination: a host (which may
//! itself be an IP literal), an optional port, an optional resolved IP
//! address, a load-balancing weight, and a small bag of typed attributes.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::rc::Rc;
use std::str::FromStr;

use error::{Error, Result};

const DEFAULT_WEIGHT: u32 = 1000;

/// Which IP family (if any) an `Endpoint`'s resolved address belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IpFamily {
    None,
    V4,
    V6,
}

/// A typed attribute value. Kept deliberately small; callers needing
/// richer values should encode them as `Text` and parse on read.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug)]
struct Inner {
    host: String,
    port: Option<u16>,
    ip_addr: Option<IpAddr>,
    weight: u32,
    attributes: Rc<HashMap<&'static str, AttributeValue>>,
}

/// An immutable, cheaply-cloned network target.
///
/// Equality, hashing, and ordering are defined over `(host, port-or-0,
/// ip-or-empty)` only: `weight` and `attributes` never participate. Two
/// endpoints that differ only in weight (or only in attributes) compare
/// equal and hash equal.
#[derive(Clone, Debug)]
pub struct Endpoint(Rc<Inner>);

impl Endpoint {
    /// Constructs an endpoint from a bare host.
    ///
    /// Unlike `parse`, this constructor never splits on `:` to find a
    /// port: a colon is only accepted if the whole string is a valid IPv6
    /// literal. `Endpoint::of_host("foo:80")` is rejected, since `foo:80`
    /// is neither a hostname nor an IP literal.
    pub fn of_host(host: &str) -> Result<Endpoint> {
        Endpoint::new(host, None)
    }

    /// Constructs an endpoint from a host and an explicit port.
    pub fn of(host: &str, port: u16) -> Result<Endpoint> {
        if port == 0 {
            return Err(Error::InvalidArgument("port must be 1-65535".into()));
        }
        Endpoint::new(host, Some(port))
    }

    fn new(host: &str, port: Option<u16>) -> Result<Endpoint> {
        if host.is_empty() {
            return Err(Error::InvalidArgument("host must not be empty".into()));
        }

        let (norm_host, ip_addr) = match normalize_ip_literal(host)? {
            Some((canon, ip)) => (canon, Some(ip)),
            None => {
                if host.contains(':') {
                    return Err(Error::InvalidArgument(format!(
                        "'{}' looks like host:port; use Endpoint::parse instead",
                        host
                    )));
                }
                (host.to_string(), None)
            }
        };

        Ok(Endpoint(Rc::new(Inner {
            host: norm_host,
            port: port,
            ip_addr: ip_addr,
            weight: DEFAULT_WEIGHT,
            attributes: Rc::new(HashMap::new()),
        })))
    }

    /// Parses an authority string: `host`, `host:port`, `[ipv6]`,
    /// `[ipv6]:port`, with an optional ignored `user@` prefix.
    pub fn parse(authority: &str) -> Result<Endpoint> {
        let without_userinfo = match authority.rfind('@') {
            Some(i) => &authority[i + 1..],
            None => authority,
        };

        if without_userinfo.starts_with('[') {
            let close = without_userinfo.find(']').ok_or_else(|| {
                Error::InvalidArgument(format!("unmatched '[' in '{}'", authority))
            })?;
            let host_part = &without_userinfo[1..close];
            let rest = &without_userinfo[close + 1..];
            let port = if rest.is_empty() {
                None
            } else if let Some(p) = rest.strip_prefix_colon() {
                Some(parse_port(p)?)
            } else {
                return Err(Error::InvalidArgument(format!(
                    "trailing characters after ']' in '{}'",
                    authority
                )));
            };
            return Endpoint::new(host_part, port);
        }

        match without_userinfo.rfind(':') {
            None => Endpoint::new(without_userinfo, None),
            Some(i) => {
                let host_part = &without_userinfo[..i];
                let port_part = &without_userinfo[i + 1..];
                // A bare (unbracketed) IPv6 literal contains multiple
                // colons; only split when there is exactly one.
                if host_part.contains(':') {
                    return Endpoint::new(without_userinfo, None);
                }
                Endpoint::new(host_part, Some(parse_port(port_part)?))
            }
        }
    }

    pub fn host(&self) -> &str {
        &self.0.host
    }

    pub fn port(&self) -> Option<u16> {
        self.0.port
    }

    pub fn has_port(&self) -> bool {
        self.0.port.is_some()
    }

    pub fn ip_addr(&self) -> Option<IpAddr> {
        self.0.ip_addr
    }

    pub fn ip_family(&self) -> IpFamily {
        match self.0.ip_addr {
            None => IpFamily::None,
            Some(IpAddr::V4(_)) => IpFamily::V4,
            Some(IpAddr::V6(_)) => IpFamily::V6,
        }
    }

    pub fn weight(&self) -> u32 {
        self.0.weight
    }

    pub fn attr(&self, key: &str) -> Option<&AttributeValue> {
        self.0.attributes.get(key)
    }

    pub fn with_port(&self, port: u16) -> Result<Endpoint> {
        if port == 0 {
            return Err(Error::InvalidArgument("port must be 1-65535".into()));
        }
        if self.0.port == Some(port) {
            return Ok(self.clone());
        }
        Ok(self.with_inner(|i| i.port = Some(port)))
    }

    pub fn without_port(&self) -> Endpoint {
        if self.0.port.is_none() {
            return self.clone();
        }
        self.with_inner(|i| i.port = None)
    }

    pub fn with_default_port(&self, port: u16) -> Result<Endpoint> {
        if self.0.port.is_some() {
            return Ok(self.clone());
        }
        self.with_port(port)
    }

    /// Attaches a resolved IP address. Fails with `IllegalState` if this
    /// endpoint's host is itself an IP literal and `ip` is `None`: an
    /// IP-literal endpoint's address can never be cleared.
    pub fn with_ip_addr(&self, ip: Option<IpAddr>) -> Result<Endpoint> {
        if ip.is_none() && self.is_ip_literal_host() {
            return Err(Error::IllegalState(
                "cannot clear ip_addr on an endpoint whose host is itself an IP literal".into(),
            ));
        }
        if self.0.ip_addr == ip {
            return Ok(self.clone());
        }
        Ok(self.with_inner(|i| i.ip_addr = ip))
    }

    pub fn with_weight(&self, weight: u32) -> Endpoint {
        if self.0.weight == weight {
            return self.clone();
        }
        self.with_inner(|i| i.weight = weight)
    }

    pub fn with_attr(&self, key: &'static str, value: AttributeValue) -> Endpoint {
        let mut inner = self.clone_inner();
        Rc::make_mut(&mut inner.attributes).insert(key, value);
        Endpoint(Rc::new(inner))
    }

    /// True if this endpoint's host is itself an IP literal (as opposed
    /// to a hostname that may later be resolved to one).
    fn is_ip_literal_host(&self) -> bool {
        match self.0.ip_addr {
            Some(ip) => self.0.host == canonical_ip_string(ip),
            None => false,
        }
    }

    fn clone_inner(&self) -> Inner {
        Inner {
            host: self.0.host.clone(),
            port: self.0.port,
            ip_addr: self.0.ip_addr,
            weight: self.0.weight,
            attributes: self.0.attributes.clone(),
        }
    }

    fn with_inner<F: FnOnce(&mut Inner)>(&self, f: F) -> Endpoint {
        let mut inner = self.clone_inner();
        f(&mut inner);
        Endpoint(Rc::new(inner))
    }

    /// The bracketed-as-needed `host[:port]` authority form.
    pub fn authority(&self) -> String {
        let host = if self.ip_family() == IpFamily::V6 {
            format!("[{}]", self.0.host)
        } else {
            self.0.host.clone()
        };
        match self.0.port {
            Some(p) => format!("{}:{}", host, p),
            None => host,
        }
    }

    /// Composes `scheme://authority[/path]`. No path is synthesized when
    /// `path` is `None` or empty.
    pub fn to_uri(&self, scheme: &str, path: Option<&str>) -> String {
        match path {
            Some(p) if !p.is_empty() => format!("{}://{}{}", scheme, self.authority(), p),
            _ => format!("{}://{}", scheme, self.authority()),
        }
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Endpoint) -> bool {
        self.0.host == other.0.host && self.0.port.unwrap_or(0) == other.0.port.unwrap_or(0)
            && self.0.ip_addr == other.0.ip_addr
    }
}
impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.host.hash(state);
        self.0.port.unwrap_or(0).hash(state);
        self.0.ip_addr.hash(state);
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Endpoint) -> Ordering {
        self.0
            .host
            .cmp(&other.0.host)
            .then_with(|| self.0.port.unwrap_or(0).cmp(&other.0.port.unwrap_or(0)))
            .then_with(|| ip_sort_key(self.0.ip_addr).cmp(&ip_sort_key(other.0.ip_addr)))
    }
}
impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Endpoint) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

fn ip_sort_key(ip: Option<IpAddr>) -> String {
    match ip {
        None => String::new(),
        Some(a) => canonical_ip_string(a),
    }
}

fn canonical_ip_string(ip: IpAddr) -> String {
    format!("{}", ip)
}

fn parse_port(s: &str) -> Result<u16> {
    let n: i64 = s
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("invalid port '{}'", s)))?;
    if n <= 0 || n > 65535 {
        return Err(Error::InvalidArgument(format!(
            "port {} out of range 1-65535",
            n
        )));
    }
    Ok(n as u16)
}

/// If `host` is an IP literal (optionally bracketed, optionally carrying
/// a zone id on a v6 address), returns its canonical textual form and
/// parsed address. Returns `Ok(None)` when `host` is not an IP literal at
/// all (i.e. should be treated as a hostname).
fn normalize_ip_literal(host: &str) -> Result<Option<(String, IpAddr)>> {
    let (body, had_brackets) = if host.starts_with('[') {
        if !host.ends_with(']') {
            return Err(Error::InvalidArgument(format!(
                "unmatched '[' in '{}'",
                host
            )));
        }
        (&host[1..host.len() - 1], true)
    } else {
        (host, false)
    };

    if body.contains('%') {
        let zone_at = body.find('%').unwrap();
        let addr_part = &body[..zone_at];
        if Ipv4Addr::from_str(addr_part).is_ok() {
            return Err(Error::InvalidArgument(format!(
                "zone id not valid on an IPv4 address: '{}'",
                host
            )));
        }
        if let Ok(v6) = Ipv6Addr::from_str(addr_part) {
            return Ok(Some((format!("{}", v6), IpAddr::V6(v6))));
        }
        return Err(Error::InvalidArgument(format!("invalid IP literal '{}'", host)));
    }

    if let Ok(v4) = Ipv4Addr::from_str(body) {
        if had_brackets {
            return Err(Error::InvalidArgument(
                "IPv4 address must not be bracketed".into(),
            ));
        }
        return Ok(Some((format!("{}", v4), IpAddr::V4(v4))));
    }

    if let Ok(v6) = Ipv6Addr::from_str(body) {
        return Ok(Some((format!("{}", v6), IpAddr::V6(v6))));
    }

    if had_brackets {
        return Err(Error::InvalidArgument(format!(
            "'{}' is bracketed but not a valid IPv6 literal",
            host
        )));
    }

    Ok(None)
}

trait StripPrefixColon {
    fn strip_prefix_colon(&self) -> Option<&str>;
}
impl StripPrefixColon for str {
    fn strip_prefix_colon(&self) -> Option<&str> {
        if self.starts_with(':') {
            Some(&self[1..])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_host_colon_port_in_single_arg_ctor() {
        assert!(Endpoint::of_host("foo:80").is_err());
    }

    #[test]
    fn s1_parse_v4_with_port() {
        let e = Endpoint::parse("192.168.0.1:80").unwrap();
        assert_eq!(e.host(), "192.168.0.1");
        assert_eq!(e.port(), Some(80));
        assert_eq!(e.ip_addr(), Some("192.168.0.1".parse().unwrap()));
        assert_eq!(e.ip_family(), IpFamily::V4);
        assert_eq!(e.authority(), "192.168.0.1:80");
        assert_eq!(e.to_uri("scheme", None), "scheme://192.168.0.1:80");
    }

    #[test]
    fn s2_v6_brackets() {
        let e = Endpoint::of("[::1]", 80).unwrap();
        assert_eq!(e.host(), "::1");
        assert_eq!(e.authority(), "[::1]:80");
        assert_eq!(e.to_uri("scheme", None), "scheme://[::1]:80");
        assert!(Endpoint::of_host("foo:80").is_err());
    }

    #[test]
    fn equality_ignores_weight_and_attributes() {
        let a = Endpoint::of("foo.com", 80).unwrap();
        let b = a.with_weight(1).with_weight(500);
        assert_eq!(a, b);
        let c = a.with_attr("region", AttributeValue::Text("us".into()));
        assert_eq!(a, c);
    }

    #[test]
    fn round_trip_without_attributes() {
        for s in &["foo.com", "foo.com:80", "192.168.0.1:80", "[::1]:80", "[::1]"] {
            let e = Endpoint::parse(s).unwrap();
            let e2 = Endpoint::parse(&e.authority()).unwrap();
            assert_eq!(e, e2);
        }
    }

    #[test]
    fn with_ip_addr_none_on_ip_literal_fails() {
        let e = Endpoint::of_host("10.0.0.1").unwrap();
        assert!(e.with_ip_addr(None).is_err());
    }

    #[test]
    fn zero_port_rejected() {
        assert!(Endpoint::of("foo.com", 0).is_err());
    }

    #[test]
    fn ordering_by_host_then_port_then_ip() {
        let a = Endpoint::parse("a.com:1").unwrap();
        let b = Endpoint::parse("a.com:2").unwrap();
        let c = Endpoint::parse("b.com:1").unwrap();
        assert!(a < b);
        assert!(b < c);
    }
}

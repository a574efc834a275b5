//! A per-event-loop resolver that sits above the raw DNS transport,
//! keeping hot entries fresh, negatively caching NXDOMAIN, and
//! honoring search-domain expansion.
//!
//! Grounded on the teacher's `balancer/endpoint.rs` backoff-on-failure
//! shape (state kept in an `Rc<RefCell<..>>`, scheduled via
//! `tokio_timer::Timer`) and `resolver/mod.rs`'s request/response
//! channel plumbing, generalized here to real DNS rather than an HTTP
//! control plane.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::future::{self, Either, Future};
use tacho;
use tokio_core::reactor::Handle;
use tokio_timer::Timer;

use dns::cache::{DnsCache, RemovalCause};
use dns::client;
use dns::config::{ResolverConfig, ResolvedAddressTypes, REFRESH_AT_FRACTION};
use dns::message::{Decoded, Question, QTYPE_A, QTYPE_AAAA};
use error::Error;
use metrics::ResolverMetrics;

struct PositiveEntry {
    address: IpAddr,
    ttl: Duration,
    hit_since_schedule: bool,
    consecutive_refresh_failures: u32,
    generation: u64,
    /// The exact search candidate that resolved (one of the values
    /// `search_candidates` would produce, not necessarily `name` itself).
    /// Refreshes re-query this candidate directly rather than re-deriving
    /// and guessing one, so a refresh can't silently bypass whatever
    /// search-domain expansion the original lookup preferred.
    queried_as: String,
}

struct Inner {
    positive: HashMap<String, PositiveEntry>,
    negative: HashMap<String, Instant>,
    /// Maps a (possibly search-expanded) question issued against the
    /// shared `DnsCache` back to the resolver-local key it serves, so a
    /// removal event on the shared cache can trigger a targeted refresh.
    dependents: HashMap<Question, String>,
    generation: u64,
    closed: bool,
}

/// Keeps hostnames resolved, refreshing them in the background as their
/// TTL approaches expiry.
#[derive(Clone)]
pub struct RefreshingAddressResolver {
    handle: Handle,
    timer: Timer,
    dns_cache: DnsCache,
    config: Rc<ResolverConfig>,
    inner: Rc<RefCell<Inner>>,
    metrics: ResolverMetrics,
}

impl RefreshingAddressResolver {
    pub fn new(
        handle: Handle,
        timer: Timer,
        dns_cache: DnsCache,
        config: ResolverConfig,
        metrics: &tacho::Scope,
    ) -> RefreshingAddressResolver {
        let resolver = RefreshingAddressResolver {
            handle: handle,
            timer: timer,
            dns_cache: dns_cache.clone(),
            config: Rc::new(config),
            inner: Rc::new(RefCell::new(Inner {
                positive: HashMap::new(),
                negative: HashMap::new(),
                dependents: HashMap::new(),
                generation: 0,
                closed: false,
            })),
            metrics: ResolverMetrics::new(metrics),
        };

        // The listener closure below is stored inside `dns_cache` itself,
        // so it must not hold a strong reference back to either the
        // cache or this resolver's state: that would be a reference
        // cycle neither Rc nor Arc ever frees (see DESIGN NOTES, "Cyclic
        // references"). It reconstructs a resolver handle on the fly
        // from weak pieces only when it actually needs to fire.
        let weak_inner = Rc::downgrade(&resolver.inner);
        let weak_cache = dns_cache.downgrade();
        let handle = resolver.handle.clone();
        let timer = resolver.timer.clone();
        let config = resolver.config.clone();
        let metrics = resolver.metrics.clone();
        dns_cache.register_removal_listener(Box::new(move |question, _cause| {
            let inner = match weak_inner.upgrade() {
                Some(inner) => inner,
                None => return,
            };
            let cache = match weak_cache.upgrade() {
                Some(cache) => cache,
                None => return,
            };
            let key = inner.borrow().dependents.get(question).cloned();
            if let Some(key) = key {
                let transient = RefreshingAddressResolver {
                    handle: handle.clone(),
                    timer: timer.clone(),
                    dns_cache: cache,
                    config: config.clone(),
                    inner: inner,
                    metrics: metrics.clone(),
                };
                transient.refresh_now(key);
            }
        }));

        resolver
    }

    /// Resolves `name`, preserving `port` on the returned address.
    /// Completes immediately on a cache hit; on a miss, issues fresh DNS
    /// queries honoring the configured address-family preference.
    pub fn resolve(&self, name: &str, port: u16) -> Box<Future<Item = SocketAddr, Error = Error>> {
        if self.inner.borrow().closed {
            return Box::new(future::err(Error::Cancelled));
        }

        self.metrics.incr_lookup();
        let key = name.to_string();
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(entry) = inner.positive.get_mut(&key) {
                entry.hit_since_schedule = true;
                self.metrics.incr_cache_hit();
                return Box::new(future::ok(SocketAddr::new(entry.address, port)));
            }
            if let Some(expiry) = inner.negative.get(&key).cloned() {
                if expiry > Instant::now() {
                    return Box::new(future::err(Error::UnknownHost(key)));
                }
                inner.negative.remove(&key);
            }
        }

        self.resolve_via_candidates(self.search_candidates(&key), 0, key, port)
    }

    /// Cancels all refresh tasks and empties the cache synchronously.
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.closed = true;
        inner.generation += 1;
        inner.positive.clear();
        inner.negative.clear();
        inner.dependents.clear();
        self.metrics.set_cache_size(0);
    }

    pub fn cache_len(&self) -> usize {
        let inner = self.inner.borrow();
        inner.positive.len() + inner.negative.len()
    }

    fn search_candidates(&self, name: &str) -> Vec<String> {
        let trailing_dot = name.ends_with('.');
        let bare = name.trim_right_matches('.');
        let dots = bare.matches('.').count() as u32;

        if self.config.search_domains.is_empty() || trailing_dot || dots >= self.config.ndots {
            return vec![bare.to_string()];
        }

        let mut candidates: Vec<String> = self.config
            .search_domains
            .iter()
            .map(|domain| format!("{}.{}", bare, domain.trim_left_matches('.')))
            .collect();
        candidates.push(bare.to_string());
        candidates
    }

    fn resolve_via_candidates(
        &self,
        candidates: Vec<String>,
        index: usize,
        original: String,
        port: u16,
    ) -> Box<Future<Item = SocketAddr, Error = Error>> {
        if index >= candidates.len() {
            self.cache_negative(original.clone());
            return Box::new(future::err(Error::UnknownHost(original)));
        }

        let candidate = candidates[index].clone();
        let resolver = self.clone();
        let candidates_rest = candidates.clone();
        let original_rest = original.clone();

        Box::new(self.query_preferred(&candidate).then(move |res| {
            match res {
                Ok((address, ttl_secs)) => {
                    resolver.cache_positive(original.clone(), candidate.clone(), address, ttl_secs);
                    Box::new(future::ok(SocketAddr::new(address, port)))
                        as Box<Future<Item = SocketAddr, Error = Error>>
                }
                Err(Error::UnknownHost(_)) => {
                    resolver.resolve_via_candidates(candidates_rest, index + 1, original_rest, port)
                }
                Err(e) => Box::new(future::err(e)),
            }
        }))
    }

    fn query_preferred(&self, name: &str) -> Box<Future<Item = (IpAddr, u32), Error = Error>> {
        let timeout = Duration::from_millis(self.config.query_timeout_ms);
        match self.config.resolved_address_types {
            ResolvedAddressTypes::V4Only => self.query_one(name, QTYPE_A, timeout),
            ResolvedAddressTypes::V6Only => self.query_one(name, QTYPE_AAAA, timeout),
            ResolvedAddressTypes::V4Preferred => self.query_both(name, timeout, true),
            ResolvedAddressTypes::V6Preferred => self.query_both(name, timeout, false),
        }
    }

    fn query_both(
        &self,
        name: &str,
        timeout: Duration,
        prefer_v4: bool,
    ) -> Box<Future<Item = (IpAddr, u32), Error = Error>> {
        let a = self.query_one(name, QTYPE_A, timeout);
        let aaaa = self.query_one(name, QTYPE_AAAA, timeout);
        let (primary, secondary) = if prefer_v4 { (a, aaaa) } else { (aaaa, a) };

        Box::new(primary.select2(secondary).then(
            move |res| -> Box<Future<Item = (IpAddr, u32), Error = Error>> {
                match res {
                    Ok(Either::A((primary_ok, _pending_secondary))) => {
                        Box::new(future::ok(primary_ok))
                    }
                    Ok(Either::B((secondary_ok, pending_primary))) => {
                        // The non-preferred family answered first; still
                        // prefer the primary family if it also answers.
                        Box::new(pending_primary.then(move |primary_res| match primary_res {
                            Ok(primary_ok) => Ok(primary_ok),
                            Err(_) => Ok(secondary_ok),
                        }))
                    }
                    Err(Either::A((primary_err, pending_secondary))) => {
                        Box::new(pending_secondary.map_err(move |e| combine_errors(primary_err, e)))
                    }
                    Err(Either::B((secondary_err, pending_primary))) => {
                        Box::new(pending_primary.map_err(move |e| combine_errors(e, secondary_err)))
                    }
                }
            },
        ))
    }

    fn query_one(
        &self,
        name: &str,
        record_type: u16,
        timeout: Duration,
    ) -> Box<Future<Item = (IpAddr, u32), Error = Error>> {
        let question = Question::new(name, record_type);
        let upstreams = self.config.upstreams.clone();
        let name_for_err = question.name.clone();

        Box::new(
            client::query(&self.handle, &self.timer, &upstreams, &question, timeout).and_then(
                move |decoded: Decoded| classify(decoded, &name_for_err),
            ),
        )
    }

    fn cache_positive(&self, original: String, queried_as: String, address: IpAddr, ttl_secs: u32) {
        let ttl = Duration::from_secs(u64::from(ttl_secs));
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return;
        }
        let generation = inner.generation;
        inner.positive.insert(
            original.clone(),
            PositiveEntry {
                address: address,
                ttl: ttl,
                hit_since_schedule: true,
                consecutive_refresh_failures: 0,
                generation: generation,
                queried_as: queried_as.clone(),
            },
        );
        // The shared cache is keyed by record type; this resolver only
        // needs "some address was cached for this name" to know when to
        // refresh, so both A and AAAA share one dependency slot here.
        let family_type = if address.is_ipv4() { QTYPE_A } else { QTYPE_AAAA };
        let question = Question::new(queried_as.clone(), family_type);
        inner.dependents.insert(question.clone(), original.clone());
        drop(inner);
        self.metrics.set_cache_size(self.cache_len());

        self.dns_cache.put_positive(
            question,
            vec![::dns::message::Answer {
                address: address,
                ttl_secs: ttl_secs,
            }],
        );
        self.schedule_refresh(original, ttl, generation);
    }

    fn cache_negative(&self, original: String) {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return;
        }
        let negative_ttl = Duration::from_secs(self.config.negative_ttl_secs);
        if negative_ttl == Duration::from_secs(0) {
            return;
        }
        inner.negative.insert(original, Instant::now() + negative_ttl);
        drop(inner);
        self.metrics.set_cache_size(self.cache_len());
    }

    fn schedule_refresh(&self, key: String, ttl: Duration, generation: u64) {
        let ttl_ms = ttl.as_secs() * 1000 + u64::from(ttl.subsec_nanos()) / 1_000_000;
        let refresh_at = Duration::from_millis((ttl_ms as f64 * REFRESH_AT_FRACTION) as u64);
        let resolver = self.clone();
        let handle = self.handle.clone();
        let task = self.timer.sleep(refresh_at).then(move |_| {
            resolver.run_scheduled_refresh(key, generation, 0);
            Ok::<(), ()>(())
        });
        handle.spawn(task);
    }

    fn run_scheduled_refresh(&self, key: String, generation: u64, attempt: u32) {
        let hot = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed || inner.generation != generation {
                return;
            }
            match inner.positive.get_mut(&key) {
                Some(entry) if entry.generation == generation => {
                    let was_hot = entry.hit_since_schedule;
                    entry.hit_since_schedule = false;
                    was_hot
                }
                _ => return,
            }
        };

        if !hot {
            // Cold entries are evicted at their TTL boundary rather than
            // refreshed.
            self.inner.borrow_mut().positive.remove(&key);
            return;
        }

        self.refresh_now_with_attempt(key, attempt);
    }

    fn refresh_now(&self, key: String) {
        self.refresh_now_with_attempt(key, 0);
    }

    fn refresh_now_with_attempt(&self, key: String, attempt: u32) {
        let resolver = self.clone();
        let handle = self.handle.clone();
        // Replay the exact candidate that resolved last time, rather
        // than re-deriving `search_candidates` and guessing: that list
        // always ends with the bare name, so guessing would quietly skip
        // search-domain expansion on every refresh.
        let key_for_query = {
            let inner = self.inner.borrow();
            inner
                .positive
                .get(&key)
                .map(|entry| entry.queried_as.clone())
                .unwrap_or_else(|| key.clone())
        };
        let key_for_query2 = key_for_query.clone();
        let key2 = key.clone();

        let fut = self.query_preferred(&key_for_query).then(move |res| {
            match res {
                Ok((address, ttl_secs)) => {
                    resolver.on_refresh_success(key2, key_for_query2, address, ttl_secs);
                }
                Err(_) => {
                    resolver.on_refresh_failure(key2, attempt);
                }
            }
            Ok::<(), ()>(())
        });
        handle.spawn(fut);
    }

    fn on_refresh_success(&self, key: String, queried_as: String, address: IpAddr, ttl_secs: u32) {
        let ttl = Duration::from_secs(u64::from(ttl_secs));
        let generation = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return;
            }
            let generation = inner.generation;
            if let Some(entry) = inner.positive.get_mut(&key) {
                entry.address = address;
                entry.ttl = ttl;
                entry.consecutive_refresh_failures = 0;
                entry.queried_as = queried_as;
            } else {
                inner.positive.insert(
                    key.clone(),
                    PositiveEntry {
                        address: address,
                        ttl: ttl,
                        hit_since_schedule: false,
                        consecutive_refresh_failures: 0,
                        generation: generation,
                        queried_as: queried_as,
                    },
                );
            }
            generation
        };
        self.metrics.incr_refresh_success();
        self.schedule_refresh(key, ttl, generation);
    }

    fn on_refresh_failure(&self, key: String, attempt: u32) {
        self.metrics.incr_refresh_failure();
        let max_attempts = self.config.refresh_backoff.max_attempts;
        let generation = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return;
            }
            match inner.positive.get_mut(&key) {
                Some(entry) => {
                    entry.consecutive_refresh_failures += 1;
                    if entry.consecutive_refresh_failures > max_attempts {
                        inner.positive.remove(&key);
                        return;
                    }
                    entry.generation
                }
                None => return,
            }
        };

        let resolver = self.clone();
        let handle = self.handle.clone();
        let delay = self.config.refresh_backoff.delay_for_attempt(attempt);
        let key2 = key.clone();
        let task = self.timer.sleep(delay).then(move |_| {
            resolver.run_scheduled_refresh_ignoring_hotness(key2, generation, attempt + 1);
            Ok::<(), ()>(())
        });
        handle.spawn(task);
    }

    fn run_scheduled_refresh_ignoring_hotness(&self, key: String, generation: u64, attempt: u32) {
        {
            let inner = self.inner.borrow();
            if inner.closed || inner.generation != generation {
                return;
            }
            if !inner.positive.contains_key(&key) {
                return;
            }
        }
        self.refresh_now_with_attempt(key, attempt);
    }
}

fn classify(decoded: Decoded, name: &str) -> Result<(IpAddr, u32), Error> {
    const RCODE_NXDOMAIN: u8 = 3;
    if decoded.rcode == RCODE_NXDOMAIN {
        return Err(Error::UnknownHost(name.to_string()));
    }
    match decoded.answers.first() {
        Some(answer) => Ok((answer.address, answer.ttl_secs)),
        None => Err(Error::UnknownHost(name.to_string())),
    }
}

fn combine_errors(a: Error, b: Error) -> Error {
    match (&a, &b) {
        (&Error::UnknownHost(ref h), _) => Error::UnknownHost(h.clone()),
        (_, &Error::UnknownHost(ref h)) => Error::UnknownHost(h.clone()),
        (&Error::DnsTimeout(ref qs), _) => Error::DnsTimeout(qs.clone()),
        _ => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndots_below_threshold_expands_with_search_domains() {
        let config = ResolverConfig {
            search_domains: vec!["corp.example".into()],
            ndots: 2,
            ..ResolverConfig::default()
        };
        let resolver = test_resolver(config);
        let cands = resolver.search_candidates("foo");
        assert_eq!(cands, vec!["foo.corp.example".to_string(), "foo".to_string()]);
    }

    #[test]
    fn ndots_at_threshold_skips_expansion() {
        let config = ResolverConfig {
            search_domains: vec!["corp.example".into()],
            ndots: 1,
            ..ResolverConfig::default()
        };
        let resolver = test_resolver(config);
        assert_eq!(resolver.search_candidates("foo.bar"), vec!["foo.bar".to_string()]);
    }

    #[test]
    fn trailing_dot_skips_expansion() {
        let config = ResolverConfig {
            search_domains: vec!["corp.example".into()],
            ndots: 5,
            ..ResolverConfig::default()
        };
        let resolver = test_resolver(config);
        assert_eq!(resolver.search_candidates("foo."), vec!["foo".to_string()]);
    }

    fn test_resolver(config: ResolverConfig) -> RefreshingAddressResolver {
        let core = ::tokio_core::reactor::Core::new().unwrap();
        let timer = Timer::default();
        let dns_cache = DnsCache::new(None);
        RefreshingAddressResolver::new(core.handle(), timer, dns_cache, config, &::tacho::new().0)
    }
}

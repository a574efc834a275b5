//! A shared, bounded DNS question -> answer cache with TTL and removal
//! notifications. Unlike the rest of this crate (single-threaded, tied
//! to one event loop), `DnsCache` is explicitly a cross-event-loop
//! shared resource (§5 "Shared resources"), so it is built on
//! `Arc<Mutex<..>>` rather than `Rc<RefCell<..>>`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use dns::message::{Answer, Question};

/// Why a cache entry was removed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RemovalCause {
    Explicit,
    Expired,
    Replaced,
    Capacity,
}

#[derive(Clone, Debug)]
enum Entry {
    Positive { records: Vec<Answer>, expires_at: Instant },
    Negative { expires_at: Instant },
}

impl Entry {
    fn expires_at(&self) -> Instant {
        match *self {
            Entry::Positive { expires_at, .. } => expires_at,
            Entry::Negative { expires_at } => expires_at,
        }
    }
}

pub type RemovalListener = Box<Fn(&Question, RemovalCause) + Send + Sync>;

struct Inner {
    capacity: Option<usize>,
    entries: HashMap<Question, Entry>,
    listeners: Vec<RemovalListener>,
}

/// A process-wide positive/negative answer cache.
#[derive(Clone)]
pub struct DnsCache {
    inner: Arc<Mutex<Inner>>,
}

impl DnsCache {
    /// `capacity` of `None` means unlimited, matching the spec's default.
    pub fn new(capacity: Option<usize>) -> DnsCache {
        DnsCache {
            inner: Arc::new(Mutex::new(Inner {
                capacity: capacity,
                entries: HashMap::new(),
                listeners: Vec::new(),
            })),
        }
    }

    /// A non-owning handle. Resolvers couple to a shared `DnsCache`
    /// through `WeakDnsCache` rather than a strong clone, so a
    /// removal-listener closure registered here never keeps the cache
    /// (or, transitively, itself) alive forever.
    pub fn downgrade(&self) -> WeakDnsCache {
        WeakDnsCache(Arc::downgrade(&self.inner))
    }

    pub fn register_removal_listener(&self, listener: RemovalListener) {
        self.inner.lock().unwrap().listeners.push(listener);
    }

    /// Stores positive answer records, expiring at `now + min(ttl)`.
    pub fn put_positive(&self, question: Question, records: Vec<Answer>) {
        let ttl = records.iter().map(|a| a.ttl_secs).min().unwrap_or(0);
        let expires_at = Instant::now() + Duration::from_secs(u64::from(ttl));
        self.insert(question, Entry::Positive { records, expires_at });
    }

    /// Caches NXDOMAIN for `negative_ttl`. A `negative_ttl` of zero
    /// disables negative caching: the call is a no-op.
    pub fn put_negative(&self, question: Question, negative_ttl: Duration) {
        if negative_ttl == Duration::from_secs(0) {
            return;
        }
        let expires_at = Instant::now() + negative_ttl;
        self.insert(question, Entry::Negative { expires_at });
    }

    fn insert(&self, question: Question, entry: Entry) {
        let mut inner = self.inner.lock().unwrap();
        let replaced = inner.entries.insert(question.clone(), entry).is_some();
        if replaced {
            DnsCache::notify(&inner.listeners, &question, RemovalCause::Replaced);
        }
        if let Some(cap) = inner.capacity {
            while inner.entries.len() > cap {
                let evict = inner.entries.keys().next().cloned();
                if let Some(q) = evict {
                    inner.entries.remove(&q);
                    DnsCache::notify(&inner.listeners, &q, RemovalCause::Capacity);
                } else {
                    break;
                }
            }
        }
    }

    /// Positive hit, already-expired positive entry treated as a miss,
    /// and a separate `is_negative` bit for NXDOMAIN hits.
    pub fn get(&self, question: &Question) -> Lookup {
        let mut inner = self.inner.lock().unwrap();
        let expired = match inner.entries.get(question) {
            Some(e) => e.expires_at() <= Instant::now(),
            None => return Lookup::Miss,
        };
        if expired {
            inner.entries.remove(question);
            DnsCache::notify(&inner.listeners, question, RemovalCause::Expired);
            return Lookup::Miss;
        }
        match inner.entries.get(question) {
            Some(Entry::Positive { records, .. }) => Lookup::Positive(records.clone()),
            Some(Entry::Negative { .. }) => Lookup::Negative,
            None => Lookup::Miss,
        }
    }

    pub fn remove(&self, question: &Question) {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.remove(question).is_some() {
            DnsCache::notify(&inner.listeners, question, RemovalCause::Explicit);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    fn notify(listeners: &[RemovalListener], question: &Question, cause: RemovalCause) {
        for l in listeners {
            l(question, cause);
        }
    }
}

pub enum Lookup {
    Positive(Vec<Answer>),
    Negative,
    Miss,
}

/// A non-owning reference to a shared `DnsCache`.
#[derive(Clone)]
pub struct WeakDnsCache(Weak<Mutex<Inner>>);

impl WeakDnsCache {
    pub fn upgrade(&self) -> Option<DnsCache> {
        self.0.upgrade().map(|inner| DnsCache { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns::message::QTYPE_A;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn positive_hit_then_miss_after_expiry_is_simulated_via_remove() {
        let cache = DnsCache::new(None);
        let q = Question::new("foo.com", QTYPE_A);
        cache.put_positive(
            q.clone(),
            vec![Answer {
                address: "1.1.1.1".parse::<IpAddr>().unwrap(),
                ttl_secs: 60,
            }],
        );
        match cache.get(&q) {
            Lookup::Positive(ref records) => assert_eq!(records.len(), 1),
            _ => panic!("expected a positive hit"),
        }
        cache.remove(&q);
        match cache.get(&q) {
            Lookup::Miss => {}
            _ => panic!("expected a miss after explicit removal"),
        }
    }

    #[test]
    fn negative_ttl_zero_disables_negative_caching() {
        let cache = DnsCache::new(None);
        let q = Question::new("nx.com", QTYPE_A);
        cache.put_negative(q.clone(), Duration::from_secs(0));
        match cache.get(&q) {
            Lookup::Miss => {}
            _ => panic!("negative_ttl=0 must not cache"),
        }
    }

    #[test]
    fn removal_listener_receives_cause() {
        let cache = DnsCache::new(None);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        cache.register_removal_listener(Box::new(move |_q, cause| {
            if cause == RemovalCause::Explicit {
                seen2.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let q = Question::new("foo.com", QTYPE_A);
        cache.put_positive(
            q.clone(),
            vec![Answer {
                address: "1.1.1.1".parse::<IpAddr>().unwrap(),
                ttl_secs: 60,
            }],
        );
        cache.remove(&q);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn capacity_eviction_fires_capacity_cause() {
        let cache = DnsCache::new(Some(1));
        let evicted = Arc::new(AtomicUsize::new(0));
        let evicted2 = evicted.clone();
        cache.register_removal_listener(Box::new(move |_q, cause| {
            if cause == RemovalCause::Capacity {
                evicted2.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let a = Question::new("a.com", QTYPE_A);
        let b = Question::new("b.com", QTYPE_A);
        let ans = vec![Answer {
            address: "1.1.1.1".parse::<IpAddr>().unwrap(),
            ttl_secs: 60,
        }];
        cache.put_positive(a, ans.clone());
        cache.put_positive(b, ans);
        assert_eq!(cache.len(), 1);
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
    }
}

//! Serde-deserializable resolver configuration, in the same
//! `deny_unknown_fields`/`camelCase` style as the rest of this runtime's
//! configuration surface.

use std::net::SocketAddr;
use std::time::Duration;

/// Which record types a name lookup issues, and how a v4/v6 split is
/// resolved when both answer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolvedAddressTypes {
    V4Only,
    V6Only,
    V4Preferred,
    V6Preferred,
}

impl Default for ResolvedAddressTypes {
    fn default() -> ResolvedAddressTypes {
        ResolvedAddressTypes::V4Preferred
    }
}

/// Backoff applied between failed refresh attempts. A `base_ms` of zero
/// emulates "refresh immediately, always."
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RefreshBackoffConfig {
    pub base_ms: u64,
    pub max_attempts: u32,
}

impl Default for RefreshBackoffConfig {
    fn default() -> RefreshBackoffConfig {
        RefreshBackoffConfig {
            base_ms: 0,
            max_attempts: 3,
        }
    }
}

impl RefreshBackoffConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_ms.saturating_mul(u64::from(attempt + 1)))
    }
}

/// Fraction of a record's TTL at which the resolver schedules a refresh.
/// Fixed at 90% per the design; not configurable.
pub const REFRESH_AT_FRACTION: f64 = 0.9;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ResolverConfig {
    pub upstreams: Vec<SocketAddr>,
    pub query_timeout_ms: u64,
    pub negative_ttl_secs: u64,
    #[serde(default)]
    pub search_domains: Vec<String>,
    #[serde(default = "default_ndots")]
    pub ndots: u32,
    #[serde(default)]
    pub refresh_backoff: RefreshBackoffConfig,
    #[serde(default)]
    pub resolved_address_types: ResolvedAddressTypes,
    #[serde(default)]
    pub dns_cache_capacity: Option<usize>,
}

fn default_ndots() -> u32 {
    1
}

impl Default for ResolverConfig {
    fn default() -> ResolverConfig {
        ResolverConfig {
            upstreams: Vec::new(),
            query_timeout_ms: 5_000,
            negative_ttl_secs: 0,
            search_domains: Vec::new(),
            ndots: default_ndots(),
            refresh_backoff: RefreshBackoffConfig::default(),
            resolved_address_types: ResolvedAddressTypes::default(),
            dns_cache_capacity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = "
upstreams:
  - 127.0.0.1:53
queryTimeoutMs: 1000
negativeTtlSecs: 2
";
        let cfg: ResolverConfig = ::serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.upstreams.len(), 1);
        assert_eq!(cfg.ndots, 1);
        assert_eq!(cfg.resolved_address_types, ResolvedAddressTypes::V4Preferred);
    }
}

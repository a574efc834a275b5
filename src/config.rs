//! Top-level runtime configuration: the resolver config from `dns`
//! plus pool/retry settings, loaded via the teacher's `from_str`
//! JSON-or-YAML dispatch (sniffing the leading `{`).

use dns::ResolverConfig;
use error::Result;
use pool::http2::{DEFAULT_MAX_HEADER_LIST_SIZE, DEFAULT_WINDOW_SIZE, Http2Settings};

pub fn from_str(mut txt: &str) -> Result<RuntimeConfig> {
    txt = txt.trim_left();
    if txt.starts_with('{') {
        Ok(::serde_json::from_str(txt)?)
    } else {
        Ok(::serde_yaml::from_str(txt)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PoolConfig {
    #[serde(default)]
    pub use_http1_pipelining: bool,
    #[serde(default)]
    pub max_connection_age_millis: Option<u64>,
    #[serde(default)]
    pub http2: Http2ConfigSection,
}

impl Default for PoolConfig {
    fn default() -> PoolConfig {
        PoolConfig {
            use_http1_pipelining: false,
            max_connection_age_millis: None,
            http2: Http2ConfigSection::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Http2ConfigSection {
    #[serde(default = "default_window_size")]
    pub initial_stream_window_size: u32,
    #[serde(default = "default_window_size")]
    pub initial_connection_window_size: u32,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
    #[serde(default = "default_max_header_list_size")]
    pub max_header_list_size: u32,
}

fn default_window_size() -> u32 {
    DEFAULT_WINDOW_SIZE
}
fn default_max_frame_size() -> u32 {
    16_384
}
fn default_max_header_list_size() -> u32 {
    DEFAULT_MAX_HEADER_LIST_SIZE
}

impl Default for Http2ConfigSection {
    fn default() -> Http2ConfigSection {
        Http2ConfigSection {
            initial_stream_window_size: default_window_size(),
            initial_connection_window_size: default_window_size(),
            max_frame_size: default_max_frame_size(),
            max_header_list_size: default_max_header_list_size(),
        }
    }
}

impl Http2ConfigSection {
    pub fn to_settings(&self) -> Http2Settings {
        Http2Settings {
            initial_stream_window_size: self.initial_stream_window_size,
            initial_connection_window_size: self.initial_connection_window_size,
            max_frame_size: self.max_frame_size,
            max_header_list_size: self.max_header_list_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_yaml() {
        let yaml = "
resolver:
  upstreams:
    - 127.0.0.1:53
  queryTimeoutMs: 1000
  negativeTtlSecs: 0
pool:
  useHttp1Pipelining: true
";
        let cfg = from_str(yaml).unwrap();
        assert!(cfg.pool.use_http1_pipelining);
        assert_eq!(cfg.resolver.upstreams.len(), 1);
    }

    #[test]
    fn parse_simple_json() {
        let json = "{\"resolver\": {\"upstreams\": [\"127.0.0.1:53\"], \"queryTimeoutMs\": 1000, \
                     \"negativeTtlSecs\": 0}}";
        let cfg = from_str(json).unwrap();
        assert_eq!(cfg.resolver.upstreams.len(), 1);
        assert!(!cfg.pool.use_http1_pipelining);
    }
}

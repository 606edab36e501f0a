//! Parameter sanitization before key derivation

use regex::Regex;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;

/// Placeholder substituted for containers nested deeper than the limit
pub const DEPTH_LIMITED: &str = "[DEPTH_LIMITED]";

/// Strips and normalizes an untrusted parameter value before it is folded
/// into a cache key
///
/// Sanitizers never fail: a value that cannot be cleaned is replaced with a
/// safe default instead.
pub trait Sanitizer: Send + Sync + 'static {
    /// Clean a single parameter value
    fn sanitize(&self, value: Value) -> Value;
}

/// Sanitizer that returns every value unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSanitizer;

impl Sanitizer for PassthroughSanitizer {
    fn sanitize(&self, value: Value) -> Value {
        value
    }
}

/// Extra string rule applied after the built-in ones
pub type CustomFilter = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Rules used by [`StrictSanitizer`]
#[derive(Clone)]
pub struct FilterConfig {
    /// Words removed from strings (matched case-insensitively on word boundaries)
    pub sql_keywords: Vec<String>,
    /// Remove anything that looks like an HTML tag
    pub remove_html_tags: bool,
    /// Trim leading and trailing whitespace
    pub trim_whitespace: bool,
    /// Maximum string length in characters
    pub max_string_len: usize,
    /// Numbers are clamped to `[-max_abs_number, max_abs_number]`
    pub max_abs_number: i64,
    /// Containers nested deeper than this are replaced by [`DEPTH_LIMITED`]
    pub max_depth: usize,
    /// Additional rules applied to every string, in order
    pub custom_filters: Vec<CustomFilter>,
}

impl fmt::Debug for FilterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterConfig")
            .field("sql_keywords", &self.sql_keywords.len())
            .field("remove_html_tags", &self.remove_html_tags)
            .field("trim_whitespace", &self.trim_whitespace)
            .field("max_string_len", &self.max_string_len)
            .field("max_abs_number", &self.max_abs_number)
            .field("max_depth", &self.max_depth)
            .field("custom_filters", &self.custom_filters.len())
            .finish()
    }
}

const DEFAULT_SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "ORDER", "GROUP", "LIMIT",
    "OFFSET", "HAVING", "UNION", "DISTINCT", "AS", "ON", "IN", "NOT", "OR", "AND", "LIKE",
    "BETWEEN", "IS", "NULL", "EXEC", "EXECUTE", "SP_EXECUTE", "CALL", "DROP", "CREATE", "ALTER",
    "TRUNCATE", "RENAME", "GRANT", "REVOKE", "INDEX", "VIEW", "PROCEDURE", "FUNCTION", "TRIGGER",
    "EVENT", "TABLE", "DATABASE", "SCHEMA",
];

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sql_keywords: DEFAULT_SQL_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            remove_html_tags: true,
            trim_whitespace: true,
            max_string_len: 1000,
            max_abs_number: 1_000_000,
            max_depth: 5,
            custom_filters: Vec::new(),
        }
    }
}

impl FilterConfig {
    /// Replace the keyword list
    pub fn sql_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sql_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Append a custom string rule
    pub fn custom_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.custom_filters.push(Arc::new(filter));
        self
    }
}

/// Default sanitizer for untrusted request parameters
///
/// Strings are trimmed, stripped of HTML tags, SQL keywords and anything
/// outside word characters and CJK ideographs, then truncated. Numbers are
/// clamped and deep nesting is cut off.
#[derive(Debug, Clone)]
pub struct StrictSanitizer {
    config: FilterConfig,
    html_tags: Regex,
    keywords: Option<Regex>,
    disallowed_chars: Regex,
    script_scheme: Regex,
    event_handlers: Regex,
}

impl StrictSanitizer {
    /// Build a sanitizer from a rule set
    pub fn new(config: FilterConfig) -> Self {
        let keywords = if config.sql_keywords.is_empty() {
            None
        } else {
            let alternation = config
                .sql_keywords
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).ok()
        };

        Self {
            html_tags: Regex::new(r"<[^>]*>").expect("static pattern"),
            keywords,
            disallowed_chars: Regex::new(r"[^A-Za-z0-9_\x{4e00}-\x{9fa5}]")
                .expect("static pattern"),
            script_scheme: Regex::new(r"(?i)javascript:").expect("static pattern"),
            event_handlers: Regex::new(r"(?i)on\w+\s*=").expect("static pattern"),
            config,
        }
    }

    fn clean_string(&self, mut value: String) -> String {
        if self.config.trim_whitespace {
            value = value.trim().to_string();
        }
        if self.config.remove_html_tags {
            value = self.html_tags.replace_all(&value, "").into_owned();
        }
        if let Some(keywords) = &self.keywords {
            value = keywords.replace_all(&value, "").into_owned();
        }
        value = self.disallowed_chars.replace_all(&value, "").into_owned();
        value = self.script_scheme.replace_all(&value, "").into_owned();
        value = self.event_handlers.replace_all(&value, "").into_owned();

        if value.chars().count() > self.config.max_string_len {
            value = value.chars().take(self.config.max_string_len).collect();
        }

        for filter in &self.config.custom_filters {
            value = filter(value);
        }
        value
    }

    fn clamp_number(&self, number: Number) -> Value {
        let max = self.config.max_abs_number;
        if let Some(i) = number.as_i64() {
            Value::from(i.clamp(-max, max))
        } else if number.as_u64().is_some() {
            Value::from(max)
        } else {
            let f = number.as_f64().unwrap_or_default();
            Value::from(f.clamp(-(max as f64), max as f64))
        }
    }

    fn clean(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.clean_string(s)),
            Value::Number(n) => self.clamp_number(n),
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.clean(v)).collect()),
            Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, self.clean(v))).collect())
            }
            other => other,
        }
    }
}

impl Default for StrictSanitizer {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

impl Sanitizer for StrictSanitizer {
    fn sanitize(&self, value: Value) -> Value {
        let mut cleaned = self.clean(value);
        limit_depth(&mut cleaned, self.config.max_depth, 1);
        cleaned
    }
}

/// Replace containers nested below `max_depth` with [`DEPTH_LIMITED`]
fn limit_depth(value: &mut Value, max_depth: usize, depth: usize) {
    let children: Box<dyn Iterator<Item = &mut Value> + '_> = match value {
        Value::Array(items) => Box::new(items.iter_mut()),
        Value::Object(map) => Box::new(map.values_mut()),
        _ => return,
    };

    for child in children {
        if !matches!(child, Value::Array(_) | Value::Object(_)) {
            continue;
        }
        if depth >= max_depth {
            *child = Value::String(DEPTH_LIMITED.to_string());
        } else {
            limit_depth(child, max_depth, depth + 1);
        }
    }
}

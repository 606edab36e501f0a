//! Core traits for cache operations

mod metrics;
mod sanitizer;
mod serializer;
mod store;

#[cfg(feature = "tracing")]
mod tracing;

pub use metrics::{CacheMetrics, CacheOperation, CacheTier, LockOutcome, NoopMetrics};
pub use sanitizer::{
    CustomFilter, DEPTH_LIMITED, FilterConfig, PassthroughSanitizer, Sanitizer, StrictSanitizer,
};
pub use serializer::{JsonSerializer, Serializer};
pub use store::{RemoteStore, StoreCommand};

#[cfg(feature = "metrics")]
pub use metrics::MetricsCrateAdapter;

#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;

#[cfg(feature = "tracing")]
pub use self::tracing::TracingMetrics;

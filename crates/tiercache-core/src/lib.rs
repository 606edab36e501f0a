//! tiercache-core: Core traits and types for the tiercache library
//!
//! This crate holds the pieces shared by the storage backends and the
//! tiered cache: the error type, the enumerated remote store interface,
//! the parameter sanitizer and serializer seams, metrics hooks and the
//! result types returned by lookups.

mod error;
mod traits;
mod types;

pub use error::{CacheError, Result};
pub use traits::*;
pub use types::*;

//! Scan report persistence.
//!
//! Provides a JSON-file cache of reports keyed by target with a TTL.

mod cache;

pub use cache::{CacheEntry, ScanCache};

//! Normalized-result cache.
//!
//! Query results are cached by operation name, document text and variables.
//! Only error-free responses are written. Mutations and subscriptions never
//! touch the cache.
//!
//! Every [`Cache::reset`] bumps the cache generation. A write carries the
//! generation observed before its request was sent and is dropped if a reset
//! happened since, so a result fetched before sign-out never lands in the
//! signed-out cache.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::protocol::{GraphQLResponse, Operation};

// ============================================================================
// FetchPolicy
// ============================================================================

/// How a query consults the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve from cache when possible, otherwise fetch and store.
    #[default]
    CacheFirst,
    /// Always fetch, then store.
    NetworkOnly,
    /// Serve from cache or fail with [`Error::CacheMiss`](crate::Error::CacheMiss).
    CacheOnly,
    /// Always fetch, never store.
    NoCache,
}

impl FetchPolicy {
    /// Returns `true` if a cached result may be served.
    #[inline]
    #[must_use]
    pub const fn reads_cache(&self) -> bool {
        matches!(self, Self::CacheFirst | Self::CacheOnly)
    }

    /// Returns `true` if network results are stored.
    #[inline]
    #[must_use]
    pub const fn writes_cache(&self) -> bool {
        matches!(self, Self::CacheFirst | Self::NetworkOnly)
    }
}

// ============================================================================
// CacheKey
// ============================================================================

/// Identity of a cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key of `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the variables cannot be
    /// serialized.
    pub fn for_operation(operation: &Operation) -> Result<Self> {
        let key = json!({
            "operationName": operation.operation_name,
            "query": operation.query(),
            "variables": operation.variables,
        });
        Ok(Self(serde_json::to_string(&key)?))
    }

    /// Returns the key string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Query result store.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the stored result for `key`.
    fn read(&self, key: &CacheKey) -> Option<GraphQLResponse>;

    /// Returns the number of resets so far.
    fn generation(&self) -> u64;

    /// Stores `response` under `key` unless the cache was reset after
    /// `generation` was read.
    ///
    /// Returns `true` if the response was stored.
    fn write(&self, key: CacheKey, response: GraphQLResponse, generation: u64) -> bool;

    /// Removes every stored result and bumps the generation.
    async fn reset(&self) -> Result<()>;
}

// ============================================================================
// InMemoryCache
// ============================================================================

/// Process-local cache.
#[derive(Default)]
pub struct InMemoryCache {
    store: Mutex<Store>,
}

#[derive(Default)]
struct Store {
    entries: FxHashMap<CacheKey, GraphQLResponse>,
    generation: u64,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().entries.is_empty()
    }
}

impl fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.lock();
        f.debug_struct("InMemoryCache")
            .field("entries", &store.entries.len())
            .field("generation", &store.generation)
            .finish()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    fn read(&self, key: &CacheKey) -> Option<GraphQLResponse> {
        self.store.lock().entries.get(key).cloned()
    }

    fn generation(&self) -> u64 {
        self.store.lock().generation
    }

    fn write(&self, key: CacheKey, response: GraphQLResponse, generation: u64) -> bool {
        if response.has_errors() {
            return false;
        }

        let mut store = self.store.lock();
        if store.generation != generation {
            debug!(key = %key, "Dropping result fetched before cache reset");
            return false;
        }
        store.entries.insert(key, response);
        true
    }

    async fn reset(&self) -> Result<()> {
        let (cleared, generation) = {
            let mut store = self.store.lock();
            let count = store.entries.len();
            store.entries.clear();
            store.generation = store.generation.wrapping_add(1);
            (count, store.generation)
        };
        debug!(cleared, generation, "Cache reset");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::GraphQLError;

    fn response(data: serde_json::Value) -> GraphQLResponse {
        GraphQLResponse {
            data: Some(data),
            ..GraphQLResponse::default()
        }
    }

    #[test]
    fn test_key_depends_on_variables() {
        let base = Operation::parse("query App($id: ID!) { app(id: $id) { id } }").expect("parse");
        let a = CacheKey::for_operation(&base.clone().variable("id", "a")).expect("key");
        let b = CacheKey::for_operation(&base.clone().variable("id", "b")).expect("key");
        let a2 = CacheKey::for_operation(&base.variable("id", "a")).expect("key");

        assert_ne!(a, b);
        assert_eq!(a, a2);
    }

    #[test]
    fn test_context_headers_do_not_affect_key() {
        let op = Operation::parse("{ apps { id } }").expect("parse");
        let plain = CacheKey::for_operation(&op).expect("key");
        let with_header = CacheKey::for_operation(&op.header("x-trace", "1")).expect("key");
        assert_eq!(plain, with_header);
    }

    #[test]
    fn test_error_responses_are_not_stored() {
        let cache = InMemoryCache::new();
        let key = CacheKey::for_operation(&Operation::parse("{ a }").expect("parse")).expect("key");

        let stored = cache.write(
            key.clone(),
            GraphQLResponse {
                errors: vec![GraphQLError::new("boom")],
                ..GraphQLResponse::default()
            },
            cache.generation(),
        );
        assert!(!stored);
        assert!(cache.read(&key).is_none());

        assert!(cache.write(key.clone(), response(json!({ "a": 1 })), cache.generation()));
        assert_eq!(cache.read(&key), Some(response(json!({ "a": 1 }))));
    }

    #[test]
    fn test_reset_clears_entries() {
        let cache = InMemoryCache::new();
        let key = CacheKey::for_operation(&Operation::parse("{ a }").expect("parse")).expect("key");
        cache.write(key, response(json!({ "a": 1 })), cache.generation());
        assert_eq!(cache.len(), 1);

        tokio_test::block_on(cache.reset()).expect("reset");
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), 1);
    }

    #[test]
    fn test_write_from_before_reset_is_dropped() {
        let cache = InMemoryCache::new();
        let key = CacheKey::for_operation(&Operation::parse("{ me }").expect("parse")).expect("key");

        let before = cache.generation();
        tokio_test::block_on(cache.reset()).expect("reset");

        assert!(!cache.write(key.clone(), response(json!({ "me": "alice" })), before));
        assert!(cache.read(&key).is_none());
        assert!(cache.is_empty());

        assert!(cache.write(key.clone(), response(json!({ "me": null })), cache.generation()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fetch_policy_flags() {
        assert_eq!(FetchPolicy::default(), FetchPolicy::CacheFirst);
        assert!(FetchPolicy::CacheOnly.reads_cache());
        assert!(!FetchPolicy::CacheOnly.writes_cache());
        assert!(!FetchPolicy::NetworkOnly.reads_cache());
        assert!(!FetchPolicy::NoCache.writes_cache());

        let parsed: FetchPolicy = serde_json::from_str(r#""network-only""#).expect("parse");
        assert_eq!(parsed, FetchPolicy::NetworkOnly);
    }
}

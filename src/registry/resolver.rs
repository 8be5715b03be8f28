//! # Function Resolver
//!
//! Turns a `function_id` into a callable, caching every successful resolution
//! for the lifetime of the process. The cache is never invalidated; a changed
//! definition requires a restart.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::function_registry::{split_function_id, FunctionRegistry, TaskFunction};
use crate::error::ResolutionError;

/// Process-local resolver over a [`FunctionRegistry`]
pub struct FunctionResolver {
    registry: Arc<FunctionRegistry>,
    cache: DashMap<String, Arc<dyn TaskFunction>>,
    resolutions: AtomicUsize,
}

impl fmt::Debug for FunctionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionResolver")
            .field("cached_functions", &self.cache.len())
            .field("resolutions", &self.resolutions.load(Ordering::Relaxed))
            .finish()
    }
}

impl FunctionResolver {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Resolve `function_id`, keeping at most one cached callable per id.
    ///
    /// The registry lookup (and any module loader it runs) happens outside the
    /// cache shard lock; if two threads race, the first insert wins.
    pub fn resolve(&self, function_id: &str) -> Result<Arc<dyn TaskFunction>, ResolutionError> {
        if let Some(cached) = self.cache.get(function_id) {
            return Ok(Arc::clone(cached.value()));
        }

        let (module, member) = split_function_id(function_id)?;
        let function = self.registry.lookup(module, member)?;

        match self.cache.entry(function_id.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                self.resolutions.fetch_add(1, Ordering::Relaxed);
                debug!(function_id = %function_id, "Resolved task function");
                Ok(Arc::clone(entry.insert(function).value()))
            }
        }
    }

    pub fn is_cached(&self, function_id: &str) -> bool {
        self.cache.contains_key(function_id)
    }

    pub fn cache_stats(&self) -> ResolverCacheStats {
        let mut cache_keys: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        cache_keys.sort();

        ResolverCacheStats {
            cached_functions: cache_keys.len(),
            cache_keys,
            resolutions: self.resolutions.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the resolver cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverCacheStats {
    pub cached_functions: usize,
    pub cache_keys: Vec<String>,
    /// Registry lookups performed (cache misses that succeeded)
    pub resolutions: usize,
}

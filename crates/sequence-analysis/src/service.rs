//! Content-hash keyed, size-bounded analysis cache.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use scenestitch_common::AnalysisConfig;
use serde::Serialize;

use crate::descriptor::ParsedStructure;
use crate::extract::extract;
use crate::structure::{to_structure, SequenceStructure};

/// Outcome of analyzing one module's source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub component_id: String,
    pub parsed: ParsedStructure,
    /// `None` when the module declares no sequences.
    pub structure: Option<SequenceStructure>,
    pub has_dynamic_values: bool,
    pub analyzed_at: DateTime<Utc>,
    pub source_hash: String,
}

/// Cache occupancy and effectiveness counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Memoizing wrapper around [`extract`] and [`to_structure`].
///
/// Results are keyed by component id and revalidated against a hash of the
/// source, so an unchanged module always yields the same `Arc`.
pub struct SequenceAnalysisService {
    cache: LruCache<String, Arc<AnalysisResult>>,
    max_cache_size: usize,
    default_duration: u64,
    stats: CacheStats,
}

impl SequenceAnalysisService {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self::with_options(config.default_duration_frames, config.max_cache_size)
    }

    pub fn with_options(default_duration: u64, max_cache_size: usize) -> Self {
        let max_cache_size = max_cache_size.max(1);
        let capacity = NonZeroUsize::new(max_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            max_cache_size,
            default_duration,
            stats: CacheStats::default(),
        }
    }

    /// Frames substituted for dynamic durations.
    pub fn default_duration(&self) -> u64 {
        self.default_duration
    }

    /// Analyze `source` for `component_id`, reusing the cached result when the
    /// source is unchanged.
    pub fn analyze(&mut self, component_id: &str, source: &str) -> Arc<AnalysisResult> {
        let hash = source_hash(source);

        if let Some(cached) = self.cache.get(component_id) {
            if cached.source_hash == hash {
                self.stats.hits += 1;
                return Arc::clone(cached);
            }
        }
        self.stats.misses += 1;

        let parsed = extract(source);
        let structure = to_structure(&parsed, self.default_duration);
        let result = Arc::new(AnalysisResult {
            component_id: component_id.to_string(),
            has_dynamic_values: parsed.has_dynamic_values(),
            parsed,
            structure,
            analyzed_at: Utc::now(),
            source_hash: hash,
        });

        tracing::debug!(
            component = component_id,
            hash = %result.source_hash,
            sequences = result.parsed.sequences.len(),
            dynamic = result.has_dynamic_values,
            "Analyzed module"
        );

        self.insert(component_id.to_string(), Arc::clone(&result));
        result
    }

    fn insert(&mut self, key: String, value: Arc<AnalysisResult>) {
        // Re-inserting an existing key refreshes its recency.
        self.cache.pop(&key);
        if self.cache.len() >= self.max_cache_size {
            if let Some((evicted, _)) = self.cache.pop_lru() {
                self.stats.evictions += 1;
                tracing::debug!(component = %evicted, "Evicted analysis from cache");
            }
        }
        self.cache.put(key, value);
    }

    /// Cached result without touching recency.
    pub fn get_cached(&self, component_id: &str) -> Option<Arc<AnalysisResult>> {
        self.cache.peek(component_id).cloned()
    }

    pub fn has_analysis(&self, component_id: &str) -> bool {
        self.cache.contains(component_id)
    }

    /// Drop the cached result for `component_id`. Returns whether one existed.
    pub fn invalidate_cache(&mut self, component_id: &str) -> bool {
        self.cache.pop(component_id).is_some()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.cache.len(),
            max_size: self.max_cache_size,
            ..self.stats
        }
    }
}

impl Default for SequenceAnalysisService {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

/// Fast content hash of module source, as 16 hex digits.
pub fn source_hash(source: &str) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(source.as_bytes()))
}

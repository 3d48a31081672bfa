//! Shared cache of compiled patterns.
//!
//! Expect reads match the same few patterns (usually the prompt) over and
//! over, so compiled regexes are kept in a small LRU cache.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;

/// Default maximum number of cached patterns.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// LRU cache of compiled regexes keyed by pattern text.
#[derive(Debug)]
pub struct RegexCache {
    // Most recently used at the back.
    entries: Mutex<VecDeque<(String, Arc<Regex>)>>,
    max_size: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl RegexCache {
    /// Create a cache holding at most `max_size` patterns.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size: max_size.max(1),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Return the compiled `pattern`, compiling it on a miss.
    pub fn get_or_compile(&self, pattern: &str) -> Result<Arc<Regex>, regex::Error> {
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pos) = entries.iter().position(|(p, _)| p == pattern) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let entry = entries.remove(pos);
                if let Some(entry) = entry {
                    let regex = Arc::clone(&entry.1);
                    entries.push_back(entry);
                    return Ok(regex);
                }
            }
        }

        // Compile outside the lock; a concurrent miss only costs a duplicate.
        self.misses.fetch_add(1, Ordering::Relaxed);
        let regex = Arc::new(Regex::new(pattern)?);

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.iter().any(|(p, _)| p == pattern) {
            if entries.len() >= self.max_size {
                entries.pop_front();
            }
            entries.push_back((pattern.to_string(), Arc::clone(&regex)));
        }
        Ok(regex)
    }

    /// Whether `pattern` is cached.
    #[must_use]
    pub fn contains(&self, pattern: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(p, _)| p == pattern)
    }

    /// Number of cached patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation.
    #[must_use]
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

static GLOBAL_CACHE: LazyLock<RegexCache> = LazyLock::new(RegexCache::default);

/// Compile `pattern` through the process-wide cache.
pub fn get_regex(pattern: &str) -> Result<Arc<Regex>, regex::Error> {
    GLOBAL_CACHE.get_or_compile(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_same_regex() {
        let cache = RegexCache::new(10);
        let a = cache.get_or_compile(r"\d+").unwrap();
        let b = cache.get_or_compile(r"\d+").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = RegexCache::new(2);
        cache.get_or_compile("a+").unwrap();
        cache.get_or_compile("b+").unwrap();
        // Touch a+ so b+ becomes the oldest.
        cache.get_or_compile("a+").unwrap();
        cache.get_or_compile("c+").unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a+"));
        assert!(!cache.contains("b+"));
        assert!(cache.contains("c+"));
    }

    #[test]
    fn invalid_pattern_is_not_cached() {
        let cache = RegexCache::new(10);
        assert!(cache.get_or_compile("[invalid").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn global_cache_shares() {
        let a = get_regex(r"\w+$").unwrap();
        let b = get_regex(r"\w+$").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}

//! Request-scoped cache of a target document's paragraph list.
//!
//! The segmented matching path asks for the target paragraphs once per
//! segment; extracting them again each time means re-scanning the whole
//! markup. The cache holds exactly one document's paragraphs and is owned
//! by the caller of one mapping invocation, never shared across items.
//!
//! Key properties:
//! - Keyed by the SHA-256 fingerprint of the target buffer
//! - Entries expire after a short TTL
//! - `scope()` clears on entry and again on drop, on success and error paths alike

use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use crate::markup::TargetParagraph;
use crate::pipeline_config::MappingConfig;

// ═══════════════════════════════════════════════════════════
// Cache entry
// ═══════════════════════════════════════════════════════════

struct CachedParagraphs {
    fingerprint: String,
    paragraphs: Vec<TargetParagraph>,
    stored_at: Instant,
}

// ═══════════════════════════════════════════════════════════
// ParagraphCache
// ═══════════════════════════════════════════════════════════

pub struct ParagraphCache {
    ttl: Duration,
    entry: Option<CachedParagraphs>,
    extractions: usize,
}

impl ParagraphCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: None,
            extractions: 0,
        }
    }

    pub fn from_config(config: &MappingConfig) -> Self {
        Self::new(Duration::from_secs(config.cache_ttl_secs))
    }

    /// Cached paragraphs for `fingerprint`, if present and not expired.
    pub fn get(&self, fingerprint: &str) -> Option<&[TargetParagraph]> {
        self.entry
            .as_ref()
            .filter(|e| e.fingerprint == fingerprint && e.stored_at.elapsed() <= self.ttl)
            .map(|e| e.paragraphs.as_slice())
    }

    /// Return the cached list or run `extract` and cache its result.
    pub fn get_or_extract<F>(&mut self, fingerprint: &str, extract: F) -> &[TargetParagraph]
    where
        F: FnOnce() -> Vec<TargetParagraph>,
    {
        if self.get(fingerprint).is_none() {
            if self.entry.is_some() {
                tracing::debug!("Paragraph cache entry stale or for another document, replacing");
            }
            let paragraphs = extract();
            self.extractions += 1;
            self.entry = Some(CachedParagraphs {
                fingerprint: fingerprint.to_string(),
                paragraphs,
                stored_at: Instant::now(),
            });
        }
        self.entry
            .as_ref()
            .map(|e| e.paragraphs.as_slice())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// Number of times the extraction closure actually ran.
    pub fn extractions(&self) -> usize {
        self.extractions
    }

    /// Clear now and again when the returned guard is dropped.
    pub fn scope(&mut self) -> CacheScope<'_> {
        self.clear();
        CacheScope { cache: self }
    }
}

impl Default for ParagraphCache {
    fn default() -> Self {
        Self::from_config(&MappingConfig::default())
    }
}

// ═══════════════════════════════════════════════════════════
// CacheScope: guaranteed release
// ═══════════════════════════════════════════════════════════

pub struct CacheScope<'a> {
    cache: &'a mut ParagraphCache,
}

impl Deref for CacheScope<'_> {
    type Target = ParagraphCache;

    fn deref(&self) -> &ParagraphCache {
        self.cache
    }
}

impl DerefMut for CacheScope<'_> {
    fn deref_mut(&mut self) -> &mut ParagraphCache {
        self.cache
    }
}

impl Drop for CacheScope<'_> {
    fn drop(&mut self) {
        self.cache.clear();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(index: usize, text: &str) -> TargetParagraph {
        TargetParagraph {
            index,
            text: text.into(),
            section: None,
            is_table_cell: false,
            has_existing_tag: false,
            table_position: None,
        }
    }

    #[test]
    fn second_lookup_hits_cache() {
        let mut cache = ParagraphCache::new(Duration::from_secs(60));
        assert_eq!(cache.get_or_extract("abc", || vec![paragraph(0, "a")]).len(), 1);
        let again = cache.get_or_extract("abc", || panic!("should not re-extract"));
        assert_eq!(again[0].text, "a");
        assert_eq!(cache.extractions(), 1);
    }

    #[test]
    fn other_fingerprint_replaces_entry() {
        let mut cache = ParagraphCache::new(Duration::from_secs(60));
        cache.get_or_extract("one", || vec![paragraph(0, "first")]);
        let second = cache.get_or_extract("two", || vec![paragraph(0, "second")]);
        assert_eq!(second[0].text, "second");
        assert!(cache.get("one").is_none());
        assert_eq!(cache.extractions(), 2);
    }

    #[test]
    fn expired_entry_is_not_served() {
        let mut cache = ParagraphCache::new(Duration::ZERO);
        cache.get_or_extract("abc", || vec![paragraph(0, "a")]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("abc").is_none());
    }

    #[test]
    fn scope_clears_on_entry_and_drop() {
        let mut cache = ParagraphCache::new(Duration::from_secs(60));
        cache.get_or_extract("stale", || vec![paragraph(0, "old")]);
        {
            let mut scope = cache.scope();
            assert!(scope.is_empty());
            scope.get_or_extract("fresh", || vec![paragraph(0, "new")]);
            assert!(!scope.is_empty());
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn scope_clears_on_error_path() {
        fn failing(cache: &mut ParagraphCache) -> Result<(), String> {
            let mut scope = cache.scope();
            scope.get_or_extract("doc", || vec![paragraph(0, "x")]);
            Err("boom".into())
        }

        let mut cache = ParagraphCache::default();
        assert!(failing(&mut cache).is_err());
        assert!(cache.is_empty());
    }
}

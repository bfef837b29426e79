//! Response cache
//!
//! Answers are cached under the normalized question text for a fixed TTL.
//! Stale entries are evicted by the lookup that finds them.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

/// Cache key for a question: trimmed and lower-cased
pub fn normalize_key(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Process-wide answer store shared by concurrent pipeline runs
pub trait AnswerCache: Send + Sync {
    /// Fresh answer for `question`, if any
    fn get(&self, question: &str) -> Option<String>;

    /// Store `answer`, replacing any earlier entry
    fn put(&self, question: &str, answer: &str);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    stored_at: Instant,
}

/// In-memory cache with a fixed time-to-live
#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Entries held, stale ones included
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl AnswerCache for TtlCache {
    fn get(&self, question: &str) -> Option<String> {
        let key = normalize_key(question);

        {
            let entries = self.entries.read().ok()?;
            let entry = entries.get(&key)?;
            if entry.stored_at.elapsed() < self.ttl {
                trace!(key = %key, "Cache hit");
                return Some(entry.value.clone());
            }
        }

        // Re-check under the write lock; a concurrent put may have refreshed it
        let mut entries = self.entries.write().ok()?;
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(&key);
                debug!(key = %key, "Evicted stale cache entry");
                None
            }
            None => None,
        }
    }

    fn put(&self, question: &str, answer: &str) {
        let key = normalize_key(question);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key,
                CacheEntry {
                    value: answer.to_string(),
                    stored_at: Instant::now(),
                },
            );
        }
    }
}

/// Cache that stores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl AnswerCache for NoCache {
    fn get(&self, _question: &str) -> Option<String> {
        None
    }

    fn put(&self, _question: &str, _answer: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  What is Visa 500? "), "what is visa 500?");
        assert_eq!(normalize_key("HELLO"), normalize_key("hello"));
    }

    #[tokio::test]
    async fn test_hit_is_case_and_space_insensitive() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.put("What is visa 500?", "It is the student visa.");

        assert_eq!(
            cache.get("  what is VISA 500?  ").as_deref(),
            Some("It is the student visa.")
        );
        assert!(cache.get("what is visa 485?").is_none());
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.put("q", "first");
        cache.put("Q", "second");
        assert_eq!(cache.get("q").as_deref(), Some("second"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.put("q", "answer");

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("q").as_deref(), Some("answer"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("q").is_none());
        assert!(cache.is_empty(), "stale entry should be evicted on lookup");
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_refreshes_timestamp() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.put("q", "old");
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put("q", "new");
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("q").as_deref(), Some("new"));
    }

    #[test]
    fn test_no_cache() {
        let cache = NoCache;
        cache.put("q", "a");
        assert!(cache.get("q").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        use std::sync::Arc;

        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.put("same question", &format!("answer {}", i));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert!(cache.get("same question").unwrap().starts_with("answer "));
    }
}

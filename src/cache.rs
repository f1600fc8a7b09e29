use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::FetchError;
use crate::news::{Article, ArticleSource, SearchMode};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Exact query text plus mode. Queries are not trimmed or case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    mode: SearchMode,
}

struct CacheEntry {
    articles: Arc<Vec<Article>>,
    fetched_at: Instant,
}

/// Memoizes successful searches for `ttl`. Errors are returned to the caller
/// and leave the cache untouched, so the next call tries again.
pub struct ResultCache<S> {
    source: S,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl<S: ArticleSource> ResultCache<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self::with_clock(source, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(source: S, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn get(
        &self,
        query: &str,
        mode: SearchMode,
    ) -> Result<Arc<Vec<Article>>, FetchError> {
        let key = CacheKey {
            query: query.to_string(),
            mode,
        };

        if let Some(articles) = self.lookup(&key).await {
            debug!("Cache hit for '{}' ({:?})", query, mode);
            return Ok(articles);
        }

        // Lock is not held across the fetch; concurrent misses may both fetch.
        let articles = Arc::new(self.source.fetch(query, mode).await?);

        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                articles: articles.clone(),
                fetched_at: self.clock.now(),
            },
        );

        Ok(articles)
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Arc<Vec<Article>>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if now.saturating_duration_since(entry.fetched_at) < self.ttl => {
                    return Some(entry.articles.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Re-check: another caller may have refreshed the entry meanwhile.
        let entry = entries.get(key)?;
        if now.saturating_duration_since(entry.fetched_at) < self.ttl {
            return Some(entry.articles.clone());
        }
        debug!("Evicting expired cache entry for '{}'", key.query);
        entries.remove(key);
        None
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Instant::now()),
            })
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    /// Counts calls and fails while `failing` is set.
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        failing: Mutex<bool>,
    }

    impl CountingSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }
    }

    impl ArticleSource for CountingSource {
        async fn fetch(&self, query: &str, _mode: SearchMode) -> Result<Vec<Article>, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if *self.failing.lock().unwrap() {
                return Err(FetchError::Api {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(vec![Article {
                title: format!("{} #{}", query, n),
                source_name: "Test".to_string(),
                author: None,
                published_at: None,
                description: None,
                url: format!("https://example.com/{}", n),
            }])
        }
    }

    const TTL: Duration = Duration::from_secs(3600);

    fn cache_with_clock() -> (ResultCache<CountingSource>, Arc<ManualClock>) {
        let clock = ManualClock::new();
        let cache = ResultCache::with_clock(CountingSource::default(), TTL, clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_second_get_within_ttl_fetches_once() {
        let (cache, clock) = cache_with_clock();

        let first = cache.get("Disney", SearchMode::FullText).await.unwrap();
        clock.advance(Duration::from_secs(3599));
        let second = cache.get("Disney", SearchMode::FullText).await.unwrap();

        assert_eq!(cache.source().calls(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let (cache, clock) = cache_with_clock();

        cache.get("Disney", SearchMode::FullText).await.unwrap();
        clock.advance(TTL);
        let refreshed = cache.get("Disney", SearchMode::FullText).await.unwrap();

        assert_eq!(cache.source().calls(), 2);
        assert_eq!(refreshed[0].title, "Disney #2");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_error_is_not_cached() {
        let (cache, _clock) = cache_with_clock();
        cache.source().set_failing(true);

        let result = cache.get("Disney", SearchMode::FullText).await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);

        cache.source().set_failing(false);
        let result = cache.get("Disney", SearchMode::FullText).await;

        assert!(result.is_ok());
        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_after_expiry_is_retried() {
        let (cache, clock) = cache_with_clock();

        cache.get("Disney", SearchMode::FullText).await.unwrap();
        clock.advance(TTL + Duration::from_secs(1));
        cache.source().set_failing(true);

        assert!(cache.get("Disney", SearchMode::FullText).await.is_err());
        assert!(cache.is_empty().await);
        assert!(cache.get("Disney", SearchMode::FullText).await.is_err());
        assert_eq!(cache.source().calls(), 3);
    }

    // The waiting lookup sees a stale entry under the read lock; by the time
    // it holds the write lock another writer has stored a fresh one.
    #[tokio::test]
    async fn test_entry_refreshed_between_locks_is_returned() {
        let (cache, clock) = cache_with_clock();
        let cache = Arc::new(cache);
        cache.get("Disney", SearchMode::FullText).await.unwrap();
        clock.advance(TTL);

        let key = CacheKey {
            query: "Disney".to_string(),
            mode: SearchMode::FullText,
        };

        let held = cache.entries.write().await;
        let lookup = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.lookup(&key).await })
        };
        tokio::task::yield_now().await;
        drop(held);

        let refreshed = Arc::new(vec![Article {
            title: "Fresh".to_string(),
            source_name: "Test".to_string(),
            author: None,
            published_at: None,
            description: None,
            url: "https://example.com/fresh".to_string(),
        }]);
        {
            let mut entries = cache.entries.write().await;
            entries.insert(
                key,
                CacheEntry {
                    articles: refreshed.clone(),
                    fetched_at: clock.now(),
                },
            );
        }

        let found = lookup.await.unwrap();
        assert_eq!(found, Some(refreshed));
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_mode_is_part_of_key() {
        let (cache, _clock) = cache_with_clock();

        cache.get("Disney", SearchMode::FullText).await.unwrap();
        cache.get("Disney", SearchMode::TitleOnly).await.unwrap();

        assert_eq!(cache.source().calls(), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_query_is_not_normalized() {
        let (cache, _clock) = cache_with_clock();

        cache.get("Disney", SearchMode::FullText).await.unwrap();
        cache.get("disney", SearchMode::FullText).await.unwrap();
        cache.get(" Disney", SearchMode::FullText).await.unwrap();

        assert_eq!(cache.source().calls(), 3);
    }

    #[tokio::test]
    async fn test_system_clock_cache() {
        let cache = ResultCache::new(CountingSource::default(), TTL);

        cache.get("Pixar", SearchMode::FullText).await.unwrap();
        cache.get("Pixar", SearchMode::FullText).await.unwrap();

        assert_eq!(cache.source().calls(), 1);
    }
}

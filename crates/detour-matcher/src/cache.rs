use crate::resolution::Resolution;
use async_trait::async_trait;
use detour_core::{CacheError, SourcePath};
use moka::future::Cache;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A cache of resolution results keyed by normalized request path.
///
/// Misses are cached too: a stored `None` means "no mapping matches", while
/// [`ResolutionCache::get`] returning `Ok(None)` means "not cached".
#[async_trait]
pub trait ResolutionCache: Send + Sync + 'static {
    async fn get(&self, path: &SourcePath) -> Result<Option<Option<Resolution>>>;

    async fn insert(&self, path: &SourcePath, resolution: Option<Resolution>) -> Result<()>;

    async fn invalidate(&self, path: &SourcePath) -> Result<()>;

    /// Drops every cached result.
    async fn invalidate_all(&self) -> Result<()>;

    /// Returns the cached result or computes and caches it.
    ///
    /// Implementations may coalesce concurrent computations for one path.
    async fn get_or_compute<F, Fut, E>(
        &self,
        path: &SourcePath,
        fetch: F,
    ) -> std::result::Result<Option<Resolution>, E>
    where
        F: FnOnce(&SourcePath) -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<Resolution>, E>> + Send,
        E: From<CacheError> + Clone + Send + Sync + 'static,
    {
        if let Some(cached) = self.get(path).await? {
            return Ok(cached);
        }

        let computed = fetch(path).await?;
        self.insert(path, computed.clone()).await?;
        Ok(computed)
    }
}

/// An in-memory [`ResolutionCache`] backed by Moka.
///
/// Entries are keyed by path and by the generation they were computed in.
/// `invalidate_all` starts a new generation, so a lookup that was already
/// running when it was called can no longer publish its result.
#[derive(Debug, Clone)]
pub struct MokaResolutionCache {
    cache: Cache<(u64, SourcePath), Option<Resolution>>,
    generation: Arc<AtomicU64>,
}

impl MokaResolutionCache {
    /// Creates a cache holding at most 10,000 paths.
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::from_cache(Cache::builder().max_capacity(max_capacity).build())
    }

    /// Creates a cache whose entries expire `ttl` after insertion.
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self::from_cache(
            Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        )
    }

    pub fn builder() -> CacheConfigBuilder {
        CacheConfig::builder()
    }

    fn from_cache(cache: Cache<(u64, SourcePath), Option<Resolution>>) -> Self {
        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn key(&self, path: &SourcePath) -> (u64, SourcePath) {
        (self.generation.load(Ordering::Acquire), path.clone())
    }
}

impl Default for MokaResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolutionCache for MokaResolutionCache {
    async fn get(&self, path: &SourcePath) -> Result<Option<Option<Resolution>>> {
        let cached = self.cache.get(&self.key(path)).await;
        match &cached {
            Some(_) => trace!(path = %path, "resolution cache hit"),
            None => trace!(path = %path, "resolution cache miss"),
        }
        Ok(cached)
    }

    async fn insert(&self, path: &SourcePath, resolution: Option<Resolution>) -> Result<()> {
        self.cache.insert(self.key(path), resolution).await;
        trace!(path = %path, "cached resolution");
        Ok(())
    }

    async fn invalidate(&self, path: &SourcePath) -> Result<()> {
        self.cache.invalidate(&self.key(path)).await;
        trace!(path = %path, "invalidated cached resolution");
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.cache.invalidate_all();
        debug!(generation, "invalidated all cached resolutions");
        Ok(())
    }

    async fn get_or_compute<F, Fut, E>(
        &self,
        path: &SourcePath,
        fetch: F,
    ) -> std::result::Result<Option<Resolution>, E>
    where
        F: FnOnce(&SourcePath) -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<Resolution>, E>> + Send,
        E: From<CacheError> + Clone + Send + Sync + 'static,
    {
        let key = self.key(path);

        // try_get_with coalesces concurrent misses for one key into one fetch.
        let computed = self
            .cache
            .try_get_with(key.clone(), async {
                trace!(path = %path, "resolution cache miss, computing");
                fetch(path).await
            })
            .await
            .map_err(|e| e.as_ref().clone())?;

        if self.generation.load(Ordering::Acquire) != key.0 {
            trace!(path = %path, "resolution computed before invalidation, dropping it");
            self.cache.invalidate(&key).await;
        }
        Ok(computed)
    }
}

/// Settings for a [`MokaResolutionCache`].
#[derive(Debug, Clone, TypedBuilder, Default)]
pub struct CacheConfig {
    #[builder(default, setter(strip_option))]
    max_capacity: Option<u64>,
    #[builder(default, setter(strip_option))]
    ttl: Option<Duration>,
    #[builder(default, setter(strip_option))]
    tti: Option<Duration>,
}

impl From<CacheConfig> for MokaResolutionCache {
    fn from(config: CacheConfig) -> Self {
        let mut builder = Cache::builder();

        if let Some(capacity) = config.max_capacity {
            builder = builder.max_capacity(capacity);
        }
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = config.tti {
            builder = builder.time_to_idle(tti);
        }

        MokaResolutionCache::from_cache(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detour_core::{Mapping, Redirect};
    use std::sync::atomic::AtomicUsize;

    fn path(s: &str) -> SourcePath {
        SourcePath::new(s).unwrap()
    }

    fn resolution(target: &str) -> Resolution {
        Resolution::new(Mapping::new(1, path("/a"), Redirect::link(target)))
    }

    #[tokio::test]
    async fn insert_and_get() {
        let cache = MokaResolutionCache::new();
        let p = path("/a");

        assert_eq!(cache.get(&p).await.unwrap(), None);

        cache.insert(&p, Some(resolution("/b"))).await.unwrap();
        assert_eq!(cache.get(&p).await.unwrap(), Some(Some(resolution("/b"))));
    }

    #[tokio::test]
    async fn misses_are_cached() {
        let cache = MokaResolutionCache::new();
        let p = path("/unmapped");

        cache.insert(&p, None).await.unwrap();
        assert_eq!(cache.get(&p).await.unwrap(), Some(None));
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let cache = MokaResolutionCache::new();
        let p = path("/a");

        cache.invalidate(&p).await.unwrap();
        cache.insert(&p, Some(resolution("/b"))).await.unwrap();
        cache.invalidate(&p).await.unwrap();
        assert_eq!(cache.get(&p).await.unwrap(), None);
        cache.invalidate(&p).await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_path() {
        let cache = MokaResolutionCache::new();
        for i in 0..20 {
            cache
                .insert(&path(&format!("/p{}", i)), Some(resolution("/b")))
                .await
                .unwrap();
        }

        cache.invalidate_all().await.unwrap();

        for i in 0..20 {
            assert_eq!(cache.get(&path(&format!("/p{}", i))).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MokaResolutionCache::with_ttl(100, Duration::from_millis(50));
        let p = path("/a");

        cache.insert(&p, Some(resolution("/b"))).await.unwrap();
        assert!(cache.get(&p).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get(&p).await.unwrap(), None);
    }

    #[tokio::test]
    async fn builder_pattern() {
        let cache: MokaResolutionCache = MokaResolutionCache::builder()
            .max_capacity(1000)
            .ttl(Duration::from_secs(60))
            .tti(Duration::from_secs(30))
            .build()
            .into();

        let p = path("/a");
        cache.insert(&p, Some(resolution("/b"))).await.unwrap();
        assert!(cache.get(&p).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn single_flight_prevents_concurrent_compute() {
        let cache = MokaResolutionCache::new();
        let computed = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..10 {
            let cache = cache.clone();
            let count = computed.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&path("/a"), |_path| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, CacheError>(Some(resolution("/b")))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), Some(resolution("/b")));
        }

        assert_eq!(computed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn computation_overtaken_by_invalidation_is_not_kept() {
        let cache = MokaResolutionCache::new();
        let p = path("/a");

        let slow = {
            let cache = cache.clone();
            let p = p.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&p, |_path| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, CacheError>(None)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.invalidate_all().await.unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), None);

        assert_eq!(cache.get(&p).await.unwrap(), None);
        let fresh = cache
            .get_or_compute(&p, |_path| async {
                Ok::<_, CacheError>(Some(resolution("/b")))
            })
            .await
            .unwrap();
        assert_eq!(fresh, Some(resolution("/b")));
    }

    #[tokio::test]
    async fn failed_compute_is_not_cached() {
        let cache = MokaResolutionCache::new();
        let p = path("/a");

        let err = cache
            .get_or_compute(&p, |_path| async {
                Err::<Option<Resolution>, _>(CacheError::Compute("store down".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Compute(_)));
        assert_eq!(cache.get(&p).await.unwrap(), None);
    }
}

use crate::cache::ResolutionCache;
use crate::matcher::Matcher;
use crate::resolution::Resolution;
use crate::{MatcherError, Result};
use async_trait::async_trait;
use detour_core::{PathPolicy, SourcePath};
use tracing::trace;

/// A [`Matcher`] decorator that caches resolutions per normalized path.
///
/// Any mapping write can change the winner for many paths, so writers call
/// [`CachedMatcher::invalidate_all`] after every change to the store.
#[derive(Debug, Clone)]
pub struct CachedMatcher<M, C> {
    inner: M,
    cache: C,
}

impl<M: Matcher, C: ResolutionCache> CachedMatcher<M, C> {
    pub fn new(inner: M, cache: C) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub async fn invalidate_all(&self) -> Result<()> {
        trace!("invalidating resolution cache");
        self.cache.invalidate_all().await.map_err(MatcherError::from)
    }
}

#[async_trait]
impl<M: Matcher, C: ResolutionCache> Matcher for CachedMatcher<M, C> {
    async fn lookup(&self, path: &SourcePath) -> Result<Option<Resolution>> {
        self.cache
            .get_or_compute(path, move |p| {
                let path = p.clone();
                async move { self.inner.lookup(&path).await }
            })
            .await
    }

    fn policy(&self) -> &PathPolicy {
        self.inner.policy()
    }
}

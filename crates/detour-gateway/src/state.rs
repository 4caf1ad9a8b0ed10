use std::sync::Arc;

use detour_core::{MappingStore, PathPolicy};
use detour_generator::SeqGenerator;
use detour_matcher::{
    CacheConfig, CachedMatcher, Matcher, MatcherService, MokaResolutionCache, DEFAULT_MAX_HOPS,
};
use detour_sync::{InMemoryHierarchy, PropagatorConfig, Propagator, SyncConfig, Synchronizer};
use tracing::warn;
use typed_builder::TypedBuilder;

pub type GatewayMatcher<S> = CachedMatcher<MatcherService<S>, MokaResolutionCache>;
pub type GatewayPropagator<S> = Propagator<S, InMemoryHierarchy, Arc<SeqGenerator>>;

/// Everything the gateway needs besides the mapping store.
#[derive(Debug, Clone, TypedBuilder)]
pub struct GatewaySettings {
    /// Hops followed by `/v1/resolve` when the request does not say.
    #[builder(default = DEFAULT_MAX_HOPS)]
    pub max_hops: usize,
    #[builder(default = CacheConfig::builder().max_capacity(10_000).build())]
    pub cache: CacheConfig,
    /// Also carries the path policy used for every request.
    #[builder(default)]
    pub sync: SyncConfig,
    #[builder(default)]
    pub propagation: PropagatorConfig,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct AppState<S> {
    store: Arc<S>,
    matcher: Arc<GatewayMatcher<S>>,
    propagator: Arc<GatewayPropagator<S>>,
    hierarchy: Arc<InMemoryHierarchy>,
    generator: Arc<SeqGenerator>,
    max_hops: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            matcher: Arc::clone(&self.matcher),
            propagator: Arc::clone(&self.propagator),
            hierarchy: Arc::clone(&self.hierarchy),
            generator: Arc::clone(&self.generator),
            max_hops: self.max_hops,
        }
    }
}

impl<S: MappingStore> AppState<S> {
    /// Wires the matcher and the propagator around a shared store.
    ///
    /// `generator` must continue after the highest id already in `store`.
    pub fn new(
        store: Arc<S>,
        hierarchy: Arc<InMemoryHierarchy>,
        generator: Arc<SeqGenerator>,
        settings: GatewaySettings,
    ) -> Self {
        let service = MatcherService::with_policy(Arc::clone(&store), settings.sync.path_policy);
        let matcher = CachedMatcher::new(service, MokaResolutionCache::from(settings.cache));
        let synchronizer = Synchronizer::new(
            Arc::clone(&store),
            Arc::clone(&hierarchy),
            Arc::clone(&generator),
            settings.sync,
        );

        Self {
            store,
            matcher: Arc::new(matcher),
            propagator: Arc::new(Propagator::new(
                Arc::new(synchronizer),
                settings.propagation,
            )),
            hierarchy,
            generator,
            max_hops: settings.max_hops,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn matcher(&self) -> &Arc<GatewayMatcher<S>> {
        &self.matcher
    }

    pub fn propagator(&self) -> &Arc<GatewayPropagator<S>> {
        &self.propagator
    }

    pub fn hierarchy(&self) -> &Arc<InMemoryHierarchy> {
        &self.hierarchy
    }

    pub fn generator(&self) -> &Arc<SeqGenerator> {
        &self.generator
    }

    pub fn policy(&self) -> &PathPolicy {
        self.matcher.policy()
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Drops every cached resolution after a write. Failures are only logged.
    pub async fn invalidate(&self) {
        if let Err(err) = self.matcher.invalidate_all().await {
            warn!(error = %err, "failed to invalidate resolution cache");
        }
    }
}

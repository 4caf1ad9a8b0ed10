use std::cmp::Ordering;
use std::sync::Arc;

use crate::matcher::Matcher;
use crate::resolution::Resolution;
use async_trait::async_trait;
use detour_core::{
    Mapping, MatchKind, PathPolicy, Pattern, ReadMappingStore, SourcePath, TrailingSlash,
};
use tracing::{debug, trace, warn};

/// Store-backed [`Matcher`].
///
/// Gathers every exact, prefix and pattern mapping that applies to a path and
/// picks the winner: highest priority first, then the most specific match
/// (exact, then longer prefixes, then patterns with more literal segments),
/// then the most recently updated mapping, then the highest id.
#[derive(Debug)]
pub struct MatcherService<S: ?Sized> {
    store: Arc<S>,
    policy: PathPolicy,
}

impl<S: ?Sized> Clone for MatcherService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

/// A mapping that applies to the request, plus how specifically it applies.
struct Candidate {
    resolution: Resolution,
    specificity: (u8, usize),
}

impl<S: ReadMappingStore + ?Sized> MatcherService<S> {
    /// Creates a matcher using the default path policy.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, PathPolicy::default())
    }

    pub fn with_policy(store: Arc<S>, policy: PathPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The sources a prefix or exact mapping could be stored under for `path`.
    fn candidate_sources(&self, path: &SourcePath) -> Vec<SourcePath> {
        let mut sources = Vec::new();

        for ancestor in path.ancestors() {
            if self.policy.trailing_slash == TrailingSlash::Keep && !ancestor.is_root() {
                let variant = if ancestor.has_trailing_slash() {
                    SourcePath::new_unchecked(ancestor.as_str().trim_end_matches('/'))
                } else {
                    SourcePath::new_unchecked(format!("{}/", ancestor))
                };
                if !sources.contains(&variant) {
                    sources.push(variant);
                }
            }
            if !sources.contains(&ancestor) {
                sources.push(ancestor);
            }
        }

        sources
    }

    async fn gather(&self, path: &SourcePath) -> crate::Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for source in self.candidate_sources(path) {
            for mapping in self.store.find_by_source_path(&source, None, &[]).await? {
                match mapping.match_kind {
                    MatchKind::Exact if &mapping.source == path => {
                        candidates.push(Candidate {
                            resolution: Resolution::new(mapping),
                            specificity: (2, 0),
                        });
                    }
                    MatchKind::Prefix => {
                        let Some(remainder) = path.strip_prefix(&mapping.source) else {
                            continue;
                        };
                        let remainder = remainder.to_string();
                        let depth = mapping.source.segments().count();
                        candidates.push(Candidate {
                            resolution: Resolution::new(mapping).with_remainder(remainder),
                            specificity: (1, depth),
                        });
                    }
                    _ => {}
                }
            }
        }

        for mapping in self.store.find_by_match_kind(MatchKind::Pattern).await? {
            let pattern = match Pattern::parse(&mapping.source) {
                Ok(pattern) => pattern,
                Err(err) => {
                    warn!(mapping = %mapping.id, error = %err, "skipping unparseable pattern mapping");
                    continue;
                }
            };
            if let Some(captures) = pattern.captures(path) {
                candidates.push(Candidate {
                    resolution: Resolution::new(mapping).with_captures(captures),
                    specificity: (0, pattern.literal_count()),
                });
            }
        }

        Ok(candidates)
    }
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    let (left, right): (&Mapping, &Mapping) = (&a.resolution.mapping, &b.resolution.mapping);
    right
        .priority
        .cmp(&left.priority)
        .then_with(|| b.specificity.cmp(&a.specificity))
        .then_with(|| right.updated_at.cmp(&left.updated_at))
        .then_with(|| right.id.cmp(&left.id))
}

#[async_trait]
impl<S: ReadMappingStore + ?Sized> Matcher for MatcherService<S> {
    async fn lookup(&self, path: &SourcePath) -> crate::Result<Option<Resolution>> {
        trace!(path = %path, "resolving request path");

        let candidates = self.gather(path).await?;
        let count = candidates.len();

        match candidates.into_iter().min_by(rank) {
            Some(winner) => {
                debug!(
                    path = %path,
                    mapping = %winner.resolution.mapping.id,
                    candidates = count,
                    "resolved request path"
                );
                Ok(Some(winner.resolution))
            }
            None => {
                trace!(path = %path, "no mapping matches request path");
                Ok(None)
            }
        }
    }

    fn policy(&self) -> &PathPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detour_core::{MappingStore, NodeId, PutMode, Redirect};
    use detour_storage::InMemoryMappingStore;
    use jiff::{SignedDuration, Timestamp};

    fn path(s: &str) -> SourcePath {
        SourcePath::new(s).unwrap()
    }

    async fn setup(mappings: Vec<Mapping>) -> MatcherService<InMemoryMappingStore> {
        let store = InMemoryMappingStore::new();
        for mapping in mappings {
            store.put(mapping, PutMode::Reject).await.unwrap();
        }
        MatcherService::new(Arc::new(store))
    }

    fn link(id: u64, source: &str, target: &str) -> Mapping {
        Mapping::new(id, path(source), Redirect::link(target))
    }

    #[tokio::test]
    async fn no_mapping_resolves_to_none() {
        let matcher = setup(vec![]).await;
        assert!(matcher.resolve("/nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unparseable_path_resolves_to_none() {
        let matcher = setup(vec![link(1, "/a", "/b")]).await;
        assert!(matcher.resolve("/a b").await.unwrap().is_none());
        assert!(matcher.resolve("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exact_match_is_normalized() {
        let matcher = setup(vec![link(1, "/About-Us", "/about")]).await;
        let mapping = matcher
            .resolve("https://example.com/about-us/?utm=x")
            .await
            .unwrap()
            .expect("mapping should match");
        assert_eq!(mapping.id.get(), 1);
    }

    #[tokio::test]
    async fn case_sensitive_policy_keeps_case() {
        let store = InMemoryMappingStore::new();
        let policy = PathPolicy::builder().case_sensitive(true).build();
        store
            .put(
                Mapping::new(1, SourcePath::parse("/About", &policy).unwrap(), Redirect::link("/x")),
                PutMode::Reject,
            )
            .await
            .unwrap();
        let matcher = MatcherService::with_policy(Arc::new(store), policy);

        assert!(matcher.resolve("/About").await.unwrap().is_some());
        assert!(matcher.resolve("/about").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn higher_priority_wins_over_specificity() {
        let matcher = setup(vec![
            link(1, "/docs/intro", "/exact"),
            link(2, "/docs", "/prefix")
                .with_match_kind(MatchKind::Prefix)
                .with_priority(5),
        ])
        .await;

        let mapping = matcher.resolve("/docs/intro").await.unwrap().unwrap();
        assert_eq!(mapping.id.get(), 2);
    }

    #[tokio::test]
    async fn exact_beats_prefix_beats_pattern_at_equal_priority() {
        let matcher = setup(vec![
            link(1, "/docs/:page", "/pattern").with_match_kind(MatchKind::Pattern),
            link(2, "/docs", "/prefix").with_match_kind(MatchKind::Prefix),
            link(3, "/docs/intro", "/exact"),
        ])
        .await;

        assert_eq!(matcher.resolve("/docs/intro").await.unwrap().unwrap().id.get(), 3);
        assert_eq!(matcher.resolve("/docs/other").await.unwrap().unwrap().id.get(), 2);
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let matcher = setup(vec![
            link(1, "/", "/root").with_match_kind(MatchKind::Prefix),
            link(2, "/shop", "/store").with_match_kind(MatchKind::Prefix),
            link(3, "/shop/sale", "/deals").with_match_kind(MatchKind::Prefix),
        ])
        .await;

        let resolution = matcher
            .resolve_match("/shop/sale/shoes")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolution.mapping.id.get(), 3);
        assert_eq!(resolution.remainder, "/shoes");
        assert_eq!(resolution.disposition().location(), Some("/deals/shoes"));

        let resolution = matcher.resolve_match("/elsewhere").await.unwrap().unwrap();
        assert_eq!(resolution.mapping.id.get(), 1);
    }

    #[tokio::test]
    async fn prefix_respects_segment_boundaries() {
        let matcher = setup(vec![link(1, "/shop", "/store").with_match_kind(MatchKind::Prefix)]).await;
        assert!(matcher.resolve("/shopping").await.unwrap().is_none());
        assert!(matcher.resolve("/shop").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pattern_with_more_literals_wins() {
        let matcher = setup(vec![
            link(1, "/:section/:slug", "/generic/:slug").with_match_kind(MatchKind::Pattern),
            link(2, "/blog/:slug", "/posts/:slug").with_match_kind(MatchKind::Pattern),
        ])
        .await;

        let resolution = matcher.resolve_match("/blog/hello").await.unwrap().unwrap();
        assert_eq!(resolution.mapping.id.get(), 2);
        assert_eq!(resolution.disposition().location(), Some("/posts/hello"));
    }

    #[tokio::test]
    async fn ties_prefer_recent_then_highest_id() {
        let now = Timestamp::now();
        let matcher = setup(vec![
            link(1, "/a", "/older").with_updated_at(now - SignedDuration::from_secs(60)),
            link(2, "/a", "/newer").with_updated_at(now),
            link(3, "/b", "/first").with_updated_at(now),
            link(4, "/b", "/second").with_updated_at(now),
        ])
        .await;

        assert_eq!(matcher.resolve("/a").await.unwrap().unwrap().id.get(), 2);
        assert_eq!(matcher.resolve("/b").await.unwrap().unwrap().id.get(), 4);
    }

    #[tokio::test]
    async fn page_mapping_redirects_to_cached_path() {
        let matcher = setup(vec![Mapping::new(
            1,
            path("/old"),
            Redirect::page(NodeId::new(7), path("/new")),
        )])
        .await;

        let resolution = matcher.resolve_match("/old").await.unwrap().unwrap();
        assert_eq!(resolution.disposition().location(), Some("/new"));
    }

    #[tokio::test]
    async fn mixed_case_pattern_names_substitute_into_links() {
        let matcher = setup(vec![
            link(1, "/blog/:Slug", "/posts/:Slug").with_match_kind(MatchKind::Pattern)
        ])
        .await;

        let resolution = matcher.resolve_match("/Blog/Hello").await.unwrap().unwrap();
        assert_eq!(resolution.disposition().location(), Some("/posts/hello"));
    }

    #[tokio::test]
    async fn keep_policy_matches_prefix_stored_with_trailing_slash() {
        let policy = PathPolicy::builder()
            .trailing_slash(TrailingSlash::Keep)
            .build();
        let store = InMemoryMappingStore::new();
        store
            .put(
                link(1, "/x", "/y").with_match_kind(MatchKind::Prefix),
                PutMode::Reject,
            )
            .await
            .unwrap();
        store
            .put(
                Mapping::new(
                    2,
                    SourcePath::parse("/docs/", &policy).unwrap(),
                    Redirect::link("/manual"),
                )
                .with_match_kind(MatchKind::Prefix),
                PutMode::Reject,
            )
            .await
            .unwrap();
        let matcher = MatcherService::with_policy(Arc::new(store), policy);

        let resolution = matcher.resolve_match("/docs/a").await.unwrap().unwrap();
        assert_eq!(resolution.mapping.id.get(), 2);
        assert_eq!(resolution.remainder, "/a");
    }
}

use crate::resolution::Resolution;
use crate::Result;
use async_trait::async_trait;
use detour_core::{Mapping, PathPolicy, SourcePath};
use tracing::debug;

/// Picks the mapping that answers a request path.
#[async_trait]
pub trait Matcher: Send + Sync + 'static {
    /// Finds the winning mapping for an already normalized path.
    async fn lookup(&self, path: &SourcePath) -> Result<Option<Resolution>>;

    /// The normalization rules request paths are parsed with.
    fn policy(&self) -> &PathPolicy;

    /// Normalizes a raw request path. Unparseable input yields `None`.
    fn normalize(&self, raw: &str) -> Option<SourcePath> {
        match SourcePath::parse(raw, self.policy()) {
            Ok(path) => Some(path),
            Err(err) => {
                debug!(raw = %raw, error = %err, "request path is not matchable");
                None
            }
        }
    }

    /// Resolves a raw request path to its full match.
    async fn resolve_match(&self, raw: &str) -> Result<Option<Resolution>> {
        match self.normalize(raw) {
            Some(path) => self.lookup(&path).await,
            None => Ok(None),
        }
    }

    /// Resolves a raw request path to the winning mapping, if any.
    async fn resolve(&self, raw: &str) -> Result<Option<Mapping>> {
        Ok(self
            .resolve_match(raw)
            .await?
            .map(|resolution| resolution.mapping))
    }
}

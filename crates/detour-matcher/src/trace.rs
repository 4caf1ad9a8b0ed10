use std::collections::HashSet;

use crate::matcher::Matcher;
use crate::resolution::Disposition;
use crate::Result;
use detour_core::{MappingId, SourcePath};
use serde::Serialize;
use tracing::{debug, warn};

/// Default number of hops [`trace`] follows before giving up.
pub const DEFAULT_MAX_HOPS: usize = 10;

/// One mapping applied while following a redirect chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hop {
    pub path: SourcePath,
    pub mapping: MappingId,
    pub disposition: Disposition,
}

/// How following a redirect chain ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceOutcome {
    /// Nothing matched the first path.
    NoMatch,
    /// The chain ended in a final answer.
    Resolved { disposition: Disposition },
    /// The chain came back to a path it had already visited.
    Loop { path: SourcePath },
    /// The chain was still going after the hop limit.
    TooLong,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trace {
    pub hops: Vec<Hop>,
    pub outcome: TraceOutcome,
}

impl Trace {
    /// The answer at the end of the chain, if it ended normally.
    pub fn final_disposition(&self) -> Option<&Disposition> {
        match &self.outcome {
            TraceOutcome::Resolved { disposition } => Some(disposition),
            _ => None,
        }
    }
}

/// Follows redirects starting at `raw` as long as they stay on this site.
///
/// Each location that is a local path is resolved again; a redirect to an
/// external URL, an error disposition or a path without a mapping ends the
/// chain. At most `max_hops` mappings are applied.
pub async fn trace<M: Matcher + ?Sized>(matcher: &M, raw: &str, max_hops: usize) -> Result<Trace> {
    let mut hops: Vec<Hop> = Vec::new();

    let Some(mut path) = matcher.normalize(raw) else {
        return Ok(Trace {
            hops,
            outcome: TraceOutcome::NoMatch,
        });
    };
    let mut seen = HashSet::from([path.clone()]);

    let outcome = loop {
        let Some(resolution) = matcher.lookup(&path).await? else {
            break match hops.last() {
                Some(last) => TraceOutcome::Resolved {
                    disposition: last.disposition.clone(),
                },
                None => TraceOutcome::NoMatch,
            };
        };

        if hops.len() >= max_hops {
            warn!(start = %raw, hops = hops.len(), "redirect chain exceeds hop limit");
            break TraceOutcome::TooLong;
        }

        let disposition = resolution.disposition();
        hops.push(Hop {
            path: path.clone(),
            mapping: resolution.mapping.id,
            disposition: disposition.clone(),
        });

        let next = disposition
            .location()
            .filter(|location| is_local(location))
            .and_then(|location| matcher.normalize(location));

        let Some(next) = next else {
            break TraceOutcome::Resolved { disposition };
        };

        if !seen.insert(next.clone()) {
            warn!(start = %raw, path = %next, "redirect loop detected");
            break TraceOutcome::Loop { path: next };
        }

        path = next;
    };

    debug!(start = %raw, hops = hops.len(), "traced redirect chain");
    Ok(Trace { hops, outcome })
}

/// A location is followed only when it is a path on this site.
fn is_local(location: &str) -> bool {
    location.starts_with('/') && !location.starts_with("//")
}

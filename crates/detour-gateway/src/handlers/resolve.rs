use crate::error::Result;
use crate::model::{PropagationQuery, ResolveQuery};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use detour_core::MappingStore;
use detour_matcher::Trace;
use detour_sync::CascadeReport;

const DEFAULT_REPORT_LIMIT: usize = 50;

/// Follows the redirect chain for a path without redirecting the caller.
pub async fn resolve_handler<S: MappingStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<Trace>> {
    let max_hops = query.max_hops.unwrap_or(state.max_hops());
    let trace = detour_matcher::trace(state.matcher().as_ref(), &query.path, max_hops).await?;
    Ok(Json(trace))
}

/// Recent cascade reports, newest first.
pub async fn propagation_handler<S: MappingStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<PropagationQuery>,
) -> Json<Vec<CascadeReport>> {
    let limit = query.limit.unwrap_or(DEFAULT_REPORT_LIMIT);
    let log = state.propagator().log();

    let reports = match query.node {
        Some(node) => log.for_node(node).into_iter().take(limit).collect(),
        None => log.recent(limit),
    };
    Json(reports)
}

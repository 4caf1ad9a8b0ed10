use crate::error::{AppError, Result};
use crate::model::{NodeRequest, VanityRequest, VanityResponse};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use detour_core::{ContentHierarchy, ContentNode, MappingStore, NodeId, NodeState};
use detour_sync::SyncError;
use tracing::info;

/// Creates or replaces a node of the content mirror.
pub async fn put_node_handler<S: MappingStore>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
    Json(request): Json<NodeRequest>,
) -> Result<(StatusCode, Json<ContentNode>)> {
    if request.segment.contains('/') {
        return Err(AppError::BadRequest(format!(
            "segment '{}' cannot contain '/'",
            request.segment
        )));
    }

    let id = NodeId::new(id);
    if request.parent == Some(id) {
        return Err(AppError::BadRequest(format!("{} cannot be its own parent", id)));
    }

    let hierarchy = state.hierarchy();
    let existed = hierarchy
        .get_node(id)
        .await
        .map_err(SyncError::from)?
        .is_some();

    let node = ContentNode {
        id,
        parent: request.parent,
        segment: request.segment,
        state: NodeState {
            published: request.published,
            on_draft: request.on_draft,
        },
    };
    hierarchy.upsert(node.clone());

    let status = if existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(node)))
}

/// Forgets a node of the content mirror.
pub async fn delete_node_handler<S: MappingStore>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> Result<StatusCode> {
    let id = NodeId::new(id);
    match state.hierarchy().forget(id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(AppError::NotFound(format!("{} not found", id))),
    }
}

/// Sets, moves or removes the vanity address of a node.
pub async fn vanity_handler<S: MappingStore>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
    Json(request): Json<VanityRequest>,
) -> Result<Json<VanityResponse>> {
    let node = NodeId::new(id);
    let mapping = state
        .propagator()
        .synchronizer()
        .set_vanity(node, request.vanity.as_deref())
        .await?;
    state.invalidate().await;

    info!(node = %node, vanity = ?mapping.as_ref().map(|m| m.source.as_str()), "vanity address updated");
    Ok(Json(VanityResponse { mapping }))
}

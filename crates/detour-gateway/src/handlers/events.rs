use crate::error::{AppError, Result};
use crate::model::{ContentEvent, EventQuery, EventResponse};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use detour_core::{MappingStore, SourcePath};
use tracing::{error, info};

/// Takes a content lifecycle event and starts the matching cascade.
///
/// Cascades run in the background unless `?wait=true` is given. The
/// resolution cache is dropped once a cascade has finished.
pub async fn event_handler<S: MappingStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<EventQuery>,
    Json(event): Json<ContentEvent>,
) -> Result<(StatusCode, Json<EventResponse>)> {
    let policy = state.policy();
    let propagator = state.propagator();

    let job = match event {
        ContentEvent::Created { node, path } => {
            let path = SourcePath::parse(&path, policy)?;
            info!(node = %node, path = %path, "received created event");
            propagator.submit_created(node, &path)
        }
        ContentEvent::PathChanged {
            node,
            old_path,
            new_path,
        } => {
            let old_path = SourcePath::parse(&old_path, policy)?;
            let new_path = SourcePath::parse(&new_path, policy)?;
            info!(node = %node, from = %old_path, to = %new_path, "received path change event");
            propagator.submit_path_changed(node, &old_path, &new_path)
        }
        ContentEvent::Deleted { node } => {
            info!(node = %node, "received deletion event");
            let report = propagator.on_deleted(node).await?;
            state.invalidate().await;
            return Ok((StatusCode::OK, Json(EventResponse::Deleted { report })));
        }
    };

    let root = job.root();
    if query.wait {
        let report = job
            .join()
            .await
            .map_err(|err| AppError::Job(err.to_string()))?;
        state.invalidate().await;
        return Ok((StatusCode::OK, Json(EventResponse::Completed { report })));
    }

    let background = state.clone();
    tokio::spawn(async move {
        if let Err(err) = job.join().await {
            error!(root = %root, error = %err, "propagation job did not finish");
        }
        background.invalidate().await;
    });

    Ok((StatusCode::ACCEPTED, Json(EventResponse::Queued { root })))
}

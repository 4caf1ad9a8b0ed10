use crate::error::{AppError, Result};
use crate::model::{ListMappingsQuery, MappingRequest, MappingResponse, RedirectRequest, WriteQuery};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use detour_core::{
    ContentHierarchy, Mapping, MappingId, MappingStore, NodeId, PutMode, Redirect, SourcePath,
    Stage,
};
use detour_generator::Generator;
use detour_sync::{InMemoryHierarchy, SyncError};
use tracing::info;

pub async fn list_mappings_handler<S: MappingStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListMappingsQuery>,
) -> Result<Json<Vec<Mapping>>> {
    let source = query
        .source
        .as_deref()
        .map(|raw| SourcePath::parse(raw, state.policy()))
        .transpose()?;

    let store = state.store();
    let mut mappings = match (query.page, &source) {
        (Some(page), _) => store.find_by_page(page).await?,
        (None, Some(source)) => store.find_by_source_path(source, None, &[]).await?,
        (None, None) => store.all().await?,
    };
    if let Some(source) = &source {
        mappings.retain(|mapping| &mapping.source == source);
    }

    Ok(Json(mappings))
}

pub async fn get_mapping_handler<S: MappingStore>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> Result<Json<Mapping>> {
    let id = MappingId::new(id);
    state
        .store()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("mapping {} not found", id)))
}

pub async fn create_mapping_handler<S: MappingStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<WriteQuery>,
    Json(request): Json<MappingRequest>,
) -> Result<(StatusCode, Json<MappingResponse>)> {
    let id = state.generator().next_id();
    let response = write_mapping(&state, id, request, query.replace, Write::Insert).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Replaces an existing mapping. Ids are only ever handed out by the
/// generator, so an unknown id is not found rather than created.
pub async fn update_mapping_handler<S: MappingStore>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
    Query(query): Query<WriteQuery>,
    Json(request): Json<MappingRequest>,
) -> Result<Json<MappingResponse>> {
    let id = MappingId::new(id);
    if state.store().get(id).await?.is_none() {
        return Err(AppError::NotFound(format!("mapping {} not found", id)));
    }

    let response = write_mapping(&state, id, request, query.replace, Write::Update).await?;
    Ok(Json(response))
}

pub async fn delete_mapping_handler<S: MappingStore>(
    Path(id): Path<u64>,
    State(state): State<AppState<S>>,
) -> Result<StatusCode> {
    let id = MappingId::new(id);
    if !state.store().remove(id).await? {
        return Err(AppError::NotFound(format!("mapping {} not found", id)));
    }

    state.invalidate().await;
    info!(id = %id, "mapping removed");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Clone, Copy)]
enum Write {
    Insert,
    Update,
}

async fn write_mapping<S: MappingStore>(
    state: &AppState<S>,
    id: MappingId,
    request: MappingRequest,
    replace: bool,
    write: Write,
) -> Result<MappingResponse> {
    let policy = state.policy();
    let source = SourcePath::parse(&request.source, policy)?;
    let redirect = match request.redirect {
        RedirectRequest::Page {
            page,
            path: Some(path),
        } => Redirect::page(page, SourcePath::parse(&path, policy)?),
        RedirectRequest::Page { page, path: None } => {
            let path = current_path(state.hierarchy(), page)
                .await?
                .ok_or_else(|| AppError::BadRequest(format!("{} has no known path", page)))?;
            Redirect::page(page, path)
        }
        RedirectRequest::Link { link } => Redirect::link(link),
        RedirectRequest::Error { status } => Redirect::error(status),
    };

    let mut mapping = Mapping::new(id, source, redirect).with_match_kind(request.match_kind);
    if let Some(priority) = request.priority {
        mapping = mapping.with_priority(priority);
    }
    if let Some(code) = request.response_code {
        mapping = mapping.with_response_code(code);
    }
    if let Some(owner) = request.owner {
        mapping = mapping.with_owner(owner);
    }
    mapping.validate()?;

    let mode = if replace {
        PutMode::Replace
    } else {
        PutMode::Reject
    };
    let outcome = match write {
        Write::Insert => state.store().insert(mapping.clone(), mode).await?,
        Write::Update => state.store().put(mapping.clone(), mode).await?,
    };
    state.invalidate().await;

    info!(
        id = %id,
        source = %mapping.source,
        created = outcome.created,
        replaced = outcome.replaced.len(),
        "mapping written"
    );

    Ok(MappingResponse {
        mapping,
        created: outcome.created,
        replaced: outcome.replaced,
    })
}

async fn current_path(hierarchy: &InMemoryHierarchy, page: NodeId) -> Result<Option<SourcePath>> {
    for stage in [Stage::Live, Stage::Draft] {
        let path = hierarchy
            .full_path_as_of(page, stage)
            .await
            .map_err(SyncError::from)?;
        if path.is_some() {
            return Ok(path);
        }
    }
    Ok(None)
}

use crate::error::{AppError, Result};
use crate::model::ErrorResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use detour_core::MappingStore;
use detour_matcher::{Disposition, Matcher};
use tracing::debug;

/// Answers any request no other route took with the winning mapping.
pub async fn dispatch_handler<S: MappingStore>(
    State(state): State<AppState<S>>,
    uri: Uri,
) -> Result<Response> {
    let raw = uri.path();
    let Some(resolution) = state.matcher().resolve_match(raw).await? else {
        return Err(AppError::NotFound(format!("no mapping for '{}'", raw)));
    };

    let mapping = resolution.mapping.id;
    match resolution.disposition() {
        Disposition::Redirect { location, status } => {
            debug!(path = %raw, mapping = %mapping, location = %location, status, "redirecting");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::MOVED_PERMANENTLY);
            Ok((status, [(header::LOCATION, location)]).into_response())
        }
        Disposition::Error { status } => {
            debug!(path = %raw, mapping = %mapping, status, "answering with mapped error");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::NOT_FOUND);
            let body = ErrorResponse {
                error: "mapped_error",
                message: format!("'{}' answers with {}", raw, status.as_u16()),
            };
            Ok((status, Json(body)).into_response())
        }
    }
}

use axum::routing::{get, post, put};
use axum::Router;
use detour_core::MappingStore;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    create_mapping_handler, delete_mapping_handler, delete_node_handler, dispatch_handler,
    event_handler, get_mapping_handler, health_handler, list_mappings_handler,
    propagation_handler, put_node_handler, resolve_handler, update_mapping_handler,
    vanity_handler,
};
use crate::state::AppState;

pub struct App {}

impl App {
    /// Admin API under `/v1`; every other path is answered by the matcher.
    pub fn router<S: MappingStore>(state: AppState<S>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .nest(
                "/v1",
                Router::new()
                    .route(
                        "/mappings",
                        get(list_mappings_handler::<S>).post(create_mapping_handler::<S>),
                    )
                    .route(
                        "/mappings/{id}",
                        get(get_mapping_handler::<S>)
                            .put(update_mapping_handler::<S>)
                            .delete(delete_mapping_handler::<S>),
                    )
                    .route("/resolve", get(resolve_handler::<S>))
                    .route("/propagation", get(propagation_handler::<S>))
                    .route("/events", post(event_handler::<S>))
                    .route(
                        "/nodes/{id}",
                        put(put_node_handler::<S>).delete(delete_node_handler::<S>),
                    )
                    .route("/nodes/{id}/vanity", put(vanity_handler::<S>)),
            )
            .fallback(dispatch_handler::<S>)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use detour_gateway::{App, AppState, GatewaySettings};
use detour_core::{Mapping, MappingStore, PutMode, Redirect, SourcePath};
use detour_generator::SeqGenerator;
use detour_storage::InMemoryMappingStore;
use detour_sync::InMemoryHierarchy;
use serde_json::{json, Value};
use tower::ServiceExt;

struct Response {
    status: StatusCode,
    location: Option<String>,
    body: Value,
}

fn app() -> Router {
    app_with(Arc::new(InMemoryMappingStore::new()))
}

fn app_with(store: Arc<InMemoryMappingStore>) -> Router {
    let state = AppState::new(
        store,
        Arc::new(InMemoryHierarchy::new()),
        Arc::new(SeqGenerator::new()),
        GatewaySettings::default(),
    );
    App::router(state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|value| value.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    Response {
        status,
        location,
        body,
    }
}

async fn get(app: &Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> Response {
    send(app, Method::POST, uri, Some(body)).await
}

async fn put(app: &Router, uri: &str, body: Value) -> Response {
    send(app, Method::PUT, uri, Some(body)).await
}

async fn link(app: &Router, source: &str, target: &str) -> Response {
    post(
        app,
        "/v1/mappings",
        json!({ "source": source, "redirect": { "type": "link", "link": target } }),
    )
    .await
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let response = get(&app, "/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn created_link_redirects_requests() {
    let app = app();

    let created = link(&app, "/Old-Page/", "/new-page").await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["mapping"]["source"], "/old-page");
    assert_eq!(created.body["created"], true);

    let response = get(&app, "/old-page").await;
    assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.location.as_deref(), Some("/new-page"));
}

#[tokio::test]
async fn unmatched_paths_are_not_found() {
    let app = app();
    let response = get(&app, "/nowhere").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "not_found");
}

#[tokio::test]
async fn error_mappings_answer_with_their_status() {
    let app = app();
    let created = post(
        &app,
        "/v1/mappings",
        json!({ "source": "/gone", "redirect": { "type": "error", "status": 410 } }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let response = get(&app, "/gone").await;
    assert_eq!(response.status, StatusCode::GONE);
    assert_eq!(response.location, None);
}

#[tokio::test]
async fn invalid_mappings_are_rejected() {
    let app = app();
    let response = post(
        &app,
        "/v1/mappings",
        json!({ "source": "/bad", "redirect": { "type": "error", "status": 200 } }),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "invalid_request");
}

#[tokio::test]
async fn canonical_conflicts_need_replace() {
    let app = app();
    let page = |node: u64, path: &str| {
        json!({
            "source": "/shared",
            "redirect": { "type": "page", "page": node, "path": path },
        })
    };

    let first = post(&app, "/v1/mappings", page(1, "/one")).await;
    assert_eq!(first.status, StatusCode::CREATED);
    let first_id = first.body["mapping"]["id"].clone();

    let second = post(&app, "/v1/mappings", page(2, "/two")).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["error"], "conflict");

    let replaced = post(&app, "/v1/mappings?replace=true", page(2, "/two")).await;
    assert_eq!(replaced.status, StatusCode::CREATED);
    assert_eq!(replaced.body["replaced"], json!([first_id]));

    let response = get(&app, "/shared").await;
    assert_eq!(response.location.as_deref(), Some("/two"));
}

#[tokio::test]
async fn mappings_can_be_read_updated_and_removed() {
    let app = app();
    let created = link(&app, "/a", "/b").await;
    let id = created.body["mapping"]["id"].as_u64().unwrap();
    let uri = format!("/v1/mappings/{}", id);

    let fetched = get(&app, &uri).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["redirect"]["link"], "/b");

    assert_eq!(get(&app, "/a").await.location.as_deref(), Some("/b"));

    let updated = put(
        &app,
        &uri,
        json!({
            "source": "/a",
            "redirect": { "type": "link", "link": "/c" },
            "response_code": 302,
        }),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["created"], false);

    let redirected = get(&app, "/a").await;
    assert_eq!(redirected.status, StatusCode::FOUND);
    assert_eq!(redirected.location.as_deref(), Some("/c"));

    let listed = get(&app, "/v1/mappings?source=/A").await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);

    let removed = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);
    assert_eq!(get(&app, &uri).await.status, StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/a").await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        send(&app, Method::DELETE, &uri, None).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn updating_an_unknown_mapping_is_not_found() {
    let app = app();

    let updated = put(
        &app,
        "/v1/mappings/1",
        json!({ "source": "/kept", "redirect": { "type": "link", "link": "/target-a" } }),
    )
    .await;
    assert_eq!(updated.status, StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/kept").await.status, StatusCode::NOT_FOUND);

    let created = link(&app, "/other", "/target-b").await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["created"], true);
}

#[tokio::test]
async fn creating_over_a_taken_id_is_a_conflict() {
    let store = Arc::new(InMemoryMappingStore::new());
    store
        .put(
            Mapping::new(1, SourcePath::new("/kept").unwrap(), Redirect::link("/target-a")),
            PutMode::Reject,
        )
        .await
        .unwrap();
    let app = app_with(store);

    let created = link(&app, "/other", "/target-b").await;
    assert_eq!(created.status, StatusCode::CONFLICT);
    assert_eq!(created.body["error"], "conflict");

    let kept = get(&app, "/kept").await;
    assert_eq!(kept.location.as_deref(), Some("/target-a"));
    assert_eq!(get(&app, "/other").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resolve_reports_the_whole_chain() {
    let app = app();
    link(&app, "/a", "/b").await;
    link(&app, "/b", "/c").await;

    let response = get(&app, "/v1/resolve?path=/a").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["hops"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["outcome"]["type"], "resolved");
    assert_eq!(response.body["outcome"]["disposition"]["location"], "/c");

    link(&app, "/c", "/a").await;
    let looped = get(&app, "/v1/resolve?path=/a").await;
    assert_eq!(looped.body["outcome"]["type"], "loop");
}

#[tokio::test]
async fn path_change_events_keep_old_addresses_working() {
    let app = app();
    assert_eq!(
        put(&app, "/v1/nodes/1", json!({ "segment": "a" })).await.status,
        StatusCode::CREATED
    );
    put(&app, "/v1/nodes/2", json!({ "parent": 1, "segment": "b" })).await;

    assert_eq!(get(&app, "/a/b").await.status, StatusCode::NOT_FOUND);

    assert_eq!(
        put(&app, "/v1/nodes/1", json!({ "segment": "a2" })).await.status,
        StatusCode::OK
    );
    let event = post(
        &app,
        "/v1/events?wait=true",
        json!({ "type": "path_changed", "node": 1, "old_path": "/a", "new_path": "/a2" }),
    )
    .await;
    assert_eq!(event.status, StatusCode::OK);
    assert_eq!(event.body["status"], "completed");
    assert_eq!(event.body["report"]["steps"].as_array().unwrap().len(), 2);

    let response = get(&app, "/a/b").await;
    assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.location.as_deref(), Some("/a2/b"));

    let log = get(&app, "/v1/propagation?node=1").await;
    assert_eq!(log.body.as_array().unwrap().len(), 1);

    put(
        &app,
        "/v1/nodes/2",
        json!({ "parent": 1, "segment": "b", "published": false, "on_draft": false }),
    )
    .await;
    let deleted = post(&app, "/v1/events", json!({ "type": "deleted", "node": 2 })).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["status"], "deleted");
    assert_eq!(deleted.body["report"]["converted"].as_array().unwrap().len(), 1);

    let mappings = get(&app, "/v1/mappings?source=/a/b").await;
    assert_eq!(mappings.body[0]["redirect"]["type"], "to_link");
    assert_eq!(get(&app, "/a/b").await.location.as_deref(), Some("/a2/b"));
}

#[tokio::test]
async fn queued_events_run_in_the_background() {
    let app = app();
    put(&app, "/v1/nodes/1", json!({ "segment": "a" })).await;
    put(&app, "/v1/nodes/2", json!({ "parent": 1, "segment": "b" })).await;

    let event = post(
        &app,
        "/v1/events",
        json!({ "type": "created", "node": 1, "path": "/legacy" }),
    )
    .await;
    assert_eq!(event.status, StatusCode::ACCEPTED);
    assert_eq!(event.body["status"], "queued");
    assert_eq!(event.body["root"], 1);

    let mut logged = Value::Null;
    for _ in 0..100 {
        logged = get(&app, "/v1/propagation").await.body;
        if !logged.as_array().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(logged.as_array().unwrap().len(), 1);

    let mut location = None;
    for _ in 0..100 {
        location = get(&app, "/legacy/b").await.location;
        if location.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(location.as_deref(), Some("/a/b"));
}

#[tokio::test]
async fn vanity_addresses_point_at_their_page() {
    let app = app();
    put(&app, "/v1/nodes/1", json!({ "segment": "about" })).await;
    put(&app, "/v1/nodes/2", json!({ "segment": "contact" })).await;

    let vanity = put(&app, "/v1/nodes/1/vanity", json!({ "vanity": "/hello" })).await;
    assert_eq!(vanity.status, StatusCode::OK);
    assert_eq!(vanity.body["mapping"]["source"], "/hello");
    assert_eq!(vanity.body["mapping"]["origin"], "vanity");
    assert_eq!(get(&app, "/hello").await.location.as_deref(), Some("/about"));

    let taken = put(&app, "/v1/nodes/2/vanity", json!({ "vanity": "/hello" })).await;
    assert_eq!(taken.status, StatusCode::CONFLICT);

    let removed = put(&app, "/v1/nodes/1/vanity", json!({ "vanity": null })).await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body["mapping"], Value::Null);
    assert_eq!(get(&app, "/hello").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn page_mappings_default_to_the_mirrored_path() {
    let app = app();
    put(&app, "/v1/nodes/7", json!({ "segment": "docs" })).await;

    let created = post(
        &app,
        "/v1/mappings",
        json!({ "source": "/manual", "redirect": { "type": "page", "page": 7 } }),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(get(&app, "/manual").await.location.as_deref(), Some("/docs"));

    let unknown = post(
        &app,
        "/v1/mappings",
        json!({ "source": "/other", "redirect": { "type": "page", "page": 8 } }),
    )
    .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

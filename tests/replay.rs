use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use volunteer_tracker::app::{AppState, build_router};
use volunteer_tracker::auth;
use volunteer_tracker::config::Config;
use volunteer_tracker::sheets::MemorySheets;
use volunteer_tracker::storage::{MemStorage, Storage};

fn setup() -> (Router, Arc<MemStorage>) {
    let config = Config::default();
    let store = Arc::new(MemStorage::new());
    auth::ensure_admin(store.as_ref(), &config.admin).unwrap();
    let state = AppState::new(store.clone(), Arc::new(MemorySheets::new()), config);
    (build_router(Arc::new(state)), store)
}

async fn replay(app: &Router, operations: Value, admin: bool) -> Vec<Value> {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/sync/replay")
        .header(header::CONTENT_TYPE, "application/json");
    if admin {
        request = request.header(auth::ADMIN_PASSWORD_HEADER, "admin123");
    }
    let request = request
        .body(Body::from(json!({ "operations": operations }).to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    body["results"].as_array().unwrap().clone()
}

fn offline_batch() -> Value {
    json!([
        {
            "id": "op-1",
            "type": "create-volunteer",
            "method": "POST",
            "url": "http://localhost:5173/api/volunteers",
            "body": { "name": "Dee" },
            "tempId": -1,
            "queuedAt": 1_714_000_000_000_i64
        },
        {
            "id": "op-2",
            "method": "POST",
            "url": "/api/events",
            "body": {
                "volunteerId": -1,
                "event": "Shelter",
                "location": "Main St",
                "hours": "3:00",
                "date": "2024-04-20"
            },
            "tempId": -7
        },
        {
            "id": "op-3",
            "method": "PATCH",
            "url": "/api/volunteers/-1",
            "body": { "hourGoal": "10:00" }
        }
    ])
}

#[tokio::test]
async fn test_replay_binds_temp_ids() {
    let (app, store) = setup();
    let results = replay(&app, offline_batch(), false).await;

    let statuses: Vec<&str> = results.iter().map(|r| r["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, ["applied", "applied", "applied"]);
    assert_eq!(results[0]["record"]["name"], "Dee");
    assert_eq!(results[1]["record"]["volunteerId"], results[0]["record"]["id"]);
    assert_eq!(results[2]["record"]["hourGoal"], "10:00");

    assert_eq!(store.volunteers().unwrap().len(), 1);
    assert_eq!(store.events().unwrap().len(), 1);
}

#[tokio::test]
async fn test_resending_a_batch_is_idempotent() {
    let (app, store) = setup();
    replay(&app, offline_batch(), false).await;
    let results = replay(&app, offline_batch(), false).await;

    assert!(results.iter().all(|r| r["status"] == "duplicate"));
    assert_eq!(store.volunteers().unwrap().len(), 1);
    assert_eq!(store.events().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_operation_can_be_retried() {
    let (app, store) = setup();
    let orphan = json!([{
        "id": "op-9",
        "method": "POST",
        "url": "/api/events",
        "body": {
            "volunteerId": -4,
            "event": "Shelter",
            "location": "Main St",
            "hours": "1:00",
            "date": "2024-04-21"
        }
    }]);
    let results = replay(&app, orphan.clone(), false).await;
    assert_eq!(results[0]["status"], "rejected");
    assert_eq!(results[0]["error"], "Unresolved temporary id -4");

    let volunteer = json!([{
        "id": "op-8",
        "method": "POST",
        "url": "/api/volunteers",
        "body": { "name": "Eve" },
        "tempId": -4
    }]);
    replay(&app, volunteer, false).await;

    let results = replay(&app, orphan, false).await;
    assert_eq!(results[0]["status"], "applied");
    assert_eq!(store.events().unwrap().len(), 1);
}

#[tokio::test]
async fn test_queued_delete_requires_admin() {
    let (app, store) = setup();
    replay(&app, offline_batch(), false).await;
    let event_id = store.events().unwrap()[0].id;
    let url = format!("/api/events/{event_id}");

    let results = replay(
        &app,
        json!([{ "id": "del-1", "method": "DELETE", "url": url }]),
        false,
    )
    .await;
    assert_eq!(results[0]["status"], "rejected");

    let results = replay(
        &app,
        json!([{ "id": "del-1", "method": "DELETE", "url": url, "body": { "password": "admin123" } }]),
        false,
    )
    .await;
    assert_eq!(results[0]["status"], "applied");
    assert!(store.events().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_by_temp_id_with_admin_request() {
    let (app, store) = setup();
    replay(&app, offline_batch(), false).await;

    let results = replay(
        &app,
        json!([{ "id": "del-2", "method": "DELETE", "url": "/api/events/-7" }]),
        true,
    )
    .await;
    assert_eq!(results[0]["status"], "applied");
    assert!(store.events().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_routes_are_rejected() {
    let (app, _) = setup();
    let results = replay(
        &app,
        json!([
            { "id": "x-1", "method": "GET", "url": "/api/volunteers" },
            { "id": "x-2", "method": "POST", "url": "/api/admin/import-csv" },
            { "id": "", "method": "POST", "url": "/api/volunteers", "body": { "name": "Z" } }
        ]),
        false,
    )
    .await;
    assert!(results.iter().all(|r| r["status"] == "rejected"));
}

//! Replay of writes queued by the web client while it was offline.
//!
//! Each queued operation carries a client-chosen id. An id is claimed in the
//! store before the write runs, so resending a batch after a lost response
//! never applies anything twice. Records created offline are known to the
//! client by negative temporary ids until the replay binds them to real ones.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api;
use crate::app::AppState;
use crate::auth;
use crate::error::{Error, Result};
use crate::extract::Json;
use crate::model::{Event, NewEvent, NewVolunteer, Volunteer, VolunteerPatch};
use crate::storage::{RecordKind, Storage};

/// One write queued by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: String,
    /// Client-side label such as `"create-event"`; informational only.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub body: Option<Value>,
    /// Negative id the client gave the record a create will produce.
    #[serde(default)]
    pub temp_id: Option<i64>,
    #[serde(default)]
    pub queued_at: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ReplayRequest {
    pub operations: Vec<PendingOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Applied,
    Duplicate,
    Rejected,
}

/// The record an applied operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Volunteer(Volunteer),
    Event(Event),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub id: String,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
}

#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub results: Vec<OperationResult>,
}

/// A supported replay target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CreateVolunteer,
    UpdateVolunteer(i64),
    CreateEvent,
    UpdateEvent(i64),
    DeleteEvent(i64),
}

/// Work out which write `method` + `url` names.
///
/// Only the path from `/api/` on matters, so absolute URLs, query strings
/// and a trailing slash are all accepted.
///
/// # Errors
/// * Returns a validation error for anything outside the replayable routes
pub fn parse_route(method: &str, url: &str) -> Result<Route> {
    let unsupported = || Error::validation(format!("Unsupported operation: {method} {url}"));

    let start = url.find("/api/").ok_or_else(unsupported)?;
    let path = &url[start + "/api/".len()..];
    let path = path.split(['?', '#']).next().unwrap_or("");
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let id = |s: &str| s.parse::<i64>().map_err(|_| unsupported());
    match (method.to_ascii_uppercase().as_str(), segments.as_slice()) {
        ("POST", ["volunteers"]) => Ok(Route::CreateVolunteer),
        ("PATCH", ["volunteers", v]) => Ok(Route::UpdateVolunteer(id(*v)?)),
        ("POST", ["events"]) => Ok(Route::CreateEvent),
        ("PUT", ["events", e]) => Ok(Route::UpdateEvent(id(*e)?)),
        ("DELETE", ["events", e]) => Ok(Route::DeleteEvent(id(*e)?)),
        _ => Err(unsupported()),
    }
}

/// Map a possibly temporary id to a real one.
fn resolve(store: &dyn Storage, kind: RecordKind, id: i64) -> Result<i64> {
    if id >= 0 {
        return Ok(id);
    }
    store
        .resolve_temp_id(kind, id)?
        .ok_or_else(|| Error::validation(format!("Unresolved temporary id {id}")))
}

fn body_of<T: serde::de::DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| Error::validation(format!("Invalid body: {e}")))
}

/// Parse an event body, resolving a temporary `volunteerId` first.
fn event_body(store: &dyn Storage, mut body: Value) -> Result<NewEvent> {
    if let Some(slot) = body.get_mut("volunteerId") {
        if let Some(id) = slot.as_i64().filter(|id| *id < 0) {
            *slot = Value::from(resolve(store, RecordKind::Volunteer, id)?);
        }
    }
    body_of(body)
}

fn bind_created(store: &dyn Storage, kind: RecordKind, temp_id: Option<i64>, id: i64) -> Result<()> {
    match temp_id {
        Some(temp) if temp < 0 => store.bind_temp_id(kind, temp, id),
        _ => Ok(()),
    }
}

fn apply(state: &AppState, op: &PendingOperation, admin: bool) -> Result<Option<Record>> {
    let store = state.store.as_ref();
    let route = parse_route(&op.method, &op.url)?;
    let body = op.body.clone().unwrap_or(Value::Null);

    match route {
        Route::CreateVolunteer => {
            let new: NewVolunteer = body_of(body)?;
            let volunteer = api::create_volunteer_checked(store, &new)?;
            bind_created(store, RecordKind::Volunteer, op.temp_id, volunteer.id)?;
            Ok(Some(Record::Volunteer(volunteer)))
        }
        Route::UpdateVolunteer(id) => {
            let id = resolve(store, RecordKind::Volunteer, id)?;
            let patch: VolunteerPatch = body_of(body)?;
            let volunteer = api::update_volunteer_checked(store, id, &patch)?;
            Ok(Some(Record::Volunteer(volunteer)))
        }
        Route::CreateEvent => {
            let new = event_body(store, body)?;
            let event = api::create_event_checked(store, &new)?;
            bind_created(store, RecordKind::Event, op.temp_id, event.id)?;
            Ok(Some(Record::Event(event)))
        }
        Route::UpdateEvent(id) => {
            let id = resolve(store, RecordKind::Event, id)?;
            let new = event_body(store, body)?;
            let event = api::update_event_checked(store, id, &new)?;
            Ok(Some(Record::Event(event)))
        }
        Route::DeleteEvent(id) => {
            let queued_password = body.get("password").and_then(Value::as_str);
            let allowed = admin
                || match queued_password {
                    Some(password) => auth::verify_admin_password(state, password)?,
                    None => false,
                };
            if !allowed {
                return Err(Error::Unauthorized("Admin password required".to_string()));
            }
            let id = resolve(store, RecordKind::Event, id)?;
            api::delete_event_checked(store, id)?;
            Ok(None)
        }
    }
}

/// Apply `operations` in order.
///
/// `admin` says whether the replay request itself carried admin rights.
///
/// # Errors
/// * Returns an error only when the store cannot record a claim
pub fn replay(
    state: &AppState,
    operations: &[PendingOperation],
    admin: bool,
) -> Result<Vec<OperationResult>> {
    let mut results = Vec::with_capacity(operations.len());
    for op in operations {
        let result = |status, error, record| OperationResult {
            id: op.id.clone(),
            status,
            error,
            record,
        };

        if op.id.trim().is_empty() {
            results.push(result(
                OperationStatus::Rejected,
                Some("Operation id is required".to_string()),
                None,
            ));
            continue;
        }
        if !state.store.try_claim_operation(&op.id)? {
            tracing::debug!(op = %op.id, "skipping replayed operation");
            results.push(result(OperationStatus::Duplicate, None, None));
            continue;
        }

        match apply(state, op, admin) {
            Ok(record) => results.push(result(OperationStatus::Applied, None, record)),
            Err(e) => {
                state.store.release_operation(&op.id)?;
                tracing::info!(op = %op.id, method = %op.method, url = %op.url, error = %e, "rejected queued operation");
                results.push(result(OperationStatus::Rejected, Some(e.to_string()), None));
            }
        }
    }
    Ok(results)
}

/// `POST /api/sync/replay`
pub async fn handle_replay(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    Json(request): Json<ReplayRequest>,
) -> Result<Json<ReplayResponse>> {
    let admin = auth::is_admin_request(&state, &headers, &uri)?;
    let results = replay(&state, &request.operations, admin)?;
    tracing::info!(
        operations = results.len(),
        applied = results
            .iter()
            .filter(|r| r.status == OperationStatus::Applied)
            .count(),
        "replayed offline queue"
    );
    Ok(Json(ReplayResponse { results }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route() {
        assert_eq!(
            parse_route("post", "/api/volunteers").unwrap(),
            Route::CreateVolunteer
        );
        assert_eq!(
            parse_route("PATCH", "http://localhost:5000/api/volunteers/-3?x=1").unwrap(),
            Route::UpdateVolunteer(-3)
        );
        assert_eq!(
            parse_route("DELETE", "/api/events/12/").unwrap(),
            Route::DeleteEvent(12)
        );
        assert!(parse_route("GET", "/api/events").is_err());
        assert!(parse_route("DELETE", "/api/volunteers/1").is_err());
        assert!(parse_route("PUT", "/api/events/abc").is_err());
        assert!(parse_route("POST", "/volunteers").is_err());
    }

    #[test]
    fn test_result_json_shape() {
        let result = OperationResult {
            id: "op-1".into(),
            status: OperationStatus::Duplicate,
            error: None,
            record: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "op-1", "status": "duplicate" }));
    }
}

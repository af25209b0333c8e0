//! JSON handlers for volunteers, events, exports and spreadsheet sync.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::app::AppState;
use crate::error::{Error, Result};
use crate::export;
use crate::extract::{Json, Path};
use crate::hours::{Hours, progress_percentage};
use crate::import::{self, ImportReport};
use crate::model::{Event, NewEvent, NewVolunteer, SheetsConfig, Volunteer, VolunteerPatch};
use crate::storage::Storage;
use crate::sync::{self, PullReport, PushReport, SyncStatus};
use crate::workbook;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A volunteer with the number of events logged.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerSummary {
    #[serde(flatten)]
    pub volunteer: Volunteer,
    pub event_count: usize,
}

/// Totals shown on a volunteer's detail page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerStats {
    pub total_events: usize,
    pub total_hours: String,
    pub progress_percentage: u64,
    pub hour_goal: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VolunteerDetail {
    pub volunteer: Volunteer,
    pub events: Vec<Event>,
    pub stats: VolunteerStats,
}

#[derive(Debug, Deserialize)]
pub struct AutoToggle {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SheetsConfigView {
    sheet_id: Option<String>,
    client_email: Option<String>,
    configured: bool,
}

/// Validate an event and check its volunteer exists, then store it.
///
/// # Errors
/// * Returns a validation error for bad fields or an unknown volunteer
pub fn create_event_checked(store: &dyn Storage, event: &NewEvent) -> Result<Event> {
    let event = event.normalize()?;
    if store.volunteer(event.volunteer_id)?.is_none() {
        return Err(Error::validation("Volunteer does not exist"));
    }
    store.create_event(event)
}

/// Validate a replacement event and store it under `id`.
///
/// # Errors
/// * Returns a validation error for bad fields or an unknown volunteer, and
///   [`Error::NotFound`] when there is no event `id`
pub fn update_event_checked(store: &dyn Storage, id: i64, event: &NewEvent) -> Result<Event> {
    let event = event.normalize()?;
    if store.volunteer(event.volunteer_id)?.is_none() {
        return Err(Error::validation("Volunteer does not exist"));
    }
    store.update_event(id, event)?.ok_or(Error::NotFound("Event"))
}

/// Validate and store a new volunteer.
///
/// # Errors
/// * Returns a validation error for bad fields
pub fn create_volunteer_checked(store: &dyn Storage, volunteer: &NewVolunteer) -> Result<Volunteer> {
    store.create_volunteer(volunteer.normalize()?)
}

/// Apply a patch to volunteer `id`.
///
/// # Errors
/// * Returns a validation error for bad fields and [`Error::NotFound`] when
///   there is no volunteer `id`
pub fn update_volunteer_checked(
    store: &dyn Storage,
    id: i64,
    patch: &VolunteerPatch,
) -> Result<Volunteer> {
    store
        .update_volunteer(id, patch)?
        .ok_or(Error::NotFound("Volunteer"))
}

/// Remove event `id`.
///
/// # Errors
/// * Returns [`Error::NotFound`] when there is no event `id`
pub fn delete_event_checked(store: &dyn Storage, id: i64) -> Result<()> {
    if store.delete_event(id)? {
        Ok(())
    } else {
        Err(Error::NotFound("Event"))
    }
}

pub async fn list_volunteers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<VolunteerSummary>>> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for event in state.store.events()? {
        *counts.entry(event.volunteer_id).or_default() += 1;
    }
    let summaries = state
        .store
        .volunteers()?
        .into_iter()
        .map(|volunteer| VolunteerSummary {
            event_count: counts.get(&volunteer.id).copied().unwrap_or(0),
            volunteer,
        })
        .collect();
    Ok(Json(summaries))
}

pub async fn get_volunteer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<VolunteerDetail>> {
    let volunteer = state
        .store
        .volunteer(id)?
        .ok_or(Error::NotFound("Volunteer"))?;
    let events = state.store.events_for(id)?;

    let total = Hours::total(events.iter().map(|e| e.hours.as_str()));
    let goal = volunteer
        .hour_goal
        .as_deref()
        .and_then(|g| Hours::parse(g).ok());
    let stats = VolunteerStats {
        total_events: events.len(),
        total_hours: total.to_string(),
        progress_percentage: progress_percentage(total, goal),
        hour_goal: volunteer.hour_goal.clone(),
    };

    Ok(Json(VolunteerDetail {
        volunteer,
        events,
        stats,
    }))
}

pub async fn create_volunteer(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewVolunteer>,
) -> Result<(StatusCode, Json<Volunteer>)> {
    let volunteer = create_volunteer_checked(state.store.as_ref(), &new)?;
    tracing::info!(id = volunteer.id, "created volunteer");
    Ok((StatusCode::CREATED, Json(volunteer)))
}

pub async fn update_volunteer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<VolunteerPatch>,
) -> Result<Json<Volunteer>> {
    Ok(Json(update_volunteer_checked(state.store.as_ref(), id, &patch)?))
}

pub async fn list_events(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Event>>> {
    Ok(Json(state.store.events()?))
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewEvent>,
) -> Result<(StatusCode, Json<Event>)> {
    let event = create_event_checked(state.store.as_ref(), &new)?;
    tracing::info!(id = event.id, volunteer = event.volunteer_id, "logged event");
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(new): Json<NewEvent>,
) -> Result<Json<Event>> {
    Ok(Json(update_event_checked(state.store.as_ref(), id, &new)?))
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    delete_event_checked(state.store.as_ref(), id)?;
    tracing::info!(id, "deleted event");
    Ok(Json(json!({ "message": "Event deleted successfully" })))
}

/// Fallback for unknown `/api` paths.
pub async fn api_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "API endpoint not found" })),
    )
        .into_response()
}

// === Export / import ===

pub async fn export_csv(State(state): State<Arc<AppState>>) -> Result<Response> {
    let csv = export::to_csv(&state.store.volunteers()?, &state.store.events()?);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"volunteer_events.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

pub async fn export_xlsx(State(state): State<Arc<AppState>>) -> Result<Response> {
    let tabs = workbook::build(&state.store.volunteers()?, &state.store.events()?);
    let bytes = export::to_xlsx(&tabs)?;
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"volunteer_hours.xlsx\"",
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn import_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImportReport>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let text = field
            .text()
            .await
            .map_err(|e| Error::validation(format!("Invalid upload: {e}")))?;
        return Ok(Json(import::from_csv(state.store.as_ref(), &text)?));
    }
    Err(Error::validation("No file uploaded"))
}

// === Spreadsheet sync ===

fn require_config(store: &dyn Storage) -> Result<SheetsConfig> {
    sync::stored_config(store)?.ok_or(Error::SheetsNotConfigured)
}

pub async fn sync_google_sheets(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SheetsConfig>,
) -> Result<Json<Value>> {
    sync::save_config(state.store.as_ref(), &config)?;
    let report = sync::push(state.store.as_ref(), state.sheets.as_ref(), &config).await?;
    Ok(Json(json!({
        "message": "Sync successful",
        "timestamp": report.timestamp,
        "tabsWritten": report.tabs_written,
    })))
}

pub async fn push_sheets(State(state): State<Arc<AppState>>) -> Result<Json<PushReport>> {
    let config = require_config(state.store.as_ref())?;
    Ok(Json(
        sync::push(state.store.as_ref(), state.sheets.as_ref(), &config).await?,
    ))
}

pub async fn pull_sheets(State(state): State<Arc<AppState>>) -> Result<Json<PullReport>> {
    let config = require_config(state.store.as_ref())?;
    Ok(Json(
        sync::pull(state.store.as_ref(), state.sheets.as_ref(), &config).await?,
    ))
}

pub async fn get_sheets_config(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let view = match sync::stored_config(state.store.as_ref())? {
        Some(config) => SheetsConfigView {
            client_email: config.service_account_key().ok().map(|k| k.client_email),
            sheet_id: Some(config.sheet_id),
            configured: true,
        },
        None => SheetsConfigView {
            sheet_id: None,
            client_email: None,
            configured: false,
        },
    };
    Ok(Json(view))
}

pub async fn save_sheets_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SheetsConfig>,
) -> Result<Json<Value>> {
    sync::save_config(state.store.as_ref(), &config)?;
    tracing::info!(sheet = %config.sheet_id, "saved spreadsheet configuration");
    Ok(Json(json!({ "message": "Configuration saved" })))
}

pub async fn sync_status(State(state): State<Arc<AppState>>) -> Result<Json<SyncStatus>> {
    Ok(Json(sync::status(state.store.as_ref())?))
}

pub async fn toggle_auto_sync(
    State(state): State<Arc<AppState>>,
    Json(toggle): Json<AutoToggle>,
) -> Result<Json<Value>> {
    sync::set_auto_sync(state.store.as_ref(), toggle.enabled)?;
    let message = if toggle.enabled {
        "Auto-sync enabled"
    } else {
        "Auto-sync disabled"
    };
    Ok(Json(json!({
        "message": message,
        "autoSyncEnabled": toggle.enabled,
    })))
}

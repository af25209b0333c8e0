//! Spreadsheet synchronization.
//!
//! `push` mirrors local records into the spreadsheet; `pull` folds rows
//! added on the spreadsheet side back into the store. A pull never deletes
//! local data.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::app::AppState;
use crate::error::{Error, Result};
use crate::model::{NewVolunteer, SheetsConfig};
use crate::reconcile::{self, IncomingRow, SkippedRow};
use crate::sheets::{SheetsApi, tab_origin, tab_range};
use crate::storage::{AUTO_SYNC_ENABLED, LAST_SYNC_TIME, SHEETS_CONFIG, Storage};
use crate::workbook::{self, SUMMARY_TAB, TOTAL_LABEL};

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub tabs_written: usize,
    pub timestamp: String,
}

/// Result of a pull.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub volunteers_created: usize,
    pub events_created: usize,
    pub events_matched: usize,
    /// Rows that could not be used, labelled with their tab.
    pub skipped: Vec<SkippedTabRow>,
    pub timestamp: String,
}

/// A skipped row and the tab it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTabRow {
    pub tab: String,
    pub row: usize,
    pub reason: String,
}

/// Sync state shown in the admin panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub last_sync_time: Option<String>,
    pub auto_sync_enabled: bool,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The stored spreadsheet configuration, if any.
///
/// # Errors
/// * Returns an error if the store fails or the stored JSON is corrupt
pub fn stored_config(store: &dyn Storage) -> Result<Option<SheetsConfig>> {
    match store.setting(SHEETS_CONFIG)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::StoredData(format!("spreadsheet configuration: {e}"))),
        None => Ok(None),
    }
}

/// Validate and store the spreadsheet configuration.
///
/// # Errors
/// * Returns a validation error for an unusable config
pub fn save_config(store: &dyn Storage, config: &SheetsConfig) -> Result<()> {
    config.validate()?;
    let raw = serde_json::to_string(config).map_err(|e| Error::StoredData(e.to_string()))?;
    store.set_setting(SHEETS_CONFIG, &raw)
}

/// Current sync status.
///
/// # Errors
/// * Returns an error if the store fails
pub fn status(store: &dyn Storage) -> Result<SyncStatus> {
    Ok(SyncStatus {
        last_sync_time: store.setting(LAST_SYNC_TIME)?,
        auto_sync_enabled: store.setting(AUTO_SYNC_ENABLED)?.as_deref() == Some("true"),
    })
}

/// Turn background sync on or off.
///
/// # Errors
/// * Returns an error if the store fails
pub fn set_auto_sync(store: &dyn Storage, enabled: bool) -> Result<()> {
    store.set_setting(AUTO_SYNC_ENABLED, if enabled { "true" } else { "false" })
}

/// Write every local record to the spreadsheet.
///
/// Creates missing tabs, then clears and rewrites each tab from `A1` so rows
/// removed locally also disappear remotely.
///
/// # Errors
/// * Returns an error if the store or any spreadsheet call fails
pub async fn push(
    store: &dyn Storage,
    api: &dyn SheetsApi,
    config: &SheetsConfig,
) -> Result<PushReport> {
    let volunteers = store.volunteers()?;
    let events = store.events()?;
    let tabs = workbook::build(&volunteers, &events);

    let existing: HashSet<String> = api.tab_titles(config).await?.into_iter().collect();
    for tab in &tabs {
        if !existing.contains(&tab.title) {
            tracing::debug!(tab = %tab.title, "creating tab");
            api.add_tab(config, &tab.title).await?;
        }
    }

    for tab in &tabs {
        api.clear(config, &tab_range(&tab.title)).await?;
        api.write(config, &tab_origin(&tab.title), &tab.rows).await?;
    }

    let timestamp = now_rfc3339();
    store.set_setting(LAST_SYNC_TIME, &timestamp)?;
    tracing::info!(tabs = tabs.len(), sheet = %config.sheet_id, "pushed to spreadsheet");
    Ok(PushReport {
        tabs_written: tabs.len(),
        timestamp,
    })
}

fn cell(row: &[String], c: usize) -> &str {
    row.get(c).map(String::as_str).unwrap_or("")
}

/// Bring rows added in the spreadsheet into the store.
///
/// Volunteers listed on the summary tab are matched by id and name, and
/// created when unknown. Event rows on each volunteer tab are matched
/// against that volunteer's local events; unmatched rows are created.
///
/// # Errors
/// * Returns an error if the store or any spreadsheet call fails
pub async fn pull(
    store: &dyn Storage,
    api: &dyn SheetsApi,
    config: &SheetsConfig,
) -> Result<PullReport> {
    let titles = api.tab_titles(config).await?;
    let mut report = PullReport::default();
    let mut volunteers = store.volunteers()?;
    // remote volunteer id -> local volunteer id
    let mut mapping: HashMap<i64, i64> = HashMap::new();

    if titles.iter().any(|t| t == SUMMARY_TAB) {
        let rows = api.read(config, &tab_range(SUMMARY_TAB)).await?;
        for (i, row) in rows.iter().enumerate().skip(1) {
            let remote_id = cell(row, 0).trim().parse::<i64>().ok();
            let name = cell(row, 1);
            if remote_id.is_none() && name.trim().is_empty() {
                continue;
            }

            let local_id = match reconcile::match_volunteer(remote_id, name, &volunteers) {
                Some(v) => v.id,
                None => {
                    let new = NewVolunteer {
                        name: name.to_string(),
                        email: None,
                        hour_goal: None,
                    };
                    match new.normalize() {
                        Ok(new) => {
                            let created = store.create_volunteer(new)?;
                            report.volunteers_created += 1;
                            let id = created.id;
                            volunteers.push(created);
                            id
                        }
                        Err(e) => {
                            report.skipped.push(SkippedTabRow {
                                tab: SUMMARY_TAB.to_string(),
                                row: i + 1,
                                reason: e.to_string(),
                            });
                            continue;
                        }
                    }
                }
            };
            if let Some(remote_id) = remote_id {
                mapping.insert(remote_id, local_id);
            }
        }
    }

    // Events created from one tab must be visible when matching later tabs.
    let mut events = store.events()?;
    for title in &titles {
        let Some(remote_id) = workbook::volunteer_id_from_title(title) else {
            continue;
        };
        let local_id = match mapping.get(&remote_id) {
            Some(id) => *id,
            None if volunteers.iter().any(|v| v.id == remote_id) => remote_id,
            None => {
                report.skipped.push(SkippedTabRow {
                    tab: title.clone(),
                    row: 0,
                    reason: format!("no volunteer for remote id {remote_id}"),
                });
                continue;
            }
        };

        let rows = api.read(config, &tab_range(title)).await?;
        let incoming = rows
            .iter()
            .enumerate()
            .skip(1)
            .take_while(|(_, row)| {
                !row.iter().all(|c| c.trim().is_empty()) && cell(row, 0) != TOTAL_LABEL
            })
            .map(|(i, row)| IncomingRow {
                row: i + 1,
                date: cell(row, 0),
                event: cell(row, 1),
                location: cell(row, 2),
                hours: cell(row, 3),
            });
        let plan = reconcile::plan_events(local_id, incoming, &events);

        report.events_matched += plan.matched;
        for new in plan.to_create {
            events.push(store.create_event(new)?);
            report.events_created += 1;
        }
        report
            .skipped
            .extend(plan.skipped.into_iter().map(|SkippedRow { row, reason }| SkippedTabRow {
                tab: title.clone(),
                row,
                reason,
            }));
    }

    report.timestamp = now_rfc3339();
    store.set_setting(LAST_SYNC_TIME, &report.timestamp)?;
    tracing::info!(
        volunteers = report.volunteers_created,
        events = report.events_created,
        skipped = report.skipped.len(),
        sheet = %config.sheet_id,
        "pulled from spreadsheet"
    );
    Ok(report)
}

/// One auto-sync tick: push if enabled and configured.
///
/// Returns whether a push ran.
///
/// # Errors
/// * Returns an error if the push fails
pub async fn auto_sync_once(state: &AppState) -> Result<bool> {
    if !status(state.store.as_ref())?.auto_sync_enabled {
        return Ok(false);
    }
    let Some(config) = stored_config(state.store.as_ref())? else {
        return Ok(false);
    };
    push(state.store.as_ref(), state.sheets.as_ref(), &config).await?;
    Ok(true)
}

/// Run auto-sync forever at the configured interval.
pub async fn run_auto_sync(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(state.config.auto_sync_interval());
    // the first tick fires immediately; skip it so startup stays quiet
    interval.tick().await;
    loop {
        interval.tick().await;
        match auto_sync_once(&state).await {
            Ok(true) => tracing::debug!("auto-sync pushed"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "auto-sync failed"),
        }
    }
}

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::NewVolunteer;
use crate::reconcile::{self, EventKey, IncomingRow, SkippedRow};
use crate::storage::Storage;

/// Outcome of a CSV import.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub volunteers_created: usize,
    pub events_created: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Load events from CSV text in the export format
///
/// The first row must be the header written by [`crate::export::to_csv`].
/// Each data row is attached to the volunteer with the same id and name,
/// else the first volunteer with that name, else a new volunteer. Rows that
/// match an existing event of that volunteer are left alone, so importing the
/// same file twice adds nothing.
///
/// # Arguments
/// * `store` - Store to import into
/// * `text` - CSV content
///
/// # Returns
/// * `Result<ImportReport>` - Counts of created records plus skipped rows
///
/// # Errors
/// * Returns a validation error if the file is empty or the header is wrong
pub fn from_csv(store: &dyn Storage, text: &str) -> Result<ImportReport> {
    let records = parse_csv(text);
    let Some((header, rows)) = records.split_first() else {
        return Err(Error::validation("CSV file is empty"));
    };
    let columns = header_columns(header)?;

    let mut report = ImportReport::default();
    let mut volunteers = store.volunteers()?;
    // group rows per resolved volunteer so reconciliation sees each batch once
    let mut grouped: Vec<(i64, Vec<(usize, Vec<String>)>)> = Vec::new();
    let mut group_index: HashMap<i64, usize> = HashMap::new();

    for (i, record) in rows.iter().enumerate() {
        let row_number = i + 2;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let field = |c: usize| record.get(c).map(String::as_str).unwrap_or("");
        let id = field(columns.id).trim().parse::<i64>().ok();
        let name = field(columns.name);

        // a bad event row must not leave a new volunteer behind
        if let Err(e) = EventKey::from_parts(
            field(columns.date),
            field(columns.event),
            field(columns.location),
            field(columns.hours),
        ) {
            report.skipped.push(SkippedRow {
                row: row_number,
                reason: e.to_string(),
            });
            continue;
        }

        let volunteer_id = match reconcile::match_volunteer(id, name, &volunteers) {
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
                        report.skipped.push(SkippedRow {
                            row: row_number,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
            }
        };

        let slot = *group_index.entry(volunteer_id).or_insert_with(|| {
            grouped.push((volunteer_id, Vec::new()));
            grouped.len() - 1
        });
        grouped[slot].1.push((row_number, record.clone()));
    }

    let events = store.events()?;
    for (volunteer_id, records) in &grouped {
        let incoming = records.iter().map(|(row, record)| {
            let field = |c: usize| record.get(c).map(String::as_str).unwrap_or("");
            IncomingRow {
                row: *row,
                date: field(columns.date),
                event: field(columns.event),
                location: field(columns.location),
                hours: field(columns.hours),
            }
        });
        let plan = reconcile::plan_events(*volunteer_id, incoming, &events);
        for new in plan.to_create {
            store.create_event(new)?;
            report.events_created += 1;
        }
        report.skipped.extend(plan.skipped);
    }

    report.skipped.sort_by_key(|s| s.row);
    tracing::info!(
        volunteers = report.volunteers_created,
        events = report.events_created,
        skipped = report.skipped.len(),
        "imported CSV"
    );
    Ok(report)
}

struct Columns {
    id: usize,
    name: usize,
    date: usize,
    event: usize,
    location: usize,
    hours: usize,
}

fn header_columns(header: &[String]) -> Result<Columns> {
    let find = |label: &str| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(label))
            .ok_or_else(|| Error::validation(format!("CSV header is missing \"{label}\"")))
    };
    Ok(Columns {
        id: find("Volunteer ID")?,
        name: find("Volunteer Name")?,
        date: find("Date")?,
        event: find("Event")?,
        location: find("Location")?,
        hours: find("Hours")?,
    })
}

/// Split CSV text into records of fields
///
/// Quoted fields may contain commas, doubled quotes and line breaks. Both
/// `\n` and `\r\n` end a record.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current_field.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                record.push(std::mem::take(&mut current_field));
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                record.push(std::mem::take(&mut current_field));
                records.push(std::mem::take(&mut record));
            }
            _ => current_field.push(c),
        }
    }

    if !current_field.is_empty() || !record.is_empty() {
        record.push(current_field);
        records.push(record);
    }

    records
}

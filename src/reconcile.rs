//! Matching external rows against local records.
//!
//! Spreadsheet tabs and CSV files carry no event ids, so an incoming row is
//! considered the same event as a local one when date, title, location and
//! duration agree. Matching is multiset based: two identical rows need two
//! identical local events to count as present.

use std::collections::HashMap;

use crate::error::Result;
use crate::hours::Hours;
use crate::model::{Event, NewEvent, Volunteer, validate_date};

/// Identity of an event for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    date: String,
    event: String,
    location: String,
    minutes: u64,
}

impl EventKey {
    /// Key for a row of text cells.
    ///
    /// # Errors
    /// * Returns a validation error if the hours or date are malformed
    pub fn from_parts(date: &str, event: &str, location: &str, hours: &str) -> Result<Self> {
        let date = date.trim();
        validate_date(date)?;
        Ok(Self {
            date: date.to_string(),
            event: event.trim().to_lowercase(),
            location: location.trim().to_lowercase(),
            minutes: Hours::parse(hours)?.minutes(),
        })
    }

    fn of(event: &Event) -> Option<Self> {
        Self::from_parts(&event.date, &event.event, &event.location, &event.hours).ok()
    }
}

/// An incoming row that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SkippedRow {
    /// 1-based row number in its source.
    pub row: usize,
    pub reason: String,
}

/// Outcome of reconciling one volunteer's rows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Rows with no local counterpart, ready to insert.
    pub to_create: Vec<NewEvent>,
    /// Rows that already exist locally.
    pub matched: usize,
    pub skipped: Vec<SkippedRow>,
}

/// One incoming event row with its position in the source.
#[derive(Debug, Clone)]
pub struct IncomingRow<'a> {
    pub row: usize,
    pub date: &'a str,
    pub event: &'a str,
    pub location: &'a str,
    pub hours: &'a str,
}

/// Decide which `incoming` rows are missing from `local` for `volunteer_id`.
pub fn plan_events<'a>(
    volunteer_id: i64,
    incoming: impl IntoIterator<Item = IncomingRow<'a>>,
    local: &[Event],
) -> Plan {
    let mut remaining: HashMap<EventKey, usize> = HashMap::new();
    for key in local
        .iter()
        .filter(|e| e.volunteer_id == volunteer_id)
        .filter_map(EventKey::of)
    {
        *remaining.entry(key).or_default() += 1;
    }

    let mut plan = Plan::default();
    for row in incoming {
        let key = match EventKey::from_parts(row.date, row.event, row.location, row.hours) {
            Ok(key) => key,
            Err(e) => {
                plan.skipped.push(SkippedRow {
                    row: row.row,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match remaining.get_mut(&key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                plan.matched += 1;
            }
            _ => {
                let candidate = NewEvent {
                    volunteer_id,
                    event: row.event.to_string(),
                    location: row.location.to_string(),
                    hours: row.hours.to_string(),
                    date: row.date.to_string(),
                };
                match candidate.normalize() {
                    Ok(new) => plan.to_create.push(new),
                    Err(e) => plan.skipped.push(SkippedRow {
                        row: row.row,
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }
    plan
}

/// Find a local volunteer for an external `(id, name)` pair.
///
/// The id wins when it exists locally and the names agree (ignoring case),
/// or when no name is given. Otherwise the first volunteer with the same
/// name is used.
pub fn match_volunteer<'a>(
    id: Option<i64>,
    name: &str,
    local: &'a [Volunteer],
) -> Option<&'a Volunteer> {
    let name = name.trim();
    let same_name = |v: &&Volunteer| v.name.trim().eq_ignore_ascii_case(name);

    if let Some(by_id) = id.and_then(|id| local.iter().find(|v| v.id == id)) {
        if name.is_empty() || same_name(&by_id) {
            return Some(by_id);
        }
    }
    if name.is_empty() {
        return None;
    }
    local.iter().find(same_name)
}

//! Tabular layout shared by the XLSX export and the sheets push.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::hours::Hours;
use crate::model::{Event, Volunteer};

/// Title of the summary tab.
pub const SUMMARY_TAB: &str = "Volunteers";

/// Header of the summary tab.
pub const SUMMARY_HEADER: [&str; 4] = ["Volunteer ID", "Name", "Total Events", "Total Hours"];

/// Header of each per-volunteer tab.
pub const EVENTS_HEADER: [&str; 4] = ["Date", "Event", "Location", "Hours"];

/// Label opening the totals row of a per-volunteer tab.
pub const TOTAL_LABEL: &str = "Total Hours:";

/// Spreadsheet services cap titles at 31 characters; stay one under.
const MAX_TITLE_LEN: usize = 30;

lazy_static! {
    static ref UNSAFE_TITLE_CHARS: Regex = Regex::new(r"[^\w\s]").unwrap();
    static ref VOLUNTEER_TITLE: Regex = Regex::new(r"^Volunteer (\d+) - ").unwrap();
}

/// One tab: a title and rows of cell text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub title: String,
    pub rows: Vec<Vec<String>>,
}

/// The tab title used for `volunteer`.
pub fn volunteer_tab_title(volunteer: &Volunteer) -> String {
    let clean = UNSAFE_TITLE_CHARS.replace_all(&volunteer.name, "");
    format!("Volunteer {} - {}", volunteer.id, clean)
        .chars()
        .take(MAX_TITLE_LEN)
        .collect()
}

/// Recover the volunteer id from a title built by [`volunteer_tab_title`].
pub fn volunteer_id_from_title(title: &str) -> Option<i64> {
    VOLUNTEER_TITLE
        .captures(title)
        .and_then(|caps| caps[1].parse().ok())
}

fn row<const N: usize>(cells: [&str; N]) -> Vec<String> {
    cells.iter().map(|c| (*c).to_string()).collect()
}

/// Build the summary tab followed by one tab per volunteer.
///
/// Volunteers keep the order they are given in; events are grouped per
/// volunteer and emitted newest first.
pub fn build(volunteers: &[Volunteer], events: &[Event]) -> Vec<Tab> {
    let mut by_volunteer: HashMap<i64, Vec<&Event>> = HashMap::new();
    for event in events {
        by_volunteer.entry(event.volunteer_id).or_default().push(event);
    }
    for list in by_volunteer.values_mut() {
        list.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
    }

    let mut summary = vec![row(SUMMARY_HEADER)];
    let mut tabs = Vec::with_capacity(volunteers.len() + 1);

    for volunteer in volunteers {
        let own = by_volunteer.get(&volunteer.id).map(Vec::as_slice).unwrap_or(&[]);
        let total = Hours::total(own.iter().map(|e| e.hours.as_str()));

        summary.push(vec![
            volunteer.id.to_string(),
            volunteer.name.clone(),
            own.len().to_string(),
            total.to_string(),
        ]);

        let mut rows = vec![row(EVENTS_HEADER)];
        rows.extend(own.iter().map(|e| {
            vec![
                e.date.clone(),
                e.event.clone(),
                e.location.clone(),
                e.hours.clone(),
            ]
        }));
        rows.push(Vec::new());
        rows.push(vec![
            TOTAL_LABEL.to_string(),
            total.to_string(),
            format!("Total Events: {}", own.len()),
        ]);

        tabs.push(Tab {
            title: volunteer_tab_title(volunteer),
            rows,
        });
    }

    tabs.insert(
        0,
        Tab {
            title: SUMMARY_TAB.to_string(),
            rows: summary,
        },
    );
    tabs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volunteer(id: i64, name: &str) -> Volunteer {
        Volunteer {
            id,
            name: name.into(),
            email: None,
            hour_goal: None,
        }
    }

    fn event(id: i64, volunteer_id: i64, date: &str, hours: &str) -> Event {
        Event {
            id,
            volunteer_id,
            event: format!("Event {id}"),
            location: "Hall".into(),
            hours: hours.into(),
            date: date.into(),
        }
    }

    #[test]
    fn test_title_strips_and_truncates() {
        let title = volunteer_tab_title(&volunteer(7, "O'Brien, Mary-Kate"));
        assert_eq!(title, "Volunteer 7 - OBrien MaryKate");

        let long = volunteer_tab_title(&volunteer(12, "Bartholomew Montgomery-Smythe"));
        assert_eq!(long.chars().count(), 30);
        assert_eq!(volunteer_id_from_title(&long), Some(12));
    }

    #[test]
    fn test_title_round_trip_rejects_others() {
        assert_eq!(volunteer_id_from_title("Volunteers"), None);
        assert_eq!(volunteer_id_from_title("Volunteer x - y"), None);
    }

    #[test]
    fn test_build_layout() {
        let volunteers = vec![volunteer(1, "Ada"), volunteer(2, "Bo")];
        let events = vec![
            event(1, 1, "2024-01-01", "1:45"),
            event(2, 1, "2024-02-01", "0:30"),
        ];
        let tabs = build(&volunteers, &events);
        assert_eq!(tabs.len(), 3);

        let summary = &tabs[0];
        assert_eq!(summary.title, SUMMARY_TAB);
        assert_eq!(summary.rows[1], ["1", "Ada", "2", "2:15"]);
        assert_eq!(summary.rows[2], ["2", "Bo", "0", "0:00"]);

        let ada = &tabs[1];
        assert_eq!(ada.title, "Volunteer 1 - Ada");
        assert_eq!(ada.rows[0], EVENTS_HEADER);
        assert_eq!(ada.rows[1][0], "2024-02-01");
        assert_eq!(ada.rows[2][0], "2024-01-01");
        assert!(ada.rows[3].is_empty());
        assert_eq!(ada.rows[4], ["Total Hours:", "2:15", "Total Events: 2"]);

        let bo = &tabs[2];
        assert_eq!(bo.rows.len(), 3);
    }
}

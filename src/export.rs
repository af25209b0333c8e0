use std::collections::HashMap;

use rust_xlsxwriter::{Workbook, Worksheet};

use crate::error::Result;
use crate::model::{Event, Volunteer};
use crate::workbook::Tab;

/// Column headers of the CSV export (and accepted by the CSV import).
pub const CSV_HEADER: [&str; 6] = [
    "Volunteer ID",
    "Volunteer Name",
    "Date",
    "Event",
    "Location",
    "Hours",
];

/// Convert all events to CSV
///
/// This function flattens every event into one CSV row, joined with the name
/// of its volunteer. Rows follow the order of `events`, which callers pass
/// newest first.
///
/// # Arguments
/// * `volunteers` - Volunteers used to resolve names
/// * `events` - Events to export
///
/// # Returns
/// * `String` - CSV content with a header row and `\n` line endings
///
/// # Examples
/// ```
/// use volunteer_tracker::export::to_csv;
/// use volunteer_tracker::model::{Event, Volunteer};
///
/// let ada = Volunteer { id: 1, name: "Ada".into(), email: None, hour_goal: None };
/// let shift = Event {
///     id: 1,
///     volunteer_id: 1,
///     event: "Pantry, morning".into(),
///     location: "Hall".into(),
///     hours: "2:00".into(),
///     date: "2024-05-01".into(),
/// };
/// let csv = to_csv(&[ada], &[shift]);
/// assert!(csv.ends_with("1,Ada,2024-05-01,\"Pantry, morning\",Hall,2:00\n"));
/// ```
pub fn to_csv(volunteers: &[Volunteer], events: &[Event]) -> String {
    let names: HashMap<i64, &str> = volunteers.iter().map(|v| (v.id, v.name.as_str())).collect();

    let mut csv_content = CSV_HEADER.join(",");
    csv_content.push('\n');

    for event in events {
        let volunteer_id = event.volunteer_id.to_string();
        let fields = [
            volunteer_id.as_str(),
            names.get(&event.volunteer_id).copied().unwrap_or(""),
            event.date.as_str(),
            event.event.as_str(),
            event.location.as_str(),
            event.hours.as_str(),
        ];
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                csv_content.push(',');
            }
            csv_content.push_str(&escape_csv(field));
        }
        csv_content.push('\n');
    }

    csv_content
}

/// Quote a field if it contains a comma, quote or line break
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert workbook tabs to XLSX format
///
/// Each [`Tab`] becomes one worksheet with its title as the sheet name and
/// every cell written as a string, mirroring what the sheets sync writes.
///
/// # Arguments
/// * `tabs` - Layout produced by [`crate::workbook::build`]
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or an error
pub fn to_xlsx(tabs: &[Tab]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    for tab in tabs {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(&tab.title)?;

        for (r, row) in tab.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                let (Ok(r), Ok(c)) = (u32::try_from(r), u16::try_from(c)) else {
                    continue;
                };
                worksheet.write_string(r, c, cell)?;
            }
        }

        workbook.push_worksheet(worksheet);
    }

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook;

    fn sample() -> (Vec<Volunteer>, Vec<Event>) {
        let volunteers = vec![Volunteer {
            id: 3,
            name: "Ada \"Countess\"".into(),
            email: None,
            hour_goal: None,
        }];
        let events = vec![Event {
            id: 1,
            volunteer_id: 3,
            event: "Sort\ndonations".into(),
            location: "Hall".into(),
            hours: "1:30".into(),
            date: "2024-01-02".into(),
        }];
        (volunteers, events)
    }

    #[test]
    fn test_csv_header_and_escaping() {
        let (volunteers, events) = sample();
        let csv = to_csv(&volunteers, &events);
        let mut lines = csv.splitn(2, '\n');
        assert_eq!(
            lines.next().unwrap(),
            "Volunteer ID,Volunteer Name,Date,Event,Location,Hours"
        );
        assert_eq!(
            lines.next().unwrap(),
            "3,\"Ada \"\"Countess\"\"\",2024-01-02,\"Sort\ndonations\",Hall,1:30\n"
        );
    }

    #[test]
    fn test_csv_unknown_volunteer_has_blank_name() {
        let (_, events) = sample();
        let csv = to_csv(&[], &events);
        assert!(csv.lines().nth(1).unwrap().starts_with("3,,2024-01-02"));
    }

    #[test]
    fn test_xlsx_is_a_zip() {
        let (volunteers, events) = sample();
        let bytes = to_xlsx(&workbook::build(&volunteers, &events)).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}

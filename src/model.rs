//! Records and request payloads.
//!
//! All JSON shapes use camelCase field names, matching what the web client
//! sends and expects.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hours::Hours;

lazy_static! {
    static ref DATE_RE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// A tracked volunteer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volunteer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    /// Target hours as `H:MM`.
    pub hour_goal: Option<String>,
}

/// Payload for creating a volunteer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVolunteer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub hour_goal: Option<String>,
}

/// Partial update for a volunteer.
///
/// An empty string for `email` or `hour_goal` clears that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub hour_goal: Option<String>,
}

/// One logged event for a volunteer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub volunteer_id: i64,
    pub event: String,
    pub location: String,
    /// Duration as `H:MM`.
    pub hours: String,
    /// `YYYY-MM-DD`.
    pub date: String,
}

/// Payload for creating or replacing an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub volunteer_id: i64,
    pub event: String,
    pub location: String,
    pub hours: String,
    pub date: String,
}

/// A login account. Only the admin exists in practice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2 PHC string.
    pub password_hash: String,
}

/// Spreadsheet target and the service account used to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetsConfig {
    pub sheet_id: String,
    /// Raw service account key JSON.
    pub service_account: String,
}

/// The parts of a service account key the sync needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

/// Admin password change form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

fn required(value: &str, message: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::validation(message))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Turn `Some("")` into `None` and trim everything else.
fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_email(email: Option<&str>) -> Result<()> {
    match email {
        Some(email) if !EMAIL_RE.is_match(email) => Err(Error::validation("Invalid email address")),
        _ => Ok(()),
    }
}

fn check_hour_goal(goal: Option<&str>) -> Result<()> {
    match goal {
        Some(goal) => Hours::parse(goal).map(|_| ()),
        None => Ok(()),
    }
}

/// Check a `YYYY-MM-DD` string names a real calendar day.
///
/// # Errors
/// * Returns a validation error for the wrong shape or an impossible date
pub fn validate_date(date: &str) -> Result<()> {
    let invalid = || Error::validation("Date must be in YYYY-MM-DD format");
    if !DATE_RE.is_match(date) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| invalid())
}

impl NewVolunteer {
    /// Validate and return a trimmed copy.
    ///
    /// # Errors
    /// * Returns a validation error for an empty name, a malformed email or goal
    pub fn normalize(&self) -> Result<Self> {
        let name = required(&self.name, "Name is required")?;
        let email = optional(self.email.as_deref());
        let hour_goal = optional(self.hour_goal.as_deref());
        check_email(email.as_deref())?;
        check_hour_goal(hour_goal.as_deref())?;
        Ok(Self {
            name,
            email,
            hour_goal,
        })
    }
}

impl VolunteerPatch {
    /// Validate the patch and apply it to `volunteer` in place.
    ///
    /// # Errors
    /// * Returns a validation error if any supplied field is invalid
    pub fn apply(&self, volunteer: &mut Volunteer) -> Result<()> {
        let name = match &self.name {
            Some(name) => Some(required(name, "Name is required")?),
            None => None,
        };
        let email = self.email.as_deref().map(|e| optional(Some(e)));
        let hour_goal = self.hour_goal.as_deref().map(|g| optional(Some(g)));
        if let Some(email) = &email {
            check_email(email.as_deref())?;
        }
        if let Some(goal) = &hour_goal {
            check_hour_goal(goal.as_deref())?;
        }

        if let Some(name) = name {
            volunteer.name = name;
        }
        if let Some(email) = email {
            volunteer.email = email;
        }
        if let Some(goal) = hour_goal {
            volunteer.hour_goal = goal;
        }
        Ok(())
    }
}

impl NewEvent {
    /// Validate and return a trimmed copy.
    ///
    /// Does not check that the volunteer exists; callers with store access do.
    ///
    /// # Errors
    /// * Returns a validation error for empty text fields, bad hours or date
    pub fn normalize(&self) -> Result<Self> {
        let event = required(&self.event, "Event name is required")?;
        let location = required(&self.location, "Location is required")?;
        let hours = self.hours.trim().to_string();
        Hours::parse(&hours)?;
        let date = self.date.trim().to_string();
        validate_date(&date)?;
        Ok(Self {
            volunteer_id: self.volunteer_id,
            event,
            location,
            hours,
            date,
        })
    }
}

impl Event {
    /// Build a stored event from its id and payload.
    #[must_use]
    pub fn from_new(id: i64, new: NewEvent) -> Self {
        Self {
            id,
            volunteer_id: new.volunteer_id,
            event: new.event,
            location: new.location,
            hours: new.hours,
            date: new.date,
        }
    }
}

impl SheetsConfig {
    /// Validate both fields and decode the service account.
    ///
    /// # Errors
    /// * Returns a validation error for empty fields or unusable key JSON
    pub fn validate(&self) -> Result<ServiceAccount> {
        required(&self.sheet_id, "Sheet ID is required")?;
        required(&self.service_account, "Service account JSON is required")?;
        self.service_account_key()
            .map_err(|_| Error::validation("Invalid service account JSON format"))
    }

    /// Decode the service account key.
    ///
    /// # Errors
    /// * Returns [`Error::ServiceAccount`] when the JSON lacks required fields
    pub fn service_account_key(&self) -> Result<ServiceAccount> {
        serde_json::from_str(&self.service_account)
            .map_err(|e| Error::ServiceAccount(e.to_string()))
    }
}

impl PasswordChange {
    /// Check the form against the minimum length and confirmation rules.
    ///
    /// # Errors
    /// * Returns a validation error describing the first failed rule
    pub fn validate(&self, min_len: usize) -> Result<()> {
        if self.current_password.is_empty() {
            return Err(Error::validation("Current password is required"));
        }
        if self.new_password.chars().count() < min_len {
            return Err(Error::validation(format!(
                "New password must be at least {min_len} characters"
            )));
        }
        if self.new_password != self.confirm_password {
            return Err(Error::validation("Passwords don't match"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_event(hours: &str, date: &str) -> NewEvent {
        NewEvent {
            volunteer_id: 1,
            event: " Food drive ".into(),
            location: "Hall".into(),
            hours: hours.into(),
            date: date.into(),
        }
    }

    #[test]
    fn test_new_volunteer_trims_and_drops_empty() {
        let v = NewVolunteer {
            name: "  Ada ".into(),
            email: Some("".into()),
            hour_goal: Some(" 20:00 ".into()),
        }
        .normalize()
        .unwrap();
        assert_eq!(v.name, "Ada");
        assert_eq!(v.email, None);
        assert_eq!(v.hour_goal.as_deref(), Some("20:00"));
    }

    #[test]
    fn test_new_volunteer_rejects() {
        assert!(NewVolunteer::default().normalize().is_err());
        let bad_email = NewVolunteer {
            name: "Ada".into(),
            email: Some("not-an-email".into()),
            hour_goal: None,
        };
        assert!(bad_email.normalize().is_err());
        let bad_goal = NewVolunteer {
            name: "Ada".into(),
            email: None,
            hour_goal: Some("20".into()),
        };
        assert!(bad_goal.normalize().is_err());
    }

    #[test]
    fn test_patch_clears_and_sets() {
        let mut v = Volunteer {
            id: 1,
            name: "Ada".into(),
            email: Some("ada@example.org".into()),
            hour_goal: Some("10:00".into()),
        };
        let patch = VolunteerPatch {
            name: None,
            email: Some(String::new()),
            hour_goal: Some("12:30".into()),
        };
        patch.apply(&mut v).unwrap();
        assert_eq!(v.name, "Ada");
        assert_eq!(v.email, None);
        assert_eq!(v.hour_goal.as_deref(), Some("12:30"));
    }

    #[test]
    fn test_patch_is_all_or_nothing() {
        let mut v = Volunteer {
            id: 1,
            name: "Ada".into(),
            email: None,
            hour_goal: None,
        };
        let patch = VolunteerPatch {
            name: Some("Grace".into()),
            email: None,
            hour_goal: Some("bad".into()),
        };
        assert!(patch.apply(&mut v).is_err());
        assert_eq!(v.name, "Ada");
    }

    #[test]
    fn test_event_validation() {
        let ok = new_event("2:15", "2024-03-09").normalize().unwrap();
        assert_eq!(ok.event, "Food drive");
        assert!(new_event("2:75", "2024-03-09").normalize().is_err());
        assert!(new_event("2:15", "2024-3-9").normalize().is_err());
        assert!(new_event("2:15", "2024-02-30").normalize().is_err());
    }

    #[test]
    fn test_event_json_is_camel_case() {
        let e = Event::from_new(4, new_event("1:00", "2024-01-01"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["volunteerId"], 1);
        assert_eq!(json["id"], 4);
    }

    #[test]
    fn test_sheets_config_validation() {
        let cfg = SheetsConfig {
            sheet_id: "abc".into(),
            service_account: r#"{"client_email":"svc@x.iam","private_key":"pem"}"#.into(),
        };
        assert_eq!(cfg.validate().unwrap().client_email, "svc@x.iam");

        let broken = SheetsConfig {
            sheet_id: "abc".into(),
            service_account: "{}".into(),
        };
        assert!(matches!(broken.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_password_change_rules() {
        let form = |cur: &str, new: &str, confirm: &str| PasswordChange {
            current_password: cur.into(),
            new_password: new.into(),
            confirm_password: confirm.into(),
        };
        assert!(form("old", "secret1", "secret1").validate(6).is_ok());
        assert!(form("", "secret1", "secret1").validate(6).is_err());
        assert!(form("old", "short", "short").validate(6).is_err());
        let err = form("old", "secret1", "secret2").validate(6).unwrap_err();
        assert_eq!(err.to_string(), "Passwords don't match");
    }
}

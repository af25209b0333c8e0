//! Record storage.
//!
//! [`Storage`] is the data-store seam used by every handler. [`MemStorage`]
//! keeps one [`Snapshot`] behind a lock and, when given a path, rewrites it
//! to disk after each mutation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Event, NewEvent, NewVolunteer, User, Volunteer, VolunteerPatch};
use crate::saving;

/// Setting key: RFC 3339 time of the last successful sheets sync.
pub const LAST_SYNC_TIME: &str = "lastSyncTime";
/// Setting key: `"true"` when the background sync should push.
pub const AUTO_SYNC_ENABLED: &str = "autoSyncEnabled";
/// Setting key: JSON encoded [`crate::model::SheetsConfig`].
pub const SHEETS_CONFIG: &str = "sheetsConfig";

/// Which id space a client temp id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    Volunteer,
    Event,
}

/// Data-store operations.
///
/// Lists come back in display order: volunteers by name (case-insensitive),
/// events newest date first with ties broken by newest id.
pub trait Storage: Send + Sync {
    // User methods
    fn user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn create_user(&self, username: &str, password_hash: &str) -> Result<User>;
    fn set_user_password(&self, id: i64, password_hash: &str) -> Result<bool>;

    // Volunteer methods
    fn volunteers(&self) -> Result<Vec<Volunteer>>;
    fn volunteer(&self, id: i64) -> Result<Option<Volunteer>>;
    /// Insert an already validated volunteer.
    fn create_volunteer(&self, volunteer: NewVolunteer) -> Result<Volunteer>;
    /// Validate and apply `patch`; `None` when the volunteer does not exist.
    fn update_volunteer(&self, id: i64, patch: &VolunteerPatch) -> Result<Option<Volunteer>>;

    // Event methods
    fn events(&self) -> Result<Vec<Event>>;
    fn events_for(&self, volunteer_id: i64) -> Result<Vec<Event>>;
    fn event(&self, id: i64) -> Result<Option<Event>>;
    /// Insert an already validated event.
    fn create_event(&self, event: NewEvent) -> Result<Event>;
    fn update_event(&self, id: i64, event: NewEvent) -> Result<Option<Event>>;
    fn delete_event(&self, id: i64) -> Result<bool>;

    // Settings methods
    fn setting(&self, key: &str) -> Result<Option<String>>;
    fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    // Offline replay bookkeeping
    /// Mark `op_id` as applied. Returns `false` if it was already claimed.
    fn try_claim_operation(&self, op_id: &str) -> Result<bool>;
    fn release_operation(&self, op_id: &str) -> Result<()>;
    fn resolve_temp_id(&self, kind: RecordKind, temp_id: i64) -> Result<Option<i64>>;
    fn bind_temp_id(&self, kind: RecordKind, temp_id: i64, id: i64) -> Result<()>;
}

/// Everything the store persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub users: BTreeMap<i64, User>,
    pub volunteers: BTreeMap<i64, Volunteer>,
    pub events: BTreeMap<i64, Event>,
    pub settings: BTreeMap<String, String>,
    pub applied_operations: BTreeSet<String>,
    pub temp_ids: BTreeMap<(RecordKind, i64), i64>,
    pub next_user_id: i64,
    pub next_volunteer_id: i64,
    pub next_event_id: i64,
}

impl Snapshot {
    fn next_id(counter: &mut i64) -> i64 {
        if *counter < 1 {
            *counter = 1;
        }
        let id = *counter;
        *counter += 1;
        id
    }
}

/// In-memory store with optional snapshot persistence.
#[derive(Debug, Default)]
pub struct MemStorage {
    state: RwLock<Snapshot>,
    path: Option<PathBuf>,
}

fn sort_volunteers(volunteers: &mut [Volunteer]) {
    volunteers.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
}

impl MemStorage {
    /// A store that lives only as long as the process.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by the snapshot file at `path`.
    ///
    /// A missing file starts an empty store; the file is created on the first
    /// write.
    ///
    /// # Errors
    /// * Returns an error if the file exists but cannot be read or decoded
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = saving::load_snapshot(&path)?.unwrap_or_default();
        tracing::info!(
            path = %path.display(),
            volunteers = snapshot.volunteers.len(),
            events = snapshot.events.len(),
            "opened data file"
        );
        Ok(Self {
            state: RwLock::new(snapshot),
            path: Some(path),
        })
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run `f` under the write lock and persist if it reports a change.
    fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> (T, bool)) -> Result<T> {
        let mut state = self.write();
        let (value, changed) = f(&mut state);
        if changed {
            if let Some(path) = &self.path {
                saving::save_snapshot(&state, path)?;
            }
        }
        Ok(value)
    }
}

impl Storage for MemStorage {
    fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        self.mutate(|s| {
            let id = Snapshot::next_id(&mut s.next_user_id);
            let user = User {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            };
            s.users.insert(id, user.clone());
            (user, true)
        })
    }

    fn set_user_password(&self, id: i64, password_hash: &str) -> Result<bool> {
        self.mutate(|s| match s.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                (true, true)
            }
            None => (false, false),
        })
    }

    fn volunteers(&self) -> Result<Vec<Volunteer>> {
        let mut volunteers: Vec<Volunteer> = self.read().volunteers.values().cloned().collect();
        sort_volunteers(&mut volunteers);
        Ok(volunteers)
    }

    fn volunteer(&self, id: i64) -> Result<Option<Volunteer>> {
        Ok(self.read().volunteers.get(&id).cloned())
    }

    fn create_volunteer(&self, volunteer: NewVolunteer) -> Result<Volunteer> {
        self.mutate(|s| {
            let id = Snapshot::next_id(&mut s.next_volunteer_id);
            let volunteer = Volunteer {
                id,
                name: volunteer.name,
                email: volunteer.email,
                hour_goal: volunteer.hour_goal,
            };
            s.volunteers.insert(id, volunteer.clone());
            (volunteer, true)
        })
    }

    fn update_volunteer(&self, id: i64, patch: &VolunteerPatch) -> Result<Option<Volunteer>> {
        let mut state = self.write();
        let Some(existing) = state.volunteers.get(&id) else {
            return Ok(None);
        };
        let mut updated = existing.clone();
        patch.apply(&mut updated)?;
        state.volunteers.insert(id, updated.clone());
        if let Some(path) = &self.path {
            saving::save_snapshot(&state, path)?;
        }
        Ok(Some(updated))
    }

    fn events(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self.read().events.values().cloned().collect();
        sort_events(&mut events);
        Ok(events)
    }

    fn events_for(&self, volunteer_id: i64) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .read()
            .events
            .values()
            .filter(|e| e.volunteer_id == volunteer_id)
            .cloned()
            .collect();
        sort_events(&mut events);
        Ok(events)
    }

    fn event(&self, id: i64) -> Result<Option<Event>> {
        Ok(self.read().events.get(&id).cloned())
    }

    fn create_event(&self, event: NewEvent) -> Result<Event> {
        self.mutate(|s| {
            let id = Snapshot::next_id(&mut s.next_event_id);
            let event = Event::from_new(id, event);
            s.events.insert(id, event.clone());
            (event, true)
        })
    }

    fn update_event(&self, id: i64, event: NewEvent) -> Result<Option<Event>> {
        self.mutate(|s| match s.events.get_mut(&id) {
            Some(existing) => {
                *existing = Event::from_new(id, event);
                (Some(existing.clone()), true)
            }
            None => (None, false),
        })
    }

    fn delete_event(&self, id: i64) -> Result<bool> {
        self.mutate(|s| {
            let removed = s.events.remove(&id).is_some();
            (removed, removed)
        })
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read().settings.get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(|s| {
            s.settings.insert(key.to_string(), value.to_string());
            ((), true)
        })
    }

    fn try_claim_operation(&self, op_id: &str) -> Result<bool> {
        self.mutate(|s| {
            let fresh = s.applied_operations.insert(op_id.to_string());
            (fresh, fresh)
        })
    }

    fn release_operation(&self, op_id: &str) -> Result<()> {
        self.mutate(|s| {
            let removed = s.applied_operations.remove(op_id);
            ((), removed)
        })
    }

    fn resolve_temp_id(&self, kind: RecordKind, temp_id: i64) -> Result<Option<i64>> {
        Ok(self.read().temp_ids.get(&(kind, temp_id)).copied())
    }

    fn bind_temp_id(&self, kind: RecordKind, temp_id: i64, id: i64) -> Result<()> {
        self.mutate(|s| {
            s.temp_ids.insert((kind, temp_id), id);
            ((), true)
        })
    }
}

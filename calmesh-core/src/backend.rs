//! Backend-neutral calendar types and the backend trait.
//!
//! The engine works exclusively against [`CalendarBackend`]; concrete
//! backends (the local JSON store, the in-memory mock) convert their
//! storage into these types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CalMeshResult;

/// A writable calendar with a stable identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub name: String,
}

/// An event attendee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub status: ParticipationStatus,
}

/// Participation status for an attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipationStatus {
    Accepted,
    Declined,
    Tentative,
    Pending,
    Unknown,
}

impl ParticipationStatus {
    /// Display form used in the sync metadata block.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Declined => "Declined",
            Self::Tentative => "Tentative",
            Self::Pending => "Pending",
            Self::Unknown => "Unknown",
        }
    }
}

/// A calendar event (backend-neutral).
///
/// `id` is empty until the backend assigns one on first save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub attendees: Vec<Attendee>,
    pub last_modified: DateTime<Utc>,
}

impl Event {
    /// An uncommitted event bound to a calendar.
    pub fn new(calendar_id: &str) -> Event {
        Event {
            id: String::new(),
            calendar_id: calendar_id.to_string(),
            title: String::new(),
            start: DateTime::UNIX_EPOCH,
            end: DateTime::UNIX_EPOCH,
            all_day: false,
            location: None,
            url: None,
            notes: None,
            attendees: Vec::new(),
            last_modified: DateTime::UNIX_EPOCH,
        }
    }
}

/// Capability shim over a calendar store.
///
/// Only `request_access` is async; everything else is synchronous because
/// the engine is a single-threaded batch reconciler.
#[async_trait]
pub trait CalendarBackend {
    /// Ask the user (or platform) for calendar access. `false` means denied.
    async fn request_access(&mut self) -> CalMeshResult<bool>;

    /// All writable calendars, with identifiers stable across runs.
    fn calendars(&self) -> CalMeshResult<Vec<Calendar>>;

    /// Events whose start falls in `[from, to)`, across the given calendars.
    /// Recurring events are already expanded into individual occurrences.
    fn events_between(
        &self,
        calendar_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalMeshResult<Vec<Event>>;

    /// The event with this id, if it still exists.
    fn event_by_id(&self, event_id: &str) -> CalMeshResult<Option<Event>>;

    /// Persist an event. Assigns `id` on first save, bumps `last_modified`,
    /// and returns the stored version.
    fn save_event(&mut self, event: &Event) -> CalMeshResult<Event>;

    /// Delete an event. Fails loudly on backend error.
    fn remove_event(&mut self, event_id: &str) -> CalMeshResult<()>;
}

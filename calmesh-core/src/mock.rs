//! Deterministic in-memory backend for tests.
//!
//! Sequential event ids, a settable clock, per-calendar save-failure
//! injection, and write counters so tests can assert that a run performed
//! no backend writes.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::backend::{Calendar, CalendarBackend, Event};
use crate::error::{CalMeshError, CalMeshResult};

pub struct MockBackend {
    pub grant_access: bool,
    now: DateTime<Utc>,
    next_id: u64,
    calendars: Vec<Calendar>,
    events: BTreeMap<String, Event>,
    failing_calendars: HashSet<String>,
    saves: usize,
    removes: usize,
    saved_ids: Vec<String>,
}

impl MockBackend {
    pub fn new() -> MockBackend {
        MockBackend {
            grant_access: true,
            now: DateTime::UNIX_EPOCH,
            next_id: 0,
            calendars: Vec::new(),
            events: BTreeMap::new(),
            failing_calendars: HashSet::new(),
            saves: 0,
            removes: 0,
            saved_ids: Vec::new(),
        }
    }

    /// What `save_event` stamps onto `last_modified`.
    pub fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = now;
    }

    pub fn add_calendar(&mut self, id: &str, name: &str) {
        self.calendars.push(Calendar {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    /// Plant an event as if the user had created it in another app.
    /// Not counted as an engine write.
    pub fn seed_event(
        &mut self,
        calendar_id: &str,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Event {
        self.next_id += 1;
        let mut event = Event::new(calendar_id);
        event.id = format!("evt-{}", self.next_id);
        event.title = title.to_string();
        event.start = start;
        event.end = end;
        event.last_modified = self.now;
        self.events.insert(event.id.clone(), event.clone());
        event
    }

    /// Apply a user edit and bump the event's modification time.
    pub fn edit_event(&mut self, event_id: &str, edit: impl FnOnce(&mut Event)) {
        if let Some(event) = self.events.get_mut(event_id) {
            edit(event);
            event.last_modified = self.now;
        }
    }

    /// Simulate an external deletion. Not counted as an engine write.
    pub fn delete_event_externally(&mut self, event_id: &str) {
        self.events.remove(event_id);
    }

    pub fn fail_saves_in(&mut self, calendar_id: &str) {
        self.failing_calendars.insert(calendar_id.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failing_calendars.clear();
    }

    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.get(event_id)
    }

    pub fn events_in(&self, calendar_id: &str) -> Vec<&Event> {
        self.events
            .values()
            .filter(|e| e.calendar_id == calendar_id)
            .collect()
    }

    /// Engine-initiated saves plus removes.
    pub fn write_count(&self) -> usize {
        self.saves + self.removes
    }

    /// Ids passed to `save_event`, in order. Empty ids show as the id the
    /// backend assigned.
    pub fn saved_ids(&self) -> &[String] {
        &self.saved_ids
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarBackend for MockBackend {
    async fn request_access(&mut self) -> CalMeshResult<bool> {
        Ok(self.grant_access)
    }

    fn calendars(&self) -> CalMeshResult<Vec<Calendar>> {
        Ok(self.calendars.clone())
    }

    fn events_between(
        &self,
        calendar_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalMeshResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .values()
            .filter(|e| calendar_ids.contains(&e.calendar_id))
            .filter(|e| e.start >= from && e.start < to)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    fn event_by_id(&self, event_id: &str) -> CalMeshResult<Option<Event>> {
        Ok(self.events.get(event_id).cloned())
    }

    fn save_event(&mut self, event: &Event) -> CalMeshResult<Event> {
        if self.failing_calendars.contains(&event.calendar_id) {
            return Err(CalMeshError::Backend(format!(
                "Injected save failure for calendar {}",
                event.calendar_id
            )));
        }

        let mut stored = event.clone();
        if stored.id.is_empty() {
            self.next_id += 1;
            stored.id = format!("evt-{}", self.next_id);
        }
        stored.last_modified = self.now;
        self.events.insert(stored.id.clone(), stored.clone());
        self.saves += 1;
        self.saved_ids.push(stored.id.clone());
        Ok(stored)
    }

    fn remove_event(&mut self, event_id: &str) -> CalMeshResult<()> {
        if self.events.remove(event_id).is_none() {
            return Err(CalMeshError::Backend(format!(
                "No such event: {}",
                event_id
            )));
        }
        self.removes += 1;
        Ok(())
    }
}

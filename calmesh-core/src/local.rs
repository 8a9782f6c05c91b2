//! Local JSON-file calendar backend.
//!
//! One file per calendar under `~/.calendarsync/calendars/`, so the CLI
//! runs end-to-end without a platform calendar API. Event ids are minted
//! as `local-<uuid>`.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{Calendar, CalendarBackend, Event};
use crate::error::{CalMeshError, CalMeshResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCalendar {
    id: String,
    name: String,
    events: Vec<Event>,
}

pub struct LocalBackend {
    dir: PathBuf,
    calendars: Vec<StoredCalendar>,
}

impl LocalBackend {
    /// Scan `dir` for calendar files, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> CalMeshResult<LocalBackend> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut calendars = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let contents = std::fs::read_to_string(&path)?;
                let calendar: StoredCalendar = serde_json::from_str(&contents)
                    .map_err(|e| CalMeshError::Backend(format!("{}: {}", path.display(), e)))?;
                calendars.push(calendar);
            }
        }
        calendars.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(LocalBackend { dir, calendars })
    }

    pub fn add_calendar(&mut self, name: &str) -> CalMeshResult<Calendar> {
        let calendar = StoredCalendar {
            id: format!("cal-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            events: Vec::new(),
        };
        self.write_calendar(&calendar)?;
        let summary = Calendar {
            id: calendar.id.clone(),
            name: calendar.name.clone(),
        };
        self.calendars.push(calendar);
        Ok(summary)
    }

    fn write_calendar(&self, calendar: &StoredCalendar) -> CalMeshResult<()> {
        let path = self.dir.join(format!("{}.json", calendar.id));
        let contents = serde_json::to_string_pretty(calendar)?;
        let temp = self.dir.join(format!("{}.json.tmp", calendar.id));
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    fn calendar_index(&self, calendar_id: &str) -> CalMeshResult<usize> {
        self.calendars
            .iter()
            .position(|c| c.id == calendar_id)
            .ok_or_else(|| CalMeshError::CalendarNotFound(calendar_id.to_string()))
    }
}

#[async_trait]
impl CalendarBackend for LocalBackend {
    async fn request_access(&mut self) -> CalMeshResult<bool> {
        // Local files need no grant.
        Ok(true)
    }

    fn calendars(&self) -> CalMeshResult<Vec<Calendar>> {
        Ok(self
            .calendars
            .iter()
            .map(|c| Calendar {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect())
    }

    fn events_between(
        &self,
        calendar_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalMeshResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .calendars
            .iter()
            .filter(|c| calendar_ids.contains(&c.id))
            .flat_map(|c| c.events.iter())
            .filter(|e| e.start >= from && e.start < to)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    fn event_by_id(&self, event_id: &str) -> CalMeshResult<Option<Event>> {
        Ok(self
            .calendars
            .iter()
            .flat_map(|c| c.events.iter())
            .find(|e| e.id == event_id)
            .cloned())
    }

    fn save_event(&mut self, event: &Event) -> CalMeshResult<Event> {
        let index = self.calendar_index(&event.calendar_id)?;

        let mut stored = event.clone();
        if stored.id.is_empty() {
            stored.id = format!("local-{}", uuid::Uuid::new_v4());
        }
        stored.last_modified = Utc::now();

        let calendar = &mut self.calendars[index];
        match calendar.events.iter_mut().find(|e| e.id == stored.id) {
            Some(existing) => *existing = stored.clone(),
            None => calendar.events.push(stored.clone()),
        }

        let snapshot = calendar.clone();
        self.write_calendar(&snapshot)?;
        Ok(stored)
    }

    fn remove_event(&mut self, event_id: &str) -> CalMeshResult<()> {
        let index = self
            .calendars
            .iter()
            .position(|c| c.events.iter().any(|e| e.id == event_id))
            .ok_or_else(|| CalMeshError::Backend(format!("No such event: {}", event_id)))?;

        self.calendars[index].events.retain(|e| e.id != event_id);
        let snapshot = self.calendars[index].clone();
        self.write_calendar(&snapshot)
    }
}

//! Durable mesh state: sync groups, event references, and the JSON store.
//!
//! The on-disk document uses camelCase keys and float epoch seconds so it
//! stays readable by earlier versions of the state file. `startDate` is
//! nullable because old state files did not record it.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CalMeshResult;

pub const STATE_FILE: &str = "calendar_state.json";
pub const BACKUP_DIR: &str = "backups";

/// One tracked event in one calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub calendar_id: String,
    pub event_id: String,
    /// Epoch seconds of the event's last observed modification.
    pub last_modified: f64,
    /// Epoch seconds of the event's start; null in pre-upgrade state files.
    #[serde(default)]
    pub start_date: Option<f64>,
    pub is_deleted: bool,
}

/// One logical event across the mesh: at most one reference per calendar,
/// at most one of them designated the authoritative source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncGroup {
    pub id: String,
    pub source_calendar_id: Option<String>,
    pub source_event_id: Option<String>,
    pub events: Vec<EventRef>,
}

impl SyncGroup {
    pub fn is_source(&self, calendar_id: &str, event_id: &str) -> bool {
        self.source_calendar_id.as_deref() == Some(calendar_id)
            && self.source_event_id.as_deref() == Some(event_id)
    }

    pub fn source_ref(&self) -> Option<&EventRef> {
        let calendar_id = self.source_calendar_id.as_deref()?;
        let event_id = self.source_event_id.as_deref()?;
        self.events
            .iter()
            .find(|r| r.calendar_id == calendar_id && r.event_id == event_id)
    }
}

/// The whole mesh document.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshState {
    pub groups: Vec<SyncGroup>,
}

impl MeshState {
    /// Linear scan; state sizes are small (thousands of events).
    pub fn find_by_event_id(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Option<(&SyncGroup, &EventRef)> {
        self.groups.iter().find_map(|group| {
            group
                .events
                .iter()
                .find(|r| r.calendar_id == calendar_id && r.event_id == event_id)
                .map(|r| (group, r))
        })
    }

    pub fn group_by_id(&self, group_id: &str) -> Option<&SyncGroup> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// Update the pair's timestamps and clear any tombstone if it is
    /// tracked anywhere; otherwise append a new reference to the named
    /// group, creating the group if needed.
    pub fn upsert_reference(
        &mut self,
        calendar_id: &str,
        event_id: &str,
        last_modified: f64,
        start_date: Option<f64>,
        group_id: &str,
    ) {
        for group in &mut self.groups {
            if let Some(reference) = group
                .events
                .iter_mut()
                .find(|r| r.calendar_id == calendar_id && r.event_id == event_id)
            {
                reference.last_modified = last_modified;
                reference.start_date = start_date;
                reference.is_deleted = false;
                return;
            }
        }

        let reference = EventRef {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.to_string(),
            last_modified,
            start_date,
            is_deleted: false,
        };

        match self.groups.iter_mut().find(|g| g.id == group_id) {
            Some(group) => group.events.push(reference),
            None => self.groups.push(SyncGroup {
                id: group_id.to_string(),
                source_calendar_id: None,
                source_event_id: None,
                events: vec![reference],
            }),
        }
    }

    pub fn tombstone(&mut self, calendar_id: &str, event_id: &str) {
        for group in &mut self.groups {
            if let Some(reference) = group
                .events
                .iter_mut()
                .find(|r| r.calendar_id == calendar_id && r.event_id == event_id)
            {
                reference.is_deleted = true;
                return;
            }
        }
    }

    pub fn set_source(&mut self, group_id: &str, calendar_id: &str, event_id: &str) {
        if let Some(group) = self.groups.iter_mut().find(|g| g.id == group_id) {
            group.source_calendar_id = Some(calendar_id.to_string());
            group.source_event_id = Some(event_id.to_string());
        }
    }

    /// Fold the loser's references into the winner and drop the loser.
    /// The winner keeps its source pointer; the loser's is discarded.
    pub fn merge_groups(&mut self, loser_id: &str, winner_id: &str) {
        let Some(position) = self.groups.iter().position(|g| g.id == loser_id) else {
            return;
        };
        let loser = self.groups.remove(position);
        match self.groups.iter_mut().find(|g| g.id == winner_id) {
            Some(winner) => winner.events.extend(loser.events),
            // Winner vanished; keep the loser rather than losing references.
            None => self.groups.push(loser),
        }
    }

    /// Every non-deleted reference whose calendar is in the selection.
    pub fn all_references(&self, calendar_ids: &HashSet<String>) -> Vec<EventRef> {
        self.groups
            .iter()
            .flat_map(|g| g.events.iter())
            .filter(|r| !r.is_deleted && calendar_ids.contains(&r.calendar_id))
            .cloned()
            .collect()
    }

    /// Drop references that started before `horizon` (epoch seconds), then
    /// drop groups left empty. References with no recorded start survive.
    pub fn prune(&mut self, horizon: f64) {
        for group in &mut self.groups {
            group
                .events
                .retain(|r| r.start_date.map_or(true, |start| start >= horizon));
        }
        self.groups.retain(|g| !g.events.is_empty());
    }
}

/// Filesystem home of the mesh state: load, quarantine, backup, save.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> StateStore {
        StateStore { dir: dir.into() }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }

    /// Read the state file. A missing file is an empty state; a parse
    /// failure surfaces as an error so the caller can quarantine the file.
    pub fn load(&self) -> CalMeshResult<MeshState> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(MeshState::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Rename a corrupt state file aside so the next save starts fresh.
    pub fn quarantine(&self, epoch: i64) -> CalMeshResult<PathBuf> {
        let target = self.dir.join(format!("{}.corrupt.{}", STATE_FILE, epoch));
        std::fs::rename(self.state_path(), &target)?;
        Ok(target)
    }

    /// Copy the prior file into `backups/`, then write the new document
    /// via temp file + rename so a crash mid-write cannot corrupt it.
    pub fn save(&self, state: &MeshState, epoch: i64) -> CalMeshResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.state_path();

        if path.exists() {
            let backups = self.backup_dir();
            std::fs::create_dir_all(&backups)?;
            std::fs::copy(&path, backups.join(format!("state_backup_{}.json", epoch)))?;
        }

        let contents = serde_json::to_string_pretty(state)?;
        let temp = self.dir.join(format!("{}.tmp", STATE_FILE));
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }
}

//! Configuration at `~/.calendarsync/config.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CalMeshError, CalMeshResult};

pub const SYNC_DIR_NAME: &str = ".calendarsync";
pub const CONFIG_FILE: &str = "config.json";
pub const LOG_FILE: &str = "sync_log.jsonl";
pub const CALENDARS_DIR: &str = "calendars";

/// The persisted calendar selection. Its presence switches the CLI from
/// interactive to headless mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub selected_calendar_ids: Vec<String>,
}

impl SyncConfig {
    /// `~/.calendarsync`, home of the state file, config, backups and log.
    pub fn sync_dir() -> CalMeshResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CalMeshError::Config("Could not determine home directory".into()))?;
        Ok(home.join(SYNC_DIR_NAME))
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// `None` when no configuration exists yet (first run).
    pub fn load(path: &Path) -> CalMeshResult<Option<SyncConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self, path: &Path) -> CalMeshResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }
}

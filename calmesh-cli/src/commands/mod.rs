pub mod calendars;
pub mod select;
pub mod status;
pub mod sync;

use anyhow::Result;
use calmesh_core::config::{SyncConfig, CALENDARS_DIR};
use calmesh_core::local::LocalBackend;
use std::path::PathBuf;

/// The `~/.calendarsync` directory plus a local backend opened inside it.
pub fn open_backend() -> Result<(PathBuf, LocalBackend)> {
    let dir = SyncConfig::sync_dir()?;
    let backend = LocalBackend::open(dir.join(CALENDARS_DIR))?;
    Ok((dir, backend))
}

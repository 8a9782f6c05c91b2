use anyhow::Result;
use owo_colors::OwoColorize;

use calmesh_core::backend::CalendarBackend;
use calmesh_core::config::{SyncConfig, LOG_FILE};
use calmesh_core::state::StateStore;

pub async fn run() -> Result<()> {
    let (dir, backend) = super::open_backend()?;

    println!("calmesh status\n");

    let config_path = SyncConfig::path_in(&dir);
    match SyncConfig::load(&config_path)? {
        Some(config) => {
            println!("Config: {}", config_path.display());
            let calendars = backend.calendars()?;
            for id in &config.selected_calendar_ids {
                match calendars.iter().find(|c| &c.id == id) {
                    Some(calendar) => println!("  - {}", calendar.name),
                    None => println!("  - {} {}", id, "(missing)".red()),
                }
            }
        }
        None => println!(
            "Config: not found (expected at {}), next sync runs interactively",
            config_path.display()
        ),
    }

    println!();

    let store = StateStore::new(&dir);
    match store.load() {
        Ok(state) => {
            let references: usize = state.groups.iter().map(|g| g.events.len()).sum();
            let tombstones: usize = state
                .groups
                .iter()
                .flat_map(|g| g.events.iter())
                .filter(|r| r.is_deleted)
                .count();
            println!(
                "State: {} groups, {} references ({} tombstoned)",
                state.groups.len(),
                references,
                tombstones
            );
        }
        Err(e) => println!("State: {} ({})", "unreadable".red(), e),
    }

    let backups = store.backup_dir();
    let backup_count = std::fs::read_dir(&backups)
        .map(|entries| entries.count())
        .unwrap_or(0);
    println!("Backups: {} in {}", backup_count, backups.display());
    println!("Log: {}", dir.join(LOG_FILE).display());

    Ok(())
}

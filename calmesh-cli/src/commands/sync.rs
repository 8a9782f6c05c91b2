use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use serde_json::json;

use calmesh_core::backend::{Calendar, CalendarBackend};
use calmesh_core::config::{SyncConfig, LOG_FILE};
use calmesh_core::engine::SyncEngine;
use calmesh_core::logger::Logger;
use calmesh_core::state::StateStore;
use calmesh_core::CalMeshError;

pub async fn run() -> Result<()> {
    let (dir, mut backend) = super::open_backend()?;
    let logger = Logger::new(dir.join(LOG_FILE));

    if !backend.request_access().await? {
        logger.error("authorization_denied", json!({}));
        return Err(CalMeshError::AuthorizationDenied.into());
    }

    let calendars = backend.calendars()?;
    let config_path = SyncConfig::path_in(&dir);

    let selected = match SyncConfig::load(&config_path)? {
        Some(config) => {
            // Headless: reuse the stored selection, dropping calendars
            // that no longer exist.
            let selected: Vec<Calendar> = calendars
                .iter()
                .filter(|c| config.selected_calendar_ids.contains(&c.id))
                .cloned()
                .collect();
            if selected.is_empty() {
                logger.error(
                    "config_invalid",
                    json!({ "selectedCalendarIds": config.selected_calendar_ids }),
                );
                bail!(
                    "None of the configured calendars exist anymore. \
                     Run `calmesh select` to pick new ones."
                );
            }
            selected
        }
        None => super::select::pick_calendars(&calendars, &config_path)?,
    };

    println!(
        "Syncing {} calendars: {}\n",
        selected.len(),
        selected
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let store = StateStore::new(&dir);
    let mut engine = SyncEngine::new(backend, store, logger, selected);
    let stats = engine.run().context("Sync run failed")?;

    if stats.has_changes() {
        println!(
            "{} created, {} updated, {} adopted",
            stats.created.to_string().green(),
            stats.updated.to_string().green(),
            stats.adopted.to_string().green(),
        );
        if stats.resurrected > 0 || stats.removed > 0 || stats.merged > 0 {
            println!(
                "{} resurrected, {} removed, {} groups merged",
                stats.resurrected.to_string().yellow(),
                stats.removed.to_string().red(),
                stats.merged.to_string().yellow(),
            );
        }
    } else {
        println!("{}", "Everything up to date.".dimmed());
    }

    Ok(())
}

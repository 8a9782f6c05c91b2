use std::path::Path;

use anyhow::{bail, Result};
use dialoguer::{Confirm, MultiSelect};
use owo_colors::OwoColorize;
use serde_json::json;

use calmesh_core::backend::{Calendar, CalendarBackend};
use calmesh_core::config::{SyncConfig, LOG_FILE};
use calmesh_core::logger::Logger;
use calmesh_core::CalMeshError;

pub async fn run() -> Result<()> {
    let (dir, mut backend) = super::open_backend()?;

    if !backend.request_access().await? {
        let logger = Logger::new(dir.join(LOG_FILE));
        logger.error("authorization_denied", json!({}));
        return Err(CalMeshError::AuthorizationDenied.into());
    }

    let calendars = backend.calendars()?;
    let selected = pick_calendars(&calendars, &SyncConfig::path_in(&dir))?;

    println!(
        "\nSelected: {}",
        selected
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

/// Interactive calendar picker. A mesh needs at least two calendars, so
/// smaller selections are rejected and re-prompted.
pub fn pick_calendars(calendars: &[Calendar], config_path: &Path) -> Result<Vec<Calendar>> {
    if calendars.len() < 2 {
        bail!(
            "A mesh needs at least two calendars; found {}. \
             Add more with `calmesh calendars add <name>`.",
            calendars.len()
        );
    }

    let items: Vec<&str> = calendars.iter().map(|c| c.name.as_str()).collect();

    let selections = loop {
        let picked = MultiSelect::new()
            .with_prompt("Select calendars to keep in sync (space to toggle, enter to confirm)")
            .items(&items)
            .interact()?;
        if picked.len() >= 2 {
            break picked;
        }
        println!("{}", "Pick at least two calendars.".yellow());
    };

    let selected: Vec<Calendar> = selections.iter().map(|&i| calendars[i].clone()).collect();

    let persist = Confirm::new()
        .with_prompt("Save this selection for headless runs?")
        .default(true)
        .interact()?;
    if persist {
        let config = SyncConfig {
            selected_calendar_ids: selected.iter().map(|c| c.id.clone()).collect(),
        };
        config.save(config_path)?;
        println!("Selection saved to {}", config_path.display().dimmed());
    }

    Ok(selected)
}

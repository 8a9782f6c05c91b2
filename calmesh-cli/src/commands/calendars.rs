use anyhow::Result;
use owo_colors::OwoColorize;

use calmesh_core::backend::CalendarBackend;

pub async fn list() -> Result<()> {
    let (_, backend) = super::open_backend()?;
    let calendars = backend.calendars()?;

    if calendars.is_empty() {
        println!("No calendars yet. Create one with `calmesh calendars add <name>`.");
        return Ok(());
    }

    for calendar in calendars {
        println!("  {} {}", calendar.name, format!("({})", calendar.id).dimmed());
    }
    Ok(())
}

pub async fn add(name: &str) -> Result<()> {
    let (_, mut backend) = super::open_backend()?;
    let calendar = backend.add_calendar(name)?;
    println!("Created calendar {} {}", calendar.name, format!("({})", calendar.id).dimmed());
    Ok(())
}

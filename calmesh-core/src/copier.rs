//! Field projection from a source event onto a copy.

use crate::backend::Event;

/// Heading that introduces the metadata block in a copy's notes.
pub const METADATA_SEPARATOR: &str = "--- Sync Metadata ---";

/// Overwrite the observable fields of `target` with `source`'s.
///
/// Attendees are not copied; backends silently drop them on foreign
/// events, so they are surfaced in the notes block instead. The result
/// depends only on `source` and `source_calendar_name`, so reapplying the
/// projection is byte-stable.
pub fn copy_fields(source: &Event, source_calendar_name: &str, target: &mut Event) {
    target.title = source.title.clone();
    target.start = source.start;
    target.end = source.end;
    target.all_day = source.all_day;
    target.location = source.location.clone();
    target.url = source.url.clone();
    target.notes = Some(compose_notes(source, source_calendar_name));
}

/// Source notes, two blank lines, then the metadata block.
fn compose_notes(source: &Event, source_calendar_name: &str) -> String {
    let mut block = format!("{}\nSource: {}", METADATA_SEPARATOR, source_calendar_name);

    if !source.attendees.is_empty() {
        block.push_str("\nParticipants:");
        for attendee in &source.attendees {
            block.push_str(&format!("\n- {} ({})", attendee.name, attendee.status.as_str()));
        }
    }

    match source.notes.as_deref().filter(|notes| !notes.is_empty()) {
        Some(notes) => format!("{}\n\n\n{}", notes, block),
        None => block,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Attendee, ParticipationStatus};
    use chrono::{TimeZone, Utc};

    fn source_event() -> Event {
        let mut event = Event::new("cal-a");
        event.id = "evt-1".to_string();
        event.title = "Lunch".to_string();
        event.start = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        event.end = Utc.with_ymd_and_hms(2025, 1, 15, 13, 0, 0).unwrap();
        event.location = Some("Cafe".to_string());
        event
    }

    #[test]
    fn copies_fields_and_appends_metadata_block() {
        let source = source_event();
        let mut target = Event::new("cal-b");

        copy_fields(&source, "Work", &mut target);

        assert_eq!(target.title, "Lunch");
        assert_eq!(target.start, source.start);
        assert_eq!(target.end, source.end);
        assert_eq!(target.location.as_deref(), Some("Cafe"));
        assert_eq!(
            target.notes.as_deref(),
            Some("--- Sync Metadata ---\nSource: Work")
        );
    }

    #[test]
    fn source_notes_are_kept_above_the_block() {
        let mut source = source_event();
        source.notes = Some("Bring the slides".to_string());
        let mut target = Event::new("cal-b");

        copy_fields(&source, "Work", &mut target);

        assert_eq!(
            target.notes.as_deref(),
            Some("Bring the slides\n\n\n--- Sync Metadata ---\nSource: Work")
        );
    }

    #[test]
    fn attendees_are_listed_but_not_copied() {
        let mut source = source_event();
        source.attendees = vec![
            Attendee {
                name: "Alice".to_string(),
                status: ParticipationStatus::Accepted,
            },
            Attendee {
                name: "Bob".to_string(),
                status: ParticipationStatus::Pending,
            },
        ];
        let mut target = Event::new("cal-b");

        copy_fields(&source, "Work", &mut target);

        assert!(target.attendees.is_empty());
        assert_eq!(
            target.notes.as_deref(),
            Some(
                "--- Sync Metadata ---\nSource: Work\nParticipants:\n- Alice (Accepted)\n- Bob (Pending)"
            )
        );
    }

    #[test]
    fn reapplication_is_byte_stable() {
        let source = source_event();
        let mut target = Event::new("cal-b");

        copy_fields(&source, "Work", &mut target);
        let first = target.clone();
        copy_fields(&source, "Work", &mut target);

        assert_eq!(target, first);
    }
}

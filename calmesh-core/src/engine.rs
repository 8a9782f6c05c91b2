//! The sync engine: a single-shot reconciler over the selected calendars.
//!
//! Each run fetches the live events in a bounded window, classifies them
//! against the mesh state, propagates creates and updates one-way from
//! each group's source, heals deletions, prunes old references and log
//! lines, and persists the state through the backup-then-write discipline.

use std::collections::HashSet;

use chrono::Duration;
use serde_json::json;

use crate::backend::{Calendar, CalendarBackend, Event};
use crate::clock::{epoch_seconds, Clock, SystemClock};
use crate::constants::{
    FUTURE_WINDOW_DAYS, FUZZY_MATCH_WINDOW_SECS, FUZZY_SEARCH_SPAN_DAYS, PAST_WINDOW_DAYS,
    PRUNE_HORIZON_DAYS,
};
use crate::copier::copy_fields;
use crate::error::{CalMeshError, CalMeshResult};
use crate::ids::{GroupIdSource, UuidSource};
use crate::logger::{iso_timestamp, Logger};
use crate::state::{EventRef, MeshState, StateStore};

/// What a run did, for rendering and for tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub adopted: usize,
    pub resurrected: usize,
    pub removed: usize,
    pub merged: usize,
}

impl SyncStats {
    pub fn has_changes(&self) -> bool {
        self.created > 0
            || self.updated > 0
            || self.adopted > 0
            || self.resurrected > 0
            || self.removed > 0
            || self.merged > 0
    }
}

/// Single-shot reconciler. All collaborators are explicit constructor
/// parameters; the clock and group-id source are injectable for tests.
pub struct SyncEngine<B: CalendarBackend> {
    backend: B,
    store: StateStore,
    logger: Logger,
    calendars: Vec<Calendar>,
    clock: Box<dyn Clock>,
    group_ids: Box<dyn GroupIdSource>,
}

impl<B: CalendarBackend> SyncEngine<B> {
    pub fn new(
        backend: B,
        store: StateStore,
        logger: Logger,
        calendars: Vec<Calendar>,
    ) -> SyncEngine<B> {
        SyncEngine {
            backend,
            store,
            logger,
            calendars,
            clock: Box::new(SystemClock),
            group_ids: Box::new(UuidSource),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> SyncEngine<B> {
        self.clock = clock;
        self
    }

    pub fn with_group_ids(mut self, group_ids: Box<dyn GroupIdSource>) -> SyncEngine<B> {
        self.group_ids = group_ids;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// One full reconciliation pass.
    pub fn run(&mut self) -> CalMeshResult<SyncStats> {
        let now = self.clock.now();
        let now_epoch = now.timestamp();

        let mut state = match self.store.load() {
            Ok(state) => state,
            Err(CalMeshError::Serialization(error)) => {
                let quarantined = self.store.quarantine(now_epoch)?;
                self.logger.warn(
                    "state_file_corrupt",
                    json!({
                        "renamedTo": quarantined.display().to_string(),
                        "error": error.to_string(),
                    }),
                );
                MeshState::default()
            }
            Err(error) => return Err(error),
        };

        let calendar_ids: Vec<String> = self.calendars.iter().map(|c| c.id.clone()).collect();
        let selected: HashSet<String> = calendar_ids.iter().cloned().collect();

        // Step 1: collect the live set.
        let window_from = now - Duration::days(PAST_WINDOW_DAYS);
        let window_to = now + Duration::days(FUTURE_WINDOW_DAYS);
        let live = self
            .backend
            .events_between(&calendar_ids, window_from, window_to)?;
        let mut live_ids: HashSet<String> = live.iter().map(|e| e.id.clone()).collect();

        let mut stats = SyncStats::default();

        // Step 2: classify and propagate per live event.
        for event in &live {
            self.classify(&mut state, event, &mut live_ids, &mut stats)?;
        }

        // Step 3: every tracked reference we did not see live.
        let mut handled_groups: HashSet<String> = HashSet::new();
        for reference in state.all_references(&selected) {
            if live_ids.contains(&reference.event_id) {
                continue;
            }
            let Some(group_id) = state
                .find_by_event_id(&reference.calendar_id, &reference.event_id)
                .map(|(group, _)| group.id.clone())
            else {
                continue;
            };
            if !handled_groups.insert(group_id.clone()) {
                continue;
            }
            self.handle_missing(&mut state, &group_id, &selected, &mut stats)?;
        }

        // Step 4: prune state and logs past the horizon.
        let horizon = now - Duration::days(PRUNE_HORIZON_DAYS);
        state.prune(epoch_seconds(&horizon));
        self.logger.prune(&iso_timestamp(&horizon))?;

        // Step 5: persist.
        self.store.save(&state, now_epoch)?;

        Ok(stats)
    }

    fn classify(
        &mut self,
        state: &mut MeshState,
        event: &Event,
        live_ids: &mut HashSet<String>,
        stats: &mut SyncStats,
    ) -> CalMeshResult<()> {
        let last_modified = epoch_seconds(&event.last_modified);
        let start_date = Some(epoch_seconds(&event.start));

        let known = state
            .find_by_event_id(&event.calendar_id, &event.id)
            .map(|(group, reference)| {
                (
                    group.id.clone(),
                    group.is_source(&event.calendar_id, &event.id),
                    group.source_calendar_id.is_none(),
                    reference.last_modified,
                    reference.is_deleted,
                )
            });

        match known {
            None => {
                let group_id = self.group_ids.next_id();
                state.upsert_reference(
                    &event.calendar_id,
                    &event.id,
                    last_modified,
                    start_date,
                    &group_id,
                );
                state.set_source(&group_id, &event.calendar_id, &event.id);
                self.logger.info(
                    "track_new_event",
                    json!({
                        "groupId": group_id,
                        "calendarId": event.calendar_id,
                        "eventId": event.id,
                        "title": event.title,
                    }),
                );
                self.propagate_new(state, event, &group_id, live_ids, stats)?;
            }
            Some((group_id, is_source, sourceless, known_modified, was_deleted)) => {
                let modified = last_modified > known_modified;
                if !modified && !was_deleted {
                    return Ok(());
                }

                let mut failures = 0;
                if modified && (is_source || sourceless) {
                    if sourceless {
                        // The group lost its source pointer (tampered or
                        // recovered state); propagating from here may
                        // clobber diverged copies.
                        self.logger.warn(
                            "sourceless_propagation",
                            json!({
                                "groupId": group_id,
                                "calendarId": event.calendar_id,
                                "eventId": event.id,
                            }),
                        );
                    }
                    failures = self.propagate_update(state, event, &group_id, stats)?;
                }

                // A failed copy save keeps this timestamp behind so the
                // propagation is retried next run.
                if failures == 0 {
                    state.upsert_reference(
                        &event.calendar_id,
                        &event.id,
                        last_modified,
                        start_date,
                        &group_id,
                    );
                }
            }
        }
        Ok(())
    }

    /// Replicate a newly tracked event into every other selected calendar,
    /// adopting fuzzy-matched twins instead of duplicating them.
    fn propagate_new(
        &mut self,
        state: &mut MeshState,
        source: &Event,
        group_id: &str,
        live_ids: &mut HashSet<String>,
        stats: &mut SyncStats,
    ) -> CalMeshResult<()> {
        let targets: Vec<String> = self
            .calendars
            .iter()
            .map(|c| c.id.clone())
            .filter(|id| *id != source.calendar_id)
            .collect();

        for calendar_id in targets {
            if let Some(twin) = self.fuzzy_match(&calendar_id, source)? {
                state.upsert_reference(
                    &calendar_id,
                    &twin.id,
                    epoch_seconds(&twin.last_modified),
                    Some(epoch_seconds(&twin.start)),
                    group_id,
                );
                live_ids.insert(twin.id.clone());
                stats.adopted += 1;
                self.logger.info(
                    "adopt_existing_event",
                    json!({
                        "groupId": group_id,
                        "calendarId": calendar_id,
                        "eventId": twin.id,
                        "title": twin.title,
                    }),
                );
                continue;
            }

            let mut replica = Event::new(&calendar_id);
            copy_fields(source, &self.calendar_name(&source.calendar_id), &mut replica);
            match self.backend.save_event(&replica) {
                Ok(saved) => {
                    live_ids.insert(saved.id.clone());
                    state.upsert_reference(
                        &calendar_id,
                        &saved.id,
                        epoch_seconds(&saved.last_modified),
                        Some(epoch_seconds(&saved.start)),
                        group_id,
                    );
                    stats.created += 1;
                    self.logger.info(
                        "replicate_event",
                        json!({
                            "groupId": group_id,
                            "calendarId": calendar_id,
                            "eventId": saved.id,
                            "title": saved.title,
                        }),
                    );
                }
                Err(error) => {
                    self.logger.error(
                        "replicate_failed",
                        json!({
                            "groupId": group_id,
                            "calendarId": calendar_id,
                            "sourceEventId": source.id,
                            "error": error.to_string(),
                        }),
                    );
                }
            }
        }
        Ok(())
    }

    /// Push the source's fields onto every live copy in the group.
    /// Returns the number of failed saves.
    fn propagate_update(
        &mut self,
        state: &mut MeshState,
        source: &Event,
        group_id: &str,
        stats: &mut SyncStats,
    ) -> CalMeshResult<usize> {
        let targets: Vec<EventRef> = match state.group_by_id(group_id) {
            Some(group) => group
                .events
                .iter()
                .filter(|r| {
                    !r.is_deleted
                        && !(r.calendar_id == source.calendar_id && r.event_id == source.id)
                })
                .cloned()
                .collect(),
            None => return Ok(0),
        };

        let mut failures = 0;
        for reference in targets {
            let Some(mut target) = self.backend.event_by_id(&reference.event_id)? else {
                // Gone from the backend; the deletion pass heals it.
                self.logger.warn(
                    "update_target_missing",
                    json!({
                        "groupId": group_id,
                        "calendarId": reference.calendar_id,
                        "eventId": reference.event_id,
                    }),
                );
                continue;
            };

            copy_fields(source, &self.calendar_name(&source.calendar_id), &mut target);
            match self.backend.save_event(&target) {
                Ok(saved) => {
                    state.upsert_reference(
                        &reference.calendar_id,
                        &saved.id,
                        epoch_seconds(&saved.last_modified),
                        Some(epoch_seconds(&saved.start)),
                        group_id,
                    );
                    stats.updated += 1;
                    self.logger.info(
                        "propagate_update",
                        json!({
                            "groupId": group_id,
                            "calendarId": reference.calendar_id,
                            "eventId": saved.id,
                            "title": saved.title,
                        }),
                    );
                }
                Err(error) => {
                    failures += 1;
                    self.logger.error(
                        "update_failed",
                        json!({
                            "groupId": group_id,
                            "calendarId": reference.calendar_id,
                            "eventId": reference.event_id,
                            "error": error.to_string(),
                        }),
                    );
                }
            }
        }
        Ok(failures)
    }

    /// Heal a group with references the run did not see live: adopt
    /// replacements, merge forked groups, resurrect deleted copies, or
    /// honor a source deletion by tearing the group down.
    fn handle_missing(
        &mut self,
        state: &mut MeshState,
        group_id: &str,
        selected: &HashSet<String>,
        stats: &mut SyncStats,
    ) -> CalMeshResult<()> {
        let Some(group) = state.group_by_id(group_id) else {
            return Ok(());
        };
        let refs: Vec<EventRef> = group.events.iter().filter(|r| !r.is_deleted).cloned().collect();
        let source_calendar = group.source_calendar_id.clone();
        let source_event = group.source_event_id.clone();

        let mut valid_events: Vec<Event> = Vec::new();
        let mut missing_refs: Vec<EventRef> = Vec::new();
        for reference in &refs {
            match self.backend.event_by_id(&reference.event_id)? {
                Some(event) => valid_events.push(event),
                None => missing_refs.push(reference.clone()),
            }
        }

        if valid_events.is_empty() {
            for reference in &refs {
                state.tombstone(&reference.calendar_id, &reference.event_id);
            }
            self.logger
                .info("group_fully_deleted", json!({ "groupId": group_id }));
            return Ok(());
        }

        let anchor = valid_events[0].clone();
        let source_live = match (&source_calendar, &source_event) {
            (Some(calendar_id), Some(event_id)) => valid_events
                .iter()
                .any(|e| &e.calendar_id == calendar_id && &e.id == event_id),
            _ => false,
        };

        for missing in &missing_refs {
            if !selected.contains(&missing.calendar_id) {
                state.tombstone(&missing.calendar_id, &missing.event_id);
                continue;
            }

            if let Some(replacement) = self.fuzzy_match(&missing.calendar_id, &anchor)? {
                let other_group = state
                    .find_by_event_id(&replacement.calendar_id, &replacement.id)
                    .map(|(group, _)| group.id.clone());
                match other_group {
                    Some(other) if other != group_id => {
                        state.merge_groups(&other, group_id);
                        stats.merged += 1;
                        self.logger.info(
                            "merge_groups",
                            json!({ "winner": group_id, "loser": other }),
                        );
                    }
                    Some(_) => {}
                    None => {
                        state.upsert_reference(
                            &replacement.calendar_id,
                            &replacement.id,
                            epoch_seconds(&replacement.last_modified),
                            Some(epoch_seconds(&replacement.start)),
                            group_id,
                        );
                        stats.adopted += 1;
                        self.logger.info(
                            "adopt_existing_event",
                            json!({
                                "groupId": group_id,
                                "calendarId": replacement.calendar_id,
                                "eventId": replacement.id,
                                "title": replacement.title,
                            }),
                        );
                    }
                }
                state.tombstone(&missing.calendar_id, &missing.event_id);
                continue;
            }

            if source_live {
                // A copy the user deleted while the source lives on:
                // recreate it.
                let Some(source) = valid_events.iter().find(|e| {
                    Some(&e.calendar_id) == source_calendar.as_ref()
                        && Some(&e.id) == source_event.as_ref()
                }) else {
                    continue;
                };
                let mut replica = Event::new(&missing.calendar_id);
                copy_fields(source, &self.calendar_name(&source.calendar_id), &mut replica);
                match self.backend.save_event(&replica) {
                    Ok(saved) => {
                        state.tombstone(&missing.calendar_id, &missing.event_id);
                        state.upsert_reference(
                            &missing.calendar_id,
                            &saved.id,
                            epoch_seconds(&saved.last_modified),
                            Some(epoch_seconds(&saved.start)),
                            group_id,
                        );
                        stats.resurrected += 1;
                        self.logger.info(
                            "resurrect_copy",
                            json!({
                                "groupId": group_id,
                                "calendarId": missing.calendar_id,
                                "eventId": saved.id,
                            }),
                        );
                    }
                    Err(error) => {
                        self.logger.error(
                            "resurrect_failed",
                            json!({
                                "groupId": group_id,
                                "calendarId": missing.calendar_id,
                                "error": error.to_string(),
                            }),
                        );
                    }
                }
            } else {
                // The source itself is gone: honor the deletion and tear
                // the whole group down.
                state.tombstone(&missing.calendar_id, &missing.event_id);
                for event in &valid_events {
                    match self.backend.remove_event(&event.id) {
                        Ok(()) => {
                            state.tombstone(&event.calendar_id, &event.id);
                            stats.removed += 1;
                        }
                        Err(error) => {
                            self.logger.error(
                                "remove_failed",
                                json!({
                                    "groupId": group_id,
                                    "calendarId": event.calendar_id,
                                    "eventId": event.id,
                                    "error": error.to_string(),
                                }),
                            );
                        }
                    }
                }
                self.logger
                    .info("honor_deletion", json!({ "groupId": group_id }));
                return Ok(());
            }
        }
        Ok(())
    }

    /// Trimmed-title equality within ±300 s of the probe's start, searched
    /// over a ±1 day window. The first candidate the backend returns wins.
    fn fuzzy_match(&self, calendar_id: &str, probe: &Event) -> CalMeshResult<Option<Event>> {
        let from = probe.start - Duration::days(FUZZY_SEARCH_SPAN_DAYS);
        let to = probe.start + Duration::days(FUZZY_SEARCH_SPAN_DAYS);
        let candidates = self
            .backend
            .events_between(&[calendar_id.to_string()], from, to)?;

        let title = probe.title.trim();
        Ok(candidates.into_iter().find(|candidate| {
            candidate.title.trim() == title
                && (candidate.start - probe.start).num_seconds().abs() <= FUZZY_MATCH_WINDOW_SECS
        }))
    }

    fn calendar_name(&self, calendar_id: &str) -> String {
        self.calendars
            .iter()
            .find(|c| c.id == calendar_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| calendar_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ids::SequentialIds;
    use crate::mock::MockBackend;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    fn ts(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, minute, 0).unwrap()
    }

    struct Fixture {
        engine: SyncEngine<MockBackend>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture::with_calendars(&[("cal-a", "A"), ("cal-b", "B")])
        }

        fn with_calendars(calendars: &[(&str, &str)]) -> Fixture {
            let mut backend = MockBackend::new();
            backend.set_now(ts(10, 0, 0));
            for (id, name) in calendars {
                backend.add_calendar(id, name);
            }
            let selected = backend.calendars().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let engine = SyncEngine::new(
                backend,
                StateStore::new(dir.path()),
                Logger::new(dir.path().join("sync_log.jsonl")),
                selected,
            )
            .with_clock(Box::new(FixedClock(ts(10, 0, 0))))
            .with_group_ids(Box::new(SequentialIds::new("group")));
            Fixture { engine, dir }
        }

        fn backend(&mut self) -> &mut MockBackend {
            self.engine.backend_mut()
        }

        fn events_in(&self, calendar_id: &str) -> Vec<Event> {
            self.engine
                .backend()
                .events_in(calendar_id)
                .into_iter()
                .cloned()
                .collect()
        }

        fn state(&self) -> MeshState {
            StateStore::new(self.dir.path()).load().unwrap()
        }

        fn state_bytes(&self) -> String {
            std::fs::read_to_string(StateStore::new(self.dir.path()).state_path()).unwrap()
        }

        fn log_contents(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("sync_log.jsonl")).unwrap_or_default()
        }

        fn seed_lunch(&mut self) -> Event {
            self.backend()
                .seed_event("cal-a", "Lunch", ts(15, 12, 0), ts(15, 13, 0))
        }
    }

    fn assert_pairs_unique(state: &MeshState) {
        let mut seen: HashMap<(String, String), usize> = HashMap::new();
        for group in &state.groups {
            for reference in &group.events {
                *seen
                    .entry((reference.calendar_id.clone(), reference.event_id.clone()))
                    .or_default() += 1;
            }
        }
        for (pair, count) in seen {
            assert_eq!(count, 1, "pair {:?} tracked {} times", pair, count);
        }
    }

    #[test]
    fn first_run_replicates_into_empty_calendar() {
        let mut fixture = Fixture::new();
        let lunch = fixture.seed_lunch();

        let stats = fixture.engine.run().unwrap();
        assert_eq!(stats.created, 1);

        let copies = fixture.events_in("cal-b");
        assert_eq!(copies.len(), 1);
        let copy = &copies[0];
        assert_eq!(copy.title, "Lunch");
        assert_eq!(copy.start, ts(15, 12, 0));
        assert_eq!(copy.end, ts(15, 13, 0));
        assert!(copy
            .notes
            .as_deref()
            .unwrap()
            .ends_with("--- Sync Metadata ---\nSource: A"));

        let state = fixture.state();
        assert_eq!(state.groups.len(), 1);
        let group = &state.groups[0];
        assert!(group.is_source("cal-a", &lunch.id));
        assert_eq!(group.events.len(), 2);
        assert_pairs_unique(&state);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut fixture = Fixture::new();
        fixture.seed_lunch();

        fixture.engine.run().unwrap();
        let writes_after_first = fixture.backend().write_count();
        let bytes_after_first = fixture.state_bytes();

        let stats = fixture.engine.run().unwrap();

        assert!(!stats.has_changes());
        assert_eq!(fixture.backend().write_count(), writes_after_first);
        assert_eq!(fixture.state_bytes(), bytes_after_first);
    }

    #[test]
    fn source_update_propagates_to_copies() {
        let mut fixture = Fixture::new();
        let lunch = fixture.seed_lunch();
        fixture.engine.run().unwrap();

        fixture.backend().set_now(ts(11, 0, 0));
        fixture
            .backend()
            .edit_event(&lunch.id, |e| e.title = "Team Lunch".to_string());
        fixture.engine.run().unwrap();

        let copies = fixture.events_in("cal-b");
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].title, "Team Lunch");
        assert!(copies[0]
            .notes
            .as_deref()
            .unwrap()
            .ends_with("--- Sync Metadata ---\nSource: A"));
    }

    #[test]
    fn copy_edit_is_not_pushed_back() {
        let mut fixture = Fixture::new();
        let lunch = fixture.seed_lunch();
        fixture.engine.run().unwrap();

        let copy_id = fixture.events_in("cal-b")[0].id.clone();
        fixture.backend().set_now(ts(11, 0, 0));
        fixture
            .backend()
            .edit_event(&copy_id, |e| e.title = "Other".to_string());
        fixture.engine.run().unwrap();

        assert_eq!(fixture.backend().event(&lunch.id).unwrap().title, "Lunch");
        assert_eq!(fixture.backend().event(&copy_id).unwrap().title, "Other");

        // The reference advanced, so the next run is a no-op.
        let writes = fixture.backend().write_count();
        fixture.engine.run().unwrap();
        assert_eq!(fixture.backend().write_count(), writes);
    }

    #[test]
    fn source_event_is_never_written() {
        let mut fixture = Fixture::new();
        let lunch = fixture.seed_lunch();
        fixture.engine.run().unwrap();

        let copy_id = fixture.events_in("cal-b")[0].id.clone();
        fixture.backend().set_now(ts(11, 0, 0));
        fixture
            .backend()
            .edit_event(&copy_id, |e| e.title = "Other".to_string());
        fixture.engine.run().unwrap();
        fixture.engine.run().unwrap();

        assert!(!fixture.backend().saved_ids().contains(&lunch.id));
    }

    #[test]
    fn deleted_copy_is_resurrected_from_source() {
        let mut fixture = Fixture::new();
        fixture.seed_lunch();
        fixture.engine.run().unwrap();

        let copy_id = fixture.events_in("cal-b")[0].id.clone();
        fixture.backend().delete_event_externally(&copy_id);
        let stats = fixture.engine.run().unwrap();

        assert_eq!(stats.resurrected, 1);
        let copies = fixture.events_in("cal-b");
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].title, "Lunch");
        assert_ne!(copies[0].id, copy_id);

        let state = fixture.state();
        let group = &state.groups[0];
        let old = group
            .events
            .iter()
            .find(|r| r.event_id == copy_id)
            .unwrap();
        assert!(old.is_deleted);
        let fresh = group
            .events
            .iter()
            .find(|r| r.event_id == copies[0].id)
            .unwrap();
        assert!(!fresh.is_deleted);
    }

    #[test]
    fn source_deletion_removes_copies() {
        let mut fixture = Fixture::new();
        let lunch = fixture.seed_lunch();
        fixture.engine.run().unwrap();

        fixture.backend().delete_event_externally(&lunch.id);
        let stats = fixture.engine.run().unwrap();

        assert_eq!(stats.removed, 1);
        assert!(fixture.events_in("cal-b").is_empty());
        let state = fixture.state();
        assert!(state.groups[0].events.iter().all(|r| r.is_deleted));
    }

    #[test]
    fn tombstones_survive_further_runs() {
        let mut fixture = Fixture::new();
        let lunch = fixture.seed_lunch();
        fixture.engine.run().unwrap();
        fixture.backend().delete_event_externally(&lunch.id);
        fixture.engine.run().unwrap();

        fixture.engine.run().unwrap();

        let state = fixture.state();
        assert!(state.groups[0].events.iter().all(|r| r.is_deleted));
    }

    #[test]
    fn untracked_twins_are_adopted_into_one_group() {
        let mut fixture = Fixture::new();
        fixture
            .backend()
            .seed_event("cal-a", "Lunch", ts(15, 12, 0), ts(15, 13, 0));
        fixture
            .backend()
            .seed_event("cal-b", "Lunch", ts(15, 12, 2), ts(15, 13, 2));

        let stats = fixture.engine.run().unwrap();

        assert_eq!(stats.adopted, 1);
        assert_eq!(stats.created, 0);
        assert_eq!(fixture.backend().write_count(), 0);
        assert_eq!(fixture.events_in("cal-a").len(), 1);
        assert_eq!(fixture.events_in("cal-b").len(), 1);

        let state = fixture.state();
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.groups[0].events.len(), 2);
        assert_pairs_unique(&state);
    }

    #[test]
    fn mesh_is_complete_across_three_calendars() {
        let mut fixture =
            Fixture::with_calendars(&[("cal-a", "A"), ("cal-b", "B"), ("cal-c", "C")]);
        fixture.seed_lunch();
        fixture
            .backend()
            .seed_event("cal-b", "Standup", ts(16, 9, 0), ts(16, 9, 15));

        fixture.engine.run().unwrap();

        let state = fixture.state();
        assert_eq!(state.groups.len(), 2);
        for group in &state.groups {
            for calendar_id in ["cal-a", "cal-b", "cal-c"] {
                let live: Vec<_> = group
                    .events
                    .iter()
                    .filter(|r| !r.is_deleted && r.calendar_id == calendar_id)
                    .collect();
                assert_eq!(live.len(), 1, "calendar {} in group {}", calendar_id, group.id);
            }
        }
        assert_pairs_unique(&state);
    }

    #[test]
    fn sourceless_group_propagates_with_warning() {
        let mut fixture = Fixture::new();
        fixture.seed_lunch();
        fixture.engine.run().unwrap();

        // Simulate a tampered state file that lost its source pointer.
        let mut state = fixture.state();
        state.groups[0].source_calendar_id = None;
        state.groups[0].source_event_id = None;
        StateStore::new(fixture.dir.path())
            .save(&state, 0)
            .unwrap();

        let copy_id = fixture.events_in("cal-b")[0].id.clone();
        fixture.backend().set_now(ts(11, 0, 0));
        fixture
            .backend()
            .edit_event(&copy_id, |e| e.title = "Rescheduled".to_string());
        fixture.engine.run().unwrap();

        let originals = fixture.events_in("cal-a");
        assert_eq!(originals[0].title, "Rescheduled");
        assert!(fixture.log_contents().contains("sourceless_propagation"));
    }

    #[test]
    fn corrupt_state_is_quarantined_and_mesh_rebuilt() {
        let mut fixture = Fixture::new();
        fixture
            .backend()
            .seed_event("cal-a", "Lunch", ts(15, 12, 0), ts(15, 13, 0));
        fixture
            .backend()
            .seed_event("cal-b", "Lunch", ts(15, 12, 1), ts(15, 13, 1));
        std::fs::write(
            StateStore::new(fixture.dir.path()).state_path(),
            "{ definitely not json",
        )
        .unwrap();

        fixture.engine.run().unwrap();

        let quarantined: Vec<_> = std::fs::read_dir(fixture.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt."))
            .collect();
        assert_eq!(quarantined.len(), 1);

        // Fuzzy adoption rebuilt the group without duplicating events.
        assert_eq!(fixture.backend().write_count(), 0);
        let state = fixture.state();
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.groups[0].events.len(), 2);
        assert!(fixture.log_contents().contains("state_file_corrupt"));
    }

    #[test]
    fn failed_replication_is_logged_and_run_continues() {
        let mut fixture =
            Fixture::with_calendars(&[("cal-a", "A"), ("cal-b", "B"), ("cal-c", "C")]);
        fixture.seed_lunch();
        fixture.backend().fail_saves_in("cal-b");

        let stats = fixture.engine.run().unwrap();

        // cal-c still got its copy.
        assert_eq!(stats.created, 1);
        assert_eq!(fixture.events_in("cal-c").len(), 1);
        assert!(fixture.events_in("cal-b").is_empty());
        assert!(fixture.log_contents().contains("replicate_failed"));
    }

    #[test]
    fn failed_update_retries_on_the_next_run() {
        let mut fixture = Fixture::new();
        let lunch = fixture.seed_lunch();
        fixture.engine.run().unwrap();

        fixture.backend().set_now(ts(11, 0, 0));
        fixture
            .backend()
            .edit_event(&lunch.id, |e| e.title = "Team Lunch".to_string());
        fixture.backend().fail_saves_in("cal-b");
        fixture.engine.run().unwrap();

        assert_eq!(fixture.events_in("cal-b")[0].title, "Lunch");
        assert!(fixture.log_contents().contains("update_failed"));

        fixture.backend().clear_failures();
        let stats = fixture.engine.run().unwrap();

        assert_eq!(stats.updated, 1);
        assert_eq!(fixture.events_in("cal-b")[0].title, "Team Lunch");
    }

    #[test]
    fn old_references_are_pruned() {
        let mut fixture = Fixture::new();
        let mut state = MeshState::default();
        // Started well before the horizon and long gone from the backend.
        state.upsert_reference("cal-a", "evt-bygone", 1.0, Some(epoch_seconds(&ts(1, 0, 0)) - 86_400.0 * 60.0), "group-old");
        StateStore::new(fixture.dir.path())
            .save(&state, 0)
            .unwrap();

        fixture.engine.run().unwrap();

        assert!(fixture.state().groups.is_empty());
    }
}

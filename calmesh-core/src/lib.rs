//! Core types and sync engine for calmesh.
//!
//! calmesh keeps a selected set of calendars in mesh agreement: every
//! tracked event exists once in every participating calendar, with one
//! authoritative source copy per sync group. This crate provides:
//! - `backend`: provider-neutral event types and the backend trait
//! - `state`: the durable mesh state document and its JSON store
//! - `engine`: the single-shot reconciler
//! - `local` / `mock`: a JSON-file backend and an in-memory test backend

pub mod backend;
pub mod clock;
pub mod config;
pub mod constants;
pub mod copier;
pub mod engine;
pub mod error;
pub mod ids;
pub mod local;
pub mod logger;
pub mod mock;
pub mod state;

// Re-export the types almost every consumer needs.
pub use backend::{Attendee, Calendar, CalendarBackend, Event, ParticipationStatus};
pub use error::{CalMeshError, CalMeshResult};

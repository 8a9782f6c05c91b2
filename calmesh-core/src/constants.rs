//! Reconciliation constants.

/// How far back the event fetch window reaches.
pub const PAST_WINDOW_DAYS: i64 = 30;

/// How far forward the event fetch window reaches.
pub const FUTURE_WINDOW_DAYS: i64 = 365;

/// Half-width of the search span when fuzzy matching, in days.
pub const FUZZY_SEARCH_SPAN_DAYS: i64 = 1;

/// Maximum start-time distance for a fuzzy match.
pub const FUZZY_MATCH_WINDOW_SECS: i64 = 300;

/// References and log lines older than this are pruned.
pub const PRUNE_HORIZON_DAYS: i64 = 30;

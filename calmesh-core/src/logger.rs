//! JSON-lines operational log.
//!
//! One object per line: `{"timestamp", "level", "action", ...details}`.
//! Timestamps are ISO-8601 UTC, so lexicographic comparison against the
//! prune horizon matches chronological order.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::CalMeshResult;

/// ISO-8601 form used for log timestamps and the prune horizon.
pub fn iso_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Append-only JSON-lines logger. A disabled logger drops everything,
/// which keeps unit tests quiet.
pub struct Logger {
    path: Option<PathBuf>,
}

impl Logger {
    pub fn new(path: impl Into<PathBuf>) -> Logger {
        Logger {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Logger {
        Logger { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, action: &str, details: Value) {
        self.write("INFO", action, details);
    }

    pub fn warn(&self, action: &str, details: Value) {
        self.write("WARN", action, details);
    }

    pub fn error(&self, action: &str, details: Value) {
        self.write("ERROR", action, details);
    }

    fn write(&self, level: &str, action: &str, details: Value) {
        let Some(path) = &self.path else { return };

        let mut line = serde_json::Map::new();
        line.insert(
            "timestamp".to_string(),
            Value::String(iso_timestamp(&Utc::now())),
        );
        line.insert("level".to_string(), Value::String(level.to_string()));
        line.insert("action".to_string(), Value::String(action.to_string()));
        if let Value::Object(extra) = details {
            line.extend(extra);
        }

        // A log write failure must not abort a sync run.
        if let Err(error) = append_line(path, &Value::Object(line)) {
            eprintln!("calmesh: failed to write log line: {}", error);
        }
    }

    /// Drop lines whose timestamp sorts before `horizon`; rewrite the file
    /// atomically. Lines that don't parse are kept.
    pub fn prune(&self, horizon: &str) -> CalMeshResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        let kept: Vec<&str> = contents
            .lines()
            .filter(|line| !line.is_empty())
            .filter(|line| match serde_json::from_str::<Value>(line) {
                Ok(entry) => entry
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .map_or(true, |ts| ts >= horizon),
                Err(_) => true,
            })
            .collect();

        let mut rewritten = kept.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }

        let temp = path.with_extension("jsonl.tmp");
        std::fs::write(&temp, rewritten)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }
}

fn append_line(path: &Path, line: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

//! Append-only audit log of user-visible business events.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::UserId, Result};

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,
    pub user_id: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, user: UserId) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            user_id: user.0,
            file_name: None,
            rules: None,
            rejected: None,
            entries: None,
            error: None,
        }
    }

    pub fn rules(user: UserId, accepted: usize, rejected: usize) -> Self {
        Self {
            rules: Some(accepted),
            rejected: Some(rejected),
            ..Self::base("rules", user)
        }
    }

    /// `entries` is the number of patched archive entries (1 for a single payload).
    pub fn transform(user: UserId, file_name: &str, rules: usize, entries: usize) -> Self {
        Self {
            file_name: Some(file_name.to_string()),
            rules: Some(rules),
            entries: Some(entries),
            ..Self::base("transform", user)
        }
    }

    pub fn failure(user: UserId, file_name: &str, error: &str) -> Self {
        Self {
            file_name: Some(file_name.to_string()),
            error: Some(truncate_text(error, AUDIT_MAX_TEXT)),
            ..Self::base("failure", user)
        }
    }

    pub fn idle_timeout(user: UserId) -> Self {
        Self::base("idle_timeout", user)
    }

    pub fn denied(user: UserId) -> Self {
        Self::base("denied", user)
    }
}

pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, event: AuditEvent) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(f, "{line}")?;
            return Ok(());
        }

        let mut block = format!("\n{}\n[{}] {}\n", "=".repeat(60), event.timestamp, event.event);
        let value = serde_json::to_value(&event)?;
        if let Some(obj) = value.as_object() {
            for (k, v) in obj {
                if k == "timestamp" || k == "event" {
                    continue;
                }
                let rendered = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                block.push_str(&format!("{k}: {rendered}\n"));
            }
        }
        f.write_all(block.as_bytes())?;
        Ok(())
    }

    /// Write an event, logging instead of failing when the file is unwritable.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.write(event) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write audit event");
        }
    }
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_len).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_skip_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLogger::new(dir.path().join("audit.log"), true);

        log.write(AuditEvent::transform(UserId(1), "save.dat", 2, 1))
            .unwrap();
        log.write(AuditEvent::idle_timeout(UserId(2))).unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "transform");
        assert_eq!(lines[0]["file_name"], "save.dat");
        assert_eq!(lines[0]["rules"], 2);
        assert_eq!(lines[1]["event"], "idle_timeout");
        assert!(lines[1].get("file_name").is_none());
    }

    #[test]
    fn text_mode_truncates_long_errors() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLogger::new(dir.path().join("audit.log"), false);

        let long = "e".repeat(AUDIT_MAX_TEXT + 50);
        log.write(AuditEvent::failure(UserId(3), "bundle.zip", &long))
            .unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(raw.contains("] failure"));
        assert!(raw.contains("file_name: bundle.zip"));
        assert!(raw.contains(&format!("{}...", "e".repeat(AUDIT_MAX_TEXT))));
        assert!(!raw.contains(&"e".repeat(AUDIT_MAX_TEXT + 1)));
    }

    #[test]
    fn record_swallows_unwritable_path() {
        let log = AuditLogger::new("/nonexistent-dir/for/sure/audit.log", true);
        log.record(AuditEvent::denied(UserId(4)));
    }
}

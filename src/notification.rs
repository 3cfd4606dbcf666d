//! Change notifications and the hints they carry into a coalesced batch.

use crate::error::NotificationError;
use crate::types::MediaKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Library-manager event that produced a notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HintEvent {
    Download,
    Upgrade,
    Rename,
    Scan,
    Other(String),
}

impl From<String> for HintEvent {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "download" => HintEvent::Download,
            "upgrade" => HintEvent::Upgrade,
            "rename" => HintEvent::Rename,
            "scan" => HintEvent::Scan,
            _ => HintEvent::Other(raw),
        }
    }
}

impl From<HintEvent> for String {
    fn from(event: HintEvent) -> Self {
        event.to_string()
    }
}

impl fmt::Display for HintEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HintEvent::Download => f.write_str("Download"),
            HintEvent::Upgrade => f.write_str("Upgrade"),
            HintEvent::Rename => f.write_str("Rename"),
            HintEvent::Scan => f.write_str("Scan"),
            HintEvent::Other(raw) => f.write_str(raw),
        }
    }
}

/// Opaque-to-the-resolver context attached to a notification.
///
/// Only `media_path` influences resolution (it feeds the file-mtime probe);
/// the rest is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintPayload {
    pub event: HintEvent,
    #[serde(default)]
    pub media_path: Option<PathBuf>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl HintPayload {
    pub fn new(event: HintEvent) -> Self {
        Self {
            event,
            media_path: None,
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.media_path = Some(path.into());
        self
    }
}

/// One upstream signal that an item may need re-resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub key: MediaKey,
    pub hint: HintPayload,
    pub received_at: DateTime<Utc>,
}

impl ChangeNotification {
    pub fn new(key: MediaKey, hint: HintPayload) -> Self {
        Self {
            key,
            hint,
            received_at: Utc::now(),
        }
    }

    /// Reject notifications that cannot be attributed to a single media unit.
    pub fn validate(&self) -> Result<(), NotificationError> {
        self.key
            .validate()
            .map_err(|e| NotificationError::Malformed(format!("{}: {}", self.key, e)))?;
        if let HintEvent::Other(raw) = &self.hint.event {
            if raw.trim().is_empty() {
                return Err(NotificationError::Malformed(format!(
                    "{}: empty event type",
                    self.key
                )));
            }
        }
        if let Some(path) = &self.hint.media_path {
            if path.as_os_str().is_empty() {
                return Err(NotificationError::Malformed(format!(
                    "{}: empty media path",
                    self.key
                )));
            }
        }
        Ok(())
    }
}

/// Line format accepted by `dateline ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub key: String,
    pub event: HintEvent,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl TryFrom<NotificationRecord> for ChangeNotification {
    type Error = NotificationError;

    fn try_from(record: NotificationRecord) -> Result<Self, Self::Error> {
        let key: MediaKey = record
            .key
            .parse()
            .map_err(|e| NotificationError::Malformed(format!("{}", e)))?;
        let notification = ChangeNotification {
            key,
            hint: HintPayload {
                event: record.event,
                media_path: record.path,
                extra: record.extra,
            },
            received_at: record.received_at.unwrap_or_else(Utc::now),
        };
        notification.validate()?;
        Ok(notification)
    }
}

impl NotificationRecord {
    pub fn parse_line(line: &str) -> Result<ChangeNotification, NotificationError> {
        let record: NotificationRecord = serde_json::from_str(line)
            .map_err(|e| NotificationError::Malformed(format!("unparseable line: {}", e)))?;
        ChangeNotification::try_from(record)
    }
}

//! Structured alarm telemetry.
//!
//! Every pipeline step emits a [`TelemetryRecord`] through a
//! [`TelemetrySink`]. Fields whose key mentions a key or token are dropped
//! when they are attached, so no sink ever sees them.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::short_id;

/// Alarm lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEvent {
    AlarmCreated,
    TextGenStarted,
    TextGenCompleted,
    TextGenFailed,
    TtsStarted,
    TtsCompleted,
    TtsFailed,
    PrimaryArmed,
    FallbackArmed,
    FallbackArmFailed,
    AlarmFiredPrimary,
    AlarmFiredFallback,
    AlarmCancelled,
    AlarmDeleted,
    AlarmCreateBlockedNoCredential,
    PermissionDenied,
}

impl TelemetryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryEvent::AlarmCreated => "alarm_created",
            TelemetryEvent::TextGenStarted => "text_gen_started",
            TelemetryEvent::TextGenCompleted => "text_gen_completed",
            TelemetryEvent::TextGenFailed => "text_gen_failed",
            TelemetryEvent::TtsStarted => "tts_started",
            TelemetryEvent::TtsCompleted => "tts_completed",
            TelemetryEvent::TtsFailed => "tts_failed",
            TelemetryEvent::PrimaryArmed => "primary_armed",
            TelemetryEvent::FallbackArmed => "fallback_armed",
            TelemetryEvent::FallbackArmFailed => "fallback_arm_failed",
            TelemetryEvent::AlarmFiredPrimary => "alarm_fired_primary",
            TelemetryEvent::AlarmFiredFallback => "alarm_fired_fallback",
            TelemetryEvent::AlarmCancelled => "alarm_cancelled",
            TelemetryEvent::AlarmDeleted => "alarm_deleted",
            TelemetryEvent::AlarmCreateBlockedNoCredential => "alarm_create_blocked_no_credential",
            TelemetryEvent::PermissionDenied => "permission_denied",
        }
    }

    /// Failure events are logged at error level.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TelemetryEvent::TextGenFailed
                | TelemetryEvent::TtsFailed
                | TelemetryEvent::FallbackArmFailed
                | TelemetryEvent::AlarmCreateBlockedNoCredential
                | TelemetryEvent::PermissionDenied
        )
    }
}

impl std::fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a payload key may carry a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("key") || key.contains("token")
}

/// One telemetry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub event: TelemetryEvent,
    pub alarm_id: Option<Uuid>,
    pub fields: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    pub fn new(event: TelemetryEvent) -> Self {
        Self {
            event,
            alarm_id: None,
            fields: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn alarm(mut self, id: Uuid) -> Self {
        self.alarm_id = Some(id);
        self
    }

    /// Attach a payload field. Sensitive keys are silently dropped.
    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        if !is_sensitive_key(key) {
            self.fields.push((key.to_string(), value.into()));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Single-line rendering: `[event] alarm=1a2b3c4d key=value ...`.
    pub fn message(&self) -> String {
        let mut message = format!("[{}]", self.event);
        if let Some(id) = self.alarm_id {
            message.push_str(&format!(" alarm={}", short_id(id)));
        }
        for (key, value) in &self.fields {
            message.push_str(&format!(" {}={}", key, value));
        }
        message
    }
}

/// Destination for telemetry records.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: TelemetryRecord);
}

fn trace_record(record: &TelemetryRecord) {
    let message = record.message();
    if record.event.is_failure() {
        tracing::error!(target: "wakeprompt::telemetry", event = record.event.as_str(), "{}", message);
    } else {
        tracing::info!(target: "wakeprompt::telemetry", event = record.event.as_str(), "{}", message);
    }
}

/// Sink that writes records to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, record: TelemetryRecord) {
        trace_record(&record);
    }
}

/// Append-only JSON-lines log. Every record is also traced.
pub struct JsonlTelemetry {
    file: Mutex<File>,
}

impl JsonlTelemetry {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl TelemetrySink for JsonlTelemetry {
    fn record(&self, record: TelemetryRecord) {
        trace_record(&record);
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize telemetry record");
                return;
            }
        };
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(e) = writeln!(file, "{}", line) {
            tracing::warn!(error = %e, "Failed to append telemetry record");
        }
    }
}

/// Sink that keeps records in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.records().into_iter().map(|r| r.event).collect()
    }

    pub fn events_for(&self, id: Uuid) -> Vec<TelemetryEvent> {
        self.records()
            .into_iter()
            .filter(|r| r.alarm_id == Some(id))
            .map(|r| r.event)
            .collect()
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn record(&self, record: TelemetryRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

//! Collaborator interfaces the orchestrator is written against.
//!
//! Concrete adapters live in `wakeprompt-providers`, `wakeprompt-storage`,
//! and `wakeprompt-alarm`; tests substitute in-memory fakes.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{
    AuthorizationError, ProviderError, Result, SchedulingError, StorageError, StoreError,
};
use crate::types::{Alarm, AlarmRegistration, Voice};

/// Inputs for wake-up text generation besides the fire time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeTextContext {
    pub voice: Voice,
    pub user_prompt: Option<String>,
}

/// Produces a short wake-up message for an alarm.
#[async_trait]
pub trait WakeTextProvider: Send + Sync {
    async fn generate_wake_text(
        &self,
        fire_time: DateTime<Utc>,
        context: &WakeTextContext,
    ) -> std::result::Result<String, ProviderError>;
}

/// Turns text into spoken audio bytes.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Voice)
        -> std::result::Result<Vec<u8>, ProviderError>;
}

/// The OS alarm subsystem.
#[async_trait]
pub trait AlarmBackbone: Send + Sync {
    /// Ask for permission to schedule alarms. `Ok(false)` means denied.
    async fn request_authorization(&self) -> std::result::Result<bool, AuthorizationError>;

    /// Register an alarm. Scheduling an id that is already registered replaces it.
    async fn schedule_alarm(
        &self,
        registration: &AlarmRegistration,
    ) -> std::result::Result<(), SchedulingError>;

    /// Remove a registration. Best-effort; unknown ids are ignored.
    fn cancel_alarm(&self, id: Uuid);
}

/// Durable storage for generated audio blobs.
pub trait AudioStore: Send + Sync {
    /// Write a blob, replacing any existing one, and return its location.
    fn save(&self, bytes: &[u8], name: &str) -> std::result::Result<PathBuf, StorageError>;

    /// Remove a blob. Missing blobs are ignored.
    fn delete(&self, name: &str);

    /// Playback length of a stored blob in seconds.
    fn duration(&self, name: &str) -> std::result::Result<f64, StorageError>;

    fn exists(&self, name: &str) -> bool;
}

/// Holder of the single provider API key.
pub trait CredentialStore: Send + Sync {
    fn save(&self, secret: &str) -> std::result::Result<(), StoreError>;

    /// `None` when no credential is stored.
    fn load(&self) -> Option<String>;

    /// Remove the credential. Deleting an absent credential succeeds.
    fn delete(&self) -> std::result::Result<(), StoreError>;

    fn has_credential(&self) -> bool {
        self.load().is_some()
    }
}

/// Persistence handle for alarm records.
pub trait AlarmRepository: Send + Sync {
    /// Insert or replace the record with this id.
    fn save(&self, alarm: &Alarm) -> Result<()>;

    fn get(&self, id: Uuid) -> Result<Option<Alarm>>;

    /// All alarms, newest first.
    fn list(&self) -> Result<Vec<Alarm>>;

    /// Remove a record. Returns whether it existed.
    fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Save a credential entered by the user; blank input removes the stored one.
///
/// Returns whether a credential is stored afterwards.
pub fn apply_credential_input(
    store: &dyn CredentialStore,
    input: &str,
) -> std::result::Result<bool, StoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        store.delete()?;
        Ok(false)
    } else {
        store.save(trimmed)?;
        Ok(true)
    }
}

//! In-memory fakes for every orchestrator collaborator.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use wakeprompt_alarm::{Collaborators, Orchestrator};
use wakeprompt_core::error::{
    AuthorizationError, ProviderError, SchedulingError, StorageError, StoreError,
};
use wakeprompt_core::ports::{
    AlarmBackbone, AlarmRepository, AudioStore, CredentialStore, SpeechProvider,
    WakeTextContext, WakeTextProvider,
};
use wakeprompt_core::telemetry::MemoryTelemetry;
use wakeprompt_core::types::{Alarm, AlarmRegistration, AlarmState, Voice};
use wakeprompt_storage::{Database, SqliteAlarmRepository};

pub const WAKE_TEXT: &str = "Good morning! Today is yours. Get up and take it.";

// =============================================================================
// Providers
// =============================================================================

/// Text provider that replays scripted results, then succeeds.
#[derive(Default)]
pub struct FakeText {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeText {
    pub fn push(&self, result: Result<String, ProviderError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WakeTextProvider for FakeText {
    async fn generate_wake_text(
        &self,
        _fire_time: DateTime<Utc>,
        _context: &WakeTextContext,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(WAKE_TEXT.to_string()))
    }
}

/// Speech provider that replays scripted results, then returns fixed bytes.
#[derive(Default)]
pub struct FakeSpeech {
    script: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn push(&self, result: Result<Vec<u8>, ProviderError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn fail_always(&self, error: ProviderError) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..16 {
            script.push_back(Err(error.clone()));
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    async fn synthesize(&self, _text: &str, _voice: Voice) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(vec![7u8; 4_000]))
    }
}

// =============================================================================
// Backbone
// =============================================================================

/// Records registrations and the order of backbone calls.
pub struct FakeBackbone {
    authorization: Mutex<Result<bool, AuthorizationError>>,
    registrations: Mutex<HashMap<Uuid, AlarmRegistration>>,
    ops: Mutex<Vec<String>>,
    fail_primary: AtomicBool,
    fail_fallback: AtomicBool,
}

impl Default for FakeBackbone {
    fn default() -> Self {
        Self {
            authorization: Mutex::new(Ok(true)),
            registrations: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            fail_primary: AtomicBool::new(false),
            fail_fallback: AtomicBool::new(false),
        }
    }
}

impl FakeBackbone {
    pub fn set_authorization(&self, result: Result<bool, AuthorizationError>) {
        *self.authorization.lock().unwrap() = result;
    }

    pub fn fail_primary(&self, fail: bool) {
        self.fail_primary.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fallback(&self, fail: bool) {
        self.fail_fallback.store(fail, Ordering::SeqCst);
    }

    pub fn registration(&self, id: Uuid) -> Option<AlarmRegistration> {
        self.registrations.lock().unwrap().get(&id).cloned()
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }

    /// Backbone calls as `cancel` / `schedule:<mode>` strings.
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    /// Insert a registration directly, as if left over from an earlier process.
    pub fn inject(&self, registration: AlarmRegistration) {
        self.registrations
            .lock()
            .unwrap()
            .insert(registration.id, registration);
    }
}

#[async_trait]
impl AlarmBackbone for FakeBackbone {
    async fn request_authorization(&self) -> Result<bool, AuthorizationError> {
        self.authorization.lock().unwrap().clone()
    }

    async fn schedule_alarm(&self, registration: &AlarmRegistration) -> Result<(), SchedulingError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("schedule:{}", registration.mode));
        let fail = match registration.sound {
            Some(_) => self.fail_primary.load(Ordering::SeqCst),
            None => self.fail_fallback.load(Ordering::SeqCst),
        };
        if fail {
            return Err(SchedulingError::Failed("alarm service unavailable".to_string()));
        }
        self.registrations
            .lock()
            .unwrap()
            .insert(registration.id, registration.clone());
        Ok(())
    }

    fn cancel_alarm(&self, id: Uuid) {
        self.ops.lock().unwrap().push("cancel".to_string());
        self.registrations.lock().unwrap().remove(&id);
    }
}

// =============================================================================
// Stores
// =============================================================================

/// Audio blobs kept in a map. Duration is one second per thousand bytes.
#[derive(Default)]
pub struct MemoryAudio {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_save: AtomicBool,
}

impl MemoryAudio {
    pub fn fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn names(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    pub fn insert(&self, name: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
    }
}

impl AudioStore for MemoryAudio {
    fn save(&self, bytes: &[u8], name: &str) -> Result<PathBuf, StorageError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                name: name.to_string(),
                reason: "disk full".to_string(),
            });
        }
        self.insert(name, bytes);
        Ok(PathBuf::from("/sounds").join(name))
    }

    fn delete(&self, name: &str) {
        self.blobs.lock().unwrap().remove(name);
    }

    fn duration(&self, name: &str) -> Result<f64, StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .get(name)
            .map(|bytes| bytes.len() as f64 / 1000.0)
            .ok_or_else(|| StorageError::Read {
                name: name.to_string(),
                reason: "not found".to_string(),
            })
    }

    fn exists(&self, name: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(name)
    }
}

#[derive(Default)]
pub struct MemoryCredentials(Mutex<Option<String>>);

impl CredentialStore for MemoryCredentials {
    fn save(&self, secret: &str) -> Result<(), StoreError> {
        *self.0.lock().unwrap() = Some(secret.to_string());
        Ok(())
    }

    fn load(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }

    fn delete(&self) -> Result<(), StoreError> {
        *self.0.lock().unwrap() = None;
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub repository: Arc<SqliteAlarmRepository>,
    pub text: Arc<FakeText>,
    pub speech: Arc<FakeSpeech>,
    pub audio: Arc<MemoryAudio>,
    pub credentials: Arc<MemoryCredentials>,
    pub backbone: Arc<FakeBackbone>,
    pub telemetry: Arc<MemoryTelemetry>,
}

impl Harness {
    /// Everything succeeds and a credential is configured.
    pub fn new() -> Self {
        let speech = Arc::new(FakeSpeech::default());
        Self::build(speech.clone(), speech)
    }

    /// Use `speech` in place of the scripted speech fake.
    pub fn with_speech(speech: Arc<dyn SpeechProvider>) -> Self {
        Self::build(Arc::new(FakeSpeech::default()), speech)
    }

    fn build(fake_speech: Arc<FakeSpeech>, speech: Arc<dyn SpeechProvider>) -> Self {
        let db = Arc::new(Database::in_memory().unwrap());
        let repository = Arc::new(SqliteAlarmRepository::new(db));
        let text = Arc::new(FakeText::default());
        let audio = Arc::new(MemoryAudio::default());
        let credentials = Arc::new(MemoryCredentials::default());
        credentials.save("sk-test").unwrap();
        let backbone = Arc::new(FakeBackbone::default());
        let telemetry = Arc::new(MemoryTelemetry::new());

        let orchestrator = Arc::new(Orchestrator::new(Collaborators {
            repository: repository.clone(),
            text: text.clone(),
            speech,
            audio: audio.clone(),
            credentials: credentials.clone(),
            backbone: backbone.clone(),
            telemetry: telemetry.clone(),
        }));

        Self {
            orchestrator,
            repository,
            text,
            speech: fake_speech,
            audio,
            credentials,
            backbone,
            telemetry,
        }
    }

    /// A second orchestrator over the same fakes but a different repository.
    pub fn orchestrator_with(&self, repository: Arc<dyn AlarmRepository>) -> Orchestrator {
        Orchestrator::new(Collaborators {
            repository,
            text: self.text.clone(),
            speech: self.speech.clone(),
            audio: self.audio.clone(),
            credentials: self.credentials.clone(),
            backbone: self.backbone.clone(),
            telemetry: self.telemetry.clone(),
        })
    }

    pub fn stored(&self, id: Uuid) -> Alarm {
        self.repository.get(id).unwrap().expect("alarm is stored")
    }

    /// Filename set iff blob exists; registrations match the state.
    pub fn assert_consistent(&self, id: Uuid) {
        let alarm = self.stored(id);
        match alarm.artifacts.audio_filename() {
            Some(name) => assert!(self.audio.exists(name), "recorded blob {name} is missing"),
            None => assert!(
                !self.audio.exists(&alarm.audio_filename()),
                "blob exists without a recorded name"
            ),
        }
        let registered = self.backbone.registration(id).is_some();
        match alarm.state {
            AlarmState::Armed => assert!(registered, "armed alarm has no registration"),
            _ => assert!(!registered, "{} alarm is still registered", alarm.state),
        }
    }
}

/// Record stuck in `state`, last written `idle` ago.
pub fn stuck(state: AlarmState, idle: chrono::Duration) -> Alarm {
    let mut alarm = draft();
    alarm.state = state;
    alarm.updated_at = Utc::now() - idle;
    alarm
}

/// A draft alarm eight hours ahead.
pub fn draft() -> Alarm {
    Alarm::new(
        Utc::now() + chrono::Duration::hours(8),
        Voice::Coral,
        Some("Mention the sunrise".to_string()),
    )
}

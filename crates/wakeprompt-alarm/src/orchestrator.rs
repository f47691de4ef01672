//! Alarm orchestrator.
//!
//! Owns the alarm state machine and drives each alarm through text
//! generation, speech synthesis, audio persistence, and arming. Any failure
//! after the credential and permission guards diverts to a fallback alarm
//! with the system sound; only a failing fallback is terminal.
//!
//! Every step follows the same order: external resources first, then the
//! in-memory state change, then persistence (best-effort), then telemetry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use wakeprompt_core::error::{AuthorizationError, ConfigurationError, SchedulingError};
use wakeprompt_core::ports::{
    AlarmBackbone, AlarmRepository, AudioStore, CredentialStore, SpeechProvider,
    WakeTextContext, WakeTextProvider,
};
use wakeprompt_core::telemetry::{TelemetryEvent, TelemetryRecord, TelemetrySink};
use wakeprompt_core::types::{
    audio_filename_for, short_id, Alarm, AlarmMode, AlarmRegistration, AlarmState,
};

use crate::error::AlarmError;
use crate::gate::{RunGate, RunTicket};
use crate::state_machine::validate_transition;

/// Reason recorded on records found mid-pipeline at startup.
pub const INTERRUPTED_REASON: &str = "pipeline interrupted before completion";

/// How long an in-flight record may go without a write before it is treated
/// as left behind by a dead process. A live pipeline writes at every step,
/// and its slowest step is one provider call with all retries.
pub const INTERRUPTED_AFTER_SECS: i64 = 300;

/// Reason recorded when an armed alarm's audio disappeared while stopped.
pub const AUDIO_MISSING_REASON: &str = "primary audio missing after restart";

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn AlarmRepository>,
    pub text: Arc<dyn WakeTextProvider>,
    pub speech: Arc<dyn SpeechProvider>,
    pub audio: Arc<dyn AudioStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub backbone: Arc<dyn AlarmBackbone>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// What [`Orchestrator::recover`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records moved from an in-flight state to `error_blocked`.
    pub interrupted: Vec<Uuid>,
    /// Armed records registered again.
    pub rearmed: Vec<Uuid>,
    /// Armed records that could not be registered again.
    pub blocked: Vec<Uuid>,
    /// In-flight records written too recently to be considered orphaned.
    pub in_progress: Vec<Uuid>,
}

/// What [`Orchestrator::reconcile`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub registered: Vec<Uuid>,
    pub cancelled: Vec<Uuid>,
    pub interrupted: Vec<Uuid>,
    /// Alarms whose registration could not be brought up to date this pass.
    pub failed: Vec<Uuid>,
}

/// Outcome of one awaited step inside a run.
enum Step<T> {
    Done(T),
    Superseded,
}

pub struct Orchestrator {
    repository: Arc<dyn AlarmRepository>,
    text: Arc<dyn WakeTextProvider>,
    speech: Arc<dyn SpeechProvider>,
    audio: Arc<dyn AudioStore>,
    credentials: Arc<dyn CredentialStore>,
    backbone: Arc<dyn AlarmBackbone>,
    telemetry: Arc<dyn TelemetrySink>,
    gate: RunGate,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        let Collaborators {
            repository,
            text,
            speech,
            audio,
            credentials,
            backbone,
            telemetry,
        } = collaborators;
        Self {
            repository,
            text,
            speech,
            audio,
            credentials,
            backbone,
            telemetry,
            gate: RunGate::new(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, id: Uuid) -> Result<Option<Alarm>, AlarmError> {
        Ok(self.repository.get(id)?)
    }

    /// All alarms, newest first.
    pub fn list(&self) -> Result<Vec<Alarm>, AlarmError> {
        Ok(self.repository.list()?)
    }

    // =========================================================================
    // User operations
    // =========================================================================

    /// Store a new draft alarm and run the pipeline on it.
    ///
    /// Returns the alarm in its final state (`armed` or `error_blocked`).
    pub async fn save_alarm(&self, mut alarm: Alarm) -> Result<Alarm, AlarmError> {
        if alarm.state != AlarmState::Draft {
            return Err(AlarmError::NotDraft(alarm.state));
        }
        let mut ticket = self.gate.begin(alarm.id).await;

        // The first write is not best-effort: without it there is no record
        // for later operations to find.
        alarm.updated_at = Utc::now();
        self.repository.save(&alarm)?;
        self.emit(
            TelemetryRecord::new(TelemetryEvent::AlarmCreated)
                .alarm(alarm.id)
                .field("fire_time", alarm.fire_time.to_rfc3339())
                .field("voice", alarm.voice.as_str()),
        );

        self.run_pipeline(&mut ticket, alarm).await
    }

    /// Release everything the alarm holds, reset it to draft, and run again.
    ///
    /// A newer operation on the same alarm supersedes a regenerate that is
    /// still running; only the newest one finishes.
    pub async fn regenerate(&self, id: Uuid) -> Result<Alarm, AlarmError> {
        let mut ticket = self.gate.begin(id).await;
        let mut alarm = self.load(id)?;

        self.release_resources(&mut alarm);
        self.transition(&mut alarm, AlarmState::Draft)?;
        alarm.reset_to_draft();
        alarm.enabled = true;
        self.persist(&mut alarm);
        info!(alarm = %alarm.short_id(), "Regenerating alarm");

        self.run_pipeline(&mut ticket, alarm).await
    }

    /// Disable the alarm and release its registration and audio. The record is kept.
    pub async fn cancel(&self, id: Uuid) -> Result<Alarm, AlarmError> {
        let _ticket = self.gate.begin(id).await;
        let mut alarm = self.load(id)?;

        self.release_resources(&mut alarm);
        self.transition(&mut alarm, AlarmState::Completed)?;
        alarm.enabled = false;
        self.persist(&mut alarm);
        self.emit(TelemetryRecord::new(TelemetryEvent::AlarmCancelled).alarm(id));
        Ok(alarm)
    }

    /// Release all external resources and remove the record.
    ///
    /// Safe in any state and for unknown ids. Returns whether a record existed.
    pub async fn delete(&self, id: Uuid) -> Result<bool, AlarmError> {
        let _ticket = self.gate.begin(id).await;

        if let Some(mut alarm) = self.repository.get(id)? {
            self.release_resources(&mut alarm);
        } else {
            self.backbone.cancel_alarm(id);
            self.audio.delete(&audio_filename_for(id));
        }

        let existed = self.repository.delete(id)?;
        if existed {
            self.emit(TelemetryRecord::new(TelemetryEvent::AlarmDeleted).alarm(id));
        }
        Ok(existed)
    }

    /// Note that an armed alarm went off. The state stays `armed`.
    ///
    /// Returns `None` when the firing was ignored because the alarm is no
    /// longer armed, e.g. it was cancelled or regenerated in the meantime.
    pub async fn record_fired(
        &self,
        id: Uuid,
        mode: AlarmMode,
    ) -> Result<Option<Alarm>, AlarmError> {
        let _ticket = self.gate.enter(id).await;
        let Some(mut alarm) = self.repository.get(id)? else {
            warn!(alarm = %short_id(id), "Ignoring firing for unknown alarm");
            return Ok(None);
        };

        if alarm.state != AlarmState::Armed {
            warn!(alarm = %alarm.short_id(), state = %alarm.state, "Ignoring firing for alarm that is not armed");
            return Ok(None);
        }

        alarm.fired_mode = Some(mode);
        self.persist(&mut alarm);
        let event = match mode {
            AlarmMode::Primary => TelemetryEvent::AlarmFiredPrimary,
            AlarmMode::Fallback => TelemetryEvent::AlarmFiredFallback,
        };
        self.emit(TelemetryRecord::new(event).alarm(id).field("mode", mode.to_string()));
        Ok(Some(alarm))
    }

    /// Reconcile persisted records with the backbone after a restart.
    ///
    /// Records left mid-pipeline for longer than [`INTERRUPTED_AFTER_SECS`]
    /// are blocked after their stray audio and registration are released;
    /// younger ones may belong to a pipeline still running in another
    /// process and are left alone. Armed alarms that are still ahead are
    /// registered again, with the custom sound only if its blob survived.
    pub async fn recover(&self) -> Result<RecoveryReport, AlarmError> {
        let mut report = RecoveryReport::default();
        let now = Utc::now();

        for alarm in self.repository.list()? {
            let id = alarm.id;
            let mut ticket = self.gate.begin(id).await;
            // Re-read under the lock.
            let Some(mut alarm) = self.repository.get(id)? else {
                continue;
            };

            if alarm.state.is_in_flight() {
                if is_orphaned(&alarm, now) {
                    self.block_interrupted(&mut alarm)?;
                    report.interrupted.push(id);
                } else {
                    debug!(alarm = %alarm.short_id(), state = %alarm.state, "Leaving recent in-flight alarm alone");
                    report.in_progress.push(id);
                }
            } else if alarm.state == AlarmState::Armed && alarm.enabled && alarm.fire_time > now {
                match self.reregister(&mut ticket, alarm).await? {
                    Step::Done(alarm) if alarm.state == AlarmState::Armed => report.rearmed.push(id),
                    Step::Done(_) => report.blocked.push(id),
                    Step::Superseded => {}
                }
            }
        }

        info!(
            interrupted = report.interrupted.len(),
            in_progress = report.in_progress.len(),
            rearmed = report.rearmed.len(),
            blocked = report.blocked.len(),
            "Recovery finished"
        );
        Ok(report)
    }

    /// Bring the backbone in line with records changed by other processes.
    ///
    /// `registrations` is what the backbone currently holds. Armed alarms
    /// without an up-to-date registration are registered again, and
    /// registrations whose alarm was cancelled, deleted, or no longer rings
    /// are cancelled. Orphaned in-flight records are blocked as in
    /// [`recover`](Self::recover). A failure on one alarm is logged and the
    /// pass carries on with the rest.
    pub async fn reconcile(
        &self,
        registrations: Vec<AlarmRegistration>,
    ) -> Result<ReconcileReport, AlarmError> {
        let mut report = ReconcileReport::default();
        let now = Utc::now();
        let mut registered: HashMap<Uuid, AlarmRegistration> =
            registrations.into_iter().map(|r| (r.id, r)).collect();

        for alarm in self.repository.list()? {
            let id = alarm.id;
            let current = registered.remove(&id);

            if alarm.state.is_in_flight() {
                if is_orphaned(&alarm, now) {
                    match self.interrupt(id, now).await {
                        Ok(true) => report.interrupted.push(id),
                        Ok(false) => {}
                        Err(e) => {
                            warn!(alarm = %alarm.short_id(), error = %e, "Failed to block interrupted alarm");
                            report.failed.push(id);
                        }
                    }
                }
                continue;
            }

            let should_ring =
                alarm.state == AlarmState::Armed && alarm.enabled && alarm.fire_time > now;
            if !should_ring {
                if current.is_some() {
                    self.backbone.cancel_alarm(id);
                    report.cancelled.push(id);
                }
                continue;
            }

            // Stored times keep millisecond precision.
            let up_to_date = current.is_some_and(|r| {
                r.fire_time.timestamp_millis() == alarm.fire_time.timestamp_millis()
                    && r.sound.as_deref() == alarm.artifacts.audio_filename()
            });
            if up_to_date {
                continue;
            }
            debug!(alarm = %alarm.short_id(), "Registering alarm armed elsewhere");
            match self.rearm(id).await {
                Ok(alarm) if alarm.state == AlarmState::Armed => report.registered.push(id),
                Ok(_) => report.failed.push(id),
                Err(e) => {
                    warn!(alarm = %alarm.short_id(), error = %e, "Failed to register alarm");
                    report.failed.push(id);
                }
            }
        }

        // Registrations with no record left.
        for id in registered.into_keys() {
            self.backbone.cancel_alarm(id);
            report.cancelled.push(id);
        }

        if report != ReconcileReport::default() {
            info!(
                registered = report.registered.len(),
                cancelled = report.cancelled.len(),
                interrupted = report.interrupted.len(),
                failed = report.failed.len(),
                "Reconciliation finished"
            );
        }
        Ok(report)
    }

    /// Register one armed alarm with the backbone again.
    ///
    /// Used when the backbone lost its registrations, e.g. an alarm armed by
    /// another process. Alarms that are not armed, disabled, or already due
    /// are returned unchanged.
    pub async fn rearm(&self, id: Uuid) -> Result<Alarm, AlarmError> {
        let mut ticket = self.gate.begin(id).await;
        let alarm = self.load(id)?;
        if alarm.state != AlarmState::Armed || !alarm.enabled || alarm.fire_time <= Utc::now() {
            return Ok(alarm);
        }
        match self.reregister(&mut ticket, alarm).await? {
            Step::Done(alarm) => Ok(alarm),
            Step::Superseded => Err(AlarmError::Superseded(id)),
        }
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    async fn run_pipeline(&self, ticket: &mut RunTicket<'_>, mut alarm: Alarm) -> Result<Alarm, AlarmError> {
        let id = alarm.id;

        // Guard: credential present.
        if !self.credentials.has_credential() {
            let reason = ConfigurationError::MissingCredential.to_string();
            self.block(&mut alarm, reason, TelemetryEvent::AlarmCreateBlockedNoCredential)?;
            return Ok(alarm);
        }

        // Guard: scheduling permission.
        let Some(authorization) = ticket.run(self.backbone.request_authorization()).await else {
            return Err(AlarmError::Superseded(id));
        };
        let authorization = match authorization {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthorizationError::Denied),
            Err(e) => Err(e),
        };
        if let Err(e) = authorization {
            self.block(&mut alarm, e.to_string(), TelemetryEvent::PermissionDenied)?;
            return Ok(alarm);
        }

        // Text generation.
        self.transition(&mut alarm, AlarmState::GeneratingText)?;
        self.persist(&mut alarm);
        self.emit(TelemetryRecord::new(TelemetryEvent::TextGenStarted).alarm(id));

        let context = WakeTextContext {
            voice: alarm.voice,
            user_prompt: alarm.prompt.clone(),
        };
        let Some(text) = ticket
            .run(self.text.generate_wake_text(alarm.fire_time, &context))
            .await
        else {
            return Err(AlarmError::Superseded(id));
        };
        let text = match text {
            Ok(text) => text,
            Err(e) => {
                self.emit(
                    TelemetryRecord::new(TelemetryEvent::TextGenFailed)
                        .alarm(id)
                        .field("error", e.to_string()),
                );
                return self
                    .arm_fallback(ticket, alarm, format!("text generation failed: {}", e))
                    .await;
            }
        };
        alarm.artifacts.record_text(text.clone());
        self.persist(&mut alarm);
        self.emit(
            TelemetryRecord::new(TelemetryEvent::TextGenCompleted)
                .alarm(id)
                .field("chars", text.chars().count().to_string()),
        );

        // Speech synthesis.
        self.transition(&mut alarm, AlarmState::GeneratingAudio)?;
        self.persist(&mut alarm);
        self.emit(TelemetryRecord::new(TelemetryEvent::TtsStarted).alarm(id));

        let Some(audio) = ticket.run(self.speech.synthesize(&text, alarm.voice)).await else {
            return Err(AlarmError::Superseded(id));
        };
        let audio = match audio {
            Ok(audio) => audio,
            Err(e) => {
                self.emit(
                    TelemetryRecord::new(TelemetryEvent::TtsFailed)
                        .alarm(id)
                        .field("error", e.to_string()),
                );
                return self
                    .arm_fallback(ticket, alarm, format!("speech synthesis failed: {}", e))
                    .await;
            }
        };
        self.emit(
            TelemetryRecord::new(TelemetryEvent::TtsCompleted)
                .alarm(id)
                .field("bytes", audio.len().to_string()),
        );

        // Primary arming.
        self.transition(&mut alarm, AlarmState::ArmingPrimaryAlarm)?;
        self.persist(&mut alarm);
        self.arm_primary(ticket, alarm, &audio).await
    }

    async fn arm_primary(
        &self,
        ticket: &mut RunTicket<'_>,
        mut alarm: Alarm,
        audio: &[u8],
    ) -> Result<Alarm, AlarmError> {
        let id = alarm.id;
        if !ticket.is_current() {
            return Err(AlarmError::Superseded(id));
        }

        let name = alarm.audio_filename();
        if let Err(e) = self.audio.save(audio, &name) {
            return self
                .arm_fallback(ticket, alarm, format!("primary scheduling failed: {}", e))
                .await;
        }
        let duration = match self.audio.duration(&name) {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!(alarm = %alarm.short_id(), error = %e, "Could not determine audio duration");
                None
            }
        };
        alarm.artifacts.record_audio(name.clone(), duration, Utc::now());
        self.persist(&mut alarm);

        let registration = AlarmRegistration::primary(id, alarm.fire_time, name.clone());
        match self.schedule(ticket, &registration).await {
            Step::Superseded => {
                // The blob is on the record; whoever superseded us releases it.
                self.backbone.cancel_alarm(id);
                Err(AlarmError::Superseded(id))
            }
            Step::Done(Err(e)) => {
                self.audio.delete(&name);
                alarm.artifacts.clear_audio();
                self.persist(&mut alarm);
                self.arm_fallback(ticket, alarm, format!("primary scheduling failed: {}", e))
                    .await
            }
            Step::Done(Ok(())) => {
                self.transition(&mut alarm, AlarmState::Armed)?;
                alarm.failure_reason = None;
                alarm.fired_mode = None;
                self.persist(&mut alarm);
                let mut record = TelemetryRecord::new(TelemetryEvent::PrimaryArmed)
                    .alarm(id)
                    .field("mode", AlarmMode::Primary.to_string());
                if let Some(secs) = duration {
                    record = record.field("duration_secs", format!("{:.1}", secs));
                }
                self.emit(record);
                Ok(alarm)
            }
        }
    }

    async fn arm_fallback(
        &self,
        ticket: &mut RunTicket<'_>,
        mut alarm: Alarm,
        reason: String,
    ) -> Result<Alarm, AlarmError> {
        let id = alarm.id;
        if !ticket.is_current() {
            return Err(AlarmError::Superseded(id));
        }
        warn!(alarm = %alarm.short_id(), reason = %reason, "Arming fallback alarm");

        self.transition(&mut alarm, AlarmState::ArmingFallbackAlarm)?;
        alarm.failure_reason = Some(reason.clone());
        self.persist(&mut alarm);

        let registration = AlarmRegistration::fallback(id, alarm.fire_time);
        match self.schedule(ticket, &registration).await {
            Step::Superseded => {
                self.backbone.cancel_alarm(id);
                Err(AlarmError::Superseded(id))
            }
            Step::Done(Err(e)) => {
                self.backbone.cancel_alarm(id);
                let reason = format!("fallback scheduling also failed: {}", e);
                self.transition(&mut alarm, AlarmState::ErrorBlocked)?;
                alarm.failure_reason = Some(reason.clone());
                self.persist(&mut alarm);
                self.emit(
                    TelemetryRecord::new(TelemetryEvent::FallbackArmFailed)
                        .alarm(id)
                        .field("reason", reason),
                );
                Ok(alarm)
            }
            Step::Done(Ok(())) => {
                self.transition(&mut alarm, AlarmState::Armed)?;
                self.persist(&mut alarm);
                self.emit(
                    TelemetryRecord::new(TelemetryEvent::FallbackArmed)
                        .alarm(id)
                        .field("mode", AlarmMode::Fallback.to_string())
                        .field("reason", reason),
                );
                Ok(alarm)
            }
        }
    }

    /// Register an armed alarm again after a restart.
    async fn reregister(
        &self,
        ticket: &mut RunTicket<'_>,
        mut alarm: Alarm,
    ) -> Result<Step<Alarm>, AlarmError> {
        let id = alarm.id;
        let sound = alarm
            .artifacts
            .audio_filename()
            .map(str::to_string)
            .filter(|name| self.audio.exists(name));

        let failure = match sound {
            Some(name) => {
                let registration = AlarmRegistration::primary(id, alarm.fire_time, name.clone());
                match self.schedule(ticket, &registration).await {
                    Step::Superseded => return Ok(Step::Superseded),
                    Step::Done(Ok(())) => {
                        self.emit(
                            TelemetryRecord::new(TelemetryEvent::PrimaryArmed)
                                .alarm(id)
                                .field("mode", AlarmMode::Primary.to_string()),
                        );
                        return Ok(Step::Done(alarm));
                    }
                    Step::Done(Err(e)) => {
                        self.audio.delete(&name);
                        Some(format!("primary scheduling failed: {}", e))
                    }
                }
            }
            None if alarm.artifacts.audio_filename().is_some() => {
                Some(AUDIO_MISSING_REASON.to_string())
            }
            None => None,
        };

        if let Some(reason) = failure {
            alarm.artifacts.clear_audio();
            alarm.failure_reason = Some(reason);
            self.persist(&mut alarm);
        }

        let registration = AlarmRegistration::fallback(id, alarm.fire_time);
        match self.schedule(ticket, &registration).await {
            Step::Superseded => Ok(Step::Superseded),
            Step::Done(Ok(())) => {
                self.emit(
                    TelemetryRecord::new(TelemetryEvent::FallbackArmed)
                        .alarm(id)
                        .field("mode", AlarmMode::Fallback.to_string())
                        .field("reason", alarm.failure_reason.clone().unwrap_or_default()),
                );
                Ok(Step::Done(alarm))
            }
            Step::Done(Err(e)) => {
                self.backbone.cancel_alarm(id);
                let reason = format!("fallback scheduling also failed: {}", e);
                self.transition(&mut alarm, AlarmState::ErrorBlocked)?;
                alarm.failure_reason = Some(reason.clone());
                self.persist(&mut alarm);
                self.emit(
                    TelemetryRecord::new(TelemetryEvent::FallbackArmFailed)
                        .alarm(id)
                        .field("reason", reason),
                );
                Ok(Step::Done(alarm))
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Cancel any prior registration, then schedule `registration`.
    async fn schedule(
        &self,
        ticket: &mut RunTicket<'_>,
        registration: &AlarmRegistration,
    ) -> Step<Result<(), SchedulingError>> {
        self.backbone.cancel_alarm(registration.id);
        let result = ticket.run(self.backbone.schedule_alarm(registration)).await;
        match result {
            Some(result) if ticket.is_current() => Step::Done(result),
            _ => Step::Superseded,
        }
    }

    /// Stop at a pre-pipeline guard.
    fn block(
        &self,
        alarm: &mut Alarm,
        reason: String,
        event: TelemetryEvent,
    ) -> Result<(), AlarmError> {
        self.backbone.cancel_alarm(alarm.id);
        self.transition(alarm, AlarmState::ErrorBlocked)?;
        alarm.failure_reason = Some(reason.clone());
        self.persist(alarm);
        self.emit(TelemetryRecord::new(event).alarm(alarm.id).field("reason", reason));
        Ok(())
    }

    /// Block an orphaned in-flight record if it is still one under the lock.
    async fn interrupt(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AlarmError> {
        let _ticket = self.gate.enter(id).await;
        let Some(mut alarm) = self.repository.get(id)? else {
            return Ok(false);
        };
        if !alarm.state.is_in_flight() || !is_orphaned(&alarm, now) {
            return Ok(false);
        }
        self.block_interrupted(&mut alarm)?;
        Ok(true)
    }

    fn block_interrupted(&self, alarm: &mut Alarm) -> Result<(), AlarmError> {
        self.release_resources(alarm);
        self.transition(alarm, AlarmState::ErrorBlocked)?;
        alarm.failure_reason = Some(INTERRUPTED_REASON.to_string());
        self.persist(alarm);
        warn!(alarm = %alarm.short_id(), "Blocked alarm interrupted mid-pipeline");
        Ok(())
    }

    /// Drop the registration and the audio blob, blob before name.
    fn release_resources(&self, alarm: &mut Alarm) {
        self.backbone.cancel_alarm(alarm.id);
        let expected = alarm.audio_filename();
        if let Some(name) = alarm.artifacts.audio_filename().map(str::to_string) {
            if name != expected {
                self.audio.delete(&name);
            }
        }
        // The deterministic name covers blobs an interrupted run never recorded.
        self.audio.delete(&expected);
        alarm.artifacts.clear_audio();
    }

    fn transition(&self, alarm: &mut Alarm, to: AlarmState) -> Result<(), AlarmError> {
        validate_transition(alarm.state, to)?;
        debug!(alarm = %alarm.short_id(), from = %alarm.state, to = %to, "State transition");
        alarm.state = to;
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<Alarm, AlarmError> {
        self.repository.get(id)?.ok_or(AlarmError::NotFound(id))
    }

    /// Best-effort write; failures are logged and the pipeline continues.
    fn persist(&self, alarm: &mut Alarm) {
        alarm.updated_at = Utc::now();
        if let Err(e) = self.repository.save(alarm) {
            warn!(alarm = %alarm.short_id(), state = %alarm.state, error = %e, "Failed to persist alarm");
        }
    }

    fn emit(&self, record: TelemetryRecord) {
        self.telemetry.record(record);
    }
}

/// Whether an in-flight record has gone quiet for too long to have a live pipeline.
fn is_orphaned(alarm: &Alarm, now: DateTime<Utc>) -> bool {
    now - alarm.updated_at >= Duration::seconds(INTERRUPTED_AFTER_SECS)
}

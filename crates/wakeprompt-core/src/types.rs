use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Extension used for every generated wake sound.
pub const AUDIO_EXTENSION: &str = "wav";

/// User prompt sent to the text provider when the alarm has none.
pub const DEFAULT_USER_PROMPT: &str = "Generate my wake-up message.";

/// Registration label for an alarm carrying generated audio.
pub const PRIMARY_LABEL: &str = "AI Alarm";

/// Registration label for an alarm carrying the system sound.
pub const FALLBACK_LABEL: &str = "AI Alarm (Fallback)";

// =============================================================================
// Enums
// =============================================================================

/// Voices offered by the speech provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    Alloy,
    Ash,
    #[default]
    Coral,
    Echo,
    Fable,
    Nova,
    Onyx,
    Sage,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 9] = [
        Voice::Alloy,
        Voice::Ash,
        Voice::Coral,
        Voice::Echo,
        Voice::Fable,
        Voice::Nova,
        Voice::Onyx,
        Voice::Sage,
        Voice::Shimmer,
    ];

    /// Identifier sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Ash => "ash",
            Voice::Coral => "coral",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Nova => "nova",
            Voice::Onyx => "onyx",
            Voice::Sage => "sage",
            Voice::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Voice {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Voice::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| format!("Unknown voice: {}", s))
    }
}

/// Pipeline state of an alarm.
///
/// ```text
/// draft -> generating_text -> generating_audio -> arming_primary_alarm -> armed
///                  \                 \                    \
///                   +-----------------+--------------------+-> arming_fallback_alarm -> armed
///                                                                        \-> error_blocked
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Draft,
    GeneratingText,
    GeneratingAudio,
    ArmingPrimaryAlarm,
    ArmingFallbackAlarm,
    Armed,
    Completed,
    ErrorBlocked,
}

impl AlarmState {
    pub const ALL: [AlarmState; 8] = [
        AlarmState::Draft,
        AlarmState::GeneratingText,
        AlarmState::GeneratingAudio,
        AlarmState::ArmingPrimaryAlarm,
        AlarmState::ArmingFallbackAlarm,
        AlarmState::Armed,
        AlarmState::Completed,
        AlarmState::ErrorBlocked,
    ];

    /// The pipeline never continues on its own from these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlarmState::Completed | AlarmState::ErrorBlocked)
    }

    pub fn is_generating(&self) -> bool {
        matches!(self, AlarmState::GeneratingText | AlarmState::GeneratingAudio)
    }

    /// A pipeline run is (or was, if interrupted) between two steps.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            AlarmState::GeneratingText
                | AlarmState::GeneratingAudio
                | AlarmState::ArmingPrimaryAlarm
                | AlarmState::ArmingFallbackAlarm
        )
    }

    /// States from which regenerate / cancel / delete are offered to the user.
    pub fn accepts_user_action(&self) -> bool {
        matches!(
            self,
            AlarmState::Armed | AlarmState::Completed | AlarmState::ErrorBlocked
        )
    }

    /// Short label for alarm lists and detail views.
    pub fn label(&self) -> &'static str {
        match self {
            AlarmState::Draft => "Draft",
            AlarmState::GeneratingText => "Generating text…",
            AlarmState::GeneratingAudio => "Generating audio…",
            AlarmState::ArmingPrimaryAlarm => "Arming…",
            AlarmState::ArmingFallbackAlarm => "Arming fallback…",
            AlarmState::Armed => "Armed",
            AlarmState::Completed => "Completed",
            AlarmState::ErrorBlocked => "Error",
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmState::Draft => write!(f, "draft"),
            AlarmState::GeneratingText => write!(f, "generating_text"),
            AlarmState::GeneratingAudio => write!(f, "generating_audio"),
            AlarmState::ArmingPrimaryAlarm => write!(f, "arming_primary_alarm"),
            AlarmState::ArmingFallbackAlarm => write!(f, "arming_fallback_alarm"),
            AlarmState::Armed => write!(f, "armed"),
            AlarmState::Completed => write!(f, "completed"),
            AlarmState::ErrorBlocked => write!(f, "error_blocked"),
        }
    }
}

impl std::str::FromStr for AlarmState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AlarmState::Draft),
            "generating_text" => Ok(AlarmState::GeneratingText),
            "generating_audio" => Ok(AlarmState::GeneratingAudio),
            "arming_primary_alarm" => Ok(AlarmState::ArmingPrimaryAlarm),
            "arming_fallback_alarm" => Ok(AlarmState::ArmingFallbackAlarm),
            "armed" => Ok(AlarmState::Armed),
            "completed" => Ok(AlarmState::Completed),
            "error_blocked" => Ok(AlarmState::ErrorBlocked),
            _ => Err(format!("Unknown alarm state: {}", s)),
        }
    }
}

/// Which sound an alarm was armed (or fired) with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmMode {
    /// Generated voice message.
    Primary,
    /// System default sound.
    Fallback,
}

impl AlarmMode {
    pub fn label(&self) -> &'static str {
        match self {
            AlarmMode::Primary => PRIMARY_LABEL,
            AlarmMode::Fallback => FALLBACK_LABEL,
        }
    }
}

impl fmt::Display for AlarmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmMode::Primary => write!(f, "primary"),
            AlarmMode::Fallback => write!(f, "fallback"),
        }
    }
}

impl std::str::FromStr for AlarmMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(AlarmMode::Primary),
            "fallback" => Ok(AlarmMode::Fallback),
            _ => Err(format!("Unknown alarm mode: {}", s)),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// Outputs of the generation steps.
///
/// Fields are only changed through the methods below so that the audio
/// filename, its duration, and the generation timestamp move together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationArtifacts {
    text: Option<String>,
    audio_filename: Option<String>,
    audio_duration_secs: Option<f64>,
    last_generated_at: Option<DateTime<Utc>>,
}

impl GenerationArtifacts {
    /// Rebuild artifacts read back from persistence.
    pub fn restore(
        text: Option<String>,
        audio_filename: Option<String>,
        audio_duration_secs: Option<f64>,
        last_generated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            text,
            audio_filename,
            audio_duration_secs,
            last_generated_at,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn audio_filename(&self) -> Option<&str> {
        self.audio_filename.as_deref()
    }

    pub fn audio_duration_secs(&self) -> Option<f64> {
        self.audio_duration_secs
    }

    pub fn last_generated_at(&self) -> Option<DateTime<Utc>> {
        self.last_generated_at
    }

    pub fn record_text(&mut self, text: String) {
        self.text = Some(text);
    }

    /// Record a blob that has already been written to the audio store.
    pub fn record_audio(
        &mut self,
        filename: String,
        duration_secs: Option<f64>,
        generated_at: DateTime<Utc>,
    ) {
        self.audio_filename = Some(filename);
        self.audio_duration_secs = duration_secs;
        self.last_generated_at = Some(generated_at);
    }

    /// Forget the audio reference. The caller deletes the blob first.
    pub fn clear_audio(&mut self) -> Option<String> {
        self.audio_duration_secs = None;
        self.audio_filename.take()
    }

    /// Drop text, audio, and duration. The generation timestamp is kept as history.
    pub fn clear(&mut self) {
        self.text = None;
        self.audio_filename = None;
        self.audio_duration_secs = None;
    }
}

/// The central alarm record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: Uuid,
    pub fire_time: DateTime<Utc>,
    pub voice: Voice,
    pub prompt: Option<String>,
    pub enabled: bool,
    pub state: AlarmState,
    pub artifacts: GenerationArtifacts,
    pub fired_mode: Option<AlarmMode>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Time of the last persisted change.
    pub updated_at: DateTime<Utc>,
}

impl Alarm {
    /// Create a draft alarm. Blank prompts are stored as `None`.
    pub fn new(fire_time: DateTime<Utc>, voice: Voice, prompt: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            fire_time,
            voice,
            prompt: normalize_prompt(prompt),
            enabled: true,
            state: AlarmState::Draft,
            artifacts: GenerationArtifacts::default(),
            fired_mode: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Blob name the generated audio is stored under.
    pub fn audio_filename(&self) -> String {
        audio_filename_for(self.id)
    }

    /// First eight hex characters of the id, used in logs.
    pub fn short_id(&self) -> String {
        short_id(self.id)
    }

    /// Prompt sent to the text provider.
    pub fn effective_prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_USER_PROMPT)
    }

    /// Whether the presentation layer should show a fallback/error indicator.
    pub fn is_degraded(&self) -> bool {
        self.failure_reason.is_some()
    }

    /// Clear everything a pipeline run produces and return to `Draft`.
    ///
    /// The caller releases the audio blob and OS registration beforehand.
    pub fn reset_to_draft(&mut self) {
        self.state = AlarmState::Draft;
        self.artifacts.clear();
        self.failure_reason = None;
        self.fired_mode = None;
    }
}

fn normalize_prompt(prompt: Option<String>) -> Option<String> {
    prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

/// First eight lowercase hex characters of an alarm id.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Deterministic audio blob name for an alarm: `ai_alarm_<8 hex>.wav`.
pub fn audio_filename_for(id: Uuid) -> String {
    format!("ai_alarm_{}.{}", short_id(id), AUDIO_EXTENSION)
}

/// A request to the scheduler backbone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRegistration {
    pub id: Uuid,
    pub fire_time: DateTime<Utc>,
    /// Custom sound blob name; `None` means the system default sound.
    pub sound: Option<String>,
    pub label: String,
    pub mode: AlarmMode,
}

impl AlarmRegistration {
    pub fn primary(id: Uuid, fire_time: DateTime<Utc>, sound: String) -> Self {
        Self {
            id,
            fire_time,
            sound: Some(sound),
            label: PRIMARY_LABEL.to_string(),
            mode: AlarmMode::Primary,
        }
    }

    pub fn fallback(id: Uuid, fire_time: DateTime<Utc>) -> Self {
        Self {
            id,
            fire_time,
            sound: None,
            label: FALLBACK_LABEL.to_string(),
            mode: AlarmMode::Fallback,
        }
    }
}

/// Notification from the backbone that an armed alarm went off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmFiring {
    pub id: Uuid,
    pub mode: AlarmMode,
    pub fired_at: DateTime<Utc>,
}

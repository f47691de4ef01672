use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, WakepromptError};
use crate::types::Voice;

/// Top-level configuration for Wakeprompt.
///
/// Loaded from `~/.wakeprompt/config.toml` by default. Missing sections and
/// fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WakepromptConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
}

impl WakepromptConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WakepromptConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.provider.max_attempts == 0 {
            return Err(WakepromptError::Config(
                "provider.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(WakepromptError::Config(
                "provider.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(WakepromptError::Config(format!(
                "provider.temperature {} is outside 0.0..=2.0",
                self.provider.temperature
            )));
        }
        if self.provider.api_base_url.trim().is_empty() {
            return Err(WakepromptError::Config(
                "provider.api_base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Data directory with a leading `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Directory generated wake sounds are written to.
    pub fn sounds_dir(&self) -> PathBuf {
        match &self.alarm.sounds_dir {
            Some(dir) => expand_home(dir),
            None => self.data_dir().join("sounds"),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("alarms.db")
    }

    pub fn credential_path(&self) -> PathBuf {
        self.data_dir().join("credential")
    }

    pub fn telemetry_path(&self) -> PathBuf {
        self.data_dir().join("telemetry.jsonl")
    }
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the alarm database, sounds, and telemetry log.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.wakeprompt/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Text and speech provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL; `/chat/completions` and `/audio/speech` are appended.
    pub api_base_url: String,
    pub text_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub speech_model: String,
    /// Per-attempt request timeout.
    pub request_timeout_secs: u64,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            temperature: 0.9,
            max_tokens: 200,
            speech_model: "tts-1".to_string(),
            request_timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

impl ProviderConfig {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base_url.trim_end_matches('/'))
    }

    pub fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.api_base_url.trim_end_matches('/'))
    }
}

/// Alarm behaviour settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Voice used when an alarm is created without one.
    pub default_voice: Voice,
    /// Whether the local alarm backbone grants scheduling permission.
    pub permission_granted: bool,
    /// Override for the sounds directory.
    pub sounds_dir: Option<String>,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            default_voice: Voice::Coral,
            permission_granted: true,
            sounds_dir: None,
        }
    }
}

/// Expand a leading `~` using `HOME` (or `USERPROFILE` on Windows).
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix('~')) {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
        if let Ok(home) = home {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

use thiserror::Error;

/// Top-level error type for Wakeprompt infrastructure.
///
/// The pipeline-facing taxonomy lives in the smaller enums below; this type
/// covers configuration files, the alarm database, and plumbing I/O.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WakepromptError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Credential store error: {0}")]
    Credential(#[from] StoreError),

    #[error("Audio store error: {0}")]
    Audio(#[from] StorageError),
}

impl From<toml::de::Error> for WakepromptError {
    fn from(err: toml::de::Error) -> Self {
        WakepromptError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for WakepromptError {
    fn from(err: toml::ser::Error) -> Self {
        WakepromptError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for WakepromptError {
    fn from(err: serde_json::Error) -> Self {
        WakepromptError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Wakeprompt operations.
pub type Result<T> = std::result::Result<T, WakepromptError>;

/// The pipeline cannot start because required configuration is absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("No API credential configured")]
    MissingCredential,
}

/// The OS alarm subsystem refused or could not answer a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("Alarm permission denied")]
    Denied,
    #[error("Alarm authorization unavailable: {0}")]
    Unavailable(String),
}

/// Failures from the text and speech providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("API credential not configured")]
    MissingCredential,
    #[error("API credential is invalid")]
    InvalidCredential,
    #[error("Provider rate limit exceeded")]
    RateLimited,
    #[error("Provider server error ({0})")]
    Server(u16),
    #[error("Provider HTTP error ({0})")]
    Http(u16),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::Server(_) | ProviderError::Transport(_)
        )
    }
}

/// Failures writing or reading audio blobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Failed to create sounds directory: {0}")]
    Directory(String),
    #[error("Failed to write audio file {name}: {reason}")]
    Write { name: String, reason: String },
    #[error("Failed to read audio file {name}: {reason}")]
    Read { name: String, reason: String },
    #[error("Invalid audio data in {name}: {reason}")]
    InvalidAudio { name: String, reason: String },
    #[error("Invalid audio file name: {0}")]
    InvalidName(String),
}

/// Failures registering an alarm with the OS alarm subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("Alarm permission not granted")]
    NotAuthorized,
    #[error("Fire time {0} is not in the future")]
    FireTimeInPast(String),
    #[error("Failed to schedule alarm: {0}")]
    Failed(String),
}

/// Failures from the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Credential save failed: {0}")]
    Save(String),
    #[error("Credential delete failed: {0}")]
    Delete(String),
}

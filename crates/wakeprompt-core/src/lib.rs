//! Wakeprompt core crate - domain types, error taxonomy, configuration,
//! collaborator ports, and telemetry.

pub mod config;
pub mod error;
pub mod ports;
pub mod telemetry;
pub mod types;

pub use config::WakepromptConfig;
pub use error::{
    AuthorizationError, ConfigurationError, ProviderError, Result, SchedulingError, StorageError,
    StoreError, WakepromptError,
};
pub use telemetry::{TelemetryEvent, TelemetryRecord, TelemetrySink};
pub use types::*;

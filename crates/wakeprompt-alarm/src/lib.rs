//! Alarm engine for Wakeprompt.
//!
//! Drives an alarm from draft through text generation, speech synthesis,
//! and arming, falling back to the system sound when any step fails.

pub mod backbone;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod state_machine;

pub use backbone::LocalAlarmBackbone;
pub use error::AlarmError;
pub use gate::{RunGate, RunTicket};
pub use orchestrator::{Collaborators, Orchestrator, ReconcileReport, RecoveryReport};
pub use state_machine::validate_transition;

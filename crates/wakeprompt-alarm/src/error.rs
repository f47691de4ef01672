//! Error types for the alarm engine.

use uuid::Uuid;
use wakeprompt_core::error::WakepromptError;
use wakeprompt_core::AlarmState;

/// Errors from alarm lifecycle operations.
///
/// Pipeline failures are not errors here: they end in `armed` with a
/// failure reason or in `error_blocked`, and are reported on the record.
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("Alarm not found: {0}")]
    NotFound(Uuid),
    #[error("Alarm must be a draft to be saved, found {0}")]
    NotDraft(AlarmState),
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(AlarmState, AlarmState),
    #[error("Alarm {0} was superseded by a newer operation")]
    Superseded(Uuid),
    #[error("Persistence error: {0}")]
    Persistence(#[from] WakepromptError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_error_display() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            AlarmError::NotFound(id).to_string(),
            "Alarm not found: 550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(
            AlarmError::NotDraft(AlarmState::Armed).to_string(),
            "Alarm must be a draft to be saved, found armed"
        );
        assert_eq!(
            AlarmError::InvalidTransition(AlarmState::Completed, AlarmState::Armed).to_string(),
            "Invalid state transition: completed -> armed"
        );
    }

    #[test]
    fn test_alarm_error_from_wakeprompt_error() {
        let err: AlarmError = WakepromptError::Persistence("disk full".to_string()).into();
        assert!(matches!(err, AlarmError::Persistence(_)));
        assert!(err.to_string().contains("disk full"));
    }
}

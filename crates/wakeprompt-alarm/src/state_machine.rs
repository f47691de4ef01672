//! Alarm state machine with validated transitions.
//!
//! One pipeline run moves forward only:
//! Draft -> GeneratingText -> GeneratingAudio -> ArmingPrimaryAlarm -> Armed,
//! with any generation or arming step able to divert to ArmingFallbackAlarm,
//! which ends in Armed or ErrorBlocked.
//!
//! Regenerate (-> Draft) and cancel (-> Completed) are accepted from any
//! state. They are only issued while holding the alarm's run lock, so an
//! in-flight state seen there belongs to an abandoned run.

use crate::error::AlarmError;
use wakeprompt_core::AlarmState;

/// Validate that a state transition is allowed.
///
/// Valid transitions:
/// - Draft -> GeneratingText
/// - Draft -> ErrorBlocked (credential or permission guard)
/// - GeneratingText -> GeneratingAudio | ArmingFallbackAlarm
/// - GeneratingAudio -> ArmingPrimaryAlarm | ArmingFallbackAlarm
/// - ArmingPrimaryAlarm -> Armed | ArmingFallbackAlarm
/// - ArmingFallbackAlarm -> Armed | ErrorBlocked
/// - in-flight or Armed -> ErrorBlocked (interrupted run, lost registration)
/// - any -> Draft (regenerate)
/// - any -> Completed (cancel)
pub fn validate_transition(from: AlarmState, to: AlarmState) -> Result<(), AlarmError> {
    use AlarmState::*;

    let valid = match (from, to) {
        (_, Draft) | (_, Completed) => true,
        (from, ErrorBlocked) if from.is_in_flight() || from == Armed => true,
        _ => matches!(
            (from, to),
            (Draft, GeneratingText)
                | (Draft, ErrorBlocked)
                | (GeneratingText, GeneratingAudio)
                | (GeneratingText, ArmingFallbackAlarm)
                | (GeneratingAudio, ArmingPrimaryAlarm)
                | (GeneratingAudio, ArmingFallbackAlarm)
                | (ArmingPrimaryAlarm, Armed)
                | (ArmingPrimaryAlarm, ArmingFallbackAlarm)
                | (ArmingFallbackAlarm, Armed)
        ),
    };

    if valid {
        Ok(())
    } else {
        Err(AlarmError::InvalidTransition(from, to))
    }
}

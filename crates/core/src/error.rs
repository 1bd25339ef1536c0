/// Failures of the interview subsystem.
///
/// Only `UnsupportedEnvironment` and `FinalizationFailed` ever reach the user.
/// The rest are absorbed by the controller and turned into flow decisions or
/// silent retries; they exist so the absorbing code can log a typed reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterviewError {
    #[error("speech recognition is not supported in this environment")]
    UnsupportedEnvironment,
    #[error("speech capture interrupted: {reason}")]
    CaptureInterrupted { reason: String },
    #[error("answer evaluation failed: {reason}")]
    EvaluationFailed { reason: String },
    #[error("follow-up generation failed: {reason}")]
    FollowUpFailed { reason: String },
    #[error("failed to save interview feedback: {reason}")]
    FinalizationFailed {
        reason: String,
        fallback_location: String,
    },
}

/// Where the user is sent when the session could not be finalized.
pub const FALLBACK_LOCATION: &str = "/";

impl InterviewError {
    pub fn finalization(reason: impl Into<String>) -> Self {
        InterviewError::FinalizationFailed {
            reason: reason.into(),
            fallback_location: FALLBACK_LOCATION.to_string(),
        }
    }

    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            InterviewError::UnsupportedEnvironment | InterviewError::FinalizationFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_start_and_save_failures_reach_the_user() {
        assert!(InterviewError::UnsupportedEnvironment.is_user_visible());
        assert!(InterviewError::finalization("disk full").is_user_visible());
        assert!(!InterviewError::EvaluationFailed { reason: "x".into() }.is_user_visible());
        assert!(!InterviewError::CaptureInterrupted { reason: "x".into() }.is_user_visible());
    }

    #[test]
    fn finalization_carries_fallback_location() {
        let err = InterviewError::finalization("disk full");
        assert_eq!(
            err.to_string(),
            "failed to save interview feedback: disk full"
        );
        assert!(matches!(
            err,
            InterviewError::FinalizationFailed { fallback_location, .. } if fallback_location == FALLBACK_LOCATION
        ));
    }
}

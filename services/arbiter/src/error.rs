//! Error Types
//!
//! Every error here is recoverable inside the arbiter loop. None of them ends
//! a cycle early or stops the process.

/// A failed hand-off to an outbound collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuationError {
    #[error("{collaborator} queue is full")]
    QueueFull { collaborator: &'static str },
    #[error("{collaborator} is disconnected")]
    Disconnected { collaborator: &'static str },
    #[error("{collaborator} rejected the request: {reason}")]
    Rejected {
        collaborator: &'static str,
        reason: String,
    },
}

/// Conditions the arbiter recovers from locally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TutorError {
    /// No current student, or no active session for them.
    #[error("No active session for {0}")]
    MissingContext(String),
    /// No learner record for the student; the default lesson applies.
    #[error("No learner profile for student '{0}'")]
    ProfileNotFound(String),
    /// A speech, motion, persistence or sync call failed.
    #[error("Actuation failed: {0}")]
    Actuation(#[from] ActuationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TutorError::MissingContext("student 's-1'".to_string());
        assert_eq!(err.to_string(), "No active session for student 's-1'");

        let err = TutorError::ProfileNotFound("s-9".to_string());
        assert_eq!(err.to_string(), "No learner profile for student 's-9'");

        let err: TutorError = ActuationError::QueueFull {
            collaborator: "speech",
        }
        .into();
        assert_eq!(err.to_string(), "Actuation failed: speech queue is full");
    }
}

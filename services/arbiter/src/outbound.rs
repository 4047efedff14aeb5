//! Outbound Collaborators
//!
//! The arbiter never blocks on actuation. Every call here must return
//! immediately; delivery, retries and queuing belong to the collaborator.

use crate::error::ActuationError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tutor_core::scoring::ScoreResult;
use tutor_core::{Command, MotionCommand, SyncPayload};

/// Fire-and-forget calls the arbiter makes to the host's I/O adapters.
#[cfg_attr(test, mockall::automock)]
pub trait Collaborators: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), ActuationError>;

    fn execute_motion(&self, command: &MotionCommand) -> Result<(), ActuationError>;

    fn persist_progress(
        &self,
        student_id: &str,
        lesson_id: &str,
        result: &ScoreResult,
    ) -> Result<(), ActuationError>;

    /// Best-effort. A failure is logged and never retried by the arbiter.
    fn sync_to_server(&self, payload: &SyncPayload) -> Result<(), ActuationError>;
}

/// Forwards every call as a [`Command`] over a bounded channel.
#[derive(Clone)]
pub struct ChannelCollaborators {
    tx: mpsc::Sender<Command>,
}

impl ChannelCollaborators {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Creates the collaborator handle and the receiver the host drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    fn forward(&self, collaborator: &'static str, command: Command) -> Result<(), ActuationError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => ActuationError::QueueFull { collaborator },
            TrySendError::Closed(_) => ActuationError::Disconnected { collaborator },
        })
    }
}

impl Collaborators for ChannelCollaborators {
    fn speak(&self, text: &str) -> Result<(), ActuationError> {
        self.forward(
            "speech",
            Command::Speak {
                text: text.to_string(),
            },
        )
    }

    fn execute_motion(&self, command: &MotionCommand) -> Result<(), ActuationError> {
        self.forward("motion", Command::Motion { command: *command })
    }

    fn persist_progress(
        &self,
        student_id: &str,
        lesson_id: &str,
        result: &ScoreResult,
    ) -> Result<(), ActuationError> {
        self.forward(
            "persistence",
            Command::PersistProgress {
                student_id: student_id.to_string(),
                lesson_id: lesson_id.to_string(),
                result: result.clone(),
            },
        )
    }

    fn sync_to_server(&self, payload: &SyncPayload) -> Result<(), ActuationError> {
        self.forward(
            "network",
            Command::Sync {
                payload: payload.clone(),
            },
        )
    }
}

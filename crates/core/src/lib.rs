//! Tutor Core
//!
//! Pure, synchronous decision logic for the tutoring robot: the perceptual
//! event model, phoneme alignment, pronunciation scoring and the adaptive
//! difficulty rules. Nothing in this crate performs I/O; the arbiter service
//! drives it and forwards the resulting [`Command`]s to the hardware and
//! network collaborators.

pub mod difficulty;
pub mod events;
pub mod phoneme;
pub mod scoring;

use scoring::ScoreResult;
use serde::{Deserialize, Serialize};

/// Represents commands that the core logic issues to an external runtime.
///
/// This enum is the primary API for decoupling the arbiter's decision-making
/// from the collaborators that execute side effects (speaking text, moving
/// servos, persisting progress, syncing with the server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Command the speech collaborator to utter the given text.
    Speak { text: String },
    /// Command the motion collaborator to perform a movement.
    Motion { command: MotionCommand },
    /// Hand a scored attempt to the persistence collaborator.
    PersistProgress {
        student_id: String,
        lesson_id: String,
        result: ScoreResult,
    },
    /// Best-effort progress upload through the network collaborator.
    Sync { payload: SyncPayload },
}

/// Motion requests understood by the motion collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MotionCommand {
    /// Cut power to every actuator immediately.
    EmergencyStop,
    /// Halt locomotion.
    Stop,
    /// Play a canned gesture animation.
    Gesture { gesture: Gesture },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Wave,
    Nod,
}

/// Progress snapshot uploaded on every sync tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub robot_id: String,
    pub progress: ProgressSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub student_id: String,
    pub pronunciation_score: f64,
}

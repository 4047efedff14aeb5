//! Perceptual Event Model
//!
//! Typed messages pushed by the speech, vision and sensor producers, and the
//! priority classes the arbiter uses to order them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A transcribed utterance from the speech producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechEvent {
    pub text: String,
    /// Recogniser confidence in `[0, 1]`.
    pub confidence: f32,
    /// Name of the recogniser that produced the text.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub recognized: bool,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectObservation {
    pub label: String,
    pub confidence: f32,
    #[serde(default)]
    pub bbox: Region,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionObservation {
    pub student_id: String,
    pub attention: bool,
    pub confidence: f32,
}

/// One analysed camera frame from the vision producer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionEvent {
    #[serde(default)]
    pub faces: Vec<FaceObservation>,
    #[serde(default)]
    pub objects: Vec<ObjectObservation>,
    #[serde(default)]
    pub attention: Vec<AttentionObservation>,
}

/// One sensor sweep. The threshold flags are computed by the sensor
/// collaborator (distance < 20 cm, temperature > 40 °C).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    /// Distance to the nearest obstacle in centimetres.
    pub distance: f32,
    /// Body temperature in degrees Celsius.
    pub temperature: f32,
    pub motion_detected: bool,
    #[serde(default)]
    pub obstacle_too_close: bool,
    #[serde(default)]
    pub temperature_high: bool,
}

/// Everything a producer may enqueue. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Speech(SpeechEvent),
    Vision(VisionEvent),
    Sensor(SensorReading),
}

impl Event {
    /// The priority class a non-emergency event is arbitrated under.
    ///
    /// Sensor readings that reach dispatch only refresh ambient context; they
    /// travel in the motion class because distance and motion feed the
    /// movement safety envelope.
    pub fn priority(&self) -> PriorityClass {
        match self {
            Event::Speech(_) => PriorityClass::Speech,
            Event::Vision(_) => PriorityClass::Vision,
            Event::Sensor(_) => PriorityClass::Motion,
        }
    }
}

/// Fixed arbitration order. Declaration order is the total order, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Learning = 1,
    Vision = 2,
    Speech = 3,
    Motion = 4,
    Emergency = 5,
}

impl PriorityClass {
    pub fn weight(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PriorityClass::Learning => "learning",
            PriorityClass::Vision => "vision",
            PriorityClass::Speech => "speech",
            PriorityClass::Motion => "motion",
            PriorityClass::Emergency => "emergency",
        };
        write!(f, "{}", name)
    }
}

/// An event collected during one arbiter cycle, tagged with its class and
/// the order in which it was drained.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub seq: u64,
    pub class: PriorityClass,
    pub event: Event,
}

impl Candidate {
    pub fn new(seq: u64, event: Event) -> Self {
        Self {
            seq,
            class: event.priority(),
            event,
        }
    }
}

/// Orders candidates by class, highest first. `sort_by` is stable, so
/// candidates of the same class keep their arrival order.
pub fn order_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.class.cmp(&a.class));
}

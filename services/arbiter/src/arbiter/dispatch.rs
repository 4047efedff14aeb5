//! Per-event handlers run during the Dispatching phase.

use super::{CycleReport, TaskArbiter, TutorCommand};
use crate::error::TutorError;
use crate::registry::{CloseReason, LessonContext};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use tutor_core::difficulty::ProgressRecord;
use tutor_core::events::{Event, FaceObservation, SensorReading, SpeechEvent, VisionEvent};
use tutor_core::phoneme;
use tutor_core::{Gesture, MotionCommand};

pub const INTRODUCTION_PROMPT: &str = "Hello! Please introduce yourself so we can start learning.";
pub const HELP_TEXT: &str = "I'm here to help you learn English. Just speak to me!";
pub const ATTENTION_PROMPT: &str = "Please look at me, I'm here to help you learn!";
pub const STOP_TEXT: &str = "Stopping movement.";
pub const RETRY_TEXT: &str = "Let's practice this again.";
pub const NO_PHRASES_TEXT: &str = "There are no phrases at this level yet.";

/// Scores at or above this move the student on to the next phrase.
pub const PASS_SCORE: f64 = 75.0;

impl TaskArbiter {
    pub(super) fn dispatch(&mut self, event: Event, now: DateTime<Utc>, report: &mut CycleReport) {
        match event {
            Event::Speech(speech) => self.handle_speech(speech, now, report),
            Event::Vision(vision) => self.handle_vision(vision, now, report),
            Event::Sensor(reading) => self.handle_sensor(reading),
        }
    }

    fn handle_sensor(&mut self, reading: SensorReading) {
        self.ambient.distance = reading.distance;
        self.ambient.temperature = reading.temperature;
        self.ambient.motion_detected = reading.motion_detected;
        debug!(
            distance = reading.distance,
            temperature = reading.temperature,
            motion = reading.motion_detected,
            "Ambient context updated"
        );
    }

    fn handle_speech(&mut self, speech: SpeechEvent, now: DateTime<Utc>, report: &mut CycleReport) {
        if speech.confidence < self.min_speech_confidence {
            debug!(
                confidence = speech.confidence,
                source = %speech.source,
                "Ignoring low-confidence speech"
            );
            return;
        }
        if let Some(student_id) = self.current_student.as_deref() {
            if let Err(e) = self.registry.touch(student_id, now) {
                debug!(student_id, error = %e, "Speech from a student without a session");
            }
        }
        match TutorCommand::parse(&speech.text) {
            Some(command) => self.handle_command(command, now, report),
            None => self.handle_learning(&speech.text, now, report),
        }
    }

    fn handle_command(&mut self, command: TutorCommand, now: DateTime<Utc>, report: &mut CycleReport) {
        info!(?command, "Voice command");
        match command {
            TutorCommand::Stop => {
                self.motion(MotionCommand::Stop, report);
                self.say(STOP_TEXT, report);
                if let Some(student_id) = self.current_student.take() {
                    self.registry.close(&student_id, now, CloseReason::StopCommand);
                }
            }
            TutorCommand::Help => self.say(HELP_TEXT, report),
            TutorCommand::Repeat => self.repeat_phrase(report),
            TutorCommand::Next => self.move_cursor(1, report),
            TutorCommand::Previous => self.move_cursor(-1, report),
        }
    }

    fn repeat_phrase(&mut self, report: &mut CycleReport) {
        let student_id = match self.active_student() {
            Ok(id) => id,
            Err(e) => return self.introduce(e, report),
        };
        let phrase = self
            .registry
            .session(&student_id)
            .ok()
            .and_then(|s| s.lesson_context.lesson.as_ref())
            .map(|l| l.target_phrase.clone());
        match (phrase, self.last_utterance.clone()) {
            (Some(phrase), _) => self.say(&format!("Please repeat after me: {}", phrase), report),
            (None, Some(last)) => self.say(&last, report),
            (None, None) => self.say(HELP_TEXT, report),
        }
    }

    /// Steps the lesson cursor by `step` within the current level, wrapping.
    fn move_cursor(&mut self, step: isize, report: &mut CycleReport) {
        let student_id = match self.active_student() {
            Ok(id) => id,
            Err(e) => return self.introduce(e, report),
        };
        let Ok(session) = self.registry.session_mut(&student_id) else {
            return;
        };
        let context = &mut session.lesson_context;
        let len = self.catalog.len(context.spec.lesson_type);
        if len == 0 {
            return self.say(NO_PHRASES_TEXT, report);
        }
        let len = len as isize;
        context.cursor = (context.cursor as isize + step).rem_euclid(len) as usize;
        context.lesson = self.catalog.lesson(context.spec.lesson_type, context.cursor);
        let phrase = context.lesson.as_ref().map(|l| l.target_phrase.clone());

        if let Some(phrase) = phrase {
            let text = if step < 0 {
                format!("Let's go back. Please say: {}", phrase)
            } else {
                format!("Next, please say: {}", phrase)
            };
            self.say(&text, report);
        }
    }

    /// Aligns and scores an attempt against the current target phrase, then
    /// adapts the learner profile and paces the lesson.
    fn handle_learning(&mut self, transcript: &str, now: DateTime<Utc>, report: &mut CycleReport) {
        let student_id = match self.active_student() {
            Ok(id) => id,
            Err(e) => return self.introduce(e, report),
        };
        let lesson = self
            .registry
            .session(&student_id)
            .ok()
            .and_then(|s| s.lesson_context.lesson.clone());

        let target_phrase = lesson.as_ref().map_or("", |l| l.target_phrase.as_str());
        let target = self.extractor.extract(target_phrase);
        let attempt = self.extractor.extract(transcript);
        let alignment = phoneme::align(&target, &attempt);
        let result = self.scorer.score(&target, &attempt, &alignment);

        let Some(lesson) = lesson.filter(|_| !target.is_empty()) else {
            debug!(%student_id, "No target phrase to score against");
            return self.say(&result.feedback, report);
        };

        info!(
            %student_id,
            lesson_id = %lesson.lesson_id,
            score = result.score,
            per = result.phoneme_error_rate,
            errors = result.total_errors(),
            "Pronunciation scored"
        );
        let persisted = self
            .outbound
            .persist_progress(&student_id, &lesson.lesson_id, &result);
        self.record(persisted, report);
        self.say(&result.feedback, report);

        let record = ProgressRecord {
            lesson_id: lesson.lesson_id.clone(),
            pronunciation_score: result.score,
            comprehension_score: None,
            vocabulary_score: None,
            recorded_at: now,
        };
        self.registry.learner_mut(&student_id).record_attempt(
            record,
            &target,
            &result,
            self.policy.as_ref(),
        );

        if result.score >= PASS_SCORE {
            self.motion(
                MotionCommand::Gesture {
                    gesture: Gesture::Nod,
                },
                report,
            );
            self.advance_lesson(&student_id, report);
        } else {
            self.say(RETRY_TEXT, report);
        }
    }

    /// Re-plans the session from a fresh recommendation and moves to the
    /// next phrase. A change of level starts that level from its first phrase.
    fn advance_lesson(&mut self, student_id: &str, report: &mut CycleReport) {
        let spec = self.registry.recommend(student_id, self.policy.as_ref());
        let Ok(session) = self.registry.session_mut(student_id) else {
            return;
        };
        let context = &mut session.lesson_context;
        let cursor = if context.spec.lesson_type == spec.lesson_type {
            context.cursor + 1
        } else {
            0
        };
        let lesson = self.catalog.lesson(spec.lesson_type, cursor);
        let phrase = lesson.as_ref().map(|l| l.target_phrase.clone());
        *context = LessonContext {
            spec,
            lesson,
            cursor,
        };

        if let Some(phrase) = phrase {
            self.say(&format!("Next, please say: {}", phrase), report);
        }
    }

    fn handle_vision(&mut self, vision: VisionEvent, now: DateTime<Utc>, report: &mut CycleReport) {
        // Each recognized student is greeted in frame order; the last one
        // becomes the current student.
        for face in vision
            .faces
            .iter()
            .filter(|f| f.recognized && f.student_id.is_some())
        {
            self.handle_face(face, now, report);
        }

        if vision.attention.iter().any(|a| !a.attention) {
            self.say(ATTENTION_PROMPT, report);
        }
        for object in &vision.objects {
            debug!(label = %object.label, confidence = object.confidence, "Object seen");
        }
    }

    /// Greets a newly seen student and opens or reuses their session.
    fn handle_face(&mut self, face: &FaceObservation, now: DateTime<Utc>, report: &mut CycleReport) {
        let Some(student_id) = face.student_id.as_deref() else {
            return;
        };
        let is_new_student = self.current_student.as_deref() != Some(student_id);
        if is_new_student {
            let name = face
                .name
                .clone()
                .or_else(|| {
                    self.registry
                        .learner(student_id)
                        .ok()
                        .and_then(|l| l.name.clone())
                })
                .unwrap_or_else(|| student_id.to_string());
            info!(student_id, %name, "Student recognized");
            self.say(
                &format!("Hello {}! Nice to see you again. Ready to learn?", name),
                report,
            );
            self.motion(
                MotionCommand::Gesture {
                    gesture: Gesture::Wave,
                },
                report,
            );
            self.current_student = Some(student_id.to_string());
        }

        let spec = self.registry.recommend(student_id, self.policy.as_ref());
        let lesson = self.catalog.lesson(spec.lesson_type, 0);
        let context = LessonContext {
            spec,
            lesson,
            cursor: 0,
        };
        let (session, created) = self.registry.open_session(student_id, context, now);
        let phrase = session
            .lesson_context
            .lesson
            .as_ref()
            .map(|l| l.target_phrase.clone());
        if created {
            if let Some(phrase) = phrase {
                self.say(&format!("Please repeat after me: {}", phrase), report);
            }
        }
    }

    /// The student whose session dispatch should act on.
    fn active_student(&self) -> Result<String, TutorError> {
        let student_id = self
            .current_student
            .as_deref()
            .ok_or_else(|| TutorError::MissingContext("the current speaker".to_string()))?;
        self.registry.session(student_id)?;
        Ok(student_id.to_string())
    }

    fn introduce(&mut self, error: TutorError, report: &mut CycleReport) {
        warn!(error = %error, "Prompting for introduction");
        report.recovered.push(error);
        self.say(INTRODUCTION_PROMPT, report);
    }
}

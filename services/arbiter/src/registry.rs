//! Session Registry
//!
//! Owns every open session and every learner record. It is only ever touched
//! by the arbiter task, which makes it the single writer of both.

use crate::error::TutorError;
use crate::lessons::Lesson;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::info;
use tutor_core::difficulty::{
    DifficultyPolicy, LearnerRecord, LessonSpec, LessonType, StudentStats,
};
use uuid::Uuid;

/// What the student is currently working on.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonContext {
    pub spec: LessonSpec,
    /// `None` when the catalog has no phrase for the recommended level.
    pub lesson: Option<Lesson>,
    /// Position in the catalog for `spec.lesson_type`.
    pub cursor: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: Uuid,
    pub student_id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub lesson_context: LessonContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    StopCommand,
    Emergency,
    Inactivity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedSession {
    pub session: Session,
    pub ended_at: DateTime<Utc>,
    pub duration: Duration,
    pub reason: CloseReason,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    learners: HashMap<String, LearnerRecord>,
    closed_total: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces the learner record for a student.
    pub fn register_student(&mut self, student_id: &str, name: &str, age: u32, level: LessonType) {
        info!(student_id, name, %level, "Registering student");
        self.learners.insert(
            student_id.to_string(),
            LearnerRecord::registered(student_id, name, age, level),
        );
    }

    /// Opens a session unless one is already active for the student, in
    /// which case that one is touched and returned. Returns whether a new
    /// session was created.
    pub fn open_session(
        &mut self,
        student_id: &str,
        lesson_context: LessonContext,
        now: DateTime<Utc>,
    ) -> (&Session, bool) {
        let mut created = false;
        let session = self
            .sessions
            .entry(student_id.to_string())
            .and_modify(|s| s.last_activity_at = now)
            .or_insert_with(|| {
                created = true;
                Session {
                    session_id: Uuid::new_v4(),
                    student_id: student_id.to_string(),
                    started_at: now,
                    last_activity_at: now,
                    lesson_context,
                }
            });
        if created {
            info!(student_id, session_id = %session.session_id, "Session opened");
        }
        (&*session, created)
    }

    pub fn has_session(&self, student_id: &str) -> bool {
        self.sessions.contains_key(student_id)
    }

    pub fn session(&self, student_id: &str) -> Result<&Session, TutorError> {
        self.sessions
            .get(student_id)
            .ok_or_else(|| TutorError::MissingContext(format!("student '{}'", student_id)))
    }

    pub fn session_mut(&mut self, student_id: &str) -> Result<&mut Session, TutorError> {
        self.sessions
            .get_mut(student_id)
            .ok_or_else(|| TutorError::MissingContext(format!("student '{}'", student_id)))
    }

    /// Records activity on an open session.
    pub fn touch(&mut self, student_id: &str, now: DateTime<Utc>) -> Result<(), TutorError> {
        self.session_mut(student_id)?.last_activity_at = now;
        Ok(())
    }

    pub fn close(
        &mut self,
        student_id: &str,
        now: DateTime<Utc>,
        reason: CloseReason,
    ) -> Option<ClosedSession> {
        let session = self.sessions.remove(student_id)?;
        let closed = ClosedSession {
            duration: now - session.started_at,
            ended_at: now,
            reason,
            session,
        };
        info!(
            student_id,
            session_id = %closed.session.session_id,
            duration_secs = closed.duration.num_seconds(),
            reason = ?reason,
            "Session closed"
        );
        self.closed_total += 1;
        Some(closed)
    }

    pub fn close_all(&mut self, now: DateTime<Utc>, reason: CloseReason) -> Vec<ClosedSession> {
        let students: Vec<String> = self.sessions.keys().cloned().collect();
        students
            .iter()
            .filter_map(|id| self.close(id, now, reason))
            .collect()
    }

    /// Closes every session idle for longer than `timeout`.
    pub fn sweep_inactive(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<ClosedSession> {
        let idle: Vec<String> = self
            .sessions
            .values()
            .filter(|s| now - s.last_activity_at > timeout)
            .map(|s| s.student_id.clone())
            .collect();
        idle.iter()
            .filter_map(|id| self.close(id, now, CloseReason::Inactivity))
            .collect()
    }

    /// Number of sessions closed since the registry was created. The closed
    /// sessions themselves belong to whoever closed them.
    pub fn closed_sessions(&self) -> u64 {
        self.closed_total
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn learner(&self, student_id: &str) -> Result<&LearnerRecord, TutorError> {
        self.learners
            .get(student_id)
            .ok_or_else(|| TutorError::ProfileNotFound(student_id.to_string()))
    }

    /// The learner record, created with a default profile on first use.
    pub fn learner_mut(&mut self, student_id: &str) -> &mut LearnerRecord {
        self.learners
            .entry(student_id.to_string())
            .or_insert_with(|| LearnerRecord::new(student_id))
    }

    /// Next lesson for a student; the default lesson when no profile exists.
    pub fn recommend(&self, student_id: &str, policy: &dyn DifficultyPolicy) -> LessonSpec {
        match self.learner(student_id) {
            Ok(learner) => learner.recommend(policy),
            Err(_) => LessonSpec::default(),
        }
    }

    pub fn stats(&self, student_id: &str) -> StudentStats {
        self.learner(student_id)
            .map(LearnerRecord::stats)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::difficulty::RuleBasedPolicy;

    fn context() -> LessonContext {
        LessonContext {
            spec: LessonSpec::default(),
            lesson: None,
            cursor: 0,
        }
    }

    #[test]
    fn test_one_active_session_per_student() {
        let mut registry = SessionRegistry::new();
        let t0 = Utc::now();

        let (first_id, created) = {
            let (session, created) = registry.open_session("s-1", context(), t0);
            (session.session_id, created)
        };
        assert!(created);

        let later = t0 + Duration::seconds(5);
        let (session, created) = registry.open_session("s-1", context(), later);
        assert!(!created);
        assert_eq!(session.session_id, first_id);
        assert_eq!(session.started_at, t0);
        assert_eq!(session.last_activity_at, later);
        assert_eq!(registry.active_sessions(), 1);
    }

    #[test]
    fn test_close_computes_duration() {
        let mut registry = SessionRegistry::new();
        let t0 = Utc::now();
        registry.open_session("s-1", context(), t0);

        let closed = registry
            .close("s-1", t0 + Duration::seconds(90), CloseReason::StopCommand)
            .unwrap();
        assert_eq!(closed.duration, Duration::seconds(90));
        assert_eq!(closed.reason, CloseReason::StopCommand);
        assert!(!registry.has_session("s-1"));
        assert!(registry.close("s-1", t0, CloseReason::StopCommand).is_none());
        assert_eq!(registry.closed_sessions(), 1);
    }

    #[test]
    fn test_repeated_open_close_keeps_registry_empty() {
        let mut registry = SessionRegistry::new();
        let t0 = Utc::now();
        for i in 0..10_000 {
            let now = t0 + Duration::seconds(i);
            registry.open_session("s-1", context(), now);
            assert!(registry.close("s-1", now, CloseReason::StopCommand).is_some());
        }
        assert_eq!(registry.active_sessions(), 0);
        assert_eq!(registry.closed_sessions(), 10_000);
        assert!(registry.sessions.capacity() <= 16);
    }

    #[test]
    fn test_missing_context_and_profile_errors() {
        let mut registry = SessionRegistry::new();
        assert!(matches!(
            registry.session("ghost"),
            Err(TutorError::MissingContext(_))
        ));
        assert!(matches!(
            registry.touch("ghost", Utc::now()),
            Err(TutorError::MissingContext(_))
        ));
        assert!(matches!(
            registry.learner("ghost"),
            Err(TutorError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_sweep_closes_only_idle_sessions() {
        let mut registry = SessionRegistry::new();
        let t0 = Utc::now();
        registry.open_session("idle", context(), t0);
        registry.open_session("busy", context(), t0);
        registry
            .touch("busy", t0 + Duration::seconds(250))
            .unwrap();

        let closed = registry.sweep_inactive(t0 + Duration::seconds(301), Duration::seconds(300));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].session.student_id, "idle");
        assert_eq!(closed[0].reason, CloseReason::Inactivity);
        assert!(registry.has_session("busy"));
    }

    #[test]
    fn test_close_all() {
        let mut registry = SessionRegistry::new();
        let t0 = Utc::now();
        registry.open_session("a", context(), t0);
        registry.open_session("b", context(), t0);
        let closed = registry.close_all(t0, CloseReason::Emergency);
        assert_eq!(closed.len(), 2);
        assert_eq!(registry.active_sessions(), 0);
    }

    #[test]
    fn test_recommend_and_stats_fall_back_to_defaults() {
        let registry = SessionRegistry::new();
        let policy = RuleBasedPolicy;
        assert_eq!(registry.recommend("nobody", &policy), LessonSpec::default());

        let stats = registry.stats("nobody");
        assert_eq!(stats.total_lessons, 0);
        assert_eq!(stats.difficulty, 0.5);
        assert_eq!(stats.current_level, LessonType::Beginner);
    }

    #[test]
    fn test_registered_student_keeps_initial_level() {
        let mut registry = SessionRegistry::new();
        registry.register_student("s-7", "Meera", 10, LessonType::Advanced);
        let learner = registry.learner("s-7").unwrap();
        assert_eq!(learner.name.as_deref(), Some("Meera"));
        assert_eq!(learner.profile.current_level, LessonType::Advanced);
        assert_eq!(registry.stats("s-7").current_level, LessonType::Advanced);
    }
}

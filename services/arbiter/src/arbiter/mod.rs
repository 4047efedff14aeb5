//! Task Arbiter
//!
//! The single decision loop of the tutor. Each cycle it:
//! 1. Drains the sensor queue and checks for an emergency before anything else.
//! 2. Drains the speech and vision queues into one candidate list.
//! 3. Stably orders the candidates by priority class.
//! 4. Dispatches them in order, updating sessions and learner profiles and
//!    handing speech and motion to the outbound collaborators.
//!
//! The arbiter owns the session registry outright, so every session and
//! profile has exactly one writer.

mod command;
mod dispatch;

pub use command::TutorCommand;

use crate::config::Config;
use crate::emergency;
use crate::error::{ActuationError, TutorError};
use crate::lessons::{LessonCatalog, LexiconExtractor, PhonemeExtractor};
use crate::outbound::Collaborators;
use crate::queues::EventQueues;
use crate::registry::{ClosedSession, CloseReason, SessionRegistry};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};
use tutor_core::difficulty::{DifficultyPolicy, LessonType, RuleBasedPolicy};
use tutor_core::events::{Candidate, Event, SensorReading, order_candidates};
use tutor_core::scoring::PronunciationScorer;
use tutor_core::{MotionCommand, ProgressSnapshot, SyncPayload};

/// Where the arbiter is within a cycle. Published on a watch channel so
/// another task can follow it while the arbiter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    Idle,
    Collecting,
    Prioritizing,
    Dispatching,
    Stopped,
}

/// Latest sensor values seen in dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AmbientContext {
    pub distance: f32,
    pub temperature: f32,
    pub motion_detected: bool,
}

/// What one cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// An emergency reading was handled; nothing else ran.
    pub emergency: bool,
    /// Dispatch was held because an earlier emergency has not cleared.
    pub held: bool,
    /// Number of candidates dispatched.
    pub dispatched: usize,
    /// Outbound calls that failed. The cycle carried on after each one.
    pub failures: Vec<TutorError>,
    /// Missing sessions or profiles that were answered with a fallback.
    pub recovered: Vec<TutorError>,
}

impl CycleReport {
    /// Nothing was dispatched, so the loop may sleep.
    pub fn is_idle(&self) -> bool {
        self.dispatched == 0
    }
}

pub struct TaskArbiter {
    robot_id: String,
    poll_interval: Duration,
    sweep_interval: Duration,
    sync_interval: Duration,
    inactivity_timeout: chrono::Duration,
    min_speech_confidence: f32,

    queues: EventQueues,
    outbound: Arc<dyn Collaborators>,
    policy: Arc<dyn DifficultyPolicy>,
    extractor: Arc<dyn PhonemeExtractor>,
    catalog: LessonCatalog,
    scorer: PronunciationScorer,
    registry: SessionRegistry,

    state: watch::Sender<ArbiterState>,
    emergency_latched: bool,
    current_student: Option<String>,
    ambient: AmbientContext,
    last_utterance: Option<String>,
    next_seq: u64,
}

impl TaskArbiter {
    pub fn new(config: &Config, queues: EventQueues, outbound: Arc<dyn Collaborators>) -> Self {
        let inactivity_timeout = chrono::Duration::from_std(config.inactivity_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let (state, _) = watch::channel(ArbiterState::Idle);
        Self {
            robot_id: config.robot_id.clone(),
            poll_interval: config.poll_interval,
            sweep_interval: config.sweep_interval,
            sync_interval: config.sync_interval,
            inactivity_timeout,
            min_speech_confidence: config.min_speech_confidence,
            queues,
            outbound,
            policy: Arc::new(RuleBasedPolicy),
            extractor: Arc::new(LexiconExtractor::with_defaults()),
            catalog: LessonCatalog::default(),
            scorer: PronunciationScorer::default(),
            registry: SessionRegistry::new(),
            state,
            emergency_latched: false,
            current_student: None,
            ambient: AmbientContext::default(),
            last_utterance: None,
            next_seq: 0,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn DifficultyPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PhonemeExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_catalog(mut self, catalog: LessonCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn register_student(&mut self, student_id: &str, name: &str, age: u32, level: LessonType) {
        self.registry.register_student(student_id, name, age, level);
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn state(&self) -> ArbiterState {
        *self.state.borrow()
    }

    /// A receiver that keeps the last state, including `Stopped`, after the
    /// arbiter has been consumed by `run`.
    pub fn subscribe_state(&self) -> watch::Receiver<ArbiterState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ArbiterState) {
        self.state.send_replace(state);
    }

    pub fn current_student(&self) -> Option<&str> {
        self.current_student.as_deref()
    }

    pub fn ambient(&self) -> AmbientContext {
        self.ambient
    }

    pub fn is_emergency_latched(&self) -> bool {
        self.emergency_latched
    }

    /// Runs one Collecting → Prioritizing → Dispatching pass.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        self.set_state(ArbiterState::Collecting);
        let readings = self.queues.drain_sensor();
        if let Some(reading) = emergency::first_emergency(&readings) {
            self.handle_emergency(*reading, now, &mut report);
            self.set_state(ArbiterState::Idle);
            return report;
        }
        if self.emergency_latched {
            if readings.is_empty() {
                report.held = true;
                self.set_state(ArbiterState::Idle);
                return report;
            }
            info!("Emergency condition cleared. Resuming dispatch.");
            self.emergency_latched = false;
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        for reading in readings {
            let seq = self.bump_seq();
            candidates.push(Candidate::new(seq, Event::Sensor(reading)));
        }
        for speech in self.queues.drain_speech() {
            let seq = self.bump_seq();
            candidates.push(Candidate::new(seq, Event::Speech(speech)));
        }
        for vision in self.queues.drain_vision() {
            let seq = self.bump_seq();
            candidates.push(Candidate::new(seq, Event::Vision(vision)));
        }

        self.set_state(ArbiterState::Prioritizing);
        order_candidates(&mut candidates);

        self.set_state(ArbiterState::Dispatching);
        if !candidates.is_empty() {
            debug!(count = candidates.len(), "Dispatching candidates");
        }
        for candidate in candidates {
            debug!(seq = candidate.seq, class = %candidate.class, "Dispatch");
            self.dispatch(candidate.event, now, &mut report);
            report.dispatched += 1;
        }

        self.set_state(ArbiterState::Idle);
        report
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Stops every actuator, warns, and closes every open session. Dispatch
    /// stays held until a later non-emergency reading arrives.
    fn handle_emergency(
        &mut self,
        reading: SensorReading,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        warn!(
            distance = reading.distance,
            temperature = reading.temperature,
            obstacle_too_close = reading.obstacle_too_close,
            temperature_high = reading.temperature_high,
            "Emergency detected"
        );
        let (stop, utterance) = emergency::emergency_response();
        self.motion(stop, report);
        self.say(utterance, report);

        let closed = self.registry.close_all(now, CloseReason::Emergency);
        if !closed.is_empty() {
            info!(closed = closed.len(), "Sessions closed by emergency stop");
        }
        self.current_student = None;
        self.emergency_latched = true;
        report.emergency = true;
    }

    /// Closes sessions idle for longer than the inactivity timeout.
    pub fn sweep_inactive(&mut self, now: DateTime<Utc>) -> Vec<ClosedSession> {
        let closed = self.registry.sweep_inactive(now, self.inactivity_timeout);
        if let Some(current) = self.current_student.as_deref() {
            if closed.iter().any(|c| c.session.student_id == current) {
                self.current_student = None;
            }
        }
        closed
    }

    /// Sends the current student's average pronunciation score upstream.
    /// Returns the payload that was handed over, if there was a student.
    pub fn sync_progress(&self) -> Result<Option<SyncPayload>, TutorError> {
        let Some(student_id) = self.current_student.as_deref() else {
            return Ok(None);
        };
        let stats = self.registry.stats(student_id);
        let payload = SyncPayload {
            robot_id: self.robot_id.clone(),
            progress: ProgressSnapshot {
                student_id: student_id.to_string(),
                pronunciation_score: stats.avg_pronunciation,
            },
        };
        self.outbound.sync_to_server(&payload)?;
        debug!(student_id, score = stats.avg_pronunciation, "Progress synced");
        Ok(Some(payload))
    }

    /// Drives cycles until `cancel` fires, then hands back the registry.
    ///
    /// A cycle is never interrupted. Cancellation is observed between cycles
    /// only, so in-flight dispatch always completes.
    pub async fn run(mut self, cancel: CancellationToken) -> SessionRegistry {
        let span = tracing::info_span!("arbiter", robot_id = %self.robot_id);
        async move {
            info!("Arbiter started.");
            let mut sweep = tokio::time::interval(self.sweep_interval);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sync = tokio::time::interval(self.sync_interval);
            sync.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Both intervals tick immediately on first use.
            sweep.tick().await;
            sync.tick().await;

            let mut idle = false;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sweep.tick() => {
                        self.sweep_inactive(Utc::now());
                    }
                    _ = sync.tick() => {
                        if let Err(e) = self.sync_progress() {
                            warn!(error = %e, "Progress sync failed");
                        }
                    }
                    _ = pause(idle, self.poll_interval) => {
                        let report = self.run_cycle(Utc::now());
                        idle = report.is_idle();
                    }
                }
            }

            self.set_state(ArbiterState::Stopped);
            info!(
                active_sessions = self.registry.active_sessions(),
                "Arbiter stopped."
            );
            self.registry
        }
        .instrument(span)
        .await
    }

    fn say(&mut self, text: &str, report: &mut CycleReport) {
        let result = self.outbound.speak(text);
        self.last_utterance = Some(text.to_string());
        self.record(result, report);
    }

    fn motion(&self, command: MotionCommand, report: &mut CycleReport) {
        let result = self.outbound.execute_motion(&command);
        self.record(result, report);
    }

    fn record(&self, result: Result<(), ActuationError>, report: &mut CycleReport) {
        if let Err(e) = result {
            warn!(error = %e, "Actuation failed");
            report.failures.push(e.into());
        }
    }
}

/// Sleeps for the poll interval after an idle cycle, otherwise just yields.
async fn pause(idle: bool, poll_interval: Duration) {
    if idle {
        tokio::time::sleep(poll_interval).await;
    } else {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::MockCollaborators;
    use crate::queues;
    use tutor_core::events::{FaceObservation, Region, SpeechEvent, VisionEvent};

    fn speech(text: &str) -> Event {
        Event::Speech(SpeechEvent {
            text: text.to_string(),
            confidence: 0.95,
            source: "test".to_string(),
        })
    }

    fn face(student_id: &str, name: &str) -> Event {
        Event::Vision(VisionEvent {
            faces: vec![FaceObservation {
                recognized: true,
                student_id: Some(student_id.to_string()),
                name: Some(name.to_string()),
                confidence: 0.9,
                region: Region::default(),
            }],
            ..VisionEvent::default()
        })
    }

    fn obstacle() -> Event {
        Event::Sensor(SensorReading {
            distance: 10.0,
            temperature: 30.0,
            obstacle_too_close: true,
            ..SensorReading::default()
        })
    }

    #[test]
    fn test_actuation_failures_do_not_stop_the_cycle() {
        let mut mock = MockCollaborators::new();
        mock.expect_speak().returning(|_| {
            Err(ActuationError::Disconnected {
                collaborator: "speech",
            })
        });
        mock.expect_execute_motion().returning(|_| Ok(()));

        let (producers, queues) = queues::bounded(8);
        let mut arbiter = TaskArbiter::new(&Config::default(), queues, Arc::new(mock));
        producers.try_submit(face("s-1", "Ana")).unwrap();
        producers.try_submit(speech("help")).unwrap();

        let report = arbiter.run_cycle(Utc::now());
        assert_eq!(report.dispatched, 2);
        assert!(!report.failures.is_empty());
        assert!(
            report
                .failures
                .iter()
                .all(|e| matches!(e, TutorError::Actuation(_)))
        );
        // The greeting still opened a session despite the failed utterance.
        assert!(arbiter.registry().has_session("s-1"));
        assert_eq!(arbiter.state(), ArbiterState::Idle);
    }

    #[test]
    fn test_state_is_dispatching_while_commands_go_out() {
        let watcher: Arc<std::sync::Mutex<Option<watch::Receiver<ArbiterState>>>> =
            Arc::default();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut mock = MockCollaborators::new();
        {
            let watcher = Arc::clone(&watcher);
            let seen = Arc::clone(&seen);
            mock.expect_speak().returning(move |_| {
                if let Some(rx) = watcher.lock().unwrap().as_ref() {
                    seen.lock().unwrap().push(*rx.borrow());
                }
                Ok(())
            });
        }

        let (producers, queues) = queues::bounded(8);
        let mut arbiter = TaskArbiter::new(&Config::default(), queues, Arc::new(mock));
        let mut rx = arbiter.subscribe_state();
        *watcher.lock().unwrap() = Some(arbiter.subscribe_state());
        producers.try_submit(speech("help")).unwrap();

        arbiter.run_cycle(Utc::now());
        assert_eq!(*seen.lock().unwrap(), vec![ArbiterState::Dispatching]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ArbiterState::Idle);
    }

    #[test]
    fn test_emergency_preempts_and_latches() {
        let mut mock = MockCollaborators::new();
        mock.expect_execute_motion()
            .withf(|c| *c == MotionCommand::EmergencyStop)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_speak()
            .withf(|t| t == emergency::SAFETY_UTTERANCE)
            .times(1)
            .returning(|_| Ok(()));

        let (producers, queues) = queues::bounded(8);
        let mut arbiter = TaskArbiter::new(&Config::default(), queues, Arc::new(mock));
        producers.try_submit(speech("hello")).unwrap();
        producers.try_submit(obstacle()).unwrap();

        let first = arbiter.run_cycle(Utc::now());
        assert!(first.emergency);
        assert_eq!(first.dispatched, 0);
        assert!(arbiter.is_emergency_latched());

        let second = arbiter.run_cycle(Utc::now());
        assert!(second.held);
        assert!(!second.emergency);
        assert_eq!(second.dispatched, 0);
    }

    #[test]
    fn test_sync_without_student_sends_nothing() {
        let mock = MockCollaborators::new();
        let (_producers, queues) = queues::bounded(1);
        let arbiter = TaskArbiter::new(&Config::default(), queues, Arc::new(mock));
        assert_eq!(arbiter.sync_progress(), Ok(None));
    }

    #[test]
    fn test_sync_failure_is_reported() {
        let mut mock = MockCollaborators::new();
        mock.expect_speak().returning(|_| Ok(()));
        mock.expect_execute_motion().returning(|_| Ok(()));
        mock.expect_sync_to_server().times(1).returning(|_| {
            Err(ActuationError::Rejected {
                collaborator: "network",
                reason: "offline".to_string(),
            })
        });

        let (producers, queues) = queues::bounded(4);
        let mut arbiter = TaskArbiter::new(&Config::default(), queues, Arc::new(mock));
        producers.try_submit(face("s-1", "Ana")).unwrap();
        arbiter.run_cycle(Utc::now());

        assert!(matches!(
            arbiter.sync_progress(),
            Err(TutorError::Actuation(ActuationError::Rejected { .. }))
        ));
    }

    #[test]
    fn test_sweep_clears_current_student() {
        let mut mock = MockCollaborators::new();
        mock.expect_speak().returning(|_| Ok(()));
        mock.expect_execute_motion().returning(|_| Ok(()));

        let (producers, queues) = queues::bounded(4);
        let mut arbiter = TaskArbiter::new(&Config::default(), queues, Arc::new(mock));
        let t0 = Utc::now();
        producers.try_submit(face("s-1", "Ana")).unwrap();
        arbiter.run_cycle(t0);
        assert_eq!(arbiter.current_student(), Some("s-1"));

        assert!(arbiter.sweep_inactive(t0 + chrono::Duration::seconds(60)).is_empty());
        let closed = arbiter.sweep_inactive(t0 + chrono::Duration::seconds(301));
        assert_eq!(closed.len(), 1);
        assert_eq!(arbiter.current_student(), None);
    }
}

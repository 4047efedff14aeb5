//! Adaptive Difficulty
//!
//! Per-student learning state and the rules that turn a score history into
//! the next lesson's parameters. The rules sit behind [`DifficultyPolicy`] so
//! a trained model can replace [`RuleBasedPolicy`] without touching the
//! arbiter.

use crate::scoring::ScoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Number of most recent scores the difficulty rule looks at.
pub const DIFFICULTY_WINDOW: usize = 10;
/// Number of most recent scores the lesson type rule looks at.
pub const RECOMMENDATION_WINDOW: usize = 5;
/// Number of earliest scores used as the learning curve baseline.
pub const CURVE_BASELINE: usize = 3;

const BASE_DIFFICULTY: f64 = 0.5;
const STREAK_STEP: f64 = 0.05;
const LESSON_TYPE_STEP: f64 = 0.1;
const BASE_DURATION_MINUTES: f64 = 15.0;
const DURATION_SPAN_MINUTES: f64 = 10.0;
/// Assumed recent average when a known student has no scores yet.
const NO_HISTORY_AVERAGE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    Beginner,
    Intermediate,
    Advanced,
}

impl LessonType {
    /// Band for an average of recent scores: >= 80 advanced, >= 60 intermediate.
    pub fn for_average(average: f64) -> Self {
        if average >= 80.0 {
            LessonType::Advanced
        } else if average >= 60.0 {
            LessonType::Intermediate
        } else {
            LessonType::Beginner
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LessonType::Beginner => "beginner",
            LessonType::Intermediate => "intermediate",
            LessonType::Advanced => "advanced",
        }
    }
}

impl fmt::Display for LessonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LessonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(LessonType::Beginner),
            "intermediate" => Ok(LessonType::Intermediate),
            "advanced" => Ok(LessonType::Advanced),
            other => Err(format!("'{}' is not a lesson level", other)),
        }
    }
}

/// Adaptive state for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    pub current_level: LessonType,
    /// Always within `[0, 1]`.
    pub difficulty: f64,
    /// Always within `[0, 1]`.
    pub vocabulary_strength: f64,
    /// Score points gained per lesson since the first lessons.
    pub learning_curve: f64,
    pub weak_phonemes: BTreeSet<String>,
}

impl Default for DifficultyProfile {
    fn default() -> Self {
        Self::starting_at(LessonType::Beginner)
    }
}

impl DifficultyProfile {
    pub fn starting_at(level: LessonType) -> Self {
        Self {
            current_level: level,
            difficulty: BASE_DIFFICULTY,
            vocabulary_strength: BASE_DIFFICULTY,
            learning_curve: 0.0,
            weak_phonemes: BTreeSet::new(),
        }
    }
}

/// Parameters for the next lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonSpec {
    pub lesson_type: LessonType,
    pub difficulty: f64,
    pub focus_areas: Vec<String>,
    pub vocabulary_level: f64,
    /// Minutes.
    pub recommended_duration: u32,
}

impl Default for LessonSpec {
    /// The lesson handed to students without a profile.
    fn default() -> Self {
        Self {
            lesson_type: LessonType::Beginner,
            difficulty: BASE_DIFFICULTY,
            focus_areas: Vec::new(),
            vocabulary_level: BASE_DIFFICULTY,
            recommended_duration: BASE_DURATION_MINUTES as u32,
        }
    }
}

/// Swappable adaptation capability.
pub trait DifficultyPolicy: Send + Sync {
    /// Returns the profile after the newest score. `scores` is the complete
    /// chronological pronunciation history, newest last.
    fn update(&self, profile: &DifficultyProfile, scores: &[f64]) -> DifficultyProfile;

    /// Recommends the next lesson. `recent_scores` is chronological, newest last.
    fn recommend(&self, profile: &DifficultyProfile, recent_scores: &[f64]) -> LessonSpec;
}

/// Deterministic threshold rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedPolicy;

impl RuleBasedPolicy {
    /// Difficulty for the trailing window of scores.
    ///
    /// An average of 85 or more climbs 0.05 per lesson in the window from
    /// 0.5; 70 to 85 holds at 0.5; below 70 drops by the shortfall / 100.
    pub fn window_difficulty(window: &[f64]) -> f64 {
        let Some(average) = mean(window) else {
            return BASE_DIFFICULTY;
        };
        let difficulty = if average >= 85.0 {
            BASE_DIFFICULTY + window.len() as f64 * STREAK_STEP
        } else if average >= 70.0 {
            BASE_DIFFICULTY
        } else {
            BASE_DIFFICULTY - (70.0 - average) / 100.0
        };
        difficulty.clamp(0.0, 1.0)
    }

    /// `(avg(window) - avg(first 3)) / lesson count`, or 0 with fewer than 3 lessons.
    pub fn learning_curve(scores: &[f64]) -> f64 {
        if scores.len() < CURVE_BASELINE {
            return 0.0;
        }
        let window = tail(scores, DIFFICULTY_WINDOW);
        match (mean(window), mean(&scores[..CURVE_BASELINE])) {
            (Some(recent), Some(early)) => (recent - early) / scores.len() as f64,
            _ => 0.0,
        }
    }
}

impl DifficultyPolicy for RuleBasedPolicy {
    fn update(&self, profile: &DifficultyProfile, scores: &[f64]) -> DifficultyProfile {
        if scores.is_empty() {
            return profile.clone();
        }
        let mut next = profile.clone();
        next.difficulty = Self::window_difficulty(tail(scores, DIFFICULTY_WINDOW));
        next.learning_curve = Self::learning_curve(scores);
        if let Some(recent) = mean(tail(scores, RECOMMENDATION_WINDOW)) {
            next.current_level = LessonType::for_average(recent);
        }
        next
    }

    fn recommend(&self, profile: &DifficultyProfile, recent_scores: &[f64]) -> LessonSpec {
        let average =
            mean(tail(recent_scores, RECOMMENDATION_WINDOW)).unwrap_or(NO_HISTORY_AVERAGE);
        let lesson_type = LessonType::for_average(average);
        let difficulty = match lesson_type {
            LessonType::Advanced => profile.difficulty + LESSON_TYPE_STEP,
            LessonType::Intermediate => profile.difficulty,
            LessonType::Beginner => profile.difficulty - LESSON_TYPE_STEP,
        }
        .clamp(0.0, 1.0);

        LessonSpec {
            lesson_type,
            difficulty: round2(difficulty),
            focus_areas: profile.weak_phonemes.iter().cloned().collect(),
            vocabulary_level: profile.vocabulary_strength,
            // Taken from the unrounded difficulty.
            recommended_duration: lesson_duration(difficulty),
        }
    }
}

/// `15 + difficulty * 10` minutes, truncated.
pub fn lesson_duration(difficulty: f64) -> u32 {
    (BASE_DURATION_MINUTES + difficulty.clamp(0.0, 1.0) * DURATION_SPAN_MINUTES) as u32
}

/// One scored lesson attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub lesson_id: String,
    pub pronunciation_score: f64,
    pub comprehension_score: Option<f64>,
    pub vocabulary_score: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate view of a student's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentStats {
    pub total_lessons: usize,
    pub avg_pronunciation: f64,
    pub avg_comprehension: Option<f64>,
    pub avg_vocabulary: Option<f64>,
    pub last_lesson_at: Option<DateTime<Utc>>,
    pub current_level: LessonType,
    pub difficulty: f64,
    pub learning_curve: f64,
}

impl Default for StudentStats {
    fn default() -> Self {
        let profile = DifficultyProfile::default();
        Self {
            total_lessons: 0,
            avg_pronunciation: 0.0,
            avg_comprehension: None,
            avg_vocabulary: None,
            last_lesson_at: None,
            current_level: profile.current_level,
            difficulty: profile.difficulty,
            learning_curve: profile.learning_curve,
        }
    }
}

/// A student's profile together with the history it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerRecord {
    pub student_id: String,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub profile: DifficultyProfile,
    pub history: Vec<ProgressRecord>,
}

impl LearnerRecord {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            name: None,
            age: None,
            profile: DifficultyProfile::default(),
            history: Vec::new(),
        }
    }

    pub fn registered(
        student_id: impl Into<String>,
        name: impl Into<String>,
        age: u32,
        level: LessonType,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            name: Some(name.into()),
            age: Some(age),
            profile: DifficultyProfile::starting_at(level),
            history: Vec::new(),
        }
    }

    pub fn pronunciation_scores(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.pronunciation_score).collect()
    }

    /// Appends a scored attempt and runs the adaptation step.
    ///
    /// `target` is the phoneme sequence the attempt was scored against; its
    /// correctly produced phonemes leave the weak set and the phonemes behind
    /// substitution or deletion errors join it.
    pub fn record_attempt<S: AsRef<str>>(
        &mut self,
        record: ProgressRecord,
        target: &[S],
        result: &ScoreResult,
        policy: &dyn DifficultyPolicy,
    ) {
        let missed: BTreeSet<String> = result.errors.iter().map(|e| e.target.clone()).collect();
        for phoneme in target {
            let phoneme: &str = phoneme.as_ref();
            if !missed.contains(phoneme) {
                self.profile.weak_phonemes.remove(phoneme);
            }
        }
        self.profile.weak_phonemes.extend(missed);

        self.history.push(record);

        let vocabulary: Vec<f64> = self.history.iter().filter_map(|r| r.vocabulary_score).collect();
        if let Some(average) = mean(&vocabulary) {
            self.profile.vocabulary_strength = (average / 100.0).clamp(0.0, 1.0);
        }

        self.profile = policy.update(&self.profile, &self.pronunciation_scores());
        tracing::debug!(
            student_id = %self.student_id,
            difficulty = self.profile.difficulty,
            level = %self.profile.current_level,
            "Learner profile updated"
        );
    }

    pub fn recommend(&self, policy: &dyn DifficultyPolicy) -> LessonSpec {
        policy.recommend(&self.profile, &self.pronunciation_scores())
    }

    pub fn stats(&self) -> StudentStats {
        let pronunciation = self.pronunciation_scores();
        let comprehension: Vec<f64> = self
            .history
            .iter()
            .filter_map(|r| r.comprehension_score)
            .collect();
        let vocabulary: Vec<f64> = self.history.iter().filter_map(|r| r.vocabulary_score).collect();

        StudentStats {
            total_lessons: self.history.len(),
            avg_pronunciation: mean(&pronunciation).map(round2).unwrap_or(0.0),
            avg_comprehension: mean(&comprehension).map(round2),
            avg_vocabulary: mean(&vocabulary).map(round2),
            last_lesson_at: self.history.iter().map(|r| r.recorded_at).max(),
            current_level: self.profile.current_level,
            difficulty: round2(self.profile.difficulty),
            learning_curve: round2(self.profile.learning_curve),
        }
    }
}

fn tail(scores: &[f64], n: usize) -> &[f64] {
    &scores[scores.len().saturating_sub(n)..]
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::PronunciationScorer;
    use approx::assert_abs_diff_eq;

    fn progress(score: f64) -> ProgressRecord {
        ProgressRecord {
            lesson_id: "beginner-0".to_string(),
            pronunciation_score: score,
            comprehension_score: None,
            vocabulary_score: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_lesson_for_unknown_student() {
        let lesson = LessonSpec::default();
        assert_eq!(lesson.lesson_type, LessonType::Beginner);
        assert_eq!(lesson.difficulty, 0.5);
        assert!(lesson.focus_areas.is_empty());
        assert_eq!(lesson.recommended_duration, 15);
    }

    #[test]
    fn test_window_difficulty_bands() {
        assert_abs_diff_eq!(RuleBasedPolicy::window_difficulty(&[90.0]), 0.55, epsilon = 1e-9);
        assert_abs_diff_eq!(
            RuleBasedPolicy::window_difficulty(&[80.0, 75.0]),
            0.5,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            RuleBasedPolicy::window_difficulty(&[50.0, 50.0]),
            0.3,
            epsilon = 1e-9
        );
        assert_eq!(RuleBasedPolicy::window_difficulty(&[]), 0.5);
        assert_eq!(RuleBasedPolicy::window_difficulty(&[0.0; 4]), 0.0);
        assert_eq!(RuleBasedPolicy::window_difficulty(&[100.0; 10]), 1.0);
    }

    #[test]
    fn test_learning_curve_needs_three_samples() {
        assert_eq!(RuleBasedPolicy::learning_curve(&[40.0, 90.0]), 0.0);

        // window avg 65, baseline avg 50, four lessons
        let curve = RuleBasedPolicy::learning_curve(&[40.0, 50.0, 60.0, 110.0]);
        assert_abs_diff_eq!(curve, 15.0 / 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_high_streak_strictly_increases_difficulty_up_to_one() {
        let policy = RuleBasedPolicy;
        let mut learner = LearnerRecord::new("s-1");
        let mut previous = learner.profile.difficulty;

        for _ in 0..10 {
            learner.record_attempt(progress(92.0), &["k"], &dummy_result(92.0), &policy);
            let current = learner.profile.difficulty;
            assert!(current > previous, "{} should exceed {}", current, previous);
            assert!(current <= 1.0);
            previous = current;
        }
        assert_abs_diff_eq!(previous, 1.0, epsilon = 1e-9);

        for _ in 0..20 {
            learner.record_attempt(progress(100.0), &["k"], &dummy_result(100.0), &policy);
            assert!(learner.profile.difficulty <= 1.0);
        }
    }

    #[test]
    fn test_difficulty_never_leaves_unit_interval() {
        let policy = RuleBasedPolicy;
        let mut learner = LearnerRecord::new("s-2");
        let extremes = [0.0, 100.0, 0.0, 0.0, 100.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0, 100.0];
        for score in extremes.iter().cycle().take(60) {
            learner.record_attempt(progress(*score), &["a"], &dummy_result(*score), &policy);
            assert!((0.0..=1.0).contains(&learner.profile.difficulty));
            let lesson = learner.recommend(&policy);
            assert!((0.0..=1.0).contains(&lesson.difficulty));
            assert!((15..=25).contains(&lesson.recommended_duration));
        }
    }

    #[test]
    fn test_recommend_bands_on_recent_five() {
        let policy = RuleBasedPolicy;
        let profile = DifficultyProfile::default();

        // Older low scores fall outside the five-score window.
        let lesson = policy.recommend(&profile, &[10.0, 10.0, 85.0, 85.0, 85.0, 85.0, 85.0]);
        assert_eq!(lesson.lesson_type, LessonType::Advanced);
        assert_abs_diff_eq!(lesson.difficulty, 0.6, epsilon = 1e-9);
        assert_eq!(lesson.recommended_duration, 21);

        let lesson = policy.recommend(&profile, &[65.0, 70.0]);
        assert_eq!(lesson.lesson_type, LessonType::Intermediate);
        assert_abs_diff_eq!(lesson.difficulty, 0.5, epsilon = 1e-9);

        let lesson = policy.recommend(&profile, &[30.0]);
        assert_eq!(lesson.lesson_type, LessonType::Beginner);
        assert_abs_diff_eq!(lesson.difficulty, 0.4, epsilon = 1e-9);
        assert_eq!(lesson.recommended_duration, 19);

        // A known profile without scores is treated as average 50.
        let lesson = policy.recommend(&profile, &[]);
        assert_eq!(lesson.lesson_type, LessonType::Beginner);
    }

    #[test]
    fn test_duration_truncates_the_unrounded_difficulty() {
        let profile = DifficultyProfile {
            difficulty: 0.397,
            ..DifficultyProfile::default()
        };
        let lesson = RuleBasedPolicy.recommend(&profile, &[65.0]);
        assert_eq!(lesson.lesson_type, LessonType::Intermediate);
        assert_abs_diff_eq!(lesson.difficulty, 0.4, epsilon = 1e-9);
        assert_eq!(lesson.recommended_duration, 18);
    }

    #[test]
    fn test_weak_phonemes_track_errors_and_recoveries() {
        let policy = RuleBasedPolicy;
        let scorer = PronunciationScorer::new();
        let mut learner = LearnerRecord::new("s-3");
        let target = ["θ", "ɪ", "ŋ", "k"];

        let result = scorer.assess(&target, &["t", "ɪ", "ŋ", "k"]);
        learner.record_attempt(progress(result.score), &target, &result, &policy);
        assert!(learner.profile.weak_phonemes.contains("θ"));
        assert_eq!(learner.recommend(&policy).focus_areas, vec!["θ".to_string()]);

        let result = scorer.assess(&target, &target);
        learner.record_attempt(progress(result.score), &target, &result, &policy);
        assert!(learner.profile.weak_phonemes.is_empty());
    }

    #[test]
    fn test_vocabulary_strength_and_stats() {
        let policy = RuleBasedPolicy;
        let mut learner = LearnerRecord::registered("s-4", "Ravi", 9, LessonType::Intermediate);
        assert_eq!(learner.profile.current_level, LessonType::Intermediate);

        let mut record = progress(80.0);
        record.vocabulary_score = Some(70.0);
        record.comprehension_score = Some(60.0);
        learner.record_attempt(record, &["a"], &dummy_result(80.0), &policy);
        learner.record_attempt(progress(70.0), &["a"], &dummy_result(70.0), &policy);

        assert_abs_diff_eq!(learner.profile.vocabulary_strength, 0.7, epsilon = 1e-9);

        let stats = learner.stats();
        assert_eq!(stats.total_lessons, 2);
        assert_abs_diff_eq!(stats.avg_pronunciation, 75.0, epsilon = 1e-9);
        assert_eq!(stats.avg_comprehension, Some(60.0));
        assert_eq!(stats.avg_vocabulary, Some(70.0));
        assert!(stats.last_lesson_at.is_some());
        assert_eq!(stats.current_level, LessonType::Intermediate);
    }

    #[test]
    fn test_lesson_type_parsing() {
        assert_eq!("Advanced".parse::<LessonType>(), Ok(LessonType::Advanced));
        assert!("expert".parse::<LessonType>().is_err());
        assert_eq!(LessonType::Intermediate.to_string(), "intermediate");
    }

    fn dummy_result(score: f64) -> ScoreResult {
        ScoreResult {
            score,
            phoneme_error_rate: 1.0 - score / 100.0,
            substitutions: 0,
            insertions: 0,
            deletions: 0,
            errors: Vec::new(),
            feedback: String::new(),
        }
    }
}

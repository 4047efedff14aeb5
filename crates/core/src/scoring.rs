//! Pronunciation Scoring
//!
//! Turns an alignment into a phoneme error rate, a 0-100 score and itemised
//! corrective hints.

use crate::phoneme::{AlignmentPair, align};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const EMPTY_TARGET_FEEDBACK: &str = "No target provided. Nothing to score.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Substitution,
    Deletion,
}

/// A single itemised pronunciation mistake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    /// Index into the target sequence.
    pub position: usize,
    pub target: String,
    /// What the student produced instead. Only present for substitutions.
    pub observed: Option<String>,
    pub hint: String,
}

/// The outcome of scoring one attempt. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// 0-100, two decimals.
    pub score: f64,
    /// Errors per target phoneme, three decimals. Exceeds 1 when insertions dominate.
    pub phoneme_error_rate: f64,
    pub substitutions: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub errors: Vec<ErrorDetail>,
    pub feedback: String,
}

impl ScoreResult {
    pub fn total_errors(&self) -> usize {
        self.substitutions + self.insertions + self.deletions
    }

    pub fn band(&self) -> FeedbackBand {
        FeedbackBand::for_score(self.score)
    }
}

/// Fixed score bands used for spoken feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackBand {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

impl FeedbackBand {
    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            FeedbackBand::Excellent
        } else if score >= 75.0 {
            FeedbackBand::Good
        } else if score >= 60.0 {
            FeedbackBand::Fair
        } else {
            FeedbackBand::NeedsImprovement
        }
    }

    pub fn message(self, score: f64) -> String {
        match self {
            FeedbackBand::Excellent => {
                format!("Excellent pronunciation! You scored {:.1}%. Keep practicing!", score)
            }
            FeedbackBand::Good => format!(
                "Good pronunciation! You scored {:.1}%. Focus on the highlighted sounds.",
                score
            ),
            FeedbackBand::Fair => format!(
                "Fair pronunciation. Score: {:.1}%. Practice the corrections below.",
                score
            ),
            FeedbackBand::NeedsImprovement => format!(
                "Needs improvement. Score: {:.1}%. Review the hints and try again.",
                score
            ),
        }
    }
}

/// Scores attempts against a fixed table of articulation hints.
#[derive(Debug, Clone)]
pub struct PronunciationScorer {
    hints: HashMap<&'static str, &'static str>,
    descriptions: HashMap<&'static str, &'static str>,
}

impl Default for PronunciationScorer {
    fn default() -> Self {
        let hints = HashMap::from([
            ("θ", "Try saying 'th' as in 'think' - place tongue between teeth"),
            ("ð", "Try saying 'th' as in 'this' - place tongue between teeth, voice it"),
            ("r", "Roll your 'r' sound - curl tongue back"),
            ("v", "Make 'v' sound by touching lower lip to upper teeth"),
            ("w", "Make 'w' sound by rounding lips like saying 'oo'"),
            ("ʃ", "Make 'sh' sound - spread lips, tongue up"),
            ("ʒ", "Make 'zh' sound like in 'measure'"),
            ("tʃ", "Make 'ch' sound - tongue touches roof of mouth"),
            ("dʒ", "Make 'j' sound like in 'judge'"),
        ]);
        let descriptions = HashMap::from([
            ("θ", "th (think)"),
            ("ð", "th (this)"),
            ("ʃ", "sh"),
            ("ʒ", "zh"),
            ("tʃ", "ch"),
            ("dʒ", "j"),
        ]);
        Self {
            hints,
            descriptions,
        }
    }
}

impl PronunciationScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aligns and scores in one step.
    pub fn assess<S: AsRef<str>>(&self, target: &[S], student: &[S]) -> ScoreResult {
        let alignment = align(target, student);
        self.score(target, student, &alignment)
    }

    /// Scores `student` against `target` using a precomputed alignment.
    ///
    /// Pairs whose indices fall outside either sequence are ignored. Target
    /// positions not covered by the alignment count as deletions and are
    /// itemised; uncovered student positions count as insertions only.
    pub fn score<S: AsRef<str>>(
        &self,
        target: &[S],
        student: &[S],
        alignment: &[AlignmentPair],
    ) -> ScoreResult {
        if target.is_empty() {
            return ScoreResult {
                score: 0.0,
                phoneme_error_rate: 0.0,
                substitutions: 0,
                insertions: 0,
                deletions: 0,
                errors: Vec::new(),
                feedback: EMPTY_TARGET_FEEDBACK.to_string(),
            };
        }

        let mut target_covered = vec![false; target.len()];
        let mut student_covered = vec![false; student.len()];
        let mut errors = Vec::new();
        let mut substitutions = 0;

        for pair in alignment {
            let (Some(expected), Some(heard)) = (
                target.get(pair.target_index),
                student.get(pair.student_index),
            ) else {
                continue;
            };
            target_covered[pair.target_index] = true;
            student_covered[pair.student_index] = true;

            if expected.as_ref() != heard.as_ref() {
                substitutions += 1;
                errors.push(ErrorDetail {
                    kind: ErrorKind::Substitution,
                    position: pair.target_index,
                    target: expected.as_ref().to_string(),
                    observed: Some(heard.as_ref().to_string()),
                    hint: self.hint(expected.as_ref()),
                });
            }
        }

        let mut deletions = 0;
        for (position, expected) in target.iter().enumerate() {
            if target_covered[position] {
                continue;
            }
            deletions += 1;
            errors.push(ErrorDetail {
                kind: ErrorKind::Deletion,
                position,
                target: expected.as_ref().to_string(),
                observed: None,
                hint: format!("Missing sound: {}", self.describe(expected.as_ref())),
            });
        }
        errors.sort_by_key(|e| e.position);

        let insertions = student_covered.iter().filter(|covered| !**covered).count();

        let per = (substitutions + insertions + deletions) as f64 / target.len() as f64;
        let score = round_to(((1.0 - per) * 100.0).max(0.0), 2);

        ScoreResult {
            score,
            phoneme_error_rate: round_to(per, 3),
            substitutions,
            insertions,
            deletions,
            errors,
            feedback: FeedbackBand::for_score(score).message(score),
        }
    }

    /// Corrective hint for a mispronounced target phoneme.
    pub fn hint(&self, phoneme: &str) -> String {
        match self.hints.get(phoneme) {
            Some(hint) => hint.to_string(),
            None => format!(
                "Try to pronounce '{}' more clearly. Listen and repeat.",
                phoneme
            ),
        }
    }

    fn describe<'a>(&self, phoneme: &'a str) -> &'a str {
        self.descriptions.get(phoneme).copied().unwrap_or(phoneme)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

//! Phoneme Alignment
//!
//! Pairs up the phonemes a student produced with the target pronunciation.

use serde::{Deserialize, Serialize};

/// An ordered sequence of phoneme symbols. Order matters and repeats are legal.
pub type PhonemeSequence = Vec<String>;

/// A target position paired with the student position it was compared against.
///
/// Produced pairs are non-decreasing in both coordinates. A pair is a match
/// when both symbols are equal and a substitution otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentPair {
    pub target_index: usize,
    pub student_index: usize,
}

impl AlignmentPair {
    pub fn new(target_index: usize, student_index: usize) -> Self {
        Self {
            target_index,
            student_index,
        }
    }
}

/// Aligns `student` against `target` with a greedy one-token lookahead.
///
/// At each step a match advances both sides. On a mismatch, a student symbol
/// is skipped as an insertion when the next student symbol realigns, a target
/// symbol is skipped as a deletion when the next target symbol realigns, and
/// otherwise the pair is emitted as a substitution. Runs of two or more
/// consecutive insertions or deletions are not recovered; they surface as
/// substitutions. Symbols left over once either side is exhausted are not
/// paired and are classified by the scorer.
pub fn align<S: AsRef<str>>(target: &[S], student: &[S]) -> Vec<AlignmentPair> {
    let mut alignment = Vec::with_capacity(target.len().min(student.len()));
    let (mut i, mut j) = (0, 0);

    while i < target.len() && j < student.len() {
        let expected = target[i].as_ref();
        let heard = student[j].as_ref();

        if expected == heard {
            alignment.push(AlignmentPair::new(i, j));
            i += 1;
            j += 1;
        } else if student.get(j + 1).is_some_and(|s| s.as_ref() == expected) {
            j += 1;
        } else if target.get(i + 1).is_some_and(|t| t.as_ref() == heard) {
            i += 1;
        } else {
            alignment.push(AlignmentPair::new(i, j));
            i += 1;
            j += 1;
        }
    }

    alignment
}

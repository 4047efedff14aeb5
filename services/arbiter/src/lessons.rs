//! Lesson Catalog and Phoneme Extraction
//!
//! Target phrases per lesson level, and the capability that turns a phrase
//! or a transcript into a phoneme sequence.

use std::collections::HashMap;
use tutor_core::difficulty::LessonType;
use tutor_core::phoneme::PhonemeSequence;

/// Turns text into phonemes. Real phonemisation belongs to the speech
/// collaborator; implementations here only need to be consistent between
/// target phrases and transcripts.
pub trait PhonemeExtractor: Send + Sync {
    fn extract(&self, text: &str) -> PhonemeSequence;
}

/// Lower-cased whitespace tokens. Each word counts as one unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenExtractor;

impl PhonemeExtractor for WordTokenExtractor {
    fn extract(&self, text: &str) -> PhonemeSequence {
        tokens(text).collect()
    }
}

/// Maps known words to IPA phonemes and falls back to the word token.
#[derive(Debug, Clone, Default)]
pub struct LexiconExtractor {
    entries: HashMap<String, Vec<String>>,
}

impl LexiconExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lexicon covering every word used by the built-in catalog.
    pub fn with_defaults() -> Self {
        let mut lexicon = Self::new();
        for (word, phonemes) in [
            ("cat", "k æ t"),
            ("red", "r ɛ d"),
            ("the", "ð ə"),
            ("good", "g ʊ d"),
            ("think", "θ ɪ ŋ k"),
            ("thank", "θ æ ŋ k"),
            ("this", "ð ɪ s"),
            ("three", "θ r i"),
            ("very", "v ɛ r i"),
            ("water", "w ɔ t ɚ"),
            ("with", "w ɪ θ"),
            ("you", "j u"),
            ("measure", "m ɛ ʒ ɚ"),
            ("church", "tʃ ɚ tʃ"),
            ("judge", "dʒ ʌ dʒ"),
        ] {
            lexicon.insert(word, phonemes.split_whitespace());
        }
        lexicon
    }

    pub fn insert<I, S>(&mut self, word: &str, phonemes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            word.to_lowercase(),
            phonemes.into_iter().map(Into::into).collect(),
        );
    }
}

impl PhonemeExtractor for LexiconExtractor {
    fn extract(&self, text: &str) -> PhonemeSequence {
        tokens(text)
            .flat_map(|word| match self.entries.get(&word) {
                Some(phonemes) => phonemes.clone(),
                None => vec![word],
            })
            .collect()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
}

/// A phrase the student is asked to pronounce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub lesson_id: String,
    pub lesson_type: LessonType,
    pub target_phrase: String,
}

/// Ordered target phrases per lesson level. Cursors wrap around.
#[derive(Debug, Clone)]
pub struct LessonCatalog {
    phrases: HashMap<LessonType, Vec<String>>,
}

impl Default for LessonCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        catalog.set(LessonType::Beginner, ["cat", "red", "the cat", "good"]);
        catalog.set(
            LessonType::Intermediate,
            ["think", "thank you", "very good", "this red cat"],
        );
        catalog.set(
            LessonType::Advanced,
            ["measure the water", "the church judge", "think with three"],
        );
        catalog
    }
}

impl LessonCatalog {
    pub fn empty() -> Self {
        Self {
            phrases: HashMap::new(),
        }
    }

    pub fn set<I, S>(&mut self, lesson_type: LessonType, phrases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phrases
            .insert(lesson_type, phrases.into_iter().map(Into::into).collect());
    }

    pub fn len(&self, lesson_type: LessonType) -> usize {
        self.phrases.get(&lesson_type).map_or(0, Vec::len)
    }

    /// The lesson at `cursor`, wrapping. `None` when the level has no phrases.
    pub fn lesson(&self, lesson_type: LessonType, cursor: usize) -> Option<Lesson> {
        let phrases = self.phrases.get(&lesson_type)?;
        if phrases.is_empty() {
            return None;
        }
        let index = cursor % phrases.len();
        Some(Lesson {
            lesson_id: format!("{}-{}", lesson_type, index),
            lesson_type,
            target_phrase: phrases[index].clone(),
        })
    }
}

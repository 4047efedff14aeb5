//! Spoken command keywords.

/// A control phrase recognised in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TutorCommand {
    Stop,
    Help,
    Repeat,
    Next,
    Previous,
}

impl TutorCommand {
    /// Checked in this order; the first keyword found wins.
    const KEYWORDS: [(&'static str, TutorCommand); 5] = [
        ("stop", TutorCommand::Stop),
        ("help", TutorCommand::Help),
        ("repeat", TutorCommand::Repeat),
        ("next", TutorCommand::Next),
        ("previous", TutorCommand::Previous),
    ];

    /// Case-insensitive substring match. `None` means the transcript is a
    /// pronunciation attempt.
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, command)| *command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_case_insensitive_substrings() {
        assert_eq!(TutorCommand::parse("STOP"), Some(TutorCommand::Stop));
        assert_eq!(TutorCommand::parse("please help me"), Some(TutorCommand::Help));
        assert_eq!(TutorCommand::parse("Repeat that"), Some(TutorCommand::Repeat));
        assert_eq!(TutorCommand::parse("next one"), Some(TutorCommand::Next));
        assert_eq!(TutorCommand::parse("go to the previous"), Some(TutorCommand::Previous));
        // Substring, not whole word.
        assert_eq!(TutorCommand::parse("unstoppable"), Some(TutorCommand::Stop));
    }

    #[test]
    fn test_first_keyword_in_fixed_order_wins() {
        assert_eq!(
            TutorCommand::parse("next, no wait, stop"),
            Some(TutorCommand::Stop)
        );
        assert_eq!(
            TutorCommand::parse("repeat the previous one"),
            Some(TutorCommand::Repeat)
        );
    }

    #[test]
    fn test_plain_speech_is_not_a_command() {
        assert_eq!(TutorCommand::parse("the cat"), None);
        assert_eq!(TutorCommand::parse(""), None);
    }
}

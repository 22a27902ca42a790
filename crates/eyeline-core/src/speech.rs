//! Transcript quality: speaking rate plus a small dictionary and rule based
//! spelling/grammar check. Audio transcription happens upstream.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::round_to;

/// Accuracy points lost per error, relative to the word count.
const ERROR_PENALTY: f64 = 150.0;

const MISSPELLINGS: &[(&str, &str)] = &[
    ("recieve", "receive"),
    ("acheive", "achieve"),
    ("definately", "definitely"),
    ("seperate", "separate"),
    ("occured", "occurred"),
    ("untill", "until"),
    ("wich", "which"),
    ("teh", "the"),
    ("adn", "and"),
    ("thier", "their"),
];

const WRONG_PAST_TENSE: &[(&str, &str)] = &[
    ("buyed", "bought"),
    ("goed", "went"),
    ("runned", "ran"),
    ("eated", "ate"),
    ("drinked", "drank"),
    ("sleeped", "slept"),
    ("thinked", "thought"),
];

const GRAMMAR_RULES: &[(&str, &str)] = &[
    (r"(?i)\b(he|she|it) (go|do|have|am)\b", r#"Use "goes/does/has/is" for third person singular"#),
    (r"(?i)\b(you|we|they) (goes|does|has|is)\b", r#"Use "go/do/have/are" for plural subjects"#),
    (r"(?i)\b(I) (are)\b", r#"Use "am" with "I""#),
    (r"(?i)\b(he|she|it) (are)\b", r#"Use "is" with he/she/it"#),
];

static COMPILED_RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn grammar_rules() -> &'static [(Regex, &'static str)] {
    COMPILED_RULES.get_or_init(|| {
        GRAMMAR_RULES
            .iter()
            .filter_map(|(pattern, message)| Regex::new(pattern).ok().map(|re| (re, *message)))
            .collect()
    })
}

fn correction(word: &str) -> Option<&'static str> {
    MISSPELLINGS
        .iter()
        .chain(WRONG_PAST_TENSE)
        .find(|(wrong, _)| *wrong == word)
        .map(|(_, right)| *right)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Spelling,
    Grammar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageError {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: String,
    /// The offending word or phrase, lower-cased.
    pub word: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechMetrics {
    pub text: String,
    pub word_count: usize,
    pub duration_secs: f64,
    pub words_per_minute: f64,
    pub spelling_errors: usize,
    pub grammar_errors: usize,
    pub total_errors: usize,
    /// [0, 100]; 100 for an empty transcript.
    pub accuracy_score: f64,
    pub errors: Vec<LanguageError>,
}

/// Strip everything but word characters and lower-case.
fn clean_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn check_spelling(words: &[&str]) -> Vec<LanguageError> {
    words
        .iter()
        .map(|w| clean_word(w))
        .filter(|w| w.chars().count() > 2 && !w.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|w| {
            correction(&w).map(|right| LanguageError {
                kind: ErrorKind::Spelling,
                message: format!("Spelling error: \"{w}\""),
                suggestion: format!("Correct: \"{right}\""),
                word: w,
            })
        })
        .collect()
}

fn check_grammar(text: &str) -> Vec<LanguageError> {
    let mut errors = Vec::new();
    for (re, message) in grammar_rules() {
        for m in re.find_iter(text) {
            let phrase = m.as_str().to_lowercase();
            errors.push(LanguageError {
                kind: ErrorKind::Grammar,
                message: format!("Grammar: {message}"),
                suggestion: format!("Check: \"{phrase}\""),
                word: phrase,
            });
        }
    }
    errors
}

/// Score a transcript spoken over `duration_secs`.
pub fn evaluate_transcript(text: &str, duration_secs: f64) -> SpeechMetrics {
    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = words.len();
    let words_per_minute = if duration_secs > 0.0 {
        round_to(word_count as f64 / (duration_secs / 60.0), 2)
    } else {
        0.0
    };

    let mut errors = check_spelling(&words);
    let spelling_errors = errors.len();
    errors.extend(check_grammar(text));
    let grammar_errors = errors.len() - spelling_errors;
    let total_errors = errors.len();

    let accuracy_score = if word_count == 0 {
        100.0
    } else {
        round_to((100.0 - total_errors as f64 / word_count as f64 * ERROR_PENALTY).max(0.0), 1)
    };

    debug!(word_count, spelling_errors, grammar_errors, accuracy_score, "transcript evaluated");

    SpeechMetrics {
        text: text.to_string(),
        word_count,
        duration_secs: round_to(duration_secs.max(0.0), 2),
        words_per_minute,
        spelling_errors,
        grammar_errors,
        total_errors,
        accuracy_score,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_transcript() {
        let m = evaluate_transcript("   ", 10.0);
        assert_eq!(m.word_count, 0);
        assert_eq!(m.accuracy_score, 100.0);
        assert_eq!(m.words_per_minute, 0.0);
    }

    #[test]
    fn test_words_per_minute() {
        let m = evaluate_transcript("one two three four five six seven", 3.0);
        assert!((m.words_per_minute - 140.0).abs() < 1e-9);
        let none = evaluate_transcript("one two", 0.0);
        assert_eq!(none.words_per_minute, 0.0);
    }

    #[test]
    fn test_spelling_errors() {
        let m = evaluate_transcript("I will recieve it, untill Friday. They runned home.", 6.0);
        assert_eq!(m.spelling_errors, 3);
        assert_eq!(m.errors[0].word, "recieve");
        assert_eq!(m.errors[0].suggestion, "Correct: \"receive\"");
        assert_eq!(m.errors[2].word, "runned");
    }

    #[test]
    fn test_short_words_and_numbers_skipped() {
        // "teh" is three letters and flagged; "ad" and "12345" are skipped.
        let m = evaluate_transcript("ad 12345 teh", 3.0);
        assert_eq!(m.spelling_errors, 1);
    }

    #[test]
    fn test_grammar_rules() {
        let m = evaluate_transcript("She go to school and they is late. I are here.", 5.0);
        assert_eq!(m.grammar_errors, 3);
        let words: Vec<&str> = m.errors.iter().map(|e| e.word.as_str()).collect();
        assert!(words.contains(&"she go"));
        assert!(words.contains(&"they is"));
        assert!(words.contains(&"i are"));
        assert!(m.errors.iter().all(|e| e.kind == ErrorKind::Grammar));
    }

    #[test]
    fn test_first_person_agreement_not_flagged() {
        let m = evaluate_transcript("I am ready and I have notes, so I go first", 4.0);
        assert_eq!(m.grammar_errors, 0);
        assert_eq!(m.accuracy_score, 100.0);
    }

    #[test]
    fn test_accuracy_formula() {
        // 1 error in 10 words: 100 - 0.1 * 150 = 85
        let text = "we will definately finish the report before the end today";
        let m = evaluate_transcript(text, 4.0);
        assert_eq!(m.word_count, 10);
        assert_eq!(m.total_errors, 1);
        assert!((m.accuracy_score - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_floor() {
        let m = evaluate_transcript("teh adn wich", 2.0);
        assert_eq!(m.accuracy_score, 0.0);
    }
}

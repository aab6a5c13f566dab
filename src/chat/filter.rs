//! Banned-word masking for relayed messages

use crate::error::{ChatError, Result};
use regex::{Captures, Regex};

/// Words masked when no list is configured
pub const DEFAULT_BANNED_WORDS: &[&str] = &[
    "spam",
    "abuse",
    "abusive",
    "inappropriate",
    "hate",
    "toxic",
    "scam",
];

/// Replaces every case-insensitive occurrence of a banned word with asterisks
/// of the same length. Matches are substrings, so "spammer" becomes "****mer".
#[derive(Debug, Clone)]
pub struct ContentFilter {
    pattern: Option<Regex>,
    word_count: usize,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BANNED_WORDS).unwrap_or(Self {
            pattern: None,
            word_count: 0,
        })
    }
}

impl ContentFilter {
    pub fn new<S: AsRef<str>>(banned_words: &[S]) -> Result<Self> {
        let mut words: Vec<&str> = banned_words
            .iter()
            .map(|word| word.as_ref().trim())
            .filter(|word| !word.is_empty())
            .collect();
        // Longest first so "abusive" wins over "abuse"
        words.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        words.dedup();

        if words.is_empty() {
            return Ok(Self {
                pattern: None,
                word_count: 0,
            });
        }

        let alternation = words
            .iter()
            .map(|word| regex::escape(word))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!("(?i)(?:{})", alternation)).map_err(|e| {
            ChatError::ConfigurationError {
                message: format!("Invalid banned word list: {}", e),
            }
        })?;

        Ok(Self {
            pattern: Some(pattern),
            word_count: words.len(),
        })
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Masked copy of `text`
    pub fn apply(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern
                .replace_all(text, |caps: &Captures| "*".repeat(caps[0].chars().count()))
                .into_owned(),
            None => text.to_string(),
        }
    }
}

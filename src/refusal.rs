//! Refusal detection on assistant-authored text.
//!
//! The turn engine only depends on the [`RefusalDetector`] contract. The
//! shipped [`PatternRefusalDetector`] matches a phrase table two ways:
//!
//! - anchored at the very start of the text, for any length;
//! - anywhere in the text, but only when the text is shorter than the
//!   configured threshold (default 200 characters).

use regex::Regex;

use crate::{AppError, Result};

/// Phrases that open a refusal. Matched case-insensitively; straight and
/// curly apostrophes are interchangeable.
pub const DEFAULT_REFUSAL_PHRASES: &[&str] = &[
    "I can't help with",
    "I can't assist with",
    "I can't provide",
    "I can't do that",
    "I cannot help with",
    "I cannot assist with",
    "I cannot provide",
    "I'm not able to help",
    "I am not able to help",
    "I'm unable to help",
    "I am unable to help",
    "I'm unable to assist",
    "I won't be able to help",
    "I will not help",
    "I must decline",
    "I'm sorry, but I can't",
    "I'm sorry, but I cannot",
    "I apologize, but I can't",
    "I apologize, but I cannot",
];

/// Decides whether accumulated assistant text is a refusal.
pub trait RefusalDetector: Send + Sync {
    /// `true` when `text` (of `char_len` characters) reads as a refusal.
    fn is_refusal(&self, text: &str, char_len: usize) -> bool;
}

/// Phrase-table refusal detector.
#[derive(Debug, Clone)]
pub struct PatternRefusalDetector {
    anchored: Regex,
    anywhere: Regex,
    short_text_threshold: usize,
}

impl PatternRefusalDetector {
    /// Detector over [`DEFAULT_REFUSAL_PHRASES`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the phrase table fails to compile.
    pub fn new(short_text_threshold: usize) -> Result<Self> {
        Self::with_phrases(DEFAULT_REFUSAL_PHRASES, short_text_threshold)
    }

    /// Detector over a custom phrase table.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `phrases` is empty or fails to compile.
    pub fn with_phrases(phrases: &[&str], short_text_threshold: usize) -> Result<Self> {
        if phrases.is_empty() {
            return Err(AppError::Config("refusal phrase table is empty".into()));
        }

        let alternation = phrases
            .iter()
            .map(|phrase| regex::escape(phrase).replace('\'', "['\u{2019}]"))
            .collect::<Vec<_>>()
            .join("|");

        let anchored = Regex::new(&format!(r"(?i)\A\s*(?:{alternation})"))
            .map_err(|err| AppError::Config(format!("invalid refusal pattern: {err}")))?;
        let anywhere = Regex::new(&format!("(?i)(?:{alternation})"))
            .map_err(|err| AppError::Config(format!("invalid refusal pattern: {err}")))?;

        Ok(Self {
            anchored,
            anywhere,
            short_text_threshold,
        })
    }

    /// Length (in characters) below which a phrase may appear anywhere.
    #[must_use]
    pub fn short_text_threshold(&self) -> usize {
        self.short_text_threshold
    }
}

impl RefusalDetector for PatternRefusalDetector {
    fn is_refusal(&self, text: &str, char_len: usize) -> bool {
        if self.anchored.is_match(text) {
            return true;
        }
        char_len < self.short_text_threshold && self.anywhere.is_match(text)
    }
}

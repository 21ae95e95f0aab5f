//! Transcript filter engine.
//!
//! Rules run in a fixed order and only ever drop whole messages; survivors
//! keep their original order and text.
//!
//! 1. system messages (when enabled)
//! 2. signature / boilerplate blocks (when enabled)
//! 3. minimum trimmed length, with greetings exempt when greetings are kept;
//!    greeting-only messages are dropped when greetings are not kept
//! 4. configured removal patterns

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::core::config::FilterConfig;
use crate::core::models::{Message, Role};
use crate::errors::PipelineError;

/// A signature block is at most this many non-empty lines long.
const MAX_SIGNATURE_LINES: usize = 4;

/// Words allowed after the closing phrase and on each following line.
const MAX_SIGNOFF_WORDS: usize = 5;

static GREETING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(hi|hello|hey|hiya|thanks|thank you|thx|ty|bye|goodbye|good\s+(morning|afternoon|evening))(\s+(there|again|so much|a lot))?[.!]*$",
    )
    .expect("static regex compile")
});

/// Lines that open a closing block.
static SIGNATURE_OPENER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^((best|kind|warm|warmest)\s+regards?\b|regards,|sincerely\b|yours\s+(truly|sincerely)\b|cheers,|sent from my\b|\[signature\]|thank you for (contacting|chatting with) us\b|this (message|chat) was (sent|generated) automatically\b)",
    )
    .expect("static regex compile")
});

/// Separator lines such as `--` or `====`.
static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-{2,}|={2,}|_{2,})\s*$").expect("static regex compile"));

#[must_use]
pub fn is_greeting(text: &str) -> bool {
    GREETING_RE.is_match(text.trim())
}

fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

/// Structural signature check: the message opens with a closing phrase or
/// separator and everything after it is a short sign-off, or the platform
/// flagged it.
#[must_use]
pub fn is_signature(message: &Message) -> bool {
    if message.is_signature {
        return true;
    }

    let lines: Vec<&str> = message
        .text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let Some((first, rest)) = lines.split_first() else {
        return false;
    };

    if lines.len() > MAX_SIGNATURE_LINES {
        return false;
    }

    let trailing = if let Some(opener) = SIGNATURE_OPENER_RE.find(first) {
        &first[opener.end()..]
    } else if SEPARATOR_RE.is_match(first) {
        ""
    } else {
        return false;
    };

    word_count(trailing) <= MAX_SIGNOFF_WORDS
        && rest.iter().all(|line| word_count(line) <= MAX_SIGNOFF_WORDS)
}

/// Compiled filter rules.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    config: FilterConfig,
    remove_patterns: Vec<Regex>,
}

impl MessageFilter {
    /// # Errors
    ///
    /// Returns `FilterError` when a configured removal pattern is not a valid regex.
    pub fn new(config: FilterConfig) -> Result<Self, PipelineError> {
        let remove_patterns = config
            .remove_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
                    .map_err(|e| {
                        PipelineError::FilterError(format!("invalid pattern '{pattern}': {e}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            remove_patterns,
        })
    }

    #[must_use]
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Apply every rule. Deterministic; returns an empty vector when nothing survives.
    #[must_use]
    pub fn apply(&self, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .filter(|msg| self.should_include(msg))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn should_include(&self, message: &Message) -> bool {
        let text = message.text.trim();

        if self.config.remove_system_messages && message.role == Role::System {
            return false;
        }

        if self.config.remove_agent_signatures && is_signature(message) {
            return false;
        }

        let greeting = is_greeting(text);
        if greeting && !self.config.include_greetings {
            return false;
        }
        if text.chars().count() < self.config.min_message_length
            && !(greeting && self.config.include_greetings)
        {
            return false;
        }

        !self.remove_patterns.iter().any(|re| re.is_match(text))
    }
}

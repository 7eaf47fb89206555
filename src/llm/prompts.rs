//! Prompt templates for text analysis.
//!
//! Each template carries exactly one `{text}` slot. Payloads are cut to a
//! fixed number of characters before substitution.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Substitution slot present once in every template.
pub const TEXT_SLOT: &str = "{text}";

/// Maximum payload characters substituted into a prompt.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 3000;

/// Default prompt for a two-sentence summary.
pub const DEFAULT_SUMMARY_PROMPT: &str = r#"Summarize this text in 2 concise sentences.
Focus on key facts and maintain neutral tone.
Text: '{text}'"#;

/// Default prompt for the key points list.
pub const DEFAULT_KEY_POINTS_PROMPT: &str = r#"Extract the TOP 3 KEY POINTS from this text.
Use bullet points (-) and be factual.
Text: '{text}'"#;

/// Default prompt for sentiment classification.
pub const DEFAULT_SENTIMENT_PROMPT: &str = r#"Classify the sentiment of this text as:
- "POS" (Positive)
- "NEG" (Negative)
- "NEU" (Neutral)
Respond ONLY with one of these 3 labels.
Text: '{text}'"#;

/// The fixed set of prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Summary,
    KeyPoints,
    Sentiment,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 3] = [Self::Summary, Self::KeyPoints, Self::Sentiment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::KeyPoints => "key_points",
            Self::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("{kind} prompt must contain exactly one {{text}} slot (found {found})")]
    SlotCount { kind: TemplateKind, found: usize },
}

/// Instruction strings used for each template kind.
///
/// Operators can override any of them in the `[analysis.prompts]` config
/// table; unset entries keep the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    #[serde(default = "default_summary")]
    pub summary: String,
    #[serde(default = "default_key_points")]
    pub key_points: String,
    #[serde(default = "default_sentiment")]
    pub sentiment: String,
}

fn default_summary() -> String {
    DEFAULT_SUMMARY_PROMPT.to_string()
}

fn default_key_points() -> String {
    DEFAULT_KEY_POINTS_PROMPT.to_string()
}

fn default_sentiment() -> String {
    DEFAULT_SENTIMENT_PROMPT.to_string()
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            summary: default_summary(),
            key_points: default_key_points(),
            sentiment: default_sentiment(),
        }
    }
}

impl PromptTemplates {
    /// Get the instruction string for a template kind.
    pub fn template(&self, kind: TemplateKind) -> &str {
        match kind {
            TemplateKind::Summary => &self.summary,
            TemplateKind::KeyPoints => &self.key_points,
            TemplateKind::Sentiment => &self.sentiment,
        }
    }

    /// Check that every template has exactly one substitution slot.
    pub fn validate(&self) -> Result<(), TemplateError> {
        for kind in TemplateKind::ALL {
            let found = self.template(kind).matches(TEXT_SLOT).count();
            if found != 1 {
                return Err(TemplateError::SlotCount { kind, found });
            }
        }
        Ok(())
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Renders prompts from a fixed template set and input cap.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    templates: PromptTemplates,
    max_input_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(PromptTemplates::default(), DEFAULT_MAX_INPUT_CHARS)
    }
}

impl PromptBuilder {
    pub fn new(templates: PromptTemplates, max_input_chars: usize) -> Self {
        Self {
            templates,
            max_input_chars,
        }
    }

    pub fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// Substitute `payload` into the template for `kind`.
    ///
    /// Payloads longer than the cap are cut to exactly `max_input_chars`
    /// characters first. Only the first slot is replaced, so a payload that
    /// itself contains `{text}` is inserted verbatim.
    pub fn render(&self, kind: TemplateKind, payload: &str) -> String {
        let payload = truncate_chars(payload, self.max_input_chars);
        self.templates
            .template(kind)
            .replacen(TEXT_SLOT, payload, 1)
    }
}

/// Cut `text` to at most `max_chars` characters (UTF-8 safe, not word aware).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

//! Failure classification.
//!
//! Decides whether an error seen while talking to the model (with the tool
//! server attached) is worth one reconnect-and-retry, or should reach the
//! caller untouched.

use std::error::Error as StdError;

/// Outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// A fresh connection may fix it.
    Transient,
    /// Retrying would not help.
    Permanent,
}

/// Decides whether an error is transient.
///
/// Implementations must be pure: the same error content always yields the
/// same class.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &(dyn StdError + 'static)) -> FailureClass;
}

const TIMEOUT: &[&str] = &["timeout", "timed out"];
const CONNECTION_CLOSED: &[&str] = &["connection", "closed", "broken pipe", "terminated"];
const RESOURCE_EXHAUSTED: &[&str] = &["resource", "exhausted"];
const TOOL_INVOCATION_FAILED: &[&str] = &["failed to call", "tool call failed", "mcp"];

const CATEGORIES: &[(&str, &[&str])] = &[
    ("timeout", TIMEOUT),
    ("connection-closed", CONNECTION_CLOSED),
    ("resource-exhausted", RESOURCE_EXHAUSTED),
    ("tool-invocation-failed", TOOL_INVOCATION_FAILED),
];

/// Case-insensitive keyword matching over an error and its `source()` chain.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    extra_keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also treat errors mentioning any of `keywords` as transient.
    pub fn with_extra_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extra_keywords.extend(
            keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty()),
        );
        self
    }

    /// The keyword category `text` falls in, if any.
    pub fn category(&self, text: &str) -> Option<&'static str> {
        let text = text.to_lowercase();
        CATEGORIES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(name, _)| *name)
            .or_else(|| {
                self.extra_keywords
                    .iter()
                    .any(|k| text.contains(k.as_str()))
                    .then_some("extra")
            })
    }
}

impl ErrorClassifier for KeywordClassifier {
    fn classify(&self, error: &(dyn StdError + 'static)) -> FailureClass {
        let mut text = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            text.push('\n');
            text.push_str(&cause.to_string());
            source = cause.source();
        }

        match self.category(&text) {
            Some(_) => FailureClass::Transient,
            None => FailureClass::Permanent,
        }
    }
}

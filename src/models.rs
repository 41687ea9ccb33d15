//! Core data models shared by the index, the chat clients and the pipeline.

use serde::{Deserialize, Serialize};

/// A unit of retrieved context text.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Passage {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

impl Passage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            page: None,
        }
    }
}

/// Which stage of the pipeline produced an [`Answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Lines pulled from the cached table of contents.
    Toc,
    Primary,
    Fallback,
    /// Both models failed; the answer text is the fixed failure message.
    Failed,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Toc => "toc",
            AnswerSource::Primary => "primary",
            AnswerSource::Fallback => "fallback",
            AnswerSource::Failed => "failed",
        }
    }

    /// True when the answer did not come from the first choice for its query kind.
    pub fn is_degraded(&self) -> bool {
        matches!(self, AnswerSource::Fallback | AnswerSource::Failed)
    }
}

impl std::fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of resolving one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

impl Answer {
    pub fn new(text: impl Into<String>, source: AnswerSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

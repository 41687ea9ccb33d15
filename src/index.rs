//! Passage retrieval over a pre-built index artifact.
//!
//! The [`PassageIndex`] trait is the narrow seam the answer pipeline calls
//! through; the index itself is built offline and only loaded here.
//!
//! [`JsonIndex`] reads an artifact of the form
//!
//! ```json
//! { "passages": [ { "text": "...", "source": "ch1", "page": 3 } ] }
//! ```
//!
//! and ranks passages by how many times the query's terms occur in them.
//! Loading is all-or-nothing: a missing or malformed artifact is an error,
//! and the server refuses to start without one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::models::Passage;

/// Finds the passages most relevant to a text query.
#[async_trait]
pub trait PassageIndex: Send + Sync {
    /// Return up to `k` passages, most relevant first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>>;

    /// Number of passages available for retrieval.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
struct IndexArtifact {
    passages: Vec<Passage>,
}

#[derive(Debug)]
struct IndexedPassage {
    passage: Passage,
    terms: Vec<String>,
}

/// In-memory index loaded from a JSON artifact.
#[derive(Debug)]
pub struct JsonIndex {
    entries: Vec<IndexedPassage>,
}

impl JsonIndex {
    /// Load the artifact at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read index artifact: {}", path.display()))?;
        let artifact: IndexArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse index artifact: {}", path.display()))?;
        Ok(Self::from_passages(artifact.passages))
    }

    pub fn from_passages(passages: Vec<Passage>) -> Self {
        let entries = passages
            .into_iter()
            .filter(|p| !p.text.trim().is_empty())
            .map(|passage| IndexedPassage {
                terms: tokenize(&passage.text),
                passage,
            })
            .collect();
        Self { entries }
    }
}

#[async_trait]
impl PassageIndex for JsonIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let score = entry
                    .terms
                    .iter()
                    .filter(|t| query_terms.contains(t.as_str()))
                    .count();
                (score > 0).then_some((i, score))
            })
            .collect();

        // Stable sort: equal scores keep artifact order.
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, _)| self.entries[i].passage.clone())
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

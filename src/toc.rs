//! Table-of-contents shortcut.
//!
//! Some questions ("what are the prose topics?", "show the contents") are
//! better answered by listing the textbook's own headings than by asking a
//! model. [`is_toc_query`] recognises them and [`TocExtractor`] pulls the
//! matching lines out of the source PDF.
//!
//! The extractor parses the document at most once per instance. After the
//! first non-empty result it keeps returning that text, even if the file on
//! disk changes or disappears.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Maximum number of matching lines kept in the excerpt.
pub const MAX_TOC_LINES: usize = 80;

const TOC_QUERY_MARKERS: &[&str] = &[
    "prose topics",
    "contents",
    "table of contents",
    "poetry list",
    "what are the prose",
];

const TOC_LINE_PATTERN: &str = r"(?i)Prose|Poetry|Grammar|Contents";

/// Returns true when `query` asks for a topic listing.
///
/// Plain case-insensitive substring containment: "what are the contents of
/// this sentence" matches too.
pub fn is_toc_query(query: &str) -> bool {
    let q = query.trim().to_lowercase();
    TOC_QUERY_MARKERS.iter().any(|marker| q.contains(marker))
}

/// Keep the lines of `pages` that look like TOC entries.
///
/// Pages are joined with `\n` in order before splitting into lines; at most
/// [`MAX_TOC_LINES`] matches are kept.
pub fn select_toc_lines(pages: &[String]) -> String {
    let pattern = toc_line_regex();
    let text = pages.join("\n");
    text.lines()
        .filter(|line| pattern.is_match(line))
        .take(MAX_TOC_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

fn toc_line_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(TOC_LINE_PATTERN).expect("TOC line pattern is valid"))
}

/// Lazily extracts and caches the TOC excerpt of one document.
pub struct TocExtractor {
    pdf_path: PathBuf,
    cache: OnceLock<String>,
}

impl TocExtractor {
    pub fn new(pdf_path: impl Into<PathBuf>) -> Self {
        Self {
            pdf_path: pdf_path.into(),
            cache: OnceLock::new(),
        }
    }

    /// An extractor whose cache is already populated with `toc`.
    pub fn with_cached(pdf_path: impl Into<PathBuf>, toc: impl Into<String>) -> Self {
        let extractor = Self::new(pdf_path);
        let _ = extractor.cache.set(toc.into());
        extractor
    }

    pub fn cached(&self) -> Option<&str> {
        self.cache.get().map(String::as_str)
    }

    /// Return the TOC excerpt, parsing the document on first use.
    ///
    /// `None` means "not available": the document is missing, unreadable,
    /// fails to parse, or has no matching lines. Nothing is cached in that
    /// case, so a later call tries again.
    pub async fn extract(&self) -> Option<String> {
        if let Some(toc) = self.cache.get() {
            return Some(toc.clone());
        }

        if !self.pdf_path.exists() {
            tracing::debug!(path = %self.pdf_path.display(), "TOC source document not found");
            return None;
        }

        let path = self.pdf_path.clone();
        let parsed = tokio::task::spawn_blocking(move || read_pdf_pages(&path)).await;

        let pages = match parsed {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                tracing::warn!(path = %self.pdf_path.display(), error = %e, "PDF parse error");
                return None;
            }
            Err(e) => {
                // pdf-extract panics on some malformed inputs
                tracing::warn!(path = %self.pdf_path.display(), error = %e, "PDF parser aborted");
                return None;
            }
        };

        let toc = select_toc_lines(&pages);
        if toc.is_empty() {
            tracing::info!(path = %self.pdf_path.display(), "no TOC lines found in document");
            return None;
        }

        // Concurrent first callers may both get here; the result is
        // deterministic, so whichever write lands first is kept.
        let _ = self.cache.set(toc);
        self.cache.get().cloned()
    }
}

fn read_pdf_pages(path: &Path) -> anyhow::Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_matches_markers_case_insensitively() {
        assert!(is_toc_query("What is the TABLE OF CONTENTS?"));
        assert!(is_toc_query("  list the Prose Topics please "));
        assert!(is_toc_query("give me the poetry list"));
        assert!(is_toc_query("What are the prose lessons?"));
    }

    #[test]
    fn classifier_accepts_substring_false_positives() {
        assert!(is_toc_query("what are the contents of this sentence"));
        assert!(is_toc_query("discontentshire"));
    }

    #[test]
    fn classifier_rejects_ordinary_questions() {
        assert!(!is_toc_query("explain this poem's theme"));
        assert!(!is_toc_query("who wrote the prose piece on rain?"));
        assert!(!is_toc_query(""));
    }

    #[test]
    fn selects_keyword_lines_across_pages_in_order() {
        let pages = vec![
            "CONTENTS\nUnit 1 Prose: The Portrait\nsomething else".to_string(),
            "Unit 2 poetry: Ode\nGrammar exercises\nIndex".to_string(),
        ];
        assert_eq!(
            select_toc_lines(&pages),
            "CONTENTS\nUnit 1 Prose: The Portrait\nUnit 2 poetry: Ode\nGrammar exercises"
        );
    }

    #[test]
    fn selection_is_bounded() {
        let pages: Vec<String> = (0..200).map(|i| format!("Prose lesson {}", i)).collect();
        let toc = select_toc_lines(&pages);
        assert_eq!(toc.lines().count(), MAX_TOC_LINES);
        assert!(toc.starts_with("Prose lesson 0\n"));
        assert!(toc.ends_with("Prose lesson 79"));
    }

    #[test]
    fn selection_without_matches_is_empty() {
        let pages = vec!["Chapter one\nChapter two".to_string()];
        assert_eq!(select_toc_lines(&pages), "");
    }

    #[tokio::test]
    async fn missing_document_is_not_available() {
        let extractor = TocExtractor::new("/definitely/not/here.pdf");
        assert_eq!(extractor.extract().await, None);
        assert_eq!(extractor.cached(), None);
    }

    #[tokio::test]
    async fn cached_value_short_circuits_parsing() {
        let extractor = TocExtractor::with_cached("/definitely/not/here.pdf", "Ch1 Prose");
        assert_eq!(extractor.extract().await.as_deref(), Some("Ch1 Prose"));
    }

    #[tokio::test]
    async fn unparseable_document_is_not_available() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();
        let extractor = TocExtractor::new(&path);
        assert_eq!(extractor.extract().await, None);
        assert_eq!(extractor.cached(), None);
    }
}

//! Answer resolution.
//!
//! ```text
//!  query ──▶ is_toc_query? ──yes──▶ TocExtractor ──some──▶ Answer(toc)
//!                 │                      │
//!                 no                    none
//!                 ▼                      │
//!           retrieve top-k ◀─────────────┘
//!                 │
//!                 ▼
//!              primary ──ok──▶ Answer(primary)
//!                 │
//!            err / empty
//!                 ▼
//!              fallback ──ok──▶ Answer(fallback)
//!                 │
//!            err / empty
//!                 ▼
//!          Answer(failed, FAILURE_MESSAGE)
//! ```
//!
//! Every request starts from the top: nothing about earlier failures is
//! remembered, and the two model calls never overlap.

use anyhow::Context;
use std::sync::Arc;

use crate::config::Config;
use crate::index::{JsonIndex, PassageIndex};
use crate::llm::{ChatModel, OpenAiChatClient};
use crate::models::{Answer, AnswerSource, Passage};
use crate::toc::{is_toc_query, TocExtractor};

/// Answer text returned when neither model produced an answer.
pub const FAILURE_MESSAGE: &str = "Both primary and fallback models failed to answer.";

/// Resolves a query to an [`Answer`].
pub struct AnswerPipeline {
    index: Arc<dyn PassageIndex>,
    toc: TocExtractor,
    primary: Arc<dyn ChatModel>,
    fallback: Arc<dyn ChatModel>,
    top_k: usize,
}

impl AnswerPipeline {
    pub fn new(
        index: Arc<dyn PassageIndex>,
        toc: TocExtractor,
        primary: Arc<dyn ChatModel>,
        fallback: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            toc,
            primary,
            fallback,
            top_k,
        }
    }

    /// Wire up the index, TOC extractor and both chat clients from `config`.
    ///
    /// Fails if the index artifact is missing or unreadable.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = JsonIndex::load(&config.documents.index_path)
            .context("retrieval index unavailable")?;
        tracing::info!(
            path = %config.documents.index_path.display(),
            passages = index.len(),
            "loaded retrieval index"
        );

        let primary = OpenAiChatClient::primary(&config.llm)?;
        let fallback = OpenAiChatClient::fallback(&config.llm)?;
        tracing::info!(
            endpoint = primary.endpoint(),
            primary = primary.model_name(),
            fallback = fallback.model_name(),
            "configured chat models"
        );

        Ok(Self::new(
            Arc::new(index),
            TocExtractor::new(&config.documents.toc_pdf),
            Arc::new(primary),
            Arc::new(fallback),
            config.retrieval.top_k,
        ))
    }

    pub fn toc(&self) -> &TocExtractor {
        &self.toc
    }

    /// Resolve `query`. Never fails: every error path ends in an answer.
    pub async fn resolve(&self, query: &str) -> Answer {
        let question = query.trim();
        let wants_toc = is_toc_query(question);
        tracing::info!(toc_query = wants_toc, "classified question");

        if wants_toc {
            if let Some(toc) = self.toc.extract().await {
                tracing::info!(lines = toc.lines().count(), "answering from table of contents");
                return Answer::new(toc, AnswerSource::Toc);
            }
            tracing::info!("table of contents unavailable, using models");
        }

        let passages = self.retrieve(question).await;

        if let Some(text) = attempt(self.primary.as_ref(), "primary", question, &passages).await {
            return Answer::new(text, AnswerSource::Primary);
        }

        if let Some(text) = attempt(self.fallback.as_ref(), "fallback", question, &passages).await {
            return Answer::new(text, AnswerSource::Fallback);
        }

        tracing::error!("both models failed");
        Answer::new(FAILURE_MESSAGE, AnswerSource::Failed)
    }

    async fn retrieve(&self, question: &str) -> Vec<Passage> {
        match self.index.retrieve(question, self.top_k).await {
            Ok(passages) => {
                tracing::debug!(count = passages.len(), "retrieved passages");
                for p in &passages {
                    tracing::debug!(source = ?p.source, page = ?p.page, "context passage");
                }
                passages
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }
}

/// One model call. `None` on error or on a blank answer.
async fn attempt(
    model: &dyn ChatModel,
    role: &str,
    question: &str,
    passages: &[Passage],
) -> Option<String> {
    tracing::info!(role, model = model.model_name(), "querying model");
    match model.answer(question, passages).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            tracing::warn!(role, model = model.model_name(), "model returned an empty answer");
            None
        }
        Err(e) => {
            tracing::warn!(role, model = model.model_name(), error = %e, "model call failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted model that records every call it receives.
    struct ScriptedModel {
        name: &'static str,
        reply: Result<&'static str, &'static str>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedModel {
        fn ok(name: &'static str, text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(text),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Err("connection refused"),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_name(&self) -> &str {
            self.name
        }

        async fn answer(&self, question: &str, passages: &[Passage]) -> Result<String, ChatError> {
            self.calls.lock().unwrap().push((
                question.to_string(),
                passages.iter().map(|p| p.text.clone()).collect(),
            ));
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(e) => Err(ChatError::Transport(e.to_string())),
            }
        }
    }

    fn index() -> Arc<dyn PassageIndex> {
        Arc::new(JsonIndex::from_passages(vec![
            Passage::new("The poem explores grief and the theme of loss."),
            Passage::new("Grammar: the passive voice."),
        ]))
    }

    fn pipeline(
        toc: TocExtractor,
        primary: Arc<ScriptedModel>,
        fallback: Arc<ScriptedModel>,
    ) -> AnswerPipeline {
        AnswerPipeline::new(index(), toc, primary, fallback, 3)
    }

    fn no_toc() -> TocExtractor {
        TocExtractor::new("/no/such/textbook.pdf")
    }

    #[tokio::test]
    async fn toc_query_with_cached_toc_skips_models() {
        let primary = ScriptedModel::ok("p", "unused");
        let fallback = ScriptedModel::ok("f", "unused");
        let p = pipeline(
            TocExtractor::with_cached("/no/such/textbook.pdf", "Ch1 Prose\nCh2 Poetry"),
            primary.clone(),
            fallback.clone(),
        );

        let answer = p.resolve("what is the table of contents").await;
        assert_eq!(answer, Answer::new("Ch1 Prose\nCh2 Poetry", AnswerSource::Toc));
        assert!(primary.calls().is_empty());
        assert!(fallback.calls().is_empty());
    }

    #[tokio::test]
    async fn toc_query_without_toc_falls_through_to_primary() {
        let primary = ScriptedModel::ok("p", "The contents cover prose and poetry.");
        let fallback = ScriptedModel::ok("f", "unused");
        let p = pipeline(no_toc(), primary.clone(), fallback.clone());

        let answer = p.resolve("show the contents").await;
        assert_eq!(answer.source, AnswerSource::Primary);
        assert_eq!(primary.calls().len(), 1);
        assert!(fallback.calls().is_empty());
    }

    #[tokio::test]
    async fn primary_success_is_returned() {
        let primary = ScriptedModel::ok("p", "It is about grief.");
        let fallback = ScriptedModel::ok("f", "unused");
        let p = pipeline(no_toc(), primary.clone(), fallback.clone());

        let answer = p.resolve("  explain this poem's theme  ").await;
        assert_eq!(answer, Answer::new("It is about grief.", AnswerSource::Primary));

        let calls = primary.calls();
        assert_eq!(calls[0].0, "explain this poem's theme");
        assert_eq!(calls[0].1, vec!["The poem explores grief and the theme of loss."]);
        assert!(fallback.calls().is_empty());
    }

    #[tokio::test]
    async fn primary_failure_uses_fallback_with_same_inputs() {
        let primary = ScriptedModel::failing("p");
        let fallback = ScriptedModel::ok("f", "The poem explores loss.");
        let p = pipeline(no_toc(), primary.clone(), fallback.clone());

        let answer = p.resolve("explain this poem's theme").await;
        assert_eq!(answer, Answer::new("The poem explores loss.", AnswerSource::Fallback));
        assert!(answer.source.is_degraded());
        assert_eq!(primary.calls(), fallback.calls());
    }

    #[tokio::test]
    async fn blank_primary_answer_counts_as_failure() {
        let primary = ScriptedModel::ok("p", "   \n");
        let fallback = ScriptedModel::ok("f", "Fallback answer.");
        let p = pipeline(no_toc(), primary, fallback);

        let answer = p.resolve("explain this poem's theme").await;
        assert_eq!(answer.source, AnswerSource::Fallback);
        assert_eq!(answer.text, "Fallback answer.");
    }

    #[tokio::test]
    async fn both_failing_yields_fixed_message() {
        let p = pipeline(no_toc(), ScriptedModel::failing("p"), ScriptedModel::failing("f"));

        let answer = p.resolve("explain this poem's theme").await;
        assert_eq!(answer.text, FAILURE_MESSAGE);
        assert_eq!(answer.source, AnswerSource::Failed);
    }

    #[tokio::test]
    async fn blank_fallback_answer_yields_fixed_message() {
        let primary = ScriptedModel::failing("p");
        let fallback = ScriptedModel::ok("f", "  ");
        let p = pipeline(no_toc(), primary.clone(), fallback.clone());

        let answer = p.resolve("explain this poem's theme").await;
        assert_eq!(answer, Answer::new(FAILURE_MESSAGE, AnswerSource::Failed));
        assert!(answer.source.is_degraded());
        assert_eq!(primary.calls().len(), 1);
        assert_eq!(fallback.calls().len(), 1);
    }

    #[tokio::test]
    async fn primary_is_retried_on_every_request() {
        let primary = ScriptedModel::failing("p");
        let fallback = ScriptedModel::ok("f", "ok");
        let p = pipeline(no_toc(), primary.clone(), fallback.clone());

        for _ in 0..3 {
            p.resolve("explain this poem's theme").await;
        }
        assert_eq!(primary.calls().len(), 3);
        assert_eq!(fallback.calls().len(), 3);
    }

    struct BrokenIndex;

    #[async_trait]
    impl PassageIndex for BrokenIndex {
        async fn retrieve(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<Passage>> {
            anyhow::bail!("index offline")
        }

        fn len(&self) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn retrieval_error_still_asks_models_without_context() {
        let primary = ScriptedModel::ok("p", "answer");
        let p = AnswerPipeline::new(
            Arc::new(BrokenIndex),
            no_toc(),
            primary.clone(),
            ScriptedModel::ok("f", "unused"),
            3,
        );

        let answer = p.resolve("explain this poem's theme").await;
        assert_eq!(answer.source, AnswerSource::Primary);
        assert!(primary.calls()[0].1.is_empty());
    }
}

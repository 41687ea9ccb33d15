//! # textbook-qa
//!
//! Question answering over a single textbook. A question is either answered
//! from the book's own table of contents or by handing the most relevant
//! passages from a pre-built index to a chat model, with a second model as a
//! fallback.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   POST /chat ──▶│ AnswerPipeline│
//!                 └──────┬───────┘
//!          ┌─────────────┼──────────────┐
//!          ▼             ▼              ▼
//!   ┌────────────┐ ┌───────────┐ ┌──────────────┐
//!   │TocExtractor│ │ JsonIndex │ │ ChatModel ×2 │
//!   │ (PDF, once)│ │ (top-k)   │ │ primary/fb   │
//!   └────────────┘ └───────────┘ └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Passages and answers |
//! | [`index`] | Passage retrieval over the index artifact |
//! | [`toc`] | TOC query detection and extraction |
//! | [`llm`] | OpenAI-compatible chat clients |
//! | [`pipeline`] | Answer resolution |
//! | [`server`] | HTTP server |

pub mod config;
pub mod index;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod toc;

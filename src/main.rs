//! # textbook-qa CLI (`tqa`)
//!
//! ## Usage
//!
//! ```bash
//! tqa --config ./config/tqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tqa serve` | Start the HTTP server |
//! | `tqa ask "<question>"` | Answer one question and exit |
//! | `tqa toc` | Print the extracted table of contents |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use textbook_qa::config;
use textbook_qa::pipeline::AnswerPipeline;
use textbook_qa::server;
use textbook_qa::toc::TocExtractor;

/// Question answering over a textbook, backed by a local chat model.
#[derive(Parser)]
#[command(name = "tqa", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Loads the retrieval index first and refuses to start without it.
    Serve,

    /// Answer a single question through the full pipeline.
    Ask {
        /// The question to answer.
        query: String,
    },

    /// Print the table of contents extracted from the source PDF.
    Toc,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask { query } => {
            let pipeline = AnswerPipeline::from_config(&cfg)?;
            let answer = pipeline.resolve(&query).await;
            println!("{}", answer.text);
            println!();
            println!("source: {}", answer.source);
            if answer.source.is_degraded() {
                tracing::warn!(source = %answer.source, "primary model did not answer");
            }
        }
        Commands::Toc => {
            let extractor = TocExtractor::new(&cfg.documents.toc_pdf);
            match extractor.extract().await {
                Some(toc) => println!("{}", toc),
                None => anyhow::bail!(
                    "No TOC available from {}",
                    cfg.documents.toc_pdf.display()
                ),
            }
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            static_dir: default_static_dir(),
            upload_dir: default_upload_dir(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_max_upload_mb() -> usize {
    100
}

/// Largest accepted `server.max_upload_mb`; the byte count must fit a 32-bit `usize`.
pub const MAX_UPLOAD_MB_LIMIT: usize = 2048;

/// Connection parameters shared by the primary and fallback chat clients.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key")]
    pub api_key: String,
    pub primary_model: String,
    pub fallback_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "http://localhost:1234/v1".to_string()
}
fn default_api_key() -> String {
    "lm-studio".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_temperature() -> f32 {
    0.4
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Source PDF scanned for table-of-contents lines.
    pub toc_pdf: PathBuf,
    /// Pre-built passage index artifact (JSON).
    pub index_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;

    // The OpenAI client convention: environment wins over the file.
    if let Ok(base) = std::env::var("OPENAI_API_BASE") {
        config.llm.base_url = base;
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        config.llm.api_key = key;
    }

    Ok(config)
}

/// Parse and validate configuration text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.server.max_upload_mb == 0 || config.server.max_upload_mb > MAX_UPLOAD_MB_LIMIT {
        anyhow::bail!(
            "server.max_upload_mb must be between 1 and {}",
            MAX_UPLOAD_MB_LIMIT
        );
    }

    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.llm.primary_model.trim().is_empty() {
        anyhow::bail!("llm.primary_model must not be empty");
    }
    if config.llm.fallback_model.trim().is_empty() {
        anyhow::bail!("llm.fallback_model must not be empty");
    }

    Ok(config)
}

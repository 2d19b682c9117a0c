use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

const DEFAULT_LLM_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_DATAGEN_URL: &str =
    "https://raw.githubusercontent.com/sanand0/tools-in-data-science-public/tds-2025-01/project-1/datagen.py";

/// Process-wide configuration, resolved once at startup and shared by Arc.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub data_root: PathBuf,
    pub max_iterations: u32,
    pub script_timeout: Duration,
    pub default_email: String,
    pub datagen_url: String,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let llm_api_key = std::env::var("DWORKS_LLM_API_KEY")
            .map_err(|_| anyhow!("DWORKS_LLM_API_KEY environment variable is required"))?;
        if llm_api_key.trim().is_empty() {
            return Err(anyhow!("DWORKS_LLM_API_KEY cannot be empty"));
        }

        let llm_base_url = std::env::var("DWORKS_LLM_URL")
            .unwrap_or_else(|_| DEFAULT_LLM_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let chat_model =
            std::env::var("DWORKS_CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let embedding_model = std::env::var("DWORKS_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());

        let data_root = std::env::var("DWORKS_DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let max_iterations = std::env::var("DWORKS_MAX_ITERATIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(5);

        let timeout_secs = std::env::var("DWORKS_SCRIPT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(120);

        let default_email =
            std::env::var("DWORKS_DEFAULT_EMAIL").unwrap_or_else(|_| String::new());
        let datagen_url = std::env::var("DWORKS_DATAGEN_URL")
            .unwrap_or_else(|_| DEFAULT_DATAGEN_URL.to_string());

        Ok(Self {
            llm_base_url,
            llm_api_key,
            chat_model,
            embedding_model,
            data_root,
            max_iterations,
            script_timeout: Duration::from_secs(timeout_secs),
            default_email,
            datagen_url,
        })
    }
}

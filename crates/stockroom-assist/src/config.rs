//! # Assistant Configuration
//!
//! ```text
//! LLM_API_URL          completions endpoint     (Groq OpenAI-compatible)
//! LLM_API_KEY_CHAT     key for chat + restock   (absent → assistant off)
//! LLM_API_KEY_VISION   key for photo recognition (falls back to chat key)
//! LLM_MODEL_CHAT       chat model
//! LLM_MODEL_VISION     vision model
//! LLM_TIMEOUT_SECS     per-request timeout       (30)
//! LLM_MAX_RETRIES      retries on 429/5xx/timeout (2)
//! ```

use std::time::Duration;

use crate::error::{AssistError, AssistResult};

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";

#[derive(Debug, Clone)]
pub struct AssistConfig {
    pub api_url: String,
    pub chat_api_key: Option<String>,
    pub vision_api_key: Option<String>,
    pub chat_model: String,
    pub vision_model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for AssistConfig {
    fn default() -> Self {
        AssistConfig {
            api_url: DEFAULT_API_URL.to_string(),
            chat_api_key: None,
            vision_api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

impl AssistConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> AssistResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AssistResult<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = AssistConfig::default();

        let timeout_secs = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| AssistError::Config {
                key: "LLM_TIMEOUT_SECS",
                reason: e.to_string(),
            })?,
            None => defaults.timeout.as_secs(),
        };
        let max_retries = match get("LLM_MAX_RETRIES") {
            Some(raw) => raw.parse::<u32>().map_err(|e| AssistError::Config {
                key: "LLM_MAX_RETRIES",
                reason: e.to_string(),
            })?,
            None => defaults.max_retries,
        };

        Ok(AssistConfig {
            api_url: get("LLM_API_URL").unwrap_or(defaults.api_url),
            chat_api_key: get("LLM_API_KEY_CHAT"),
            vision_api_key: get("LLM_API_KEY_VISION"),
            chat_model: get("LLM_MODEL_CHAT").unwrap_or(defaults.chat_model),
            vision_model: get("LLM_MODEL_VISION").unwrap_or(defaults.vision_model),
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
        })
    }

    /// Whether any capability has a key.
    pub fn is_enabled(&self) -> bool {
        self.chat_api_key.is_some() || self.vision_api_key.is_some()
    }

    pub(crate) fn vision_key(&self) -> Option<&str> {
        self.vision_api_key
            .as_deref()
            .or(self.chat_api_key.as_deref())
    }
}

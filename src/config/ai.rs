// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

use crate::error::GenerateError;

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_timeout_ms() -> u64 {
    55_000
}
fn default_temperature() -> f32 {
    0.8
}
fn default_max_output_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "gemini" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from GEMINI_API_KEY at resolve time.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Hard wall-clock budget for one model call; must fit the host request budget.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl ModelConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: ModelConfig = serde_json::from_str(&data)?;
        Ok(cfg.normalized())
    }

    /// `$AI_CONFIG_PATH`, then `config/ai.json`, then built-in defaults.
    /// `AI_TEST_MODE=mock` forces the scripted provider.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_AI_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.into());
        let mut cfg = if Path::new(&path).exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        if env::var("AI_TEST_MODE").map(|v| v == "mock").unwrap_or(false) {
            cfg.provider = "mock".to_string();
        }
        Ok(cfg)
    }

    fn normalized(mut self) -> Self {
        self.provider = self.provider.trim().to_lowercase();
        if self.timeout_ms == 0 {
            self.timeout_ms = default_timeout_ms();
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        self
    }

    /// Resolve the API key; `"ENV"` reads the provider's variable.
    pub fn resolve_api_key(&self) -> Result<String, GenerateError> {
        let key = if self.api_key.trim().eq_ignore_ascii_case("env") {
            match self.provider.as_str() {
                "gemini" => env::var("GEMINI_API_KEY").unwrap_or_default(),
                "mock" => return Ok(String::new()),
                other => {
                    return Err(GenerateError::Config(format!(
                        "unsupported model provider: {other}"
                    )))
                }
            }
        } else {
            self.api_key.clone()
        };
        if key.trim().is_empty() {
            return Err(GenerateError::Config(
                "missing required environment variable: GEMINI_API_KEY".to_string(),
            ));
        }
        Ok(key.trim().to_string())
    }
}

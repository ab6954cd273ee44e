//! Keeps only titles that describe tool activity.
//!
//! A title passes when it has AI/tool context, at least one of
//! activity, utility or brand, and no exclusion keyword. Keywords match whole
//! words, case-insensitively.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::{env, fs, path::Path};

pub const DEFAULT_SIGNALS_CONFIG_PATH: &str = "config/signals.toml";
pub const ENV_SIGNALS_CONFIG_PATH: &str = "SIGNALS_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub tool_context: Vec<String>,
    #[serde(default)]
    pub activity: Vec<String>,
    #[serde(default)]
    pub utility: Vec<String>,
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl ClassifierConfig {
    pub fn default_seed() -> Self {
        Self {
            tool_context: words(&[
                "ai", "a.i.", "artificial intelligence", "llm", "llms", "gpt", "genai",
                "generative", "machine learning", "agent", "agents", "agentic", "copilot",
                "chatbot", "assistant", "model", "models", "diffusion", "transformer", "rag",
                "prompt", "prompts",
            ]),
            activity: words(&[
                "launch", "launches", "launched", "launching", "release", "releases",
                "released", "ship", "ships", "shipped", "unveil", "unveils", "unveiled",
                "introduce", "introduces", "introduced", "introducing", "debut", "debuts",
                "rolls out", "rolled out", "rolling out", "update", "updates", "updated",
                "beta", "open-sources", "open sourced", "now available", "new version",
                "adds", "added", "lands", "upgrade", "upgrades", "show hn",
            ]),
            utility: words(&[
                "tool", "tools", "app", "apps", "plugin", "plugins", "extension",
                "extensions", "api", "sdk", "framework", "library", "cli", "editor", "ide",
                "workflow", "workflows", "automation", "open source", "open-source",
                "browser", "platform", "feature", "features", "integration", "dashboard",
                "template", "templates",
            ]),
            brands: words(&[
                "openai", "chatgpt", "anthropic", "claude", "gemini", "google", "microsoft",
                "github", "cursor", "perplexity", "notion", "figma", "midjourney", "runway",
                "elevenlabs", "hugging face", "huggingface", "ollama", "langchain", "replit",
                "vercel", "v0", "zapier", "supabase", "mistral", "llama", "meta", "apple",
                "nvidia", "deepseek", "canva", "adobe", "raycast", "linear", "warp",
            ]),
            exclusions: words(&[
                "stock", "stocks", "shares", "earnings", "ipo", "valuation", "lawsuit",
                "sues", "sued", "regulation", "regulators", "senate", "congress", "election",
                "tariff", "tariffs", "market cap", "layoffs", "investors", "crypto",
                "bitcoin", "antitrust", "court",
            ]),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading signal classifier config {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
    }

    /// `$SIGNALS_CONFIG_PATH`, then `config/signals.toml`, then the built-in seed.
    pub fn load() -> Result<Self> {
        let path = env::var(ENV_SIGNALS_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_SIGNALS_CONFIG_PATH.to_string());
        if Path::new(&path).exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default_seed())
        }
    }
}

/// Why a title was kept or dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub tool_context: bool,
    pub activity: bool,
    pub utility: bool,
    pub brand: bool,
    pub excluded: bool,
}

impl Classification {
    pub fn is_tool_activity(&self) -> bool {
        self.tool_context && (self.activity || self.utility || self.brand) && !self.excluded
    }
}

#[derive(Debug, Clone)]
pub struct ToolSignalClassifier {
    tool_context: Option<Regex>,
    activity: Option<Regex>,
    utility: Option<Regex>,
    brands: Option<Regex>,
    exclusions: Option<Regex>,
}

fn compile(list: &[String]) -> Result<Option<Regex>> {
    let alts: Vec<String> = list
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if alts.is_empty() {
        return Ok(None);
    }
    // `\b` cannot anchor keywords that end in punctuation ("a.i."), so use
    // explicit non-word lookaround substitutes.
    let pat = format!(r"(?i)(?:^|[^\w])(?:{})(?:$|[^\w])", alts.join("|"));
    Ok(Some(Regex::new(&pat).context("compiling classifier keywords")?))
}

fn hit(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(text))
}

impl ToolSignalClassifier {
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            tool_context: compile(&cfg.tool_context)?,
            activity: compile(&cfg.activity)?,
            utility: compile(&cfg.utility)?,
            brands: compile(&cfg.brands)?,
            exclusions: compile(&cfg.exclusions)?,
        })
    }

    pub fn classify(&self, title: &str) -> Classification {
        Classification {
            tool_context: hit(&self.tool_context, title),
            activity: hit(&self.activity, title),
            utility: hit(&self.utility, title),
            brand: hit(&self.brands, title),
            excluded: hit(&self.exclusions, title),
        }
    }

    pub fn is_tool_activity(&self, title: &str) -> bool {
        self.classify(title).is_tool_activity()
    }
}

impl Default for ToolSignalClassifier {
    fn default() -> Self {
        // The built-in seed only holds escaped literals.
        Self::from_config(&ClassifierConfig::default_seed()).expect("default classifier")
    }
}

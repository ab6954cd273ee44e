// src/config/pipeline.rs
//! Tunable pipeline parameters, loaded from `config/pipeline.toml`.
//!
//! Every section has defaults, so a missing file or a partial file is fine.
//! Values are sanitised after loading; the sanitiser keeps the length band at
//! least 3 wide because the short pads used by the hardener need 4 chars of
//! room to always land inside the band.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

/// Structural contract every delivered post must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    pub target_count: usize,
    pub min_len: usize,
    pub max_len: usize,
    /// Length the padder aims for; clamped into `[min_len, max_len]`.
    pub pad_target: Option<usize>,
    pub min_tags: usize,
    pub max_tags: usize,
    pub duplicate_threshold: f32,
    /// Prefix length used by the "one text starts inside the other" check.
    pub prefix_overlap_chars: usize,
    /// Shorter normalized texts are exempt from the prefix check.
    pub min_overlap_chars: usize,
    pub banned_phrases: Vec<String>,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            target_count: 10,
            min_len: 270,
            max_len: 275,
            pad_target: None,
            min_tags: 1,
            max_tags: 2,
            duplicate_threshold: 0.6,
            prefix_overlap_chars: 120,
            min_overlap_chars: 24,
            banned_phrases: default_banned_phrases(),
        }
    }
}

impl ContractConfig {
    pub fn pad_target(&self) -> usize {
        self.pad_target
            .unwrap_or((self.min_len + self.max_len) / 2)
            .clamp(self.min_len, self.max_len)
    }
}

fn default_banned_phrases() -> Vec<String> {
    [
        "breaking",
        "just in",
        "news",
        "headline",
        "headlines",
        "reportedly",
        "according to",
        "press release",
        "sources say",
        "announced",
        "announcement",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { max_attempts: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub max_age_secs: u64,
    /// Items dated this far in the future are still accepted (clock skew).
    pub future_skew_secs: u64,
    pub limit: usize,
    pub per_source_cap: usize,
    pub min_before_broaden: usize,
    /// How many ranked signals are written into the prompt.
    pub prompt_limit: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 24 * 3600,
            future_skew_secs: 600,
            limit: 50,
            per_source_cap: 12,
            min_before_broaden: 8,
            prompt_limit: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Calendar days of daily batches to read.
    pub days: u32,
    /// Hours of saved run snapshots to read.
    pub hours: u32,
    pub prompt_limit: usize,
    pub avoid_cap: usize,
    /// Each history text is cut to this many chars inside the prompt.
    pub prompt_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            days: 3,
            hours: 72,
            prompt_limit: 40,
            avoid_cap: 100,
            prompt_chars: 180,
        }
    }
}

/// Iteration caps for every repair loop.
///
/// Worst case per `harden` call: `max_repair_passes` passes, each running one
/// padding loop of at most `max_pad_steps` insertions and one trim loop bounded
/// by the number of words in the draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopLimits {
    pub max_repair_passes: usize,
    pub max_pad_steps: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_repair_passes: 6,
            max_pad_steps: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub keep_days: u32,
    /// Offset applied to UTC when deriving the `YYYY-MM-DD` day key.
    pub day_offset_minutes: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache/posts"),
            keep_days: 30,
            day_offset_minutes: 330,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub contract: ContractConfig,
    pub generation: GenerationConfig,
    pub signals: SignalConfig,
    pub history: HistoryConfig,
    pub limits: LoopLimits,
    pub store: StoreConfig,
}

impl PipelineConfig {
    /// Load using `$PIPELINE_CONFIG_PATH`, then `config/pipeline.toml`.
    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_PIPELINE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH));
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing pipeline config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    /// Clamp values into ranges the pipeline can always satisfy.
    pub fn sanitized(mut self) -> Self {
        let c = &mut self.contract;
        c.target_count = c.target_count.clamp(1, 20);
        c.min_len = c.min_len.max(120);
        if c.max_len < c.min_len + 3 {
            c.max_len = c.min_len + 3;
        }
        if c.min_tags > c.max_tags {
            std::mem::swap(&mut c.min_tags, &mut c.max_tags);
        }
        c.max_tags = c.max_tags.clamp(1, 5);
        c.min_tags = c.min_tags.min(c.max_tags);
        if !(c.duplicate_threshold > 0.0 && c.duplicate_threshold <= 1.0) {
            c.duplicate_threshold = 0.6;
        }
        c.prefix_overlap_chars = c.prefix_overlap_chars.max(c.min_overlap_chars).max(1);
        c.banned_phrases.retain(|p| !p.trim().is_empty());

        self.generation.max_attempts = self.generation.max_attempts.clamp(1, 10);
        self.signals.limit = self.signals.limit.max(1);
        self.signals.per_source_cap = self.signals.per_source_cap.max(1);
        self.limits.max_repair_passes = self.limits.max_repair_passes.clamp(1, 16);
        self.limits.max_pad_steps = self.limits.max_pad_steps.clamp(1, 128);
        self
    }
}

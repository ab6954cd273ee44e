// tests/common/mod.rs
//
// Shared builders for integration tests: contract-valid posts, fixture signal
// sources and a generator wired to a scripted model.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use toolpulse::config::{ModelConfig, PipelineConfig};
use toolpulse::generate::contract::{char_len, Contract};
use toolpulse::generate::model_client::{ModelClient, ScriptedModel, ScriptedReply};
use toolpulse::generate::tools::TOOLS;
use toolpulse::history::HistoryTracker;
use toolpulse::ingest::classifier::ToolSignalClassifier;
use toolpulse::ingest::types::{Signal, SignalSource};
use toolpulse::ingest::SignalAggregator;
use toolpulse::source_weights::SourceWeightsConfig;
use toolpulse::Generator;

/// 2025-10-09T08:53:20Z
pub const NOW: u64 = 1_760_000_000;

/// A post about `TOOLS[i]` that already satisfies the default contract.
pub fn valid_post(i: usize) -> String {
    let c = Contract::default();
    let tool = &TOOLS[i % TOOLS.len()];
    let tail = format!(" 🚀 {} {} #AI", tool.handle, tool.link);
    let mut s = format!(
        "Tool: {} gives {} a quicker way to {}.",
        tool.name, tool.audience, tool.use_case
    );
    while char_len(&s) + char_len(&tail) + 12 <= c.max_len {
        s.push_str(" Calm steps.");
    }
    while char_len(&s) + char_len(&tail) < c.min_len {
        s.push_str(" Go.");
    }
    format!("{s}{tail}")
}

/// Model reply carrying `texts`, each tagged with the same age.
pub fn reply_with(texts: &[String], age: &str) -> ScriptedReply {
    let tweets: Vec<_> = texts
        .iter()
        .map(|t| json!({ "text": t, "sourceAge": age }))
        .collect();
    ScriptedReply::Text(json!({ "tweets": tweets }).to_string())
}

pub fn clean_batch(n: usize) -> Vec<String> {
    (0..n).map(valid_post).collect()
}

pub struct FixedSignals {
    pub name: &'static str,
    pub items: Vec<Signal>,
}

#[async_trait]
impl SignalSource for FixedSignals {
    async fn fetch(&self) -> anyhow::Result<Vec<Signal>> {
        Ok(self.items.clone())
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

pub struct FailingSignals;

#[async_trait]
impl SignalSource for FailingSignals {
    async fn fetch(&self) -> anyhow::Result<Vec<Signal>> {
        anyhow::bail!("feed unreachable")
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn signal(title: &str, url: &str, source: &str, ts: u64) -> Signal {
    Signal {
        title: title.to_string(),
        url: Some(url.to_string()),
        source: source.to_string(),
        timestamp_secs: ts,
    }
}

pub fn launch_signals() -> Vec<Signal> {
    vec![
        signal(
            "Cursor launches background agents for its AI editor",
            "https://cursor.com/blog/agents",
            "Google News",
            NOW - 2 * 3600,
        ),
        signal(
            "Show HN: Open-source AI tool that turns specs into tests",
            "https://github.com/example/spec2test",
            "Show HN",
            NOW - 30 * 60,
        ),
    ]
}

pub fn aggregator(cfg: &PipelineConfig, primary: Vec<Arc<dyn SignalSource>>) -> SignalAggregator {
    SignalAggregator::new(
        primary,
        Vec::new(),
        ToolSignalClassifier::default(),
        SourceWeightsConfig::default(),
        cfg.signals.clone(),
    )
}

/// Generator over fixture signals, an empty history and `model`.
pub fn generator_with(
    cfg: PipelineConfig,
    model_cfg: ModelConfig,
    model: Arc<ScriptedModel>,
) -> Generator {
    let sources: Vec<Arc<dyn SignalSource>> = vec![Arc::new(FixedSignals {
        name: "fixture",
        items: launch_signals(),
    })];
    let signals = aggregator(&cfg, sources);
    let history = HistoryTracker::new(cfg.history.clone());
    let client: Arc<dyn ModelClient> = model;
    Generator::new(cfg, model_cfg, signals, history, client)
}

pub fn generator(model: Arc<ScriptedModel>) -> Generator {
    generator_with(PipelineConfig::default(), ModelConfig::default(), model)
}

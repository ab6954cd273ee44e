// src/generate/mod.rs
pub mod assembler;
pub mod contract;
pub mod harden;
pub mod model_client;
pub mod parser;
pub mod prompt;
pub mod similarity;
pub mod tools;

use metrics::{describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::config::{ModelConfig, PipelineConfig};
use crate::error::Result;
use crate::history::HistoryTracker;
use crate::ingest::SignalAggregator;

use self::assembler::BatchAssembler;
use self::contract::Contract;
use self::model_client::ModelClient;
use self::prompt::PromptComposer;

/// One finished post as handed to callers and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub text: String,
    #[serde(rename = "sourceAge")]
    pub source_age: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateOptions {
    /// Texts the caller already has; never repeated.
    #[serde(default, rename = "avoidTweets")]
    pub avoid_tweets: Vec<String>,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "generate_attempts_total",
            "Model attempts by outcome (accepted, rejected, error kind)."
        );
        describe_counter!(
            "generate_model_errors_total",
            "Model call errors by kind."
        );
        describe_counter!(
            "generate_backfill_posts_total",
            "Posts synthesized by backfill, per stage."
        );
        describe_counter!(
            "generate_backfill_skipped_total",
            "Synthesized drafts rejected as invalid or duplicate."
        );
        describe_histogram!("generate_model_call_ms", "Model call latency in milliseconds.");
        describe_histogram!("generate_total_ms", "End-to-end generation time in milliseconds.");
        describe_gauge!(
            "generate_last_batch_backfilled",
            "Backfilled posts in the most recent batch."
        );
    });
}

/// Short stable id for logging a post without its text.
pub(crate) fn short_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Entry point of the pipeline: signals and history in, one batch out.
pub struct Generator {
    cfg: PipelineConfig,
    model: ModelConfig,
    contract: Contract,
    signals: SignalAggregator,
    history: HistoryTracker,
    client: Arc<dyn ModelClient>,
}

impl Generator {
    pub fn new(
        cfg: PipelineConfig,
        model: ModelConfig,
        signals: SignalAggregator,
        history: HistoryTracker,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        ensure_metrics_described();
        let contract = Contract::from_pipeline(&cfg);
        Self {
            cfg,
            model,
            contract,
            signals,
            history,
            client,
        }
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub async fn generate(&self, opts: GenerateOptions) -> Result<Vec<GeneratedPost>> {
        self.generate_at(now_unix(), opts).await
    }

    /// Same as [`Generator::generate`] with an injected clock.
    pub async fn generate_at(&self, now: u64, opts: GenerateOptions) -> Result<Vec<GeneratedPost>> {
        let t0 = Instant::now();
        let (signals, history) = tokio::join!(
            self.signals.collect_signals(now),
            self.history.collect_history(now, &opts.avoid_tweets)
        );
        info!(
            target: "generate",
            signals = signals.len(),
            history = history.all.len(),
            "context collected"
        );

        let composer = PromptComposer::new(
            &self.contract,
            &self.model,
            &self.cfg.signals,
            &self.cfg.history,
        );
        let assembler = BatchAssembler::new(
            &self.contract,
            composer,
            self.client.as_ref(),
            self.cfg.generation.max_attempts,
            Duration::from_millis(self.model.timeout_ms),
        );
        let posts = assembler.assemble(now, &signals, &history).await?;

        histogram!("generate_total_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        info!(
            target: "generate",
            posts = posts.len(),
            ids = ?posts.iter().map(|p| short_id(&p.text)).collect::<Vec<_>>(),
            "batch ready"
        );
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_stable_hex() {
        let a = short_id("Tool: hello");
        assert_eq!(a.len(), 12);
        assert_eq!(a, short_id("Tool: hello"));
        assert_ne!(a, short_id("Tool: hello!"));
    }

    #[test]
    fn post_serializes_with_source_age() {
        let p = GeneratedPost {
            text: "t".into(),
            source_age: "3h ago".into(),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["sourceAge"], "3h ago");
    }
}

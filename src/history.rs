//! history.rs: previously produced post texts, used to steer the model away
//! from repeats and to reject duplicates.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::warn;

use crate::config::HistoryConfig;

/// How far back a persisted source should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWindow {
    Days(u32),
    Hours(u32),
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Texts inside `window`, most recent first.
    async fn fetch_history(&self, window: HistoryWindow, now: u64) -> anyhow::Result<Vec<String>>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySnapshot {
    /// Shown to the model.
    pub prompt: Vec<String>,
    /// Checked for duplicates.
    pub all: Vec<String>,
}

pub struct HistoryTracker {
    sources: Vec<(Arc<dyn HistorySource>, HistoryWindow)>,
    cfg: HistoryConfig,
}

fn dedupe_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl HistoryTracker {
    pub fn new(cfg: HistoryConfig) -> Self {
        Self {
            sources: Vec::new(),
            cfg,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn HistorySource>, window: HistoryWindow) -> Self {
        self.sources.push((source, window));
        self
    }

    /// Register `source` for both the daily and the hourly window from config.
    pub fn with_store<S: HistorySource + 'static>(self, source: Arc<S>) -> Self {
        let days = HistoryWindow::Days(self.cfg.days);
        let hours = HistoryWindow::Hours(self.cfg.hours);
        self.with_source(source.clone(), days)
            .with_source(source, hours)
    }

    /// Merge the caller's avoid list with every source. Failing sources
    /// contribute nothing.
    pub async fn collect_history(&self, now: u64, avoid: &[String]) -> HistorySnapshot {
        let mut set = JoinSet::new();
        for (i, (src, window)) in self.sources.iter().enumerate() {
            let src = Arc::clone(src);
            let window = *window;
            set.spawn(async move { (i, src.name(), src.fetch_history(window, now).await) });
        }
        let mut per_source: Vec<Vec<String>> = vec![Vec::new(); self.sources.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, _, Ok(texts))) => per_source[i] = texts,
                Ok((_, name, Err(e))) => {
                    warn!(target: "history", source = name, error = ?e, "history source failed");
                }
                Err(e) => warn!(target: "history", error = %e, "history task aborted"),
            }
        }

        let avoid = avoid
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .take(self.cfg.avoid_cap)
            .map(str::to_string);

        let mut seen = HashSet::new();
        let all: Vec<String> = avoid
            .chain(per_source.into_iter().flatten())
            .filter(|t| !t.trim().is_empty())
            .filter(|t| seen.insert(dedupe_key(t)))
            .collect();
        let prompt = all.iter().take(self.cfg.prompt_limit).cloned().collect();
        HistorySnapshot { prompt, all }
    }
}

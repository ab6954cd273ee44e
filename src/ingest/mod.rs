// src/ingest/mod.rs
pub mod classifier;
pub mod providers;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::SignalConfig;
use crate::source_weights::SourceWeightsConfig;

use self::classifier::ToolSignalClassifier;
use self::providers::{fallback_signals, GoogleNewsRss, HackerNewsSearch, HackerNewsShow};
use self::types::{Signal, SignalSource};

pub const PRIMARY_NEWS_QUERY: &str = "AI tools launch";
pub const BROAD_NEWS_QUERY: &str = "artificial intelligence";
pub const HN_SEARCH_QUERY: &str = "AI tool";
const SHOW_HN_LIMIT: usize = 15;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_signals_total", "Signals parsed from sources.");
        describe_counter!("ingest_kept_total", "Signals kept after filtering and ranking.");
        describe_counter!(
            "ingest_filtered_total",
            "Signals dropped as stale, future-dated or not tool activity."
        );
        describe_counter!("ingest_dedup_total", "Signals removed as duplicates.");
        describe_counter!("signals_source_errors_total", "Source fetch/parse errors.");
        describe_counter!(
            "ingest_fallback_total",
            "Runs that fell back to the static tool list."
        );
        describe_histogram!("ingest_parse_ms", "Source parse time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when signals were last collected.");
    });
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Clean a feed title: decode entities, strip tags, ASCII quotes, collapse
/// whitespace, drop trailing sentence punctuation, cap at 300 chars.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let no_cdata = decoded.replace("<![CDATA[", "").replace("]]>", "");
    let no_tags = RE_TAGS.replace_all(&no_cdata, "");
    let quoted = no_tags
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let mut out = RE_WS.replace_all(&quoted, " ").trim().to_string();

    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',' | ':' | ';') {
            out.pop();
        } else {
            break;
        }
    }

    if out.chars().count() > 300 {
        out = out.chars().take(300).collect();
    }
    out
}

/// Lowercase alphanumerics only.
pub fn title_key(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Host without `www.` plus path without trailing slash. Queries are dropped
/// except on Hacker News item pages, where the id lives in the query.
pub fn url_key(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").to_lowercase();
    let path = parsed.path().trim_end_matches('/');
    let mut key = format!("{host}{path}");
    if host == "news.ycombinator.com" {
        if let Some(q) = parsed.query() {
            key.push('?');
            key.push_str(q);
        }
    }
    Some(key)
}

#[derive(Debug, Default, Clone, Copy)]
struct FilterStats {
    stale: usize,
    off_topic: usize,
    duplicate: usize,
}

/// Fetches, filters, ranks and caps signals from all sources.
pub struct SignalAggregator {
    primary: Vec<Arc<dyn SignalSource>>,
    broad: Vec<Arc<dyn SignalSource>>,
    classifier: ToolSignalClassifier,
    weights: SourceWeightsConfig,
    cfg: SignalConfig,
}

impl SignalAggregator {
    pub fn new(
        primary: Vec<Arc<dyn SignalSource>>,
        broad: Vec<Arc<dyn SignalSource>>,
        classifier: ToolSignalClassifier,
        weights: SourceWeightsConfig,
        cfg: SignalConfig,
    ) -> Self {
        Self {
            primary,
            broad,
            classifier,
            weights,
            cfg,
        }
    }

    /// The live sources: Google News and Show HN first, broader queries on
    /// demand.
    pub fn live(
        client: reqwest::Client,
        classifier: ToolSignalClassifier,
        weights: SourceWeightsConfig,
        cfg: SignalConfig,
    ) -> anyhow::Result<Self> {
        let primary: Vec<Arc<dyn SignalSource>> = vec![
            Arc::new(GoogleNewsRss::search(PRIMARY_NEWS_QUERY, client.clone())?),
            Arc::new(HackerNewsShow::http(SHOW_HN_LIMIT, client.clone())),
        ];
        let broad: Vec<Arc<dyn SignalSource>> = vec![
            Arc::new(GoogleNewsRss::search(BROAD_NEWS_QUERY, client.clone())?),
            Arc::new(HackerNewsSearch::query(HN_SEARCH_QUERY, client)?),
        ];
        Ok(Self::new(primary, broad, classifier, weights, cfg))
    }

    /// Never fails; with no usable signal it returns the static fallback list.
    pub async fn collect_signals(&self, now: u64) -> Vec<Signal> {
        ensure_metrics_described();
        let mut stats = FilterStats::default();

        let mut pool = self.eligible(now, fan_out(&self.primary).await, &mut stats);
        let mut ranked = self.rank_dedup(pool.clone(), &mut stats);

        if ranked.len() < self.cfg.min_before_broaden && !self.broad.is_empty() {
            info!(
                target: "ingest",
                kept = ranked.len(),
                min = self.cfg.min_before_broaden,
                "too few signals; broadening"
            );
            pool.extend(self.eligible(now, fan_out(&self.broad).await, &mut stats));
            stats.duplicate = 0;
            ranked = self.rank_dedup(pool, &mut stats);
        }

        counter!("ingest_filtered_total").increment((stats.stale + stats.off_topic) as u64);
        counter!("ingest_dedup_total").increment(stats.duplicate as u64);
        gauge!("ingest_last_run_ts").set(now as f64);

        if ranked.is_empty() {
            warn!(target: "ingest", "no live signals; using fallback list");
            counter!("ingest_fallback_total").increment(1);
            return fallback_signals(now, self.cfg.limit);
        }

        counter!("ingest_kept_total").increment(ranked.len() as u64);
        debug!(
            target: "ingest",
            kept = ranked.len(),
            stale = stats.stale,
            off_topic = stats.off_topic,
            duplicate = stats.duplicate,
            "signals collected"
        );
        ranked
    }

    /// Recency window and classifier.
    fn eligible(&self, now: u64, raw: Vec<Signal>, stats: &mut FilterStats) -> Vec<Signal> {
        let oldest = now.saturating_sub(self.cfg.max_age_secs);
        let newest = now.saturating_add(self.cfg.future_skew_secs);
        let mut out = Vec::with_capacity(raw.len());
        for s in raw {
            if s.timestamp_secs == 0 || s.timestamp_secs < oldest || s.timestamp_secs > newest {
                stats.stale += 1;
            } else if !self.classifier.is_tool_activity(&s.title) {
                stats.off_topic += 1;
            } else {
                out.push(s);
            }
        }
        out
    }

    /// Rank by source weight then recency, drop repeats (first ranked wins),
    /// cap per source, truncate to the limit.
    fn rank_dedup(&self, mut pool: Vec<Signal>, stats: &mut FilterStats) -> Vec<Signal> {
        pool.sort_by(|a, b| {
            let wa = self.weights.weight_for(&a.source);
            let wb = self.weights.weight_for(&b.source);
            wb.total_cmp(&wa)
                .then(b.timestamp_secs.cmp(&a.timestamp_secs))
                .then_with(|| a.title.cmp(&b.title))
        });

        let mut titles = HashSet::new();
        let mut urls = HashSet::new();
        let mut per_source: HashMap<String, usize> = HashMap::new();
        let mut out = Vec::new();
        for s in pool {
            let tk = title_key(&s.title);
            let uk = s.url.as_deref().and_then(url_key);
            let seen = titles.contains(&tk) || uk.as_ref().is_some_and(|u| urls.contains(u));
            if seen {
                stats.duplicate += 1;
                continue;
            }
            titles.insert(tk);
            if let Some(u) = uk {
                urls.insert(u);
            }

            let n = per_source.entry(s.source.clone()).or_default();
            if *n >= self.cfg.per_source_cap {
                continue;
            }
            *n += 1;
            out.push(s);
            if out.len() >= self.cfg.limit {
                break;
            }
        }
        out
    }
}

async fn fan_out(sources: &[Arc<dyn SignalSource>]) -> Vec<Signal> {
    let mut set = JoinSet::new();
    for s in sources {
        let s = Arc::clone(s);
        set.spawn(async move { (s.name(), s.fetch().await) });
    }
    let mut out = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(mut v))) => out.append(&mut v),
            Ok((name, Err(e))) => {
                warn!(target: "ingest", provider = name, error = ?e, "signal source failed");
                counter!("signals_source_errors_total", "source" => name).increment(1);
            }
            Err(e) => {
                warn!(target: "ingest", error = %e, "signal source task aborted");
                counter!("signals_source_errors_total", "source" => "panic").increment(1);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_punct() {
        let out = normalize_text("  Cursor&nbsp;&nbsp; ships <b>agents</b>!!!  ");
        assert_eq!(out, "Cursor ships agents");
        assert_eq!(normalize_text("<![CDATA[Hello “AI”]]>"), "Hello \"AI\"");
    }

    #[test]
    fn keys_normalize_titles_and_urls() {
        assert_eq!(title_key("Cursor 2.0: Agents!"), "cursor20agents");
        assert_eq!(
            url_key("https://www.Example.com/post/1/?utm_source=x").as_deref(),
            Some("example.com/post/1")
        );
        assert_eq!(
            url_key("https://news.ycombinator.com/item?id=7").as_deref(),
            Some("news.ycombinator.com/item?id=7")
        );
        assert_eq!(url_key("not a url"), None);
    }
}

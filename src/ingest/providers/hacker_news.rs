use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;
use tokio::task::JoinSet;

use crate::ingest::normalize_text;
use crate::ingest::types::{Signal, SignalSource};

pub const SHOW_HN_SOURCE: &str = "Show HN";
pub const HN_SEARCH_SOURCE: &str = "HN Search";

const FIREBASE_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const ALGOLIA_URL: &str = "https://hn.algolia.com/api/v1/search_by_date";

fn item_url(id: u64) -> String {
    format!("https://news.ycombinator.com/item?id={id}")
}

fn record(source: &'static str, t0: std::time::Instant, n: usize) {
    histogram!("ingest_parse_ms", "source" => source).record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("ingest_signals_total", "source" => source).increment(n as u64);
}

// ---------------------------------------------------------------------------
// Show HN (Firebase API)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HnItem {
    id: u64,
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    time: u64,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    dead: bool,
}

impl HnItem {
    fn into_signal(self) -> Option<Signal> {
        if self.deleted || self.dead {
            return None;
        }
        let title = normalize_text(self.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            return None;
        }
        Some(Signal {
            title,
            url: Some(self.url.unwrap_or_else(|| item_url(self.id))),
            source: SHOW_HN_SOURCE.to_string(),
            timestamp_secs: self.time,
        })
    }
}

/// Newest "Show HN" stories: ids from `showstories.json`, then one request
/// per item, fetched concurrently.
pub struct HackerNewsShow {
    mode: ShowMode,
}

enum ShowMode {
    /// JSON array of item objects.
    Fixture(String),
    Http {
        base: String,
        limit: usize,
        client: reqwest::Client,
    },
}

impl HackerNewsShow {
    pub fn from_fixture(items_json: &str) -> Self {
        Self {
            mode: ShowMode::Fixture(items_json.to_string()),
        }
    }

    pub fn http(limit: usize, client: reqwest::Client) -> Self {
        Self {
            mode: ShowMode::Http {
                base: FIREBASE_BASE.to_string(),
                limit,
                client,
            },
        }
    }

    fn parse_items_from_str(s: &str) -> Result<Vec<Signal>> {
        let t0 = std::time::Instant::now();
        let items: Vec<Option<HnItem>> =
            serde_json::from_str(s).context("parsing show hn items json")?;
        let out: Vec<Signal> = items
            .into_iter()
            .flatten()
            .filter_map(HnItem::into_signal)
            .collect();
        record(SHOW_HN_SOURCE, t0, out.len());
        Ok(out)
    }

    async fn fetch_http(base: &str, limit: usize, client: &reqwest::Client) -> Result<Vec<Signal>> {
        let t0 = std::time::Instant::now();
        let ids: Vec<u64> = client
            .get(format!("{base}/showstories.json"))
            .send()
            .await
            .context("show hn ids get()")?
            .error_for_status()
            .context("show hn ids status")?
            .json()
            .await
            .context("show hn ids json")?;

        let mut set = JoinSet::new();
        for (i, id) in ids.into_iter().take(limit).enumerate() {
            let client = client.clone();
            let url = format!("{base}/item/{id}.json");
            set.spawn(async move {
                let item: Option<HnItem> = client
                    .get(url)
                    .send()
                    .await
                    .ok()?
                    .error_for_status()
                    .ok()?
                    .json()
                    .await
                    .ok()?;
                Some((i, item?))
            });
        }

        let mut fetched = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(Some(pair)) = joined {
                fetched.push(pair);
            }
        }
        fetched.sort_by_key(|(i, _)| *i);
        let out: Vec<Signal> = fetched
            .into_iter()
            .filter_map(|(_, item)| item.into_signal())
            .collect();
        record(SHOW_HN_SOURCE, t0, out.len());
        Ok(out)
    }
}

#[async_trait]
impl SignalSource for HackerNewsShow {
    async fn fetch(&self) -> Result<Vec<Signal>> {
        match &self.mode {
            ShowMode::Fixture(s) => Self::parse_items_from_str(s),
            ShowMode::Http {
                base,
                limit,
                client,
            } => Self::fetch_http(base, *limit, client).await,
        }
    }

    fn name(&self) -> &'static str {
        SHOW_HN_SOURCE
    }
}

// ---------------------------------------------------------------------------
// Algolia search by date
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    created_at_i: u64,
}

/// Stories matching a query, newest first.
pub struct HackerNewsSearch {
    mode: SearchMode,
}

enum SearchMode {
    /// Raw Algolia response body.
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl HackerNewsSearch {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: SearchMode::Fixture(body.to_string()),
        }
    }

    pub fn query(query: &str, client: reqwest::Client) -> Result<Self> {
        let url = reqwest::Url::parse_with_params(
            ALGOLIA_URL,
            &[("query", query), ("tags", "story"), ("hitsPerPage", "30")],
        )
        .context("building hn search url")?;
        Ok(Self {
            mode: SearchMode::Http {
                url: url.to_string(),
                client,
            },
        })
    }

    fn parse_items_from_str(s: &str) -> Result<Vec<Signal>> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse = serde_json::from_str(s).context("parsing hn search json")?;
        let out: Vec<Signal> = resp
            .hits
            .into_iter()
            .filter_map(|h| {
                let title = normalize_text(h.title.as_deref().unwrap_or_default());
                if title.is_empty() {
                    return None;
                }
                let url = h.url.filter(|u| !u.trim().is_empty()).or_else(|| {
                    h.object_id.parse::<u64>().ok().map(item_url)
                });
                Some(Signal {
                    title,
                    url,
                    source: HN_SEARCH_SOURCE.to_string(),
                    timestamp_secs: h.created_at_i,
                })
            })
            .collect();
        record(HN_SEARCH_SOURCE, t0, out.len());
        Ok(out)
    }
}

#[async_trait]
impl SignalSource for HackerNewsSearch {
    async fn fetch(&self) -> Result<Vec<Signal>> {
        match &self.mode {
            SearchMode::Fixture(s) => Self::parse_items_from_str(s),
            SearchMode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .context("hn search get()")?
                    .error_for_status()
                    .context("hn search status")?
                    .text()
                    .await
                    .context("hn search .text()")?;
                Self::parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        HN_SEARCH_SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn show_hn_fixture_skips_dead_and_fills_item_links() {
        let json = r#"[
            {"id": 1, "title": "Show HN: Local LLM agent CLI", "url": "https://github.com/x/agent", "time": 1760000000},
            {"id": 2, "title": "Show HN: AI notes plugin", "time": 1760000100},
            {"id": 3, "title": "Show HN: gone", "time": 1760000200, "dead": true},
            null
        ]"#;
        let items = HackerNewsShow::from_fixture(json).fetch().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url.as_deref(), Some("https://github.com/x/agent"));
        assert_eq!(
            items[1].url.as_deref(),
            Some("https://news.ycombinator.com/item?id=2")
        );
        assert!(items.iter().all(|s| s.source == SHOW_HN_SOURCE));
    }

    #[tokio::test]
    async fn search_fixture_parses_hits() {
        let body = r#"{"hits":[
            {"objectID":"41","title":"Ollama adds tool calling","url":"https://ollama.com/blog","created_at_i":1760000000},
            {"objectID":"42","title":"Ask HN: favourite AI tools?","url":null,"created_at_i":1760000300},
            {"objectID":"43","title":null,"created_at_i":1760000400}
        ]}"#;
        let items = HackerNewsSearch::from_fixture(body).fetch().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Ollama adds tool calling");
        assert_eq!(
            items[1].url.as_deref(),
            Some("https://news.ycombinator.com/item?id=42")
        );
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        assert!(HackerNewsShow::from_fixture("{").fetch().await.is_err());
        assert!(HackerNewsSearch::from_fixture("[]").fetch().await.is_err());
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::normalize_text;
use crate::ingest::types::{Signal, SignalSource};

pub const GOOGLE_NEWS_SOURCE: &str = "Google News";
const SEARCH_URL: &str = "https://news.google.com/rss/search";
const MAX_ITEMS: usize = 30;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

pub(crate) fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

/// Google News titles end in " - Publisher"; drop that tail.
fn strip_publisher(title: &str) -> &str {
    match title.rsplit_once(" - ") {
        Some((head, tail)) if !head.trim().is_empty() && tail.chars().count() <= 40 => head,
        _ => title,
    }
}

/// Google News RSS search for one query, restricted to the last day.
pub struct GoogleNewsRss {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl GoogleNewsRss {
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn search(query: &str, client: reqwest::Client) -> Result<Self> {
        let q = format!("{query} when:1d");
        let url = reqwest::Url::parse_with_params(
            SEARCH_URL,
            &[
                ("q", q.as_str()),
                ("hl", "en-US"),
                ("gl", "US"),
                ("ceid", "US:en"),
            ],
        )
        .context("building google news url")?;
        Ok(Self {
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        })
    }

    fn parse_items_from_str(s: &str) -> Result<Vec<Signal>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing google news rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len().min(MAX_ITEMS));
        for it in rss.channel.item.into_iter().take(MAX_ITEMS) {
            let raw = it.title.unwrap_or_default();
            let title = normalize_text(strip_publisher(&raw));
            if title.is_empty() {
                continue;
            }
            out.push(Signal {
                title,
                url: it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
                source: GOOGLE_NEWS_SOURCE.to_string(),
                timestamp_secs: it
                    .pub_date
                    .as_deref()
                    .map(parse_rfc2822_to_unix)
                    .unwrap_or(0),
            });
        }

        histogram!("ingest_parse_ms", "source" => GOOGLE_NEWS_SOURCE)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_signals_total", "source" => GOOGLE_NEWS_SOURCE)
            .increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SignalSource for GoogleNewsRss {
    async fn fetch(&self) -> Result<Vec<Signal>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .context("google news http get()")?
                    .error_for_status()
                    .context("google news http status")?
                    .text()
                    .await
                    .context("google news http .text()")?;
                Self::parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        GOOGLE_NEWS_SOURCE
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>AI tools - Google News</title>
<item>
  <title>Figma launches AI prototyping tools - The Verge</title>
  <link>https://news.google.com/rss/articles/abc</link>
  <pubDate>Mon, 13 Oct 2025 08:00:00 GMT</pubDate>
</item>
<item>
  <title><![CDATA[Cursor ships &nbsp;agent mode for teams - TechCrunch]]></title>
  <link>https://news.google.com/rss/articles/def</link>
</item>
<item><title></title></item>
</channel></rss>"#;

    #[tokio::test]
    async fn parses_fixture_items() {
        let p = GoogleNewsRss::from_fixture(FIXTURE);
        let items = p.fetch().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Figma launches AI prototyping tools");
        assert_eq!(items[0].source, "Google News");
        assert_eq!(items[0].timestamp_secs, 1_760_342_400);
        assert_eq!(items[1].title, "Cursor ships agent mode for teams");
        assert_eq!(items[1].timestamp_secs, 0);
    }

    #[tokio::test]
    async fn empty_channel_is_ok() {
        let p = GoogleNewsRss::from_fixture("<rss><channel><title>x</title></channel></rss>");
        assert!(p.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_is_an_error() {
        let p = GoogleNewsRss::from_fixture("not xml at all <<<");
        assert!(p.fetch().await.is_err());
    }

    #[test]
    fn search_url_encodes_query() {
        let p = GoogleNewsRss::search("AI tools launch", reqwest::Client::new()).unwrap();
        match p.mode {
            Mode::Http { url, .. } => {
                assert!(url.starts_with("https://news.google.com/rss/search?q=AI+tools+launch+when%3A1d"));
                assert!(url.contains("ceid=US%3Aen"));
            }
            Mode::Fixture(_) => panic!("expected http mode"),
        }
    }
}

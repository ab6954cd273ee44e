use crate::generate::tools::TOOLS;
use crate::ingest::types::Signal;

pub const FALLBACK_SOURCE: &str = "Fallback";

/// Static signals from the tool table, used when every live source is down.
/// All are stamped `now` so they pass the recency window.
pub fn fallback_signals(now: u64, limit: usize) -> Vec<Signal> {
    TOOLS
        .iter()
        .take(limit)
        .map(|t| Signal {
            title: format!("{}: {}", t.name, t.capability),
            url: Some(t.link.to_string()),
            source: FALLBACK_SOURCE.to_string(),
            timestamp_secs: now,
        })
        .collect()
}

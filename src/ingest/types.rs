// src/ingest/types.rs
use anyhow::Result;

/// One candidate item of tool activity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Signal {
    pub title: String,
    pub url: Option<String>,
    pub source: String,      // e.g. "Google News", "Show HN"
    pub timestamp_secs: u64, // unix seconds
}

impl Signal {
    /// Relative age: "Nh ago" above an hour, "Nm ago" above a minute,
    /// otherwise "Ns ago".
    pub fn age_label(&self, now: u64) -> String {
        let secs = now.saturating_sub(self.timestamp_secs);
        if secs > 3_600 {
            format!("{}h ago", secs / 3_600)
        } else if secs > 60 {
            format!("{}m ago", secs / 60)
        } else {
            format!("{secs}s ago")
        }
    }
}

#[async_trait::async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Signal>>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_label_units() {
        let s = |ts| Signal {
            title: "t".into(),
            url: None,
            source: "x".into(),
            timestamp_secs: ts,
        };
        assert_eq!(s(10_000 - 7_300).age_label(10_000), "2h ago");
        assert_eq!(s(10_000 - 3_600).age_label(10_000), "60m ago");
        assert_eq!(s(10_000 - 61).age_label(10_000), "1m ago");
        assert_eq!(s(10_000 - 5).age_label(10_000), "5s ago");
        assert_eq!(s(20_000).age_label(10_000), "0s ago");
    }
}

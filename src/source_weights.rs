//! # Source Weights
//!
//! Trust weights in `[0.0, 1.0]` per signal source ("Show HN", "Google News",
//! ...), used to rank signals before recency.
//!
//! Lookup order: alias → exact → longest substring → default. Names are
//! compared after lowercasing and folding punctuation/dashes to spaces.

use serde::Deserialize;
use std::{collections::HashMap, env, fs, path::Path};
use tracing::warn;

pub const DEFAULT_SOURCE_WEIGHTS_PATH: &str = "config/source_weights.json";
pub const ENV_SOURCE_WEIGHTS_PATH: &str = "SOURCE_WEIGHTS_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeightsConfig {
    #[serde(default = "default_default_weight")]
    pub default_weight: f32,
    #[serde(default)]
    pub weights: HashMap<String, f32>,
    /// Alternative spellings → canonical name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f32 {
    0.50
}

impl SourceWeightsConfig {
    /// Load from JSON; a missing or broken file yields [`Self::default_seed`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<Self>(&s) {
                Ok(cfg) => cfg.normalized(),
                Err(e) => {
                    warn!(target: "ingest", path = %path.display(), error = %e, "bad source weights; using defaults");
                    Self::default_seed()
                }
            },
            Err(_) => Self::default_seed(),
        }
    }

    /// `$SOURCE_WEIGHTS_PATH`, then `config/source_weights.json`.
    pub fn load() -> Self {
        let path = env::var(ENV_SOURCE_WEIGHTS_PATH)
            .unwrap_or_else(|_| DEFAULT_SOURCE_WEIGHTS_PATH.to_string());
        Self::load_from_file(path)
    }

    fn normalized(self) -> Self {
        Self {
            default_weight: self.default_weight,
            weights: self
                .weights
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
            aliases: self
                .aliases
                .into_iter()
                .map(|(k, v)| (normalize(&k), normalize(&v)))
                .collect(),
        }
    }

    pub fn weight_for(&self, source: &str) -> f32 {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&w) = self.weights.get(canon) {
                return clamp01(w);
            }
        }

        if let Some(&w) = self.weights.get(&s) {
            return clamp01(w);
        }

        // Longest key wins so "hn search" beats "hn" for "HN Search API".
        let best = self
            .weights
            .iter()
            .filter(|(k, _)| !k.is_empty() && s.contains(k.as_str()))
            .max_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| b.0.cmp(a.0)));
        if let Some((_, &w)) = best {
            return clamp01(w);
        }

        clamp01(self.default_weight)
    }

    pub fn default_seed() -> Self {
        let weights = [
            ("show hn", 0.95),
            ("google news", 0.85),
            ("hn search", 0.75),
            ("product hunt", 0.80),
            ("github", 0.80),
            ("fallback", 0.20),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let aliases = [
            ("hn", "show hn"),
            ("hacker news", "show hn"),
            ("hackernews", "show hn"),
            ("news google com", "google news"),
            ("algolia", "hn search"),
            ("producthunt", "product hunt"),
        ]
        .into_iter()
        .map(|(a, c)| (a.to_string(), c.to_string()))
        .collect();

        Self {
            default_weight: default_default_weight(),
            weights,
            aliases,
        }
    }
}

impl Default for SourceWeightsConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

fn normalize(s: &str) -> String {
    let folded: String = s
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '—' | '–' | '-' | '_' | '/' | '\\' | '.' | ',' | '\'' | '’' => ' ',
            c if c.is_whitespace() => ' ',
            c => c,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SourceWeightsConfig {
        SourceWeightsConfig::default_seed()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn exact_and_case_insensitive() {
        let c = cfg();
        assert!(close(c.weight_for("Show HN"), 0.95));
        assert!(close(c.weight_for("GOOGLE NEWS"), 0.85));
    }

    #[test]
    fn alias_match() {
        let c = cfg();
        assert!(close(c.weight_for("Hacker-News"), 0.95));
        assert!(close(c.weight_for("news.google.com"), 0.85));
    }

    #[test]
    fn longest_substring_wins() {
        let c = cfg();
        assert!(close(c.weight_for("HN Search (Algolia)"), 0.75));
        assert!(close(c.weight_for("Google News — Tech"), 0.85));
    }

    #[test]
    fn default_and_clamp() {
        let c = cfg();
        assert!(close(c.weight_for("somewhere else"), 0.50));
        let odd: SourceWeightsConfig =
            serde_json::from_str(r#"{"default_weight": 3.0, "weights": {"X": -1.0}}"#).unwrap();
        let odd = odd.normalized();
        assert!(close(odd.weight_for("x"), 0.0));
        assert!(close(odd.weight_for("y"), 1.0));
    }

    #[test]
    fn missing_file_falls_back_to_seed() {
        let c = SourceWeightsConfig::load_from_file("/definitely/not/here.json");
        assert!(close(c.weight_for("Show HN"), 0.95));
    }
}

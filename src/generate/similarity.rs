//! Near-duplicate detection between posts.
//!
//! Texts are compared after stripping links, mentions, hashtags and
//! punctuation. Two posts are near-duplicates when any of these holds:
//! - token-set Jaccard similarity (words longer than 2 chars) >= threshold
//! - the first `prefix_overlap_chars` of one normalized text occur inside the
//!   other (only when that prefix is at least `min_overlap_chars` long)
//! - the normalized texts are equal and non-empty

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::contract::{Contract, LINK_RE};

static MENTION_OR_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[@#][A-Za-z0-9_]+").expect("mention/tag regex"));

/// Parameters of the duplicate test, taken from the contract.
#[derive(Clone, Copy, Debug)]
pub struct SimilarityParams {
    pub threshold: f32,
    pub prefix_overlap_chars: usize,
    pub min_overlap_chars: usize,
}

impl From<&Contract> for SimilarityParams {
    fn from(c: &Contract) -> Self {
        Self {
            threshold: c.duplicate_threshold,
            prefix_overlap_chars: c.prefix_overlap_chars,
            min_overlap_chars: c.min_overlap_chars,
        }
    }
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self::from(&Contract::default())
    }
}

/// Normalized text plus its token set, computed once per post.
#[derive(Clone, Debug)]
pub struct Fingerprint {
    normalized: String,
    tokens: HashSet<String>,
}

impl Fingerprint {
    pub fn new(text: &str) -> Self {
        let normalized = normalize(text);
        let tokens = normalized
            .split(' ')
            .filter(|w| w.chars().count() > 2)
            .map(str::to_string)
            .collect();
        Self { normalized, tokens }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn jaccard(&self, other: &Fingerprint) -> f32 {
        if self.tokens.is_empty() && other.tokens.is_empty() {
            return 0.0;
        }
        let inter = self.tokens.intersection(&other.tokens).count();
        let union = self.tokens.len() + other.tokens.len() - inter;
        inter as f32 / union as f32
    }

    pub fn is_near_duplicate(&self, other: &Fingerprint, p: &SimilarityParams) -> bool {
        if !self.normalized.is_empty() && self.normalized == other.normalized {
            return true;
        }
        if self.jaccard(other) >= p.threshold {
            return true;
        }
        prefix_inside(&self.normalized, &other.normalized, p)
            || prefix_inside(&other.normalized, &self.normalized, p)
    }
}

fn prefix_inside(a: &str, b: &str, p: &SimilarityParams) -> bool {
    let prefix: String = a.chars().take(p.prefix_overlap_chars).collect();
    prefix.chars().count() >= p.min_overlap_chars && b.contains(prefix.as_str())
}

/// Lowercase, drop links/mentions/hashtags, map punctuation to spaces and
/// collapse whitespace.
pub fn normalize(text: &str) -> String {
    let no_links = LINK_RE.replace_all(text, " ");
    let no_tags = MENTION_OR_TAG_RE.replace_all(&no_links, " ");
    let mut out = String::with_capacity(no_tags.len());
    let mut last_was_space = true;
    for ch in no_tags.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

pub fn similarity(a: &str, b: &str) -> f32 {
    Fingerprint::new(a).jaccard(&Fingerprint::new(b))
}

pub fn is_near_duplicate(a: &str, b: &str, p: &SimilarityParams) -> bool {
    Fingerprint::new(a).is_near_duplicate(&Fingerprint::new(b), p)
}

/// Accumulating set of accepted texts for greedy duplicate filtering.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    params: SimilarityParams,
    seen: Vec<Fingerprint>,
}

impl DuplicateIndex {
    pub fn new(params: SimilarityParams) -> Self {
        Self {
            params,
            seen: Vec::new(),
        }
    }

    pub fn with_texts<I, S>(params: SimilarityParams, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut idx = Self::new(params);
        for t in texts {
            idx.insert(t.as_ref());
        }
        idx
    }

    pub fn is_duplicate(&self, text: &str) -> bool {
        let fp = Fingerprint::new(text);
        self.is_duplicate_fp(&fp)
    }

    pub fn is_duplicate_fp(&self, fp: &Fingerprint) -> bool {
        self.seen.iter().any(|s| s.is_near_duplicate(fp, &self.params))
    }

    pub fn insert(&mut self, text: &str) {
        self.seen.push(Fingerprint::new(text));
    }

    /// Insert unless it duplicates something already held. Returns whether it
    /// was inserted.
    pub fn try_insert(&mut self, text: &str) -> bool {
        let fp = Fingerprint::new(text);
        if self.is_duplicate_fp(&fp) {
            return false;
        }
        self.seen.push(fp);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

//! Per-post structural contract.
//!
//! Every check here is pure and works on the final text. The hardener in
//! [`super::harden`] pairs each check with a repair; [`validate`] runs them all
//! and reports every failure, in rule order.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::config::{ContractConfig, LoopLimits, PipelineConfig};

static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(#[A-Za-z][A-Za-z0-9_]*)").expect("hashtag regex"));
static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[\s(])(@[A-Za-z0-9_]{1,15})\b").expect("mention regex"));
pub(crate) static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("link regex"));
static PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{1,19}:\s").expect("prefix regex"));
static PREFIX_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{1,19}:$").expect("prefix token regex"));

/// Words a post must not end on.
const DANGLING: &[&str] = &[
    "and", "or", "but", "so", "nor", "to", "with", "for", "of", "the", "a", "an", "in", "on",
    "at", "by", "from", "into", "via", "than", "as", "your", "our", "their", "its", "my",
    "because", "while", "plus",
];

/// Compiled contract: numeric bands from config plus the banned-phrase matcher.
#[derive(Debug, Clone)]
pub struct Contract {
    pub target_count: usize,
    pub min_len: usize,
    pub max_len: usize,
    pub pad_target: usize,
    pub min_tags: usize,
    pub max_tags: usize,
    pub duplicate_threshold: f32,
    pub prefix_overlap_chars: usize,
    pub min_overlap_chars: usize,
    pub banned_phrases: Vec<String>,
    pub max_repair_passes: usize,
    pub max_pad_steps: usize,
    banned_re: Option<Regex>,
}

impl Contract {
    pub fn new(cfg: &ContractConfig, limits: &LoopLimits) -> Self {
        Self {
            target_count: cfg.target_count,
            min_len: cfg.min_len,
            max_len: cfg.max_len,
            pad_target: cfg.pad_target(),
            min_tags: cfg.min_tags,
            max_tags: cfg.max_tags,
            duplicate_threshold: cfg.duplicate_threshold,
            prefix_overlap_chars: cfg.prefix_overlap_chars,
            min_overlap_chars: cfg.min_overlap_chars,
            banned_phrases: cfg.banned_phrases.clone(),
            max_repair_passes: limits.max_repair_passes,
            max_pad_steps: limits.max_pad_steps,
            banned_re: build_banned_regex(&cfg.banned_phrases),
        }
    }

    pub fn from_pipeline(cfg: &PipelineConfig) -> Self {
        Self::new(&cfg.contract, &cfg.limits)
    }

    pub(crate) fn banned_regex(&self) -> Option<&Regex> {
        self.banned_re.as_ref()
    }

    /// First banned phrase found outside of links, as written in the text.
    pub fn banned_match(&self, text: &str) -> Option<String> {
        let re = self.banned_re.as_ref()?;
        outside_links(text)
            .into_iter()
            .find_map(|seg| re.find(seg).map(|m| m.as_str().to_string()))
    }
}

impl Default for Contract {
    fn default() -> Self {
        Self::new(&ContractConfig::default(), &LoopLimits::default())
    }
}

fn build_banned_regex(phrases: &[String]) -> Option<Regex> {
    let mut alts: Vec<String> = phrases
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    if alts.is_empty() {
        return None;
    }
    // Longer alternatives first so "headlines" wins over "headline".
    alts.sort_by_key(|a| std::cmp::Reverse(a.len()));
    match Regex::new(&format!(r"(?i)\b(?:{})\b", alts.join("|"))) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(target: "generate", error = %e, "banned phrase list did not compile; ignoring");
            None
        }
    }
}

/// Slices of `text` that are not inside a link.
pub(crate) fn outside_links(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in LINK_RE.find_iter(text) {
        out.push(&text[last..m.start()]);
        last = m.end();
    }
    out.push(&text[last..]);
    out
}

/// Length as the contract measures it: Unicode scalar values.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub fn hashtags(text: &str) -> Vec<&str> {
    HASHTAG_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

pub fn hashtag_count(text: &str) -> usize {
    HASHTAG_RE.captures_iter(text).count()
}

pub fn mentions(text: &str) -> Vec<&str> {
    MENTION_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

pub fn has_mention(text: &str) -> bool {
    MENTION_RE.is_match(text)
}

/// Links found in the text, with trailing punctuation removed.
pub fn links(text: &str) -> Vec<&str> {
    LINK_RE.find_iter(text).map(|m| trim_link(m.as_str())).collect()
}

pub fn trim_link(raw: &str) -> &str {
    raw.trim_end_matches(|c: char| {
        matches!(
            c,
            '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '\'' | '"' | '>' | '…'
        )
    })
}

/// A link counts only if it parses as http(s) with a dotted host and an
/// alphabetic top-level label.
pub fn is_well_formed_link(link: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(link) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return false;
    }
    labels
        .last()
        .map(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false)
}

pub fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x1F000..=0x1F2FF | 0x2B00..=0x2BFF
    )
}

fn is_emoji_part(c: char) -> bool {
    is_emoji(c) || matches!(c, '\u{FE0F}' | '\u{200D}')
}

pub fn has_emoji(text: &str) -> bool {
    text.chars().any(is_emoji)
}

pub(crate) fn is_emoji_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(is_emoji_part) && token.chars().any(is_emoji)
}

pub(crate) fn is_hashtag_token(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next() == Some('#') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}

pub(crate) fn is_mention_token(token: &str) -> bool {
    MENTION_RE.is_match(token)
}

pub(crate) fn is_link_token(token: &str) -> bool {
    (token.starts_with("http://") || token.starts_with("https://"))
        && is_well_formed_link(trim_link(token))
}

pub(crate) fn is_prefix_token(token: &str) -> bool {
    PREFIX_TOKEN_RE.is_match(token)
}

pub fn has_prefix(text: &str) -> bool {
    PREFIX_RE.is_match(text)
}

pub(crate) fn is_dangling(word: &str) -> bool {
    let core = word
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    DANGLING.contains(&core.as_str())
}

pub(crate) fn ends_terminal(word: &str) -> bool {
    word.trim_end_matches(['"', '\'', ')'])
        .ends_with(['.', '!', '?', '…'])
}

/// True when the post stops on a finished sentence, a hashtag or a link, and
/// the words before a closing tag run do not dangle.
pub fn ending_is_complete(text: &str) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut end = tokens.len();
    while end > 0 && is_emoji_token(tokens[end - 1]) {
        end -= 1;
    }
    if end == 0 {
        return false;
    }
    let last = tokens[end - 1].trim_end_matches(is_emoji_part);
    if is_hashtag_token(last) || is_link_token(last) {
        let mut i = end;
        while i > 0
            && (is_hashtag_token(tokens[i - 1])
                || is_link_token(tokens[i - 1])
                || is_emoji_token(tokens[i - 1]))
        {
            i -= 1;
        }
        return i == 0 || !is_dangling(tokens[i - 1]);
    }
    ends_terminal(last) && !is_dangling(last)
}

/// One contract failure of a single post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Length { len: usize, min: usize, max: usize },
    HashtagCount { count: usize, min: usize, max: usize },
    BannedPhrase(String),
    MissingPrefix,
    MissingLink,
    MalformedLink(String),
    MissingMention,
    MissingEmoji,
    IncompleteEnding,
}

impl Violation {
    /// Short label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Violation::Length { .. } => "length",
            Violation::HashtagCount { .. } => "hashtags",
            Violation::BannedPhrase(_) => "banned",
            Violation::MissingPrefix => "prefix",
            Violation::MissingLink | Violation::MalformedLink(_) => "link",
            Violation::MissingMention => "mention",
            Violation::MissingEmoji => "emoji",
            Violation::IncompleteEnding => "ending",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Length { len, min, max } => {
                write!(f, "length {len} is outside {min}-{max} characters")
            }
            Violation::HashtagCount { count, min, max } => {
                write!(f, "has {count} hashtags, needs {min}-{max}")
            }
            Violation::BannedPhrase(p) => write!(f, "uses banned phrase \"{p}\""),
            Violation::MissingPrefix => {
                write!(f, "missing the one-word category prefix with a colon")
            }
            Violation::MissingLink => write!(f, "missing a link"),
            Violation::MalformedLink(l) => write!(f, "malformed link {l}"),
            Violation::MissingMention => write!(f, "missing an @mention"),
            Violation::MissingEmoji => write!(f, "missing an emoji"),
            Violation::IncompleteEnding => write!(f, "ends mid-sentence"),
        }
    }
}

pub(crate) type Check = fn(&str, &Contract) -> Option<Violation>;

pub(crate) fn check_banned(text: &str, c: &Contract) -> Option<Violation> {
    c.banned_match(text).map(Violation::BannedPhrase)
}

pub(crate) fn check_prefix(text: &str, _c: &Contract) -> Option<Violation> {
    (!has_prefix(text)).then_some(Violation::MissingPrefix)
}

pub(crate) fn check_link(text: &str, _c: &Contract) -> Option<Violation> {
    let found = links(text);
    if let Some(bad) = found.iter().find(|l| !is_well_formed_link(l)) {
        return Some(Violation::MalformedLink(bad.to_string()));
    }
    found.is_empty().then_some(Violation::MissingLink)
}

pub(crate) fn check_mention(text: &str, _c: &Contract) -> Option<Violation> {
    (!has_mention(text)).then_some(Violation::MissingMention)
}

pub(crate) fn check_emoji(text: &str, _c: &Contract) -> Option<Violation> {
    (!has_emoji(text)).then_some(Violation::MissingEmoji)
}

pub(crate) fn check_hashtags(text: &str, c: &Contract) -> Option<Violation> {
    let count = hashtag_count(text);
    (count < c.min_tags || count > c.max_tags).then_some(Violation::HashtagCount {
        count,
        min: c.min_tags,
        max: c.max_tags,
    })
}

pub(crate) fn check_ending(text: &str, _c: &Contract) -> Option<Violation> {
    (!ending_is_complete(text)).then_some(Violation::IncompleteEnding)
}

pub(crate) fn check_length(text: &str, c: &Contract) -> Option<Violation> {
    let len = char_len(text);
    (len < c.min_len || len > c.max_len).then_some(Violation::Length {
        len,
        min: c.min_len,
        max: c.max_len,
    })
}

/// Checks in rule order; the hardener's table follows the same order.
pub(crate) const CHECKS: [Check; 8] = [
    check_banned,
    check_prefix,
    check_link,
    check_mention,
    check_emoji,
    check_hashtags,
    check_ending,
    check_length,
];

/// Every contract violation of `text`. Empty means the post is valid.
pub fn validate(text: &str, contract: &Contract) -> Vec<Violation> {
    CHECKS.iter().filter_map(|check| check(text, contract)).collect()
}

pub fn is_valid(text: &str, contract: &Contract) -> bool {
    CHECKS.iter().all(|check| check(text, contract).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(body: &str, c: &Contract) -> String {
        // pad a sentence body with a neutral clause until it sits in the band
        let tail = " 🚀 @cursor_ai https://cursor.com #AI";
        let mut s = body.to_string();
        while char_len(&s) + char_len(tail) + 12 <= c.max_len {
            s.push_str(" Calm steps.");
        }
        while char_len(&s) + char_len(tail) < c.min_len {
            s.push_str(" Go.");
        }
        format!("{s}{tail}")
    }

    #[test]
    fn well_formed_links_need_dotted_alpha_host() {
        assert!(is_well_formed_link("https://cursor.com"));
        assert!(is_well_formed_link("https://docs.github.com/en/copilot"));
        assert!(!is_well_formed_link("https://localhost:3000"));
        assert!(!is_well_formed_link("https://cursor."));
        assert!(!is_well_formed_link("https://10.0.0.1/x"));
        assert!(!is_well_formed_link("http//broken"));
        assert_eq!(trim_link("https://cursor.com)."), "https://cursor.com");
    }

    #[test]
    fn hashtags_and_mentions_are_token_anchored() {
        let t = "Tool: mail me at a@b.com, follow @cursor_ai (@v0) and see https://x.com/#frag #AI #Dev_Tools";
        assert_eq!(hashtags(t), vec!["#AI", "#Dev_Tools"]);
        assert_eq!(mentions(t), vec!["@cursor_ai", "@v0"]);
        assert!(!has_mention("write to team@example.com"));
    }

    #[test]
    fn banned_phrases_ignore_links() {
        let c = Contract::default();
        assert_eq!(
            c.banned_match("Tool: see https://news.ycombinator.com today"),
            None
        );
        assert_eq!(
            c.banned_match("Tool: BREAKING update for devs").as_deref(),
            Some("BREAKING")
        );
        assert_eq!(
            c.banned_match("Tool: just   in from the lab").as_deref(),
            Some("just   in")
        );
        assert_eq!(c.banned_match("Tool: newsletter tips"), None);
    }

    #[test]
    fn ending_rules() {
        assert!(ending_is_complete("Tool: it ships today. 🚀"));
        assert!(ending_is_complete("Tool: it ships today @x https://x.com #AI"));
        assert!(ending_is_complete("Tool: built for @cursor_ai https://cursor.com"));
        assert!(!ending_is_complete("Tool: made for https://cursor.com #AI"));
        assert!(!ending_is_complete("Tool: it ships with"));
        assert!(!ending_is_complete("Tool: it ships today"));
        assert!(!ending_is_complete("Tool: built with the."));
    }

    #[test]
    fn valid_post_has_no_violations() {
        let c = Contract::default();
        let post = fit(
            "Tool: Cursor now rewrites whole modules from one prompt, so refactors that took an afternoon finish before lunch.",
            &c,
        );
        assert!(
            validate(&post, &c).is_empty(),
            "{post:?} -> {:?}",
            validate(&post, &c)
        );
        assert!(is_valid(&post, &c));
    }

    #[test]
    fn reports_every_failure_in_rule_order() {
        let c = Contract::default();
        let v = validate("breaking news about tools and", &c);
        let names: Vec<&str> = v.iter().map(Violation::name).collect();
        assert_eq!(
            names,
            vec!["banned", "prefix", "link", "mention", "emoji", "hashtags", "ending", "length"]
        );
    }

    #[test]
    fn malformed_link_is_reported_even_with_a_good_one() {
        let c = Contract::default();
        let v = check_link("Tool: https://cursor.com and https://nope", &c);
        assert_eq!(v, Some(Violation::MalformedLink("https://nope".into())));
    }
}

//! Deterministic repair of candidate posts.
//!
//! The rule table pairs each contract check with a repair. `harden` returns
//! already-valid input untouched; anything else is split into a draft
//! (category prefix, body words, trailing run of emoji/mentions/links/tags),
//! repaired rule by rule for at most `max_repair_passes` passes, and rendered
//! back with single spaces.
//!
//! Worst-case work per call is `max_repair_passes * (8 checks + one trim loop
//! bounded by the word count + max_pad_steps padding steps)`.

use std::collections::HashSet;

use super::contract::{
    self, char_len, ends_terminal, hashtag_count, hashtags, is_dangling, is_emoji_token,
    is_hashtag_token, is_mention_token, is_prefix_token, trim_link, Check,
    Contract, LINK_RE,
};
use super::tools::{
    self, seeded, ToolProfile, DEFAULT_TAGS, EMOJIS, FILLERS, FILLER_STRIDE, MICRO_PADS, PREFIXES,
};

type Repair = fn(&mut Draft, &RepairCtx<'_>);

/// One contract rule: a pure check and the repair applied when it fails.
pub(crate) struct Rule {
    pub name: &'static str,
    pub check: Check,
    repair: Repair,
}

pub(crate) static RULES: [Rule; 8] = [
    Rule {
        name: "banned",
        check: contract::check_banned,
        repair: repair_banned,
    },
    Rule {
        name: "prefix",
        check: contract::check_prefix,
        repair: repair_prefix,
    },
    Rule {
        name: "link",
        check: contract::check_link,
        repair: repair_link,
    },
    Rule {
        name: "mention",
        check: contract::check_mention,
        repair: repair_mention,
    },
    Rule {
        name: "emoji",
        check: contract::check_emoji,
        repair: repair_emoji,
    },
    Rule {
        name: "hashtags",
        check: contract::check_hashtags,
        repair: repair_hashtags,
    },
    Rule {
        name: "ending",
        check: contract::check_ending,
        repair: repair_ending,
    },
    Rule {
        name: "length",
        check: contract::check_length,
        repair: repair_length,
    },
];

struct RepairCtx<'a> {
    seed: u64,
    contract: &'a Contract,
    tool: &'static ToolProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Draft {
    prefix: Option<String>,
    body: Vec<String>,
    tail: Vec<String>,
}

fn is_tail_token(t: &str) -> bool {
    t.starts_with("http://")
        || t.starts_with("https://")
        || t.starts_with('#')
        || t.starts_with('@')
        || is_emoji_token(t)
}

fn has_link(t: &str) -> bool {
    LINK_RE.is_match(t)
}

impl Draft {
    fn parse(text: &str) -> Self {
        let mut tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let prefix = match tokens.first() {
            Some(t) if is_prefix_token(t) => Some(tokens.remove(0)),
            _ => None,
        };
        let mut split = tokens.len();
        while split > 0 && is_tail_token(&tokens[split - 1]) {
            split -= 1;
        }
        let tail = tokens.split_off(split);
        Self {
            prefix,
            body: tokens,
            tail,
        }
    }

    fn render(&self) -> String {
        self.prefix
            .iter()
            .chain(self.body.iter())
            .chain(self.tail.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn is_empty(&self) -> bool {
        self.prefix.is_none() && self.body.is_empty() && self.tail.is_empty()
    }

    fn any_token(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.body.iter().chain(self.tail.iter()).any(|t| pred(t))
    }

    /// Insert before the first link or hashtag of the tail.
    fn insert_before_closers(&mut self, token: &str) {
        let at = self
            .tail
            .iter()
            .position(|t| has_link(t) || is_hashtag_token(t))
            .unwrap_or(self.tail.len());
        self.tail.insert(at, token.to_string());
    }

    fn push_sentence(&mut self, sentence: &str) {
        self.body
            .extend(sentence.split_whitespace().map(str::to_string));
    }
}

/// Repair `raw` until it satisfies the contract. Deterministic in `seed`;
/// valid input comes back unchanged.
pub fn harden(raw: &str, seed: u64, contract: &Contract) -> String {
    if contract::is_valid(raw, contract) {
        return raw.to_string();
    }
    let ctx = RepairCtx {
        seed,
        contract,
        tool: tools::tool_for(raw, seed),
    };
    let mut draft = Draft::parse(raw);
    for pass in 0..contract.max_repair_passes {
        let mut touched = false;
        for rule in RULES.iter() {
            if (rule.check)(&draft.render(), contract).is_some() {
                (rule.repair)(&mut draft, &ctx);
                touched = true;
            }
        }
        if !touched {
            break;
        }
        if pass + 1 == contract.max_repair_passes {
            tracing::debug!(target: "generate", seed, "repair passes exhausted");
        }
    }
    draft.render()
}

/// Names of the rules in the order they are applied.
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|r| r.name).collect()
}

// -- repairs --

fn repair_banned(d: &mut Draft, ctx: &RepairCtx<'_>) {
    let Some(re) = ctx.contract.banned_regex() else {
        return;
    };
    if d.prefix.as_deref().is_some_and(|p| re.is_match(p)) {
        d.prefix = None;
    }

    let body = d.body.join(" ");
    let mut cleaned = String::with_capacity(body.len());
    let mut last = 0;
    for m in LINK_RE.find_iter(&body) {
        cleaned.push_str(&re.replace_all(&body[last..m.start()], " "));
        cleaned.push_str(m.as_str());
        last = m.end();
    }
    cleaned.push_str(&re.replace_all(&body[last..], " "));

    let mut words: Vec<String> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric) || is_emoji_token(w))
        .map(str::to_string)
        .collect();
    if let Some(first) = words.first_mut() {
        let trimmed = first
            .trim_start_matches([':', ';', ',', '-', '–', '—', '|'])
            .to_string();
        *first = trimmed;
    }
    d.body = words;
    d.tail.retain(|t| has_link(t) || !re.is_match(t));
}

fn repair_prefix(d: &mut Draft, ctx: &RepairCtx<'_>) {
    if d.prefix.is_none() {
        d.prefix = Some(seeded(&PREFIXES, ctx.seed).to_string());
    }
}

fn repair_link(d: &mut Draft, ctx: &RepairCtx<'_>) {
    let keep = |t: &String| match LINK_RE.find(t) {
        Some(m) => contract::is_well_formed_link(trim_link(m.as_str())),
        None => true,
    };
    d.body.retain(keep);
    d.tail.retain(keep);
    if !d.any_token(has_link) {
        let at = d
            .tail
            .iter()
            .position(|t| is_hashtag_token(t))
            .unwrap_or(d.tail.len());
        d.tail.insert(at, ctx.tool.link.to_string());
    }
}

fn repair_mention(d: &mut Draft, ctx: &RepairCtx<'_>) {
    if !d.any_token(is_mention_token) {
        d.insert_before_closers(ctx.tool.handle);
    }
}

fn repair_emoji(d: &mut Draft, ctx: &RepairCtx<'_>) {
    if !contract::has_emoji(&d.render()) {
        d.tail.insert(0, seeded(&EMOJIS, ctx.seed).to_string());
    }
}

fn repair_hashtags(d: &mut Draft, ctx: &RepairCtx<'_>) {
    let c = ctx.contract;
    // Keep the first max_tags in reading order; demote extra body tags to
    // plain words and drop extra tail tags.
    let mut allowance = c.max_tags;
    for t in d.body.iter_mut() {
        if is_hashtag_token(t) {
            if allowance > 0 {
                allowance -= 1;
            } else {
                t.remove(0);
            }
        }
    }
    d.tail.retain(|t| {
        if !is_hashtag_token(t) {
            return true;
        }
        if allowance > 0 {
            allowance -= 1;
            true
        } else {
            false
        }
    });

    let text = d.render();
    let mut count = hashtag_count(&text);
    if count >= c.min_tags {
        return;
    }
    let present: HashSet<String> = hashtags(&text).iter().map(|h| h.to_lowercase()).collect();
    let start = (ctx.seed % DEFAULT_TAGS.len() as u64) as usize;
    for k in 0..DEFAULT_TAGS.len() {
        if count >= c.min_tags {
            break;
        }
        let tag = DEFAULT_TAGS[(start + k) % DEFAULT_TAGS.len()];
        if !present.contains(&tag.to_lowercase()) {
            d.tail.push(tag.to_string());
            count += 1;
        }
    }
}

fn repair_ending(d: &mut Draft, _ctx: &RepairCtx<'_>) {
    let mut others = Vec::new();
    let mut links = Vec::new();
    let mut tags = Vec::new();
    for t in d.tail.drain(..) {
        if is_hashtag_token(&t) {
            tags.push(t);
        } else if has_link(&t) {
            links.push(t);
        } else {
            others.push(t);
        }
    }
    if links.is_empty() && tags.is_empty() {
        // Nothing to close on: fold words back into the body, keep emoji last.
        let (emoji, words): (Vec<String>, Vec<String>) =
            others.into_iter().partition(|t| is_emoji_token(t));
        d.body.extend(words);
        complete_body(&mut d.body);
        d.tail = emoji;
    } else {
        complete_body(&mut d.body);
        d.tail = others;
        d.tail.extend(links);
        d.tail.extend(tags);
    }
}

fn repair_length(d: &mut Draft, ctx: &RepairCtx<'_>) {
    let c = ctx.contract;
    while char_len(&d.render()) > c.max_len {
        if trim_inline_structure(d, ctx) {
            complete_body(&mut d.body);
            continue;
        }
        // Then plain words; mentions, links and tags may be the only ones left.
        if let Some(i) = d.body.iter().rposition(|w| !is_structural(w)) {
            d.body.remove(i);
            complete_body(&mut d.body);
        } else if !shrink_structure(d, ctx) {
            break;
        }
    }
    pad(d, ctx);
}

/// Surplus links and mentions go before any prose does: the longest link
/// when another one remains, the last body mention when another mention
/// remains, else a lone link that eats a third of the band is swapped for
/// the tool's own.
fn trim_inline_structure(d: &mut Draft, ctx: &RepairCtx<'_>) -> bool {
    let c = ctx.contract;
    if count_all(d, has_link) > 1 {
        let longest = d
            .body
            .iter()
            .chain(&d.tail)
            .enumerate()
            .filter(|(_, t)| has_link(t))
            .max_by_key(|(i, t)| (char_len(t), std::cmp::Reverse(*i)))
            .map(|(i, _)| i);
        if let Some(i) = longest {
            if i < d.body.len() {
                d.body.remove(i);
            } else {
                d.tail.remove(i - d.body.len());
            }
            return true;
        }
    }
    if count_all(d, is_mention_token) > 1 {
        if let Some(i) = d.body.iter().rposition(|t| is_mention_token(t)) {
            d.body.remove(i);
            return true;
        }
    }
    let tool_len = char_len(ctx.tool.link);
    for part in [&mut d.body, &mut d.tail] {
        if let Some(i) = part.iter().position(|t| {
            let n = char_len(t);
            has_link(t) && n > tool_len && n * 3 > c.max_len
        }) {
            part[i] = ctx.tool.link.to_string();
            return true;
        }
    }
    false
}

fn count_all(d: &Draft, pred: fn(&str) -> bool) -> usize {
    d.body.iter().chain(&d.tail).filter(|t| pred(t)).count()
}

fn is_structural(w: &str) -> bool {
    is_mention_token(w) || has_link(w) || is_hashtag_token(w)
}

/// Drop trailing dangling words and stray punctuation, then close the last
/// word with a period unless it already ends a sentence. Emoji, links and
/// hashtags are closers and are skipped over.
fn complete_body(body: &mut Vec<String>) {
    loop {
        let Some(i) = body
            .iter()
            .rposition(|w| !is_emoji_token(w) && !is_hashtag_token(w) && !has_link(w))
        else {
            return;
        };
        let w = &body[i];
        if is_dangling(w) || !w.chars().any(char::is_alphanumeric) {
            body.remove(i);
            continue;
        }
        let w = &mut body[i];
        let kept = w.trim_end_matches([',', ';', ':', '-', '–', '—']).len();
        w.truncate(kept);
        if !ends_terminal(w) {
            w.push('.');
        }
        return;
    }
}

/// Remove one structural token the contract does not need, body first.
/// Returns false when nothing can go.
fn shrink_structure(d: &mut Draft, ctx: &RepairCtx<'_>) -> bool {
    let c = ctx.contract;
    let surplus: [(fn(&str) -> bool, usize); 4] = [
        (is_mention_token, 1),
        (has_link, 1),
        (is_hashtag_token, c.min_tags),
        (is_emoji_token, 1),
    ];
    for (pred, keep) in surplus {
        if count_all(d, pred) <= keep {
            continue;
        }
        for part in [&mut d.body, &mut d.tail] {
            if let Some(i) = part.iter().rposition(|t| pred(t)) {
                part.remove(i);
                return true;
            }
        }
    }
    if let Some(i) = d.tail.iter().rposition(|t| {
        !is_mention_token(t) && !has_link(t) && !is_hashtag_token(t) && !is_emoji_token(t)
    }) {
        d.tail.remove(i);
        return true;
    }
    // A single oversized link: swap for the fallback tool's link.
    let tool_len = char_len(ctx.tool.link);
    for part in [&mut d.body, &mut d.tail] {
        if let Some(i) = part
            .iter()
            .position(|t| has_link(t) && char_len(t) > tool_len)
        {
            part[i] = ctx.tool.link.to_string();
            return true;
        }
    }
    false
}

/// Grow the body toward the band with seed-rotated filler sentences, then
/// exact short pads.
fn pad(d: &mut Draft, ctx: &RepairCtx<'_>) {
    let c = ctx.contract;
    complete_body(&mut d.body);
    let n = FILLERS.len() as u64;
    let start = ctx.seed.wrapping_mul(FILLER_STRIDE) % n;

    for _ in 0..c.max_pad_steps {
        let text = d.render();
        let len = char_len(&text);
        if len >= c.min_len {
            return;
        }
        let sep = usize::from(!d.is_empty());
        let grown = |s: &str| len + sep + char_len(s);

        let mut first_fit = None;
        let mut landing = None;
        for k in 0..n {
            let f = FILLERS[((start + k) % n) as usize];
            if text.contains(f) {
                continue;
            }
            let new_len = grown(f);
            if new_len > c.max_len {
                continue;
            }
            if new_len >= c.min_len {
                landing = Some(f);
                break;
            }
            first_fit.get_or_insert(f);
        }
        if let Some(f) = landing.or(first_fit) {
            d.push_sentence(f);
            continue;
        }

        let micro = MICRO_PADS
            .iter()
            .filter(|p| grown(p) >= c.min_len && grown(p) <= c.max_len)
            .min_by_key(|p| (grown(p).abs_diff(c.pad_target), text.contains(**p)))
            .or_else(|| {
                MICRO_PADS
                    .iter()
                    .filter(|p| grown(p) <= c.max_len)
                    .max_by_key(|p| grown(p))
            });
        match micro {
            Some(p) => d.push_sentence(p),
            None => return,
        }
    }
}

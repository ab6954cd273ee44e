//! Attempt loop that turns model output into a complete batch.
//!
//! ```text
//! Requesting -> Normalizing -> Validating -> Accepted
//!      ^                            |
//!      +--------- Retrying <--------+---> Exhausted -> backfill
//! ```
//!
//! Every attempt leaves an immutable [`AttemptSnapshot`]. When attempts run
//! out, the survivors of the best snapshot are kept and the rest of the batch
//! is synthesized from the tool table.

use metrics::{counter, gauge};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::contract::{self, Contract, Violation};
use super::harden::harden;
use super::model_client::{call_model, ModelClient};
use super::parser::{normalize_freshness, parse_candidates, CandidatePost, DEFAULT_FRESHNESS};
use super::prompt::PromptComposer;
use super::similarity::{DuplicateIndex, Fingerprint, SimilarityParams};
use super::tools::{backfill_text, scanning_text, BACKFILL_ANGLES, SCAN_VARIANTS, TOOLS};
use super::{short_id, GeneratedPost};
use crate::error::{GenerateError, Result};
use crate::history::HistorySnapshot;
use crate::ingest::types::Signal;

pub const BACKFILL_FRESHNESS: &str = "Backfill";
pub const SCANNING_FRESHNESS: &str = "System";

const SEED_ATTEMPT_STRIDE: u64 = 101;
const BACKFILL_SEED_BASE: u64 = 1_000;
const SCANNING_SEED_BASE: u64 = 2_000;

/// Everything wrong with one attempt's batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolationReport {
    pub expected: usize,
    pub got: usize,
    /// `(post index, violations)` for posts that fail the contract.
    pub per_post: Vec<(usize, Vec<Violation>)>,
    /// `(i, j, jaccard)` for near-duplicate pairs inside the batch.
    pub pairwise: Vec<(usize, usize, f32)>,
    /// Indices of posts that repeat a history entry.
    pub history: Vec<usize>,
}

impl ViolationReport {
    pub fn is_clean(&self) -> bool {
        self.got == self.expected
            && self.per_post.is_empty()
            && self.pairwise.is_empty()
            && self.history.is_empty()
    }

    pub fn violation_count(&self) -> usize {
        usize::from(self.got != self.expected)
            + self.per_post.iter().map(|(_, v)| v.len()).sum::<usize>()
            + self.pairwise.len()
            + self.history.len()
    }

    /// One line per problem, phrased for the model.
    pub fn feedback_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.got != self.expected {
            lines.push(format!(
                "- expected exactly {} posts, got {}",
                self.expected, self.got
            ));
        }
        for (i, vs) in &self.per_post {
            for v in vs {
                lines.push(format!("- post {}: {v}", i + 1));
            }
        }
        for (i, j, sim) in &self.pairwise {
            lines.push(format!(
                "- posts {} and {} are too similar ({:.2}); cover different tools",
                i + 1,
                j + 1,
                sim
            ));
        }
        for i in &self.history {
            lines.push(format!(
                "- post {} repeats an already published post; pick a new angle",
                i + 1
            ));
        }
        lines
    }

    pub fn feedback(&self) -> String {
        self.feedback_lines().join("\n")
    }
}

/// What one attempt produced. Never mutated after it is recorded.
#[derive(Debug, Clone)]
pub enum AttemptSnapshot {
    Failed {
        attempt: u32,
        kind: &'static str,
        message: String,
    },
    Completed {
        attempt: u32,
        posts: Vec<GeneratedPost>,
        report: ViolationReport,
        /// Indices into `posts` that may be kept if this attempt is chosen.
        survivors: Vec<usize>,
    },
}

impl AttemptSnapshot {
    pub fn attempt(&self) -> u32 {
        match self {
            AttemptSnapshot::Failed { attempt, .. } | AttemptSnapshot::Completed { attempt, .. } => {
                *attempt
            }
        }
    }

    fn survivor_count(&self) -> usize {
        match self {
            AttemptSnapshot::Failed { .. } => 0,
            AttemptSnapshot::Completed { survivors, .. } => survivors.len(),
        }
    }
}

#[derive(Debug)]
enum AttemptState {
    Requesting {
        attempt: u32,
        feedback: Option<String>,
    },
    Normalizing {
        attempt: u32,
        raw: String,
    },
    Validating {
        attempt: u32,
        posts: Vec<GeneratedPost>,
    },
    Retrying {
        attempt: u32,
        feedback: String,
    },
    Accepted(Vec<GeneratedPost>),
    Exhausted,
}

pub struct BatchAssembler<'a> {
    contract: &'a Contract,
    composer: PromptComposer<'a>,
    client: &'a dyn ModelClient,
    max_attempts: u32,
    call_budget: Duration,
}

impl<'a> BatchAssembler<'a> {
    pub fn new(
        contract: &'a Contract,
        composer: PromptComposer<'a>,
        client: &'a dyn ModelClient,
        max_attempts: u32,
        call_budget: Duration,
    ) -> Self {
        Self {
            contract,
            composer,
            client,
            max_attempts: max_attempts.max(1),
            call_budget,
        }
    }

    /// Run the attempt loop. Returns exactly `target_count` posts unless the
    /// model client reports a configuration error.
    pub async fn assemble(
        &self,
        now: u64,
        signals: &[Signal],
        history: &HistorySnapshot,
    ) -> Result<Vec<GeneratedPost>> {
        let params = SimilarityParams::from(self.contract);
        let history_idx = DuplicateIndex::with_texts(params, &history.all);
        let mut snapshots: Vec<AttemptSnapshot> = Vec::new();

        let mut state = AttemptState::Requesting {
            attempt: 1,
            feedback: None,
        };
        loop {
            state = match state {
                AttemptState::Requesting { attempt, feedback } => {
                    let payload = self.composer.build_request(
                        now,
                        signals,
                        &history.prompt,
                        feedback.as_deref(),
                    );
                    debug!(target: "generate", attempt, prompt_chars = payload.prompt.len(), "requesting");
                    match call_model(self.client, &payload, self.call_budget).await {
                        Ok(raw) => AttemptState::Normalizing { attempt, raw },
                        Err(e) if !e.is_retryable() => {
                            counter!("generate_attempts_total", "outcome" => "fatal").increment(1);
                            return Err(e);
                        }
                        Err(e) => self.fail(attempt, e, &mut snapshots),
                    }
                }
                AttemptState::Normalizing { attempt, raw } => match parse_candidates(&raw) {
                    Ok(candidates) => AttemptState::Validating {
                        attempt,
                        posts: self.normalize(attempt, candidates),
                    },
                    Err(e) => self.fail(attempt, e, &mut snapshots),
                },
                AttemptState::Validating { attempt, posts } => {
                    let report = self.validate_batch(&posts, &history_idx);
                    if report.is_clean() {
                        info!(target: "generate", attempt, posts = posts.len(), "batch accepted");
                        counter!("generate_attempts_total", "outcome" => "accepted").increment(1);
                        AttemptState::Accepted(posts)
                    } else {
                        let survivors = self.survivors(&posts, &report);
                        info!(
                            target: "generate",
                            attempt,
                            posts = posts.len(),
                            violations = report.violation_count(),
                            survivors = survivors.len(),
                            "batch rejected"
                        );
                        counter!("generate_attempts_total", "outcome" => "rejected").increment(1);
                        let feedback = report.feedback();
                        snapshots.push(AttemptSnapshot::Completed {
                            attempt,
                            posts,
                            report,
                            survivors,
                        });
                        self.next_after(attempt, feedback)
                    }
                }
                AttemptState::Retrying { attempt, feedback } => AttemptState::Requesting {
                    attempt: attempt + 1,
                    feedback: Some(feedback),
                },
                AttemptState::Accepted(posts) => {
                    gauge!("generate_last_batch_backfilled").set(0.0);
                    return Ok(posts);
                }
                AttemptState::Exhausted => {
                    let kept = best_survivors(&snapshots);
                    warn!(
                        target: "generate",
                        attempts = snapshots.len(),
                        kept = kept.len(),
                        "attempts exhausted; backfilling"
                    );
                    return Ok(self.backfill(now, kept, &history_idx));
                }
            };
        }
    }

    fn fail(
        &self,
        attempt: u32,
        e: GenerateError,
        snapshots: &mut Vec<AttemptSnapshot>,
    ) -> AttemptState {
        warn!(target: "generate", attempt, kind = e.kind(), error = %e, "attempt failed");
        counter!("generate_attempts_total", "outcome" => e.kind()).increment(1);
        let feedback = format!(
            "- the previous reply was unusable ({e}); return only the JSON object with exactly {} posts",
            self.contract.target_count
        );
        snapshots.push(AttemptSnapshot::Failed {
            attempt,
            kind: e.kind(),
            message: e.to_string(),
        });
        self.next_after(attempt, feedback)
    }

    fn next_after(&self, attempt: u32, feedback: String) -> AttemptState {
        if attempt >= self.max_attempts {
            AttemptState::Exhausted
        } else {
            AttemptState::Retrying { attempt, feedback }
        }
    }

    /// Harden each candidate. Posts past `target_count` are dropped.
    fn normalize(&self, attempt: u32, candidates: Vec<CandidatePost>) -> Vec<GeneratedPost> {
        candidates
            .into_iter()
            .take(self.contract.target_count)
            .enumerate()
            .map(|(i, c)| {
                let seed = i as u64 + u64::from(attempt) * SEED_ATTEMPT_STRIDE;
                GeneratedPost {
                    text: harden(&c.text, seed, self.contract),
                    source_age: normalize_freshness(c.freshness.as_deref(), DEFAULT_FRESHNESS),
                }
            })
            .collect()
    }

    pub(crate) fn validate_batch(
        &self,
        posts: &[GeneratedPost],
        history_idx: &DuplicateIndex,
    ) -> ViolationReport {
        let params = SimilarityParams::from(self.contract);
        let fps: Vec<Fingerprint> = posts.iter().map(|p| Fingerprint::new(&p.text)).collect();

        let mut report = ViolationReport {
            expected: self.contract.target_count,
            got: posts.len(),
            ..ViolationReport::default()
        };
        for (i, p) in posts.iter().enumerate() {
            let vs = contract::validate(&p.text, self.contract);
            if !vs.is_empty() {
                report.per_post.push((i, vs));
            }
            if history_idx.is_duplicate_fp(&fps[i]) {
                report.history.push(i);
            }
        }
        for i in 0..fps.len() {
            for j in (i + 1)..fps.len() {
                if fps[i].is_near_duplicate(&fps[j], &params) {
                    report.pairwise.push((i, j, fps[i].jaccard(&fps[j])));
                }
            }
        }
        report
    }

    /// Valid, not repeating history, and greedily free of in-batch repeats.
    fn survivors(&self, posts: &[GeneratedPost], report: &ViolationReport) -> Vec<usize> {
        let mut idx = DuplicateIndex::new(SimilarityParams::from(self.contract));
        posts
            .iter()
            .enumerate()
            .filter(|(i, _)| !report.per_post.iter().any(|(j, _)| j == i))
            .filter(|(i, _)| !report.history.contains(i))
            .filter(|(_, p)| idx.try_insert(&p.text))
            .map(|(i, _)| i)
            .collect()
    }

    /// Fill `kept` up to `target_count` from the tool table, then from the
    /// "still scanning" drafts.
    pub(crate) fn backfill(
        &self,
        now: u64,
        mut kept: Vec<GeneratedPost>,
        history_idx: &DuplicateIndex,
    ) -> Vec<GeneratedPost> {
        let target = self.contract.target_count;
        let params = SimilarityParams::from(self.contract);
        let mut batch_idx = DuplicateIndex::with_texts(params, kept.iter().map(|p| &p.text));
        let initial = kept.len();

        let start = ((now / 86_400) as usize).wrapping_mul(target) % TOOLS.len();
        let mut k = 0u64;
        'tools: for angle in 0..BACKFILL_ANGLES {
            for offset in 0..TOOLS.len() {
                if kept.len() >= target {
                    break 'tools;
                }
                let tool = &TOOLS[(start + offset) % TOOLS.len()];
                let text = harden(
                    &backfill_text(tool, angle, k),
                    BACKFILL_SEED_BASE + k,
                    self.contract,
                );
                k += 1;
                if !contract::is_valid(&text, self.contract) || history_idx.is_duplicate(&text) {
                    counter!("generate_backfill_skipped_total", "stage" => "tools").increment(1);
                    continue;
                }
                if !batch_idx.try_insert(&text) {
                    counter!("generate_backfill_skipped_total", "stage" => "tools").increment(1);
                    continue;
                }
                debug!(target: "generate", id = %short_id(&text), tool = tool.name, angle, "backfilled");
                kept.push(GeneratedPost {
                    text,
                    source_age: BACKFILL_FRESHNESS.to_string(),
                });
            }
        }
        let from_tools = kept.len() - initial;

        let mut i = 0;
        while kept.len() < target && i < SCAN_VARIANTS {
            let text = harden(&scanning_text(i), SCANNING_SEED_BASE + i as u64, self.contract);
            i += 1;
            if !contract::is_valid(&text, self.contract) || history_idx.is_duplicate(&text) {
                counter!("generate_backfill_skipped_total", "stage" => "scanning").increment(1);
                continue;
            }
            if batch_idx.try_insert(&text) {
                kept.push(GeneratedPost {
                    text,
                    source_age: SCANNING_FRESHNESS.to_string(),
                });
            }
        }

        // Only reachable with a contract that rejects every synthesized draft,
        // or a history that already holds them all. History is not checked here.
        let mut j = 0;
        while kept.len() < target {
            if j == 0 {
                error!(target: "generate", short = target - kept.len(), "backfill pool exhausted");
            }
            kept.push(GeneratedPost {
                text: harden(&scanning_text(j), SCANNING_SEED_BASE + j as u64, self.contract),
                source_age: SCANNING_FRESHNESS.to_string(),
            });
            j += 1;
        }

        let from_scanning = kept.len() - initial - from_tools;
        counter!("generate_backfill_posts_total", "stage" => "tools").increment(from_tools as u64);
        counter!("generate_backfill_posts_total", "stage" => "scanning")
            .increment(from_scanning as u64);
        gauge!("generate_last_batch_backfilled").set((from_tools + from_scanning) as f64);
        info!(
            target: "generate",
            kept = initial,
            from_tools,
            from_scanning,
            "backfill complete"
        );
        kept
    }
}

/// Survivors of the attempt that kept the most posts; later attempts win ties.
fn best_survivors(snapshots: &[AttemptSnapshot]) -> Vec<GeneratedPost> {
    let mut best: Option<&AttemptSnapshot> = None;
    for s in snapshots {
        if best.map_or(true, |b| s.survivor_count() >= b.survivor_count()) {
            best = Some(s);
        }
    }
    match best {
        Some(AttemptSnapshot::Completed {
            posts, survivors, ..
        }) => survivors.iter().map(|&i| posts[i].clone()).collect(),
        _ => Vec::new(),
    }
}

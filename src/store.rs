//! On-disk batch store.
//!
//! Layout under the store directory:
//! - `{YYYY-MM-DD}.json`: the day's batch, an array of `{text, sourceAge, posted}`
//!   (plain strings from older files are accepted)
//! - `runs/{id}.json`: one snapshot per generation run
//!
//! Day keys use a fixed UTC offset (default +05:30). Writes go to a temp file
//! that is renamed over the target, so readers never see partial JSON.

use async_trait::async_trait;
use chrono::{FixedOffset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::generate::{short_id, GeneratedPost};
use crate::history::{HistorySource, HistoryWindow};

pub const ENV_STORE_DIR: &str = "STORE_DIR";
const RUNS_DIR: &str = "runs";

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date key regex"));
static RUN_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("run id regex"));

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid date key: {0}")]
    InvalidDate(String),
    #[error("invalid run id: {0}")]
    InvalidRunId(String),
    #[error("no batch stored for {0}")]
    MissingDay(String),
    #[error("index {index} out of range for {date} ({len} posts)")]
    IndexOutOfRange {
        date: String,
        index: usize,
        len: usize,
    },
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store json failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::MissingDay(_) | StoreError::IndexOutOfRange { .. }
        )
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, StoreError::InvalidDate(_) | StoreError::InvalidRunId(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

fn default_source_age() -> String {
    "Fresh".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPost {
    pub text: String,
    #[serde(rename = "sourceAge", default = "default_source_age")]
    pub source_age: String,
    #[serde(default)]
    pub posted: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Post(StoredPost),
    Legacy(String),
}

impl From<StoredEntry> for StoredPost {
    fn from(e: StoredEntry) -> Self {
        match e {
            StoredEntry::Post(p) => p,
            StoredEntry::Legacy(text) => StoredPost {
                text,
                source_age: default_source_age(),
                posted: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyBatch {
    pub date: String,
    pub tweets: Vec<StoredPost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: String,
    pub saved_at: u64,
    pub date: String,
    pub posts: Vec<GeneratedPost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMeta {
    pub id: String,
    pub saved_at: u64,
    pub date: String,
    pub count: usize,
}

impl From<&RunSnapshot> for RunMeta {
    fn from(r: &RunSnapshot) -> Self {
        Self {
            id: r.id.clone(),
            saved_at: r.saved_at,
            date: r.date.clone(),
            count: r.posts.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchStore {
    dir: PathBuf,
    offset: FixedOffset,
}

impl BatchStore {
    pub fn new(dir: impl Into<PathBuf>, day_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(day_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
        Self {
            dir: dir.into(),
            offset,
        }
    }

    /// `$STORE_DIR` overrides the configured directory.
    pub fn from_config(cfg: &StoreConfig) -> Self {
        let dir = std::env::var(ENV_STORE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| cfg.dir.clone());
        Self::new(dir, cfg.day_offset_minutes)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `YYYY-MM-DD` of `now` in the store's offset.
    pub fn day_key(&self, now: u64) -> String {
        Utc.timestamp_opt(now as i64, 0)
            .single()
            .unwrap_or_default()
            .with_timezone(&self.offset)
            .format("%Y-%m-%d")
            .to_string()
    }

    fn day_path(&self, date: &str) -> StoreResult<PathBuf> {
        if !DATE_RE.is_match(date) {
            return Err(StoreError::InvalidDate(date.to_string()));
        }
        Ok(self.dir.join(format!("{date}.json")))
    }

    fn run_path(&self, id: &str) -> StoreResult<PathBuf> {
        if !RUN_ID_RE.is_match(id) {
            return Err(StoreError::InvalidRunId(id.to_string()));
        }
        Ok(self.dir.join(RUNS_DIR).join(format!("{id}.json")))
    }

    /// Replace the day's batch; every post starts unposted.
    pub fn save_daily(&self, date: &str, posts: &[GeneratedPost]) -> StoreResult<DailyBatch> {
        let path = self.day_path(date)?;
        let tweets: Vec<StoredPost> = posts
            .iter()
            .map(|p| StoredPost {
                text: p.text.clone(),
                source_age: p.source_age.clone(),
                posted: false,
            })
            .collect();
        write_json_atomic(&path, &tweets)?;
        info!(target: "store", date, posts = tweets.len(), "daily batch saved");
        Ok(DailyBatch {
            date: date.to_string(),
            tweets,
        })
    }

    pub fn load_daily(&self, date: &str) -> StoreResult<Option<DailyBatch>> {
        let path = self.day_path(date)?;
        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<StoredEntry> = serde_json::from_str(&data)?;
        Ok(Some(DailyBatch {
            date: date.to_string(),
            tweets: entries.into_iter().map(StoredPost::from).collect(),
        }))
    }

    /// Stored day keys, newest first.
    pub fn available_dates(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut dates: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let stem = name.strip_suffix(".json")?;
                DATE_RE.is_match(stem).then(|| stem.to_string())
            })
            .collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    /// Flip the posted flag of one post; returns the updated post.
    pub fn toggle_posted(&self, date: &str, index: usize) -> StoreResult<StoredPost> {
        let mut batch = self
            .load_daily(date)?
            .ok_or_else(|| StoreError::MissingDay(date.to_string()))?;
        let len = batch.tweets.len();
        let post = batch
            .tweets
            .get_mut(index)
            .ok_or_else(|| StoreError::IndexOutOfRange {
                date: date.to_string(),
                index,
                len,
            })?;
        post.posted = !post.posted;
        let updated = post.clone();
        write_json_atomic(&self.day_path(date)?, &batch.tweets)?;
        debug!(target: "store", date, index, posted = updated.posted, "toggled posted");
        Ok(updated)
    }

    /// Delete day files and run snapshots older than `keep_days`. Returns the
    /// number of files removed.
    pub fn cleanup(&self, keep_days: u32, now: u64) -> StoreResult<usize> {
        let cutoff_secs = now.saturating_sub(u64::from(keep_days) * 86_400);
        let cutoff_day = self.day_key(cutoff_secs);
        let mut deleted = 0;

        for date in self.available_dates()? {
            if date < cutoff_day {
                fs::remove_file(self.day_path(&date)?)?;
                deleted += 1;
            }
        }
        for run in self.read_runs()? {
            if run.saved_at < cutoff_secs {
                fs::remove_file(self.run_path(&run.id)?)?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(target: "store", deleted, cutoff = %cutoff_day, "old batches removed");
        }
        Ok(deleted)
    }

    pub fn save_run(&self, now: u64, posts: &[GeneratedPost]) -> StoreResult<RunSnapshot> {
        let fingerprint: String = posts.iter().map(|p| p.text.as_str()).collect();
        let id = format!("{now}-{}", &short_id(&fingerprint)[..8]);
        let run = RunSnapshot {
            id,
            saved_at: now,
            date: self.day_key(now),
            posts: posts.to_vec(),
        };
        write_json_atomic(&self.run_path(&run.id)?, &run)?;
        info!(target: "store", id = %run.id, posts = run.posts.len(), "run snapshot saved");
        Ok(run)
    }

    /// Runs saved within the last `hours`, newest first.
    pub fn list_runs(&self, now: u64, hours: u32) -> StoreResult<Vec<RunMeta>> {
        let since = now.saturating_sub(u64::from(hours) * 3_600);
        let mut runs: Vec<RunSnapshot> = self
            .read_runs()?
            .into_iter()
            .filter(|r| r.saved_at >= since)
            .collect();
        runs.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| b.id.cmp(&a.id)));
        Ok(runs.iter().map(RunMeta::from).collect())
    }

    pub fn load_run(&self, id: &str) -> StoreResult<Option<RunSnapshot>> {
        let path = self.run_path(id)?;
        match fs::read_to_string(&path) {
            Ok(d) => Ok(Some(serde_json::from_str(&d)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_runs(&self) -> StoreResult<Vec<RunSnapshot>> {
        let entries = match fs::read_dir(self.dir.join(RUNS_DIR)) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(StoreError::from)
                .and_then(|d| serde_json::from_str::<RunSnapshot>(&d).map_err(StoreError::from))
            {
                Ok(run) => out.push(run),
                Err(e) => warn!(target: "store", path = %path.display(), error = %e, "skipping unreadable run"),
            }
        }
        Ok(out)
    }

    /// Texts inside `window`, most recent first.
    pub fn history_texts(&self, window: HistoryWindow, now: u64) -> StoreResult<Vec<String>> {
        match window {
            HistoryWindow::Days(n) => {
                let mut out = Vec::new();
                for d in 0..u64::from(n) {
                    let date = self.day_key(now.saturating_sub(d * 86_400));
                    if let Some(batch) = self.load_daily(&date)? {
                        out.extend(batch.tweets.into_iter().map(|p| p.text));
                    }
                }
                Ok(out)
            }
            HistoryWindow::Hours(h) => {
                let since = now.saturating_sub(u64::from(h) * 3_600);
                let mut runs: Vec<RunSnapshot> = self
                    .read_runs()?
                    .into_iter()
                    .filter(|r| r.saved_at >= since)
                    .collect();
                runs.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
                Ok(runs
                    .into_iter()
                    .flat_map(|r| r.posts.into_iter().map(|p| p.text))
                    .collect())
            }
        }
    }
}

#[async_trait]
impl HistorySource for BatchStore {
    async fn fetch_history(&self, window: HistoryWindow, now: u64) -> anyhow::Result<Vec<String>> {
        let store = self.clone();
        let texts = tokio::task::spawn_blocking(move || store.history_texts(window, now)).await??;
        Ok(texts)
    }

    fn name(&self) -> &'static str {
        "batch_store"
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let tmp = path.with_extension(format!("json.tmp-{}-{nanos}", std::process::id()));
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

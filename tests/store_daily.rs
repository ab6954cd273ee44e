// tests/store_daily.rs
//
// BatchStore on a temp directory: daily files, run snapshots, retention and
// the history view the generator reads back.

mod common;

use std::sync::Arc;

use toolpulse::config::HistoryConfig;
use toolpulse::history::{HistoryTracker, HistoryWindow};
use toolpulse::{BatchStore, GeneratedPost};

use common::NOW;

const DAY: u64 = 86_400;

fn posts(prefix: &str, n: usize) -> Vec<GeneratedPost> {
    (0..n)
        .map(|i| GeneratedPost {
            text: format!("{prefix} post {i}"),
            source_age: "2h ago".to_string(),
        })
        .collect()
}

fn store() -> (tempfile::TempDir, BatchStore) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = BatchStore::new(tmp.path(), 0);
    (tmp, store)
}

#[test]
fn saved_day_reloads_unposted_and_is_listed_newest_first() {
    let (_tmp, store) = store();
    assert!(store.available_dates().expect("list").is_empty());
    assert!(store.load_daily("2025-10-09").expect("load").is_none());

    store.save_daily("2025-10-07", &posts("old", 2)).expect("save");
    let saved = store.save_daily("2025-10-09", &posts("new", 3)).expect("save");
    assert!(saved.tweets.iter().all(|p| !p.posted));

    let loaded = store.load_daily("2025-10-09").expect("load").expect("present");
    assert_eq!(loaded, saved);
    assert_eq!(loaded.tweets[2].text, "new post 2");
    assert_eq!(loaded.tweets[2].source_age, "2h ago");

    assert_eq!(
        store.available_dates().expect("list"),
        vec!["2025-10-09", "2025-10-07"]
    );
}

#[test]
fn regenerating_a_day_resets_posted_flags() {
    let (_tmp, store) = store();
    store.save_daily("2025-10-09", &posts("a", 2)).expect("save");
    assert!(store.toggle_posted("2025-10-09", 0).expect("toggle").posted);

    store.save_daily("2025-10-09", &posts("b", 2)).expect("save");
    let day = store.load_daily("2025-10-09").expect("load").expect("present");
    assert_eq!(day.tweets[0].text, "b post 0");
    assert!(!day.tweets[0].posted);
}

#[test]
fn invalid_keys_are_rejected() {
    let (_tmp, store) = store();
    for bad in ["", "2025-10", "20251009", "2025-10-09/../x", "../../etc"] {
        let err = store.load_daily(bad).expect_err(bad);
        assert!(err.is_invalid_input(), "{bad}: {err}");
    }
    let err = store.load_run("has space").expect_err("run id");
    assert!(err.is_invalid_input());
}

#[test]
fn runs_are_listed_inside_the_window() {
    let (_tmp, store) = store();
    let old = store.save_run(NOW - 4 * DAY, &posts("old", 1)).expect("run");
    let mid = store.save_run(NOW - 3_600, &posts("mid", 2)).expect("run");
    let new = store.save_run(NOW - 60, &posts("new", 3)).expect("run");
    assert_ne!(mid.id, new.id);
    assert_eq!(new.date, "2025-10-09");

    let listed = store.list_runs(NOW, 72).expect("list");
    let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![new.id.as_str(), mid.id.as_str()]);
    assert_eq!(listed[0].count, 3);

    let back = store.load_run(&old.id).expect("load").expect("present");
    assert_eq!(back, old);
    assert!(store.load_run("1-deadbeef").expect("load").is_none());
}

#[test]
fn cleanup_drops_only_expired_days_and_runs() {
    let (tmp, store) = store();
    for date in ["2025-09-30", "2025-10-01", "2025-10-02", "2025-10-09"] {
        store.save_daily(date, &posts(date, 1)).expect("save");
    }
    store.save_run(NOW - 8 * DAY, &posts("stale", 1)).expect("run");
    let fresh = store.save_run(NOW - 3_600, &posts("fresh", 1)).expect("run");
    std::fs::write(tmp.path().join("notes.txt"), "keep me").expect("write");

    let removed = store.cleanup(7, NOW).expect("cleanup");
    assert_eq!(removed, 3);
    assert_eq!(
        store.available_dates().expect("list"),
        vec!["2025-10-09", "2025-10-02"]
    );
    let runs = store.list_runs(NOW, 24 * 30).expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, fresh.id);
    assert!(tmp.path().join("notes.txt").exists());

    assert_eq!(store.cleanup(7, NOW).expect("cleanup"), 0);
}

#[test]
fn history_windows_read_days_and_runs() {
    let (_tmp, store) = store();
    store.save_daily("2025-10-09", &posts("today", 1)).expect("save");
    store.save_daily("2025-10-08", &posts("yesterday", 1)).expect("save");
    store.save_daily("2025-10-05", &posts("last week", 1)).expect("save");
    store.save_run(NOW - 2 * 3_600, &posts("recent run", 1)).expect("run");
    store.save_run(NOW - 10 * 3_600, &posts("older run", 1)).expect("run");

    let days = store.history_texts(HistoryWindow::Days(2), NOW).expect("days");
    assert_eq!(days, vec!["today post 0", "yesterday post 0"]);

    let hours = store.history_texts(HistoryWindow::Hours(3), NOW).expect("hours");
    assert_eq!(hours, vec!["recent run post 0"]);
}

#[tokio::test]
async fn tracker_reads_the_store_and_merges_repeats() {
    let (_tmp, store) = store();
    let batch = posts("shared", 2);
    store.save_daily("2025-10-09", &batch).expect("save");
    store.save_run(NOW - 60, &batch).expect("run");

    let tracker = HistoryTracker::new(HistoryConfig::default()).with_store(Arc::new(store));
    let snap = tracker
        .collect_history(NOW, &["caller post".to_string()])
        .await;
    assert_eq!(
        snap.all,
        vec!["caller post", "shared post 0", "shared post 1"]
    );
}

// src/ingest/providers/mod.rs
pub mod fallback;
pub mod google_news;
pub mod hacker_news;

pub use fallback::fallback_signals;
pub use google_news::GoogleNewsRss;
pub use hacker_news::{HackerNewsSearch, HackerNewsShow};

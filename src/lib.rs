//! Drafts batches of short social posts about AI tools from live launch
//! signals, checks them against a structural contract and keeps a daily
//! archive.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod generate;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod source_weights;
pub mod store;

pub use crate::api::{router, AppState};
pub use crate::error::{GenerateError, Result};
pub use crate::generate::{GenerateOptions, GeneratedPost, Generator};
pub use crate::store::BatchStore;

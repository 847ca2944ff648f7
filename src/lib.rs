//! Proxy Harvest - incremental proxy config harvester
//!
//! Pulls unseen messages from a channel, extracts proxy config links,
//! drops the ones whose endpoints are provably dead, and keeps a
//! deduplicated, freshness-ordered list on disk between runs.

pub mod proxy;
pub mod source;
pub mod store;
pub mod sync;

pub use proxy::*;
pub use source::{JsonlSource, Message, MessageSource, TelegramWebSource};
pub use store::{merge_fresh_first, CursorStore, ListStore};
pub use sync::{SyncConfig, SyncOutcome, SyncReport, Syncer};

/// Application result type
pub type Result<T> = anyhow::Result<T>;

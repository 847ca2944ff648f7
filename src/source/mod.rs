//! Message sources feeding the ingestion run
//!
//! A source yields a channel's messages lazily, newest first. Two sources
//! are provided:
//! - `JsonlSource` reads a JSON-lines export from disk
//! - `TelegramWebSource` pages through a public channel's web preview

pub mod jsonl;
pub mod telegram;

pub use jsonl::JsonlSource;
pub use telegram::TelegramWebSource;

use crate::Result;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A single channel message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "date")]
    pub posted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            posted_at: None,
        }
    }
}

/// Producer of channel messages.
///
/// The stream is finite, newest first, and cannot be restarted. `min_id` lets
/// a source stop paging early; callers still check ids themselves. An `Err`
/// item ends the run.
pub trait MessageSource {
    fn messages<'a>(&'a self, channel: &'a str, min_id: u64) -> BoxStream<'a, Result<Message>>;
}

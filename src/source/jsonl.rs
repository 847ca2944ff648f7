//! Message source backed by a JSON-lines channel export

use crate::source::{Message, MessageSource};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Export line; service messages may lack an id
#[derive(Debug, Deserialize)]
struct ExportLine {
    id: Option<u64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

/// Serves messages from memory, newest first
#[derive(Debug, Clone, Default)]
pub struct JsonlSource {
    messages: Vec<Message>,
}

impl JsonlSource {
    /// Build a source from messages in any order
    pub fn from_messages(mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        Self { messages }
    }

    /// Parse a JSON-lines export, one message object per line
    pub fn parse_str(content: &str) -> Result<Self> {
        let mut messages = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parsed: ExportLine = serde_json::from_str(line)
                .with_context(|| format!("Invalid export line {}", index + 1))?;
            let Some(id) = parsed.id else {
                debug!(line = index + 1, "skipping export line without id");
                continue;
            };

            messages.push(Message {
                id,
                text: parsed.text.unwrap_or_default(),
                posted_at: parsed.date,
            });
        }

        Ok(Self::from_messages(messages))
    }

    /// Read a JSON-lines export file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read export {}", path.display()))?;
        Self::parse_str(&content)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageSource for JsonlSource {
    fn messages<'a>(&'a self, _channel: &'a str, _min_id: u64) -> BoxStream<'a, Result<Message>> {
        stream::iter(self.messages.iter().cloned().map(Ok)).boxed()
    }
}

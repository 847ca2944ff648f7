//! Ingestion run: fetch unseen messages, extract configs, probe, merge, persist

use crate::proxy::extractor::RecordExtractor;
use crate::proxy::models::{ConnectionRecord, LivenessStatus};
use crate::proxy::prober::{LivenessProber, ProberConfig};
use crate::source::MessageSource;
use crate::store::{merge_fresh_first, CursorStore, ListStore};
use crate::Result;
use anyhow::Context;
use futures::StreamExt;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Default channel to harvest
pub const DEFAULT_CHANNEL: &str = "@Spotify_Porteghali";

/// Default display label stamped on every config
pub const DEFAULT_DISPLAY_NAME: &str = "یاسین";

/// Default cap on messages pulled per run
pub const DEFAULT_SCAN_LIMIT: usize = 500;

/// Default path of the persisted config list
pub const DEFAULT_LIST_PATH: &str = "config.txt";

/// Default path of the cursor file
pub const DEFAULT_CURSOR_PATH: &str = "state/last_id.txt";

/// Configuration for an ingestion run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Channel identifier handed to the message source
    pub channel: String,
    /// Label written after `#` on every config
    pub display_name: String,
    /// Maximum number of messages pulled from the source
    pub scan_limit: usize,
    /// Persisted config list
    pub list_path: PathBuf,
    /// Highest processed message id
    pub cursor_path: PathBuf,
    /// Liveness probe settings
    pub prober: ProberConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            scan_limit: DEFAULT_SCAN_LIMIT,
            list_path: PathBuf::from(DEFAULT_LIST_PATH),
            cursor_path: PathBuf::from(DEFAULT_CURSOR_PATH),
            prober: ProberConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: String) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_display_name(mut self, display_name: String) -> Self {
        self.display_name = display_name;
        self
    }

    pub fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit;
        self
    }

    pub fn with_list_path(mut self, path: PathBuf) -> Self {
        self.list_path = path;
        self
    }

    pub fn with_cursor_path(mut self, path: PathBuf) -> Self {
        self.cursor_path = path;
        self
    }

    pub fn with_prober(mut self, prober: ProberConfig) -> Self {
        self.prober = prober;
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No unseen config links in the scanned messages
    NoNewRecords,
    /// New links were found but every one of them is dead
    NoneAlive,
    /// At least one new link was merged into the list
    Added,
}

/// Summary of an ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Messages newer than the cursor that were scanned
    pub scanned: usize,
    pub cursor_before: u64,
    pub cursor_after: u64,
    /// New candidates after dedup
    pub found: usize,
    pub alive: usize,
    pub untested: usize,
    pub dead: usize,
    /// Size of the persisted list after the run
    pub total: usize,
}

impl SyncReport {
    /// Candidates that made it into the list
    pub fn passed(&self) -> usize {
        self.alive + self.untested
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            SyncOutcome::NoNewRecords => write!(f, "No new configs found."),
            SyncOutcome::NoneAlive => {
                write!(f, "Found {} new configs but none are alive.", self.found)
            }
            SyncOutcome::Added => write!(
                f,
                "Added {} new configs ({} alive, {} untested, {} dead of {} found). Total: {}",
                self.passed(),
                self.alive,
                self.untested,
                self.dead,
                self.found,
                self.total
            ),
        }
    }
}

/// Drives one incremental ingestion over a message source
pub struct Syncer<S> {
    source: S,
    config: SyncConfig,
    extractor: RecordExtractor,
    prober: LivenessProber,
    cursor: CursorStore,
    list: ListStore,
}

impl<S: MessageSource> Syncer<S> {
    pub fn new(source: S, config: SyncConfig) -> Self {
        Self {
            extractor: RecordExtractor::new(&config.display_name),
            prober: LivenessProber::with_config(config.prober.clone()),
            cursor: CursorStore::new(&config.cursor_path),
            list: ListStore::new(&config.list_path),
            source,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run a single ingestion pass.
    ///
    /// A source error aborts the run before anything is written. Otherwise the
    /// cursor is saved as soon as fetching completes, and the list file is
    /// rewritten only when new configs pass the liveness probe.
    pub async fn run(&self) -> Result<SyncReport> {
        let span = info_span!("sync", run_id = %Uuid::new_v4(), channel = %self.config.channel);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<SyncReport> {
        let cursor_before = self.cursor.load();
        let prior = self.list.load()?;
        info!(cursor = cursor_before, existing = prior.len(), "loaded state");

        let prior_set: HashSet<&str> = prior.iter().map(String::as_str).collect();
        let mut collected: HashSet<ConnectionRecord> = HashSet::new();
        let mut candidates: Vec<ConnectionRecord> = Vec::new();
        let mut max_seen = cursor_before;
        let mut scanned = 0;

        let mut messages = self
            .source
            .messages(&self.config.channel, cursor_before)
            .take(self.config.scan_limit);

        while let Some(message) = messages.next().await {
            let message = message.context("Failed to fetch channel messages")?;
            if message.id <= cursor_before {
                break;
            }

            scanned += 1;
            max_seen = max_seen.max(message.id);

            let records = self.extractor.extract(&message.text);
            debug!(id = message.id, posted_at = ?message.posted_at, links = records.len(), "scanned message");

            for record in records {
                if prior_set.contains(record.as_str()) || !collected.insert(record.clone()) {
                    continue;
                }
                candidates.push(record);
            }
        }
        drop(messages);

        if max_seen > cursor_before {
            self.cursor.save(max_seen)?;
            info!(cursor = max_seen, "cursor advanced");
        }

        let mut report = SyncReport {
            outcome: SyncOutcome::NoNewRecords,
            scanned,
            cursor_before,
            cursor_after: max_seen,
            found: candidates.len(),
            alive: 0,
            untested: 0,
            dead: 0,
            total: prior.len(),
        };

        if candidates.is_empty() {
            info!(scanned, "no new configs");
            return Ok(report);
        }

        info!(candidates = candidates.len(), "probing new configs");
        let results = self.prober.probe_records(candidates).await;

        let mut passed = Vec::new();
        for result in results {
            match result.status {
                LivenessStatus::Alive => report.alive += 1,
                LivenessStatus::Untested => report.untested += 1,
                LivenessStatus::Dead => {
                    report.dead += 1;
                    continue;
                }
            }
            passed.push(result.record.into_string());
        }

        if passed.is_empty() {
            report.outcome = SyncOutcome::NoneAlive;
            info!(dead = report.dead, "all new configs are dead");
            return Ok(report);
        }

        let merged = merge_fresh_first(&passed, &prior);
        self.list.save(&merged)?;

        report.outcome = SyncOutcome::Added;
        report.total = merged.len();
        info!(added = passed.len(), total = report.total, "config list updated");
        Ok(report)
    }
}

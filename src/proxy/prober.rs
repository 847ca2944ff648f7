//! Liveness prober checking config endpoints with bounded-concurrency TCP connects

use crate::proxy::models::{ConnectionRecord, ProbeResult, ProbeTarget};
use crate::proxy::resolver::EndpointResolver;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tracing::debug;

/// Default timeout for a single connect attempt in seconds
pub const DEFAULT_TIMEOUT_SECS: f64 = 3.0;

/// Default number of connect attempts in flight
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Configuration for the liveness prober
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Timeout for each connect attempt
    pub timeout: Duration,
    /// Maximum number of concurrent connect attempts
    pub concurrency: usize,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ProberConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the concurrency bound, clamped to at least one slot
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Prober for filtering out unreachable config endpoints
#[derive(Debug, Clone, Default)]
pub struct LivenessProber {
    config: ProberConfig,
}

impl LivenessProber {
    /// Create a prober with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a prober with custom configuration
    pub fn with_config(mut config: ProberConfig) -> Self {
        config.concurrency = config.concurrency.max(1);
        Self { config }
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    /// Try a TCP connect to `target`, returning the connect latency when it succeeds
    pub async fn probe_target(&self, target: &ProbeTarget) -> Option<u64> {
        let start = Instant::now();
        let connect = TcpStream::connect((target.host.as_str(), target.port));

        match tokio::time::timeout(self.config.timeout, connect).await {
            Ok(Ok(mut stream)) => {
                let elapsed = start.elapsed().as_millis() as u64;
                // Closing is best-effort; the connect already proved liveness.
                let _ = stream.shutdown().await;
                debug!(%target, elapsed_ms = elapsed, "endpoint alive");
                Some(elapsed)
            }
            Ok(Err(e)) => {
                debug!(%target, error = %e, "endpoint dead");
                None
            }
            Err(_) => {
                debug!(%target, "endpoint timed out");
                None
            }
        }
    }

    /// Probe every record, returning one result per record in input order.
    ///
    /// Records without a probe target pass as untested. Records sharing a
    /// target share a single connect attempt.
    pub async fn probe_records(&self, records: Vec<ConnectionRecord>) -> Vec<ProbeResult> {
        let targets: Vec<Option<ProbeTarget>> =
            records.iter().map(EndpointResolver::resolve).collect();

        let mut unique: Vec<ProbeTarget> = Vec::new();
        let mut seen: HashMap<ProbeTarget, usize> = HashMap::new();
        for target in targets.iter().flatten() {
            if !seen.contains_key(target) {
                seen.insert(target.clone(), unique.len());
                unique.push(target.clone());
            }
        }

        let latencies = self.probe_targets(unique).await;

        records
            .into_iter()
            .zip(targets)
            .map(|(record, target)| match target {
                None => ProbeResult::untested(record),
                Some(target) => match seen.get(&target).and_then(|&i| latencies[i]) {
                    Some(elapsed) => ProbeResult::alive(record, elapsed),
                    None => ProbeResult::dead(record),
                },
            })
            .collect()
    }

    /// Probe targets concurrently; the result at index `i` belongs to `targets[i]`
    pub async fn probe_targets(&self, targets: Vec<ProbeTarget>) -> Vec<Option<u64>> {
        self.run_bounded(targets, |target| async move { self.probe_target(&target).await })
            .await
    }

    /// Run `attempt` over `items` with at most `concurrency` attempts in flight.
    ///
    /// Outputs are placed by input index, not by completion order.
    async fn run_bounded<T, F, Fut>(&self, items: Vec<T>, attempt: F) -> Vec<Option<u64>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Option<u64>>,
    {
        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut outputs = vec![None; items.len()];

        let completed = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| {
                let sem = Arc::clone(&semaphore);
                let pending = attempt(item);
                async move {
                    // The semaphore is never closed while this stream is alive.
                    let Ok(_permit) = sem.acquire().await else {
                        return (index, None);
                    };
                    (index, pending.await)
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await;

        for (index, output) in completed {
            outputs[index] = output;
        }

        outputs
    }

    /// Probe records and split them into passing and failing results
    pub async fn probe_and_separate(
        &self,
        records: Vec<ConnectionRecord>,
    ) -> (Vec<ProbeResult>, Vec<ProbeResult>) {
        self.probe_records(records)
            .await
            .into_iter()
            .partition(|r| r.passes())
    }
}

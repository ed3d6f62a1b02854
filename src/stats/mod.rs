mod latency;

use latency::{longest, mean, median, percentile, shortest, sort_latencies};

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::request::{RequestOutcome, StatusClass};

const BATCH_SIZE: usize = 256;

/// Latency samples in completion order. `raw` holds every outcome, `timed`
/// only the requests that passed.
#[derive(Debug, Default)]
struct LatencyLog {
    raw: Vec<u64>,
    timed: Vec<u64>,
}

/// Counters shared by every worker for the lifetime of a run.
///
/// Scalars are atomics. Each composite field has its own lock: the per-url
/// map is a `DashMap`, the server name and latency log sit behind mutexes.
#[derive(Debug, Default)]
pub struct AggregateStats {
    issued: AtomicU64,
    completed: AtomicU64,
    passed: AtomicU64,
    failed: AtomicU64,
    connection_failures: AtomicU64,
    other_responses: AtomicU64,
    resp_2xx: AtomicU64,
    resp_3xx: AtomicU64,
    resp_4xx: AtomicU64,
    resp_5xx: AtomicU64,
    bytes_downloaded: AtomicU64,
    url_hits: DashMap<String, u64>,
    server: Mutex<Option<String>>,
    latencies: Mutex<LatencyLog>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim one request from the budget. Check and increment happen in a
    /// single atomic step, so no more than `budget` requests are ever issued.
    pub fn reserve(&self, budget: u64) -> bool {
        self.issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |issued| {
                (issued < budget).then_some(issued + 1)
            })
            .is_ok()
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Fold one outcome into the counters. Safe to call from any number of
    /// tasks at once.
    pub fn record(&self, outcome: RequestOutcome) {
        let passed = outcome.passed();

        let class_counter = match outcome.class() {
            StatusClass::ConnectionFailed => &self.connection_failures,
            StatusClass::Other => &self.other_responses,
            StatusClass::Success => &self.resp_2xx,
            StatusClass::Redirection => &self.resp_3xx,
            StatusClass::ClientError => &self.resp_4xx,
            StatusClass::ServerError => &self.resp_5xx,
        };
        class_counter.fetch_add(1, Ordering::Relaxed);

        if passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_downloaded.fetch_add(outcome.bytes, Ordering::Relaxed);

        if let Some(server) = &outcome.server {
            let mut current = lock(&self.server);
            if current.is_none() {
                debug!("Server type is {}", server);
                *current = Some(server.clone());
            }
        }

        {
            let mut log = lock(&self.latencies);
            log.raw.push(outcome.elapsed_ms);
            if passed {
                log.timed.push(outcome.elapsed_ms);
            }
        }

        *self.url_hits.entry(outcome.url).or_insert(0) += 1;

        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    /// First non-empty `Server` header seen during the run.
    pub fn server(&self) -> Option<String> {
        lock(&self.server).clone()
    }

    /// Derive the summary. Call once every worker has been joined; `elapsed`
    /// is the wall-clock duration of the run.
    pub fn finalize(&self, elapsed: Duration) -> Summary {
        let (raw, timed) = {
            let log = lock(&self.latencies);
            (log.raw.clone(), log.timed.clone())
        };
        let sorted = sort_latencies(timed);
        let completed = self.completed();

        let url_hits = self
            .url_hits
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let throughput = if elapsed.is_zero() {
            0.0
        } else {
            completed as f64 / elapsed.as_secs_f64()
        };

        Summary {
            issued: self.issued(),
            completed,
            passed: self.passed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            connection_failures: self.connection_failures.load(Ordering::Acquire),
            other_responses: self.other_responses.load(Ordering::Acquire),
            resp_2xx: self.resp_2xx.load(Ordering::Acquire),
            resp_3xx: self.resp_3xx.load(Ordering::Acquire),
            resp_4xx: self.resp_4xx.load(Ordering::Acquire),
            resp_5xx: self.resp_5xx.load(Ordering::Acquire),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Acquire),
            server: self.server(),
            url_hits,
            shortest_ms: shortest(&sorted),
            longest_ms: longest(&sorted),
            median_ms: median(&sorted),
            average_ms: mean(&sorted),
            p90_ms: percentile(&sorted, 90.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
            elapsed_ms: elapsed.as_millis() as u64,
            throughput,
            sorted_latencies: sorted,
            raw_latencies: raw,
        }
    }
}

/// Read-only view of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub issued: u64,
    pub completed: u64,
    pub passed: u64,
    pub failed: u64,
    pub connection_failures: u64,
    pub other_responses: u64,
    pub resp_2xx: u64,
    pub resp_3xx: u64,
    pub resp_4xx: u64,
    pub resp_5xx: u64,
    pub bytes_downloaded: u64,
    pub server: Option<String>,
    pub url_hits: BTreeMap<String, u64>,
    pub shortest_ms: u64,
    pub longest_ms: u64,
    pub median_ms: f64,
    pub average_ms: f64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub elapsed_ms: u64,
    pub throughput: f64,
    /// Latencies of passing requests, ascending.
    #[serde(skip)]
    pub sorted_latencies: Vec<u64>,
    /// Latency of every request in completion order, failures included.
    #[serde(skip)]
    pub raw_latencies: Vec<u64>,
}

impl Summary {
    /// Sum over every status class, connection failures included.
    pub fn class_total(&self) -> u64 {
        self.connection_failures
            + self.other_responses
            + self.resp_2xx
            + self.resp_3xx
            + self.resp_4xx
            + self.resp_5xx
    }
}

/// Drain the result channel into `stats` until every sender is gone.
/// Returns the number of outcomes recorded.
pub async fn aggregator_task(
    mut rx: mpsc::UnboundedReceiver<RequestOutcome>,
    stats: Arc<AggregateStats>,
) -> u64 {
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    let mut recorded = 0;

    // recv_many only yields 0 once the channel is closed and empty
    while rx.recv_many(&mut batch, BATCH_SIZE).await > 0 {
        for outcome in batch.drain(..) {
            stats.record(outcome);
            recorded += 1;
        }
    }
    recorded
}

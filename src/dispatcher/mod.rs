//! Fan-out of requests over a fixed pool of worker tasks, fan-in of their
//! outcomes through a channel into the shared [`AggregateStats`].
//!
//! Each worker loops: claim one request from the budget, pick a target, run
//! the request, send the outcome. The budget claim is a single atomic
//! check-and-increment, so the run issues exactly `total` requests no matter
//! how many workers race for the last slot. Requests already in flight when
//! the budget runs out (or the run is cancelled) always finish.
//!
//! The result channel closes once every worker has dropped its sender, which
//! lets the aggregator drain the remaining outcomes and exit. The run only
//! finalizes after all workers and the aggregator have been joined.

use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::RunConfiguration;
use crate::request::{RequestOutcome, RequestTask};
use crate::stats::{AggregateStats, Summary, aggregator_task};

/// Stops workers from claiming further requests.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct Dispatcher {
    config: Arc<RunConfiguration>,
    stats: Arc<AggregateStats>,
    cancel: CancelHandle,
}

#[derive(Clone)]
struct WorkerContext {
    config: Arc<RunConfiguration>,
    stats: Arc<AggregateStats>,
    cancel: CancelHandle,
    task: RequestTask,
}

impl Dispatcher {
    pub fn new(config: Arc<RunConfiguration>) -> Self {
        Self {
            config,
            stats: Arc::new(AggregateStats::new()),
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn run(self) -> Result<Summary> {
        let workers = self.config.worker_count();
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = tokio::spawn(aggregator_task(rx, self.stats.clone()));

        let ctx = WorkerContext {
            config: self.config.clone(),
            stats: self.stats.clone(),
            cancel: self.cancel.clone(),
            task: RequestTask::new(self.config.clone()),
        };

        info!(
            "Spawning {} workers for {} requests",
            workers, self.config.total
        );
        let started = Instant::now();
        let handles = spawn_workers(ctx, workers, tx);

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }
        let elapsed = started.elapsed();
        info!("All workers done in {:.2}s", elapsed.as_secs_f64());

        let recorded = aggregator.await?;
        debug!("Aggregator recorded {} outcomes", recorded);

        Ok(self.stats.finalize(elapsed))
    }
}

/// Spawn `workers` tasks, each holding its own sender. The sender passed in is
/// dropped here so the channel closes with the last worker.
fn spawn_workers(
    ctx: WorkerContext,
    workers: usize,
    tx: UnboundedSender<RequestOutcome>,
) -> Vec<JoinHandle<u64>> {
    (0..workers)
        .map(|id| tokio::spawn(worker(id, ctx.clone(), tx.clone())))
        .collect()
}

async fn worker(id: usize, ctx: WorkerContext, tx: UnboundedSender<RequestOutcome>) -> u64 {
    let mut done = 0u64;

    while !ctx.cancel.is_cancelled() && ctx.stats.reserve(ctx.config.total) {
        if done > 0 && !ctx.config.delay.is_zero() {
            time::sleep(ctx.config.delay).await;
        }

        let url = ctx.config.target.pick();
        let outcome = ctx.task.execute(url).await;
        if tx.send(outcome).is_err() {
            warn!("Result channel closed, worker {} stopping", id);
            break;
        }
        done += 1;
    }

    debug!("Worker {} finished after {} requests", id, done);
    done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use crate::testing::{StubResponse, spawn_stub};
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn config(target: Target, total: u64, concurrency: usize) -> Arc<RunConfiguration> {
        let mut config = RunConfiguration::new(target);
        config.total = total;
        config.concurrency = concurrency;
        Arc::new(config)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_url_all_pass() {
        let addr = spawn_stub(StubResponse::ok("ok").delay(Duration::from_millis(5))).await;
        let target = Target::Single(format!("http://{}/", addr));

        let summary = assert_ok!(Dispatcher::new(config(target, 10, 4)).run().await);

        assert_eq!(summary.issued, 10);
        assert_eq!(summary.completed, 10);
        assert_eq!(summary.passed, 10);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.resp_2xx, 10);
        assert_eq!(summary.bytes_downloaded, 20);
        assert_eq!(summary.sorted_latencies.len(), 10);
        assert!(summary.shortest_ms >= 5);
        assert!(summary.longest_ms < 1000);
        assert!(summary.median_ms >= summary.shortest_ms as f64);
        assert!(summary.median_ms <= summary.longest_ms as f64);
    }

    #[tokio::test]
    async fn url_list_spreads_hits() {
        let addr = spawn_stub(StubResponse::ok("ok")).await;
        let urls: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|path| format!("http://{}/{}", addr, path))
            .collect();

        let dispatcher = Dispatcher::new(config(Target::List(urls.clone()), 30, 1));
        let summary = assert_ok!(dispatcher.run().await);

        assert_eq!(summary.url_hits.values().sum::<u64>(), 30);
        for url in &urls {
            assert!(summary.url_hits.get(url).copied().unwrap_or(0) > 0, "{url} never hit");
        }
    }

    #[tokio::test]
    async fn not_found_everywhere() {
        let addr = spawn_stub(StubResponse::status(404, "nope")).await;
        let target = Target::Single(format!("http://{}/", addr));

        let summary = assert_ok!(Dispatcher::new(config(target, 5, 2)).run().await);

        assert_eq!(summary.passed, 0);
        assert_eq!(summary.failed, 5);
        assert_eq!(summary.resp_4xx, 5);
        assert_eq!(summary.class_total(), 5);
        assert_eq!(summary.median_ms, 0.0);
        assert_eq!(summary.average_ms, 0.0);
        assert!(summary.sorted_latencies.is_empty());
        assert_eq!(summary.raw_latencies.len(), 5);
    }

    #[tokio::test]
    async fn first_server_header_is_kept() {
        let addr = spawn_stub(
            StubResponse::ok("ok").servers(vec!["TestServer/1.0", "Other/2.0"]),
        )
        .await;
        let target = Target::Single(format!("http://{}/", addr));

        let summary = assert_ok!(Dispatcher::new(config(target, 4, 1)).run().await);

        assert_eq!(summary.server.as_deref(), Some("TestServer/1.0"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_above_budget_issues_only_budget() {
        let addr = spawn_stub(StubResponse::ok("ok")).await;
        let target = Target::Single(format!("http://{}/", addr));

        let summary = assert_ok!(Dispatcher::new(config(target, 3, 50)).run().await);

        assert_eq!(summary.issued, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.passed, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn refused_connections_still_complete_the_run() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let target = Target::Single(format!("http://{}/", addr));

        let summary = assert_ok!(Dispatcher::new(config(target, 6, 3)).run().await);

        assert_eq!(summary.issued, 6);
        assert_eq!(summary.failed, 6);
        assert_eq!(summary.connection_failures, 6);
        assert_eq!(summary.class_total(), 6);
        assert_eq!(summary.shortest_ms, 0);
    }

    #[tokio::test]
    async fn cancelled_run_issues_nothing_and_still_summarizes() {
        let addr = spawn_stub(StubResponse::ok("ok")).await;
        let target = Target::Single(format!("http://{}/", addr));
        let dispatcher = Dispatcher::new(config(target, 100, 4));
        dispatcher.cancel_handle().cancel();

        let summary = assert_ok!(dispatcher.run().await);

        assert_eq!(summary.issued, 0);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.median_ms, 0.0);
    }

    #[tokio::test]
    async fn cancelling_mid_run_lets_in_flight_requests_finish() {
        let addr = spawn_stub(StubResponse::ok("ok").delay(Duration::from_millis(20))).await;
        let target = Target::Single(format!("http://{}/", addr));
        let dispatcher = Dispatcher::new(config(target, 10_000, 2));
        let cancel = dispatcher.cancel_handle();

        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let summary = assert_ok!(dispatcher.run().await);

        assert!(summary.issued < 10_000);
        assert_eq!(summary.issued, summary.completed);
        assert_eq!(summary.passed, summary.completed);
    }

    #[tokio::test]
    async fn zero_budget_runs_nothing() {
        let target = Target::Single("http://127.0.0.1:9/".to_string());
        let summary = assert_ok!(Dispatcher::new(config(target, 0, 4)).run().await);

        assert_eq!(summary.issued, 0);
        assert_eq!(summary.class_total(), 0);
    }

    #[tokio::test]
    async fn delay_spaces_out_requests() {
        let addr = spawn_stub(StubResponse::ok("ok")).await;
        let mut config = RunConfiguration::new(Target::Single(format!("http://{}/", addr)));
        config.total = 3;
        config.concurrency = 1;
        config.delay = Duration::from_millis(30);

        let summary = assert_ok!(Dispatcher::new(Arc::new(config)).run().await);

        assert_eq!(summary.completed, 3);
        assert!(summary.elapsed_ms >= 60);
    }
}

//! Concurrent batch install/remove over a bounded worker pool

pub mod progress;
pub mod requirements;

pub use progress::{CountingProgress, IndicatifProgress, NoopProgress, ProgressSink};
pub use requirements::{install_from_requirements, parse_requirements};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::managers::{ManagerKind, OperationExecutor, OperationKind, PackageResult};
use crate::utils::serialize_secs;

/// One package-level unit of work
#[async_trait]
pub trait PackageOperation: Send + Sync {
    fn kind(&self) -> OperationKind;

    async fn run(&self, package: &str, preferred: Option<ManagerKind>) -> PackageResult;
}

/// Installs through an [`OperationExecutor`]
pub struct InstallOperation {
    executor: Arc<OperationExecutor>,
}

impl InstallOperation {
    pub fn new(executor: Arc<OperationExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl PackageOperation for InstallOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Install
    }

    async fn run(&self, package: &str, preferred: Option<ManagerKind>) -> PackageResult {
        self.executor.install(package, preferred).await
    }
}

/// Removes through an [`OperationExecutor`]
pub struct RemoveOperation {
    executor: Arc<OperationExecutor>,
}

impl RemoveOperation {
    pub fn new(executor: Arc<OperationExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl PackageOperation for RemoveOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Remove
    }

    async fn run(&self, package: &str, preferred: Option<ManagerKind>) -> PackageResult {
        self.executor.remove(package, preferred).await
    }
}

/// Options for one batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_workers: usize,
    pub fail_fast: bool,
    /// Deadline for the whole batch
    pub timeout: Duration,
    pub preferred: Option<ManagerKind>,
}

impl BatchOptions {
    /// Built-in defaults: 4 workers and one hour for installs, 3 workers and
    /// half an hour for removals
    pub fn for_operation(operation: OperationKind) -> Self {
        Self::from_config(&BatchConfig::default(), operation)
    }

    pub fn from_config(config: &BatchConfig, operation: OperationKind) -> Self {
        Self {
            max_workers: config.workers_for(operation),
            fail_fast: config.fail_fast,
            timeout: config.timeout_for(operation),
            preferred: None,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_preferred(mut self, preferred: Option<ManagerKind>) -> Self {
        self.preferred = preferred;
        self
    }
}

/// Aggregate outcome of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub operation: OperationKind,
    /// Successful results, in completion order
    pub success: Vec<PackageResult>,
    /// Failed results, in completion order
    pub failed: Vec<PackageResult>,
    /// Packages never started because of fail-fast
    pub cancelled: Vec<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub total_time: Duration,
    pub packages_processed: usize,
    pub success_rate: f64,
}

impl BatchReport {
    fn new(operation: OperationKind, packages_processed: usize) -> Self {
        Self {
            operation,
            success: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
            total_time: Duration::ZERO,
            packages_processed,
            success_rate: 0.0,
        }
    }

    fn record(&mut self, result: PackageResult) {
        if result.success {
            self.success.push(result);
        } else {
            self.failed.push(result);
        }
    }

    fn finalize(&mut self, total_time: Duration) {
        self.total_time = total_time;
        self.success_rate = if self.packages_processed == 0 {
            0.0
        } else {
            self.success.len() as f64 / self.packages_processed as f64 * 100.0
        };
    }

    pub fn all_succeeded(&self) -> bool {
        self.packages_processed > 0 && self.success.len() == self.packages_processed
    }
}

/// Trim, drop empty names and drop repeats, keeping first occurrences.
///
/// Dropping repeats goes beyond plain trimming: a name listed twice runs once
/// and counts once in `packages_processed` and the success rate.
pub fn clean_package_list<S: AsRef<str>>(packages: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    packages
        .iter()
        .map(|pkg| pkg.as_ref().trim())
        .filter(|pkg| !pkg.is_empty())
        .filter(|pkg| seen.insert(pkg.to_string()))
        .map(str::to_string)
        .collect()
}

enum WorkerEvent {
    Finished(PackageResult),
    Cancelled(String),
}

/// Shared state visible to every worker of one batch
struct PoolState {
    queue: Mutex<mpsc::Receiver<String>>,
    cancel: AtomicBool,
    in_flight: std::sync::Mutex<HashSet<String>>,
}

/// Runs package operations across a bounded pool of workers
pub struct BatchOrchestrator {
    progress: Arc<dyn ProgressSink>,
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(NoopProgress))
    }
}

impl BatchOrchestrator {
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        Self { progress }
    }

    /// Run `operation` for every package and collect the report.
    ///
    /// Never fails: every package ends up in exactly one of `success`,
    /// `failed` or `cancelled`.
    pub async fn run_batch<S: AsRef<str>>(
        &self,
        packages: &[S],
        operation: Arc<dyn PackageOperation>,
        options: &BatchOptions,
    ) -> BatchReport {
        let started = Instant::now();
        let kind = operation.kind();
        let packages = clean_package_list(packages);
        let mut report = BatchReport::new(kind, packages.len());

        if packages.is_empty() {
            report.finalize(started.elapsed());
            return report;
        }

        let workers = options.max_workers.clamp(1, packages.len());
        info!(
            "Starting batch {} of {} packages ({} workers)",
            kind.verb(),
            packages.len(),
            workers
        );

        let (job_tx, job_rx) = mpsc::channel(packages.len());
        for package in &packages {
            // Capacity equals the package count, so this never waits
            if job_tx.send(package.clone()).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let state = Arc::new(PoolState {
            queue: Mutex::new(job_rx),
            cancel: AtomicBool::new(false),
            in_flight: std::sync::Mutex::new(HashSet::new()),
        });
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        // Workers live for this batch only; the runtime itself is the long-lived pool
        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(worker_loop(
                worker_id,
                state.clone(),
                operation.clone(),
                options.preferred,
                options.fail_fast,
                event_tx.clone(),
            ));
        }
        drop(event_tx);

        self.progress
            .start(packages.len() as u64, &format!("{} packages", capitalize(kind.verb())));

        let mut pending: HashSet<String> = packages.iter().cloned().collect();
        let deadline = tokio::time::Instant::now() + options.timeout;
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, event_rx.recv()).await {
                Ok(Some(WorkerEvent::Finished(result))) => {
                    pending.remove(&result.package);
                    let message = if result.success {
                        format!("✓ {}", result.package)
                    } else {
                        format!("✗ {}", result.package)
                    };
                    self.progress.update(1, &message);
                    report.record(result);
                }
                Ok(Some(WorkerEvent::Cancelled(package))) => {
                    pending.remove(&package);
                    report.cancelled.push(package);
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            warn!(
                "Batch {} hit its {}s deadline with {} packages unfinished",
                kind.verb(),
                options.timeout.as_secs(),
                pending.len()
            );
            pool.abort_all();
        }
        while pool.join_next().await.is_some() {}

        // Whatever is still pending never reported back: either it was left
        // in the queue by fail-fast or it was cut off by the deadline
        let in_flight = state
            .in_flight
            .lock()
            .map(|set| set.clone())
            .unwrap_or_default();
        let cancelled_by_fail_fast = state.cancel.load(Ordering::SeqCst);
        for package in packages.iter().filter(|pkg| pending.contains(*pkg)) {
            if timed_out && (in_flight.contains(package) || !cancelled_by_fail_fast) {
                let result =
                    PackageResult::timeout(package, kind, options.timeout, started.elapsed());
                self.progress.update(1, &format!("✗ {package}"));
                report.record(result);
            } else {
                report.cancelled.push(package.clone());
            }
        }

        if !report.cancelled.is_empty() {
            warn!(
                "Fail-fast stopped {} pending packages: {}",
                report.cancelled.len(),
                report.cancelled.join(", ")
            );
        }

        self.progress.finish();
        report.finalize(started.elapsed());

        info!(
            "Batch {} complete: {}/{} succeeded in {:.1}s",
            kind.verb(),
            report.success.len(),
            report.packages_processed,
            report.total_time.as_secs_f64()
        );

        report
    }
}

async fn worker_loop(
    worker_id: usize,
    state: Arc<PoolState>,
    operation: Arc<dyn PackageOperation>,
    preferred: Option<ManagerKind>,
    fail_fast: bool,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let kind = operation.kind();

    loop {
        let next = state.queue.lock().await.recv().await;
        let Some(package) = next else {
            break;
        };

        if state.cancel.load(Ordering::SeqCst) {
            let _ = events.send(WorkerEvent::Cancelled(package));
            continue;
        }

        if let Ok(mut in_flight) = state.in_flight.lock() {
            in_flight.insert(package.clone());
        }
        debug!("Worker {} picked up {}", worker_id, package);

        let unit_started = Instant::now();
        let result = match AssertUnwindSafe(operation.run(&package, preferred))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("{} of {} panicked: {}", kind.verb(), package, reason);
                PackageResult::failure(
                    &package,
                    kind,
                    format!("Unexpected error: {reason}"),
                    unit_started.elapsed(),
                )
            }
        };

        if !result.success && fail_fast {
            // Set before pulling the next package so nothing queued starts
            state.cancel.store(true, Ordering::SeqCst);
        }

        if let Ok(mut in_flight) = state.in_flight.lock() {
            in_flight.remove(&package);
        }

        if events.send(WorkerEvent::Finished(result)).is_err() {
            break;
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

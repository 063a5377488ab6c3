//! Concurrent scan pipeline.
//!
//! ```text
//! source ──▶ work queue ──▶ workers (N) ──▶ results queue ──▶ collector ──▶ store
//!                                 │                 ▲
//!                                 └─▶ barrier ──▶ closer
//! ```
//!
//! Both queues are bounded tokio channels. Each worker holds a clone of the
//! results sender and drops it before arriving at the [`CompletionBarrier`].
//! The closer task owns the last sender and drops it once the barrier reaches
//! zero, so the collector sees the results queue close only after the final
//! enqueue of the final worker.

use crate::checker::RecordChecker;
use crate::error::ScanError;
use crate::protocols::TxtResolver;
use crate::store::RecordStore;
use crate::types::{InputSource, ScanConfig, ScanRecord, ScanSummary};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};

struct BarrierState {
    remaining: AtomicUsize,
    notify: Notify,
}

/// Countdown from the worker count to zero.
///
/// Created together with exactly one [`Arrival`] per worker, so the count is
/// fixed before any worker starts and each worker can decrement it only once.
pub struct CompletionBarrier {
    state: Arc<BarrierState>,
}

/// One worker's share of a [`CompletionBarrier`].
///
/// Arrives when dropped, including when the owning task panics.
pub struct Arrival {
    state: Arc<BarrierState>,
}

impl CompletionBarrier {
    /// Create a barrier expecting `count` arrivals, and the arrivals.
    pub fn with_arrivals(count: usize) -> (Self, Vec<Arrival>) {
        let state = Arc::new(BarrierState {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        });
        let arrivals = (0..count)
            .map(|_| Arrival {
                state: state.clone(),
            })
            .collect();
        (Self { state }, arrivals)
    }

    /// Number of arrivals still outstanding.
    pub fn remaining(&self) -> usize {
        self.state.remaining.load(Ordering::Acquire)
    }

    /// Wait until every arrival has been made.
    pub async fn wait(&self) {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        loop {
            // Register before checking so a concurrent final arrival is not missed
            notified.as_mut().enable();
            if self.remaining() == 0 {
                return;
            }
            notified.as_mut().await;
            notified.set(self.state.notify.notified());
        }
    }
}

impl Arrival {
    /// Signal that the owning worker has stopped for good.
    pub fn arrive(self) {}
}

impl Drop for Arrival {
    fn drop(&mut self) {
        if self.state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.notify.notify_waiters();
        }
    }
}

/// Parse one line of a domain list.
///
/// Blank lines and `#` comments yield `None`; inline comments are stripped.
pub fn parse_domain_line(line: &str) -> Option<String> {
    let domain = line.split('#').next().unwrap_or("").trim();
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}

/// Scan pipeline over a resolver and a configuration.
///
/// # Example
///
/// ```rust,no_run
/// use spfmap_lib::{HickoryResolver, InputSource, ScanConfig, ScanPipeline, SqliteStore};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let resolver = Arc::new(HickoryResolver::from_system_conf()?);
///     let pipeline = ScanPipeline::new(resolver, ScanConfig::default())?;
///
///     let mut store = SqliteStore::open("spfmap.db").await?;
///     store.ensure_schema().await?;
///
///     let summary = pipeline
///         .run(InputSource::Target("example.com".to_string()), &mut store)
///         .await?;
///     println!("{} domains scanned", summary.domains_scanned);
///     Ok(())
/// }
/// ```
pub struct ScanPipeline {
    checker: RecordChecker,
    config: ScanConfig,
    span: Span,
}

impl ScanPipeline {
    /// Create a pipeline, rejecting invalid configuration up front.
    pub fn new(resolver: Arc<dyn TxtResolver>, config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            checker: RecordChecker::with_config(resolver, &config),
            config,
            span: info_span!("scan"),
        })
    }

    /// Emit all pipeline diagnostics under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan every domain from `input` and write the results to `store`.
    ///
    /// Returns once every domain has been looked up and every write has been
    /// attempted. Only input errors (unreadable file, empty target) are
    /// returned; lookup and write failures are logged and counted.
    pub async fn run<S>(&self, input: InputSource, store: &mut S) -> Result<ScanSummary, ScanError>
    where
        S: RecordStore + ?Sized,
    {
        let start = Instant::now();
        let capacity = self.config.queue_capacity;
        let (work_tx, work_rx) = mpsc::channel::<String>(capacity);
        let (results_tx, results_rx) = mpsc::channel::<ScanRecord>(capacity);

        // Input errors must surface before any worker exists
        let source = match input {
            InputSource::Target(domain) => {
                self.enqueue_target(domain, work_tx)?;
                None
            }
            InputSource::File(path) => {
                let file = open_domain_file(&path).await?;
                Some((file, work_tx))
            }
        };

        let workers = self.spawn_workers(work_rx, &results_tx);
        let closer = self.spawn_closer(workers.barrier, results_tx);

        let reader = source.map(|(file, work_tx)| {
            tokio::spawn(
                feed_domains(BufReader::new(file), work_tx)
                    .instrument(info_span!(parent: &self.span, "source")),
            )
        });

        let mut summary = collect(results_rx, store)
            .instrument(info_span!(parent: &self.span, "collector"))
            .await;

        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                warn!(parent: &self.span, error = %e, "domain reader task failed");
            }
        }
        for handle in workers.handles {
            if let Err(e) = handle.await {
                warn!(parent: &self.span, error = %e, "worker task failed");
            }
        }
        if let Err(e) = closer.await {
            warn!(parent: &self.span, error = %e, "closer task failed");
        }

        summary.duration = start.elapsed();
        info!(
            parent: &self.span,
            scanned = summary.domains_scanned,
            persisted = summary.records_persisted,
            failed = summary.write_failures,
            elapsed_ms = summary.duration.as_millis() as u64,
            "scan complete"
        );
        Ok(summary)
    }

    /// Put the single target on the queue and close it.
    fn enqueue_target(&self, domain: String, tasks: mpsc::Sender<String>) -> Result<(), ScanError> {
        let domain = domain.trim().to_string();
        if domain.is_empty() {
            return Err(ScanError::invalid_domain(domain, "Target domain cannot be empty"));
        }
        tasks
            .try_send(domain)
            .map_err(|e| ScanError::internal(format!("work queue rejected target: {}", e)))?;
        debug!(parent: &self.span, "target enqueued, work queue closed");
        Ok(())
    }

    fn spawn_workers(
        &self,
        work_rx: mpsc::Receiver<String>,
        results_tx: &mpsc::Sender<ScanRecord>,
    ) -> WorkerPool {
        let tasks = Arc::new(Mutex::new(work_rx));
        let (barrier, arrivals) = CompletionBarrier::with_arrivals(self.config.workers);

        info!(
            parent: &self.span,
            workers = self.config.workers,
            selection = %self.config.selection,
            "starting workers"
        );

        let handles = arrivals
            .into_iter()
            .enumerate()
            .map(|(index, arrival)| {
                let id = index + 1;
                tokio::spawn(
                    run_worker(
                        tasks.clone(),
                        results_tx.clone(),
                        self.checker.clone(),
                        arrival,
                    )
                    .instrument(info_span!(parent: &self.span, "worker", id)),
                )
            })
            .collect();

        WorkerPool { barrier, handles }
    }

    fn spawn_closer(
        &self,
        barrier: CompletionBarrier,
        results_tx: mpsc::Sender<ScanRecord>,
    ) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                barrier.wait().await;
                drop(results_tx);
                debug!("all workers finished, results queue closed");
            }
            .instrument(info_span!(parent: &self.span, "closer")),
        )
    }
}

struct WorkerPool {
    barrier: CompletionBarrier,
    handles: Vec<JoinHandle<()>>,
}

async fn open_domain_file(path: &Path) -> Result<tokio::fs::File, ScanError> {
    tokio::fs::File::open(path).await.map_err(|e| {
        ScanError::file_error(
            path.display().to_string(),
            format!("Failed to open input file: {}", e),
        )
    })
}

/// Push every domain from `reader` onto the work queue, then close it.
async fn feed_domains<R>(reader: R, tasks: mpsc::Sender<String>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut enqueued = 0usize;
    let mut line_num = 0usize;

    loop {
        line_num += 1;
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(domain) = parse_domain_line(&line) else {
                    continue;
                };
                debug!(%domain, "enqueued");
                if tasks.send(domain).await.is_err() {
                    warn!("work queue closed before input was exhausted");
                    break;
                }
                enqueued += 1;
            }
            Ok(None) => break,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(line = line_num, error = %e, "skipping undecodable line");
            }
            Err(e) => {
                warn!(line = line_num, error = %e, "stopped reading input file");
                break;
            }
        }
    }

    info!(enqueued, "input exhausted, work queue closed");
    enqueued
}

async fn run_worker(
    tasks: Arc<Mutex<mpsc::Receiver<String>>>,
    results: mpsc::Sender<ScanRecord>,
    checker: RecordChecker,
    arrival: Arrival,
) {
    debug!("worker started");
    let mut processed = 0usize;

    loop {
        let domain = {
            let mut rx = tasks.lock().await;
            rx.recv().await
        };
        let Some(domain) = domain else {
            break;
        };

        debug!(%domain, "scanning");
        let record = checker.check_domain(&domain).await;
        if results.send(record).await.is_err() {
            warn!(%domain, "results queue closed while workers were running");
            break;
        }
        processed += 1;
    }

    drop(results);
    arrival.arrive();
    debug!(processed, "worker finished");
}

async fn collect<S>(mut results: mpsc::Receiver<ScanRecord>, store: &mut S) -> ScanSummary
where
    S: RecordStore + ?Sized,
{
    let mut summary = ScanSummary::default();

    while let Some(record) = results.recv().await {
        summary.observe(&record);
        match store.insert(&record).await {
            Ok(()) => {
                summary.records_persisted += 1;
                debug!(domain = %record.domain, "stored");
            }
            Err(e) => {
                summary.write_failures += 1;
                warn!(domain = %record.domain, error = %e, "failed to store record, skipping");
            }
        }
    }

    summary
}

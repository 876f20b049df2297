//! Single-worker write executor for one index.
//!
//! Every mutation goes through one FIFO queue drained by one tokio task, so
//! jobs run strictly in submission order. The tantivy writer is opened
//! lazily when a job arrives and closed (committed) again after an idle
//! delay, every n-th job, or right away when `close_early` is set.
//!
//! The writer slot sits behind a `tokio::sync::RwLock`, which queues shared
//! and exclusive acquirers first-come-first-served: a stream of jobs taking
//! the shared side can never starve a pending close on the exclusive side,
//! and a close never runs while a job holds the writer.

use crate::config::SearcherConfig;
use crate::error::{Result, SearchError};
use crate::index::action::{WriterAction, WriterJob};
use crate::index::{IndexHandle, ManagedIndexWriter};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::task::JoinHandle;

const SHUTDOWN_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

type WriterSlot = Option<ManagedIndexWriter>;

/// Access to the open writer for the duration of one job.
///
/// Returned by `before_job` and handed back to `after_job`; dropping it
/// releases the lock.
pub enum JobLease {
    Shared(OwnedRwLockReadGuard<WriterSlot>),
    Exclusive(OwnedRwLockWriteGuard<WriterSlot>),
}

impl JobLease {
    pub fn writer(&self) -> Result<&ManagedIndexWriter> {
        let slot = match self {
            JobLease::Shared(guard) => guard.as_ref(),
            JobLease::Exclusive(guard) => guard.as_ref(),
        };
        slot.ok_or_else(|| SearchError::Tantivy("writer is not open".to_string()))
    }

    pub fn writer_mut(&mut self) -> Result<&mut ManagedIndexWriter> {
        match self {
            JobLease::Exclusive(guard) => guard
                .as_mut()
                .ok_or_else(|| SearchError::Tantivy("writer is not open".to_string())),
            JobLease::Shared(_) => Err(SearchError::Tantivy(
                "job needs the exclusive writer lease".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct ExecutorConfig {
    idle_close_delay: Duration,
    close_after_jobs: u64,
    close_early: bool,
    shutdown_timeout: Duration,
}

impl From<&SearcherConfig> for ExecutorConfig {
    fn from(config: &SearcherConfig) -> Self {
        ExecutorConfig {
            idle_close_delay: config.idle_close_delay(),
            close_after_jobs: config.close_after_jobs.max(1),
            close_early: config.close_early,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

struct ExecutorState {
    index: Arc<IndexHandle>,
    config: ExecutorConfig,
    writer: Arc<RwLock<WriterSlot>>,
    closer: Mutex<Option<JoinHandle<()>>>,
    version: Arc<AtomicU64>,
    completed_jobs: AtomicU64,
    close_count: AtomicU64,
    pending: AtomicUsize,
    shutting_down: AtomicBool,
}

impl ExecutorState {
    fn id(&self) -> &str {
        self.index.id()
    }

    fn cancel_closer(&self) {
        if let Ok(mut closer) = self.closer.lock() {
            if let Some(handle) = closer.take() {
                handle.abort();
            }
        }
    }

    /// Cancel a pending close and hand out the writer, opening it if closed.
    async fn before_job(&self, exclusive: bool) -> Result<JobLease> {
        self.cancel_closer();
        let mut guard = Arc::clone(&self.writer).write_owned().await;
        if guard.is_none() {
            *guard = Some(self.index.writer()?);
            tracing::debug!("[WQ {}] writer opened", self.id());
        }
        if exclusive {
            Ok(JobLease::Exclusive(guard))
        } else {
            Ok(JobLease::Shared(guard.downgrade()))
        }
    }

    async fn after_job(self: &Arc<Self>, lease: JobLease) {
        drop(lease);
        let completed = self.completed_jobs.fetch_add(1, Ordering::AcqRel) + 1;
        let by_count = completed % self.config.close_after_jobs == 0;
        // While shutting down, the last drained job closes without a timer.
        let draining = self.shutting_down.load(Ordering::Acquire)
            && self.pending.load(Ordering::Acquire) == 0;
        if by_count || self.config.close_early || draining {
            self.close_writer().await;
        } else {
            self.schedule_close();
        }
    }

    fn schedule_close(self: &Arc<Self>) {
        let state = Arc::clone(self);
        let delay = self.config.idle_close_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::trace!("[WQ {}] idle for {:?}, closing writer", state.id(), delay);
            state.close_writer().await;
        });
        match self.closer.lock() {
            Ok(mut closer) => {
                if let Some(previous) = closer.replace(handle) {
                    previous.abort();
                }
            }
            Err(_) => handle.abort(),
        }
    }

    /// Commit and release the writer. Never fails; errors are logged.
    async fn close_writer(&self) {
        let mut guard = self.writer.write().await;
        let Some(writer) = guard.take() else {
            tracing::trace!("[WQ {}] writer already closed", self.id());
            return;
        };
        let open_for = writer.open_for();
        let mut writer = writer.into_inner();

        match writer.commit() {
            Ok(opstamp) => {
                tracing::debug!("[WQ {}] committed at opstamp {}", self.id(), opstamp);
            }
            Err(e) => {
                tracing::error!("[WQ {}] commit failed on close: {}", self.id(), e);
            }
        }
        if let Err(e) = writer.wait_merging_threads() {
            tracing::warn!("[WQ {}] merge threads ended with error: {}", self.id(), e);
        }

        self.version.fetch_add(1, Ordering::AcqRel);
        self.close_count.fetch_add(1, Ordering::AcqRel);
        tracing::info!(
            "[WQ {}] writer closed after {}ms, {} jobs completed",
            self.id(),
            open_for.as_millis(),
            self.completed_jobs.load(Ordering::Acquire)
        );
    }
}

async fn process_jobs(state: Arc<ExecutorState>, mut rx: mpsc::UnboundedReceiver<WriterJob>) {
    tracing::info!("[WQ {}] write executor started", state.id());
    while let Some(job) = rx.recv().await {
        state.pending.fetch_sub(1, Ordering::AcqRel);

        if let WriterJob::Flush(ack) = job {
            state.cancel_closer();
            state.close_writer().await;
            let _ = ack.send(());
            continue;
        }

        tracing::trace!("[WQ {}] running {:?}", state.id(), job);
        let mut lease = match state.before_job(job.needs_exclusive()).await {
            Ok(lease) => lease,
            Err(e) => {
                tracing::error!(
                    "[WQ {}] could not open writer, dropping {} job: {}",
                    state.id(),
                    job.kind(),
                    e
                );
                continue;
            }
        };

        let outcome = WriterAction::new(&state.index).run(job, &mut lease);
        if outcome.committed {
            state.version.fetch_add(1, Ordering::AcqRel);
        }
        state.after_job(lease).await;
    }
    tracing::info!("[WQ {}] queue closed, worker exiting", state.id());
}

/// Serializes all mutations of one index through a single worker task.
///
/// Must be created inside a tokio runtime.
pub struct WriteExecutor {
    state: Arc<ExecutorState>,
    sender: Mutex<Option<mpsc::UnboundedSender<WriterJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteExecutor {
    /// `version` is bumped on every commit so readers know to refresh.
    pub fn new(index: Arc<IndexHandle>, config: &SearcherConfig, version: Arc<AtomicU64>) -> Self {
        let state = Arc::new(ExecutorState {
            index,
            config: ExecutorConfig::from(config),
            writer: Arc::new(RwLock::new(None)),
            closer: Mutex::new(None),
            version,
            completed_jobs: AtomicU64::new(0),
            close_count: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(process_jobs(Arc::clone(&state), rx));
        WriteExecutor {
            state,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue `job`. Fire-and-forget: failures while running it are logged.
    pub fn submit(&self, job: WriterJob) -> Result<()> {
        let closed = || SearchError::ExecutorClosed(self.state.id().to_string());
        let sender = self.sender.lock().map_err(|_| closed())?;
        let sender = sender.as_ref().ok_or_else(closed)?;
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        sender.send(job).map_err(|_| {
            self.state.pending.fetch_sub(1, Ordering::AcqRel);
            closed()
        })
    }

    /// Wait until every job queued so far ran and its changes are committed.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.submit(WriterJob::Flush(tx))?;
        rx.await
            .map_err(|_| SearchError::ExecutorClosed(self.state.id().to_string()))
    }

    /// Stop accepting jobs, drain the queue with a bounded wait and close
    /// the writer. Safe to call more than once.
    pub async fn shutdown(&self) {
        let state = &self.state;
        state.shutting_down.store(true, Ordering::Release);
        state.cancel_closer();

        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());

        if let Some(mut worker) = worker {
            let deadline = Instant::now() + state.config.shutdown_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let wait = remaining.min(SHUTDOWN_PROGRESS_INTERVAL);
                match tokio::time::timeout(wait, &mut worker).await {
                    Ok(Ok(())) => break,
                    Ok(Err(e)) => {
                        tracing::warn!("[WQ {}] worker ended abnormally: {}", state.id(), e);
                        break;
                    }
                    Err(_) if Instant::now() >= deadline => {
                        tracing::warn!(
                            "[WQ {}] shutdown timed out with {} jobs pending, aborting worker",
                            state.id(),
                            state.pending.load(Ordering::Acquire)
                        );
                        worker.abort();
                        break;
                    }
                    Err(_) => {
                        tracing::info!(
                            "[WQ {}] waiting for {} queued jobs",
                            state.id(),
                            state.pending.load(Ordering::Acquire)
                        );
                    }
                }
            }
        }

        state.cancel_closer();
        state.close_writer().await;
        tracing::info!("[WQ {}] shut down", state.id());
    }

    pub fn is_writer_open(&self) -> bool {
        match self.state.writer.try_read() {
            Ok(slot) => slot.is_some(),
            // Someone holds the exclusive side, which only happens while
            // the writer is open (job, open or close in progress).
            Err(_) => true,
        }
    }

    /// Number of times the writer was closed (committed) so far.
    pub fn close_count(&self) -> u64 {
        self.state.close_count.load(Ordering::Acquire)
    }

    pub fn completed_jobs(&self) -> u64 {
        self.state.completed_jobs.load(Ordering::Acquire)
    }

    pub fn pending_jobs(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }
}

impl Drop for WriteExecutor {
    fn drop(&mut self) {
        // Without an explicit shutdown the worker drains what is queued and
        // exits once the channel closes; the idle closer commits the rest.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::document::build_document;
    use crate::index::fields::{DataType, FieldDefinition};
    use crate::tokenizer::Analyzer;
    use crate::types::FieldData;
    use tantivy::Term;

    fn index() -> Arc<IndexHandle> {
        Arc::new(
            IndexHandle::in_memory(
                "wq",
                &[FieldDefinition::new("title", DataType::Text)],
                Analyzer::default(),
            )
            .unwrap(),
        )
    }

    fn add_job(index: &IndexHandle, id: &str) -> WriterJob {
        let doc = build_document(index, id, id, &[FieldData::new("title", "hello")]).unwrap();
        WriterJob::Add(doc)
    }

    fn num_docs(index: &IndexHandle) -> u64 {
        let reader = index.reader().unwrap();
        reader.searcher().num_docs()
    }

    fn config(idle_ms: u64) -> SearcherConfig {
        SearcherConfig {
            idle_close_delay_ms: idle_ms,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_flush_commits_and_closes() {
        let index = index();
        let version = Arc::new(AtomicU64::new(0));
        let executor = WriteExecutor::new(Arc::clone(&index), &config(60_000), Arc::clone(&version));

        executor.submit(add_job(&index, "obj_1")).unwrap();
        executor.submit(add_job(&index, "obj_2")).unwrap();
        executor.flush().await.unwrap();

        assert_eq!(num_docs(&index), 2);
        assert_eq!(executor.completed_jobs(), 2);
        assert_eq!(executor.close_count(), 1);
        assert_eq!(version.load(Ordering::Acquire), 1);
        assert!(!executor.is_writer_open());
    }

    #[tokio::test]
    async fn test_idle_close_happens_once() {
        let index = index();
        let executor =
            WriteExecutor::new(Arc::clone(&index), &config(50), Arc::new(AtomicU64::new(0)));

        executor.submit(add_job(&index, "obj_1")).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(executor.close_count(), 1);
        assert_eq!(num_docs(&index), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(executor.close_count(), 1);
        assert!(!executor.is_writer_open());
    }

    #[tokio::test]
    async fn test_jobs_within_delay_share_one_writer_session() {
        let index = index();
        let executor =
            WriteExecutor::new(Arc::clone(&index), &config(60_000), Arc::new(AtomicU64::new(0)));

        for i in 0..10 {
            executor.submit(add_job(&index, &format!("obj_{}", i))).unwrap();
        }
        executor.flush().await.unwrap();
        assert_eq!(executor.completed_jobs(), 10);
        assert_eq!(executor.close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_after_jobs_threshold() {
        let index = index();
        let config = SearcherConfig {
            idle_close_delay_ms: 60_000,
            close_after_jobs: 2,
            ..Default::default()
        };
        let executor = WriteExecutor::new(Arc::clone(&index), &config, Arc::new(AtomicU64::new(0)));

        for i in 0..4 {
            executor.submit(add_job(&index, &format!("obj_{}", i))).unwrap();
        }
        executor.flush().await.unwrap();
        assert_eq!(executor.close_count(), 2);
        assert_eq!(num_docs(&index), 4);
    }

    #[tokio::test]
    async fn test_delete_after_add_preserves_order() {
        let index = index();
        let executor =
            WriteExecutor::new(Arc::clone(&index), &config(60_000), Arc::new(AtomicU64::new(0)));

        for i in 0..20 {
            executor.submit(add_job(&index, &format!("obj_{}", i))).unwrap();
        }
        for i in 0..20 {
            let term = Term::from_field_text(index.entry_id_field(), &format!("obj_{}", i));
            executor.submit(WriterJob::Delete(term)).unwrap();
        }
        executor.flush().await.unwrap();
        assert_eq!(num_docs(&index), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects() {
        let index = index();
        let executor =
            WriteExecutor::new(Arc::clone(&index), &config(60_000), Arc::new(AtomicU64::new(0)));

        for i in 0..5 {
            executor.submit(add_job(&index, &format!("obj_{}", i))).unwrap();
        }
        executor.shutdown().await;
        assert_eq!(num_docs(&index), 5);
        assert_eq!(executor.pending_jobs(), 0);
        assert!(matches!(
            executor.submit(WriterJob::Optimize),
            Err(SearchError::ExecutorClosed(_))
        ));

        executor.shutdown().await;
        assert_eq!(executor.close_count(), 1);
    }

    #[tokio::test]
    async fn test_optimize_merges_segments() {
        let index = index();
        let config = SearcherConfig {
            close_early: true,
            ..Default::default()
        };
        let executor = WriteExecutor::new(Arc::clone(&index), &config, Arc::new(AtomicU64::new(0)));

        for i in 0..3 {
            executor.submit(add_job(&index, &format!("obj_{}", i))).unwrap();
        }
        executor.submit(WriterJob::Optimize).unwrap();
        executor.flush().await.unwrap();

        assert_eq!(num_docs(&index), 3);
        assert_eq!(index.inner().searchable_segment_ids().unwrap().len(), 1);
    }
}

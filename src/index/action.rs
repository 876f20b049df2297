use crate::error::{Result, SearchError};
use crate::index::write_queue::JobLease;
use crate::index::IndexHandle;
use tantivy::{TantivyDocument, Term};
use tokio::sync::oneshot;

/// Documents buffered in memory during bulk ingestion, applied to the
/// writer as one unit.
#[derive(Default)]
pub struct StagedSegment {
    docs: Vec<TantivyDocument>,
}

impl StagedSegment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, doc: TantivyDocument) {
        self.docs.push(doc);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl std::fmt::Debug for StagedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedSegment")
            .field("docs", &self.docs.len())
            .finish()
    }
}

/// One queued mutation. Consumed exactly once by the executor's worker.
pub enum WriterJob {
    Add(TantivyDocument),
    Delete(Term),
    Optimize,
    Merge(StagedSegment),
    /// Barrier: commit everything queued before it, then acknowledge.
    Flush(oneshot::Sender<()>),
}

impl WriterJob {
    pub fn kind(&self) -> &'static str {
        match self {
            WriterJob::Add(_) => "add",
            WriterJob::Delete(_) => "delete",
            WriterJob::Optimize => "optimize",
            WriterJob::Merge(_) => "merge",
            WriterJob::Flush(_) => "flush",
        }
    }

    /// Jobs that need `&mut` access to the writer run under the exclusive lease.
    pub fn needs_exclusive(&self) -> bool {
        matches!(self, WriterJob::Optimize)
    }
}

impl std::fmt::Debug for WriterJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterJob::Merge(stage) => write!(f, "Merge({} docs)", stage.len()),
            WriterJob::Delete(term) => write!(f, "Delete({:?})", term),
            other => f.write_str(other.kind()),
        }
    }
}

/// What running a job did to the on-disk index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionOutcome {
    /// The job committed, so readers may see new segments.
    pub committed: bool,
}

/// Applies one [`WriterJob`] to the open writer.
pub struct WriterAction<'a> {
    index_id: &'a str,
    index: &'a IndexHandle,
}

impl<'a> WriterAction<'a> {
    pub fn new(index: &'a IndexHandle) -> Self {
        WriterAction {
            index_id: index.id(),
            index,
        }
    }

    /// Run `job`, logging and swallowing any failure.
    pub fn run(&self, job: WriterJob, lease: &mut JobLease) -> ActionOutcome {
        let kind = job.kind();
        match self.execute(job, lease) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[WQ {}] {} job failed, dropped: {}", self.index_id, kind, e);
                ActionOutcome::default()
            }
        }
    }

    pub fn execute(&self, job: WriterJob, lease: &mut JobLease) -> Result<ActionOutcome> {
        match job {
            WriterJob::Add(doc) => {
                lease.writer()?.add_document(doc)?;
                Ok(ActionOutcome::default())
            }
            WriterJob::Delete(term) => {
                lease.writer()?.delete_term(term);
                Ok(ActionOutcome::default())
            }
            WriterJob::Merge(stage) => {
                let writer = lease.writer()?;
                let count = stage.len();
                for doc in stage.docs {
                    writer.add_document(doc)?;
                }
                tracing::info!("[WQ {}] merged staged segment of {} docs", self.index_id, count);
                Ok(ActionOutcome::default())
            }
            WriterJob::Optimize => self.optimize(lease),
            // The executor commits and acknowledges barriers itself.
            WriterJob::Flush(_) => Ok(ActionOutcome::default()),
        }
    }

    /// Commit, force-merge all segments into one and garbage-collect stale files.
    fn optimize(&self, lease: &mut JobLease) -> Result<ActionOutcome> {
        let writer = lease.writer_mut()?;
        writer.commit()?;

        let segment_ids = self.index.inner().searchable_segment_ids()?;
        tracing::info!(
            "[WQ {}] optimizing {} segments",
            self.index_id,
            segment_ids.len()
        );
        if segment_ids.len() > 1 {
            // Blocks until tantivy's merge thread pool finishes.
            writer
                .merge(&segment_ids)
                .wait()
                .map_err(|e| SearchError::Tantivy(e.to_string()))?;
        }

        let gc_result = writer
            .garbage_collect_files()
            .wait()
            .map_err(|e| SearchError::Tantivy(e.to_string()))?;
        tracing::info!(
            "[WQ {}] optimize done, gc removed {} files",
            self.index_id,
            gc_result.deleted_files.len()
        );
        Ok(ActionOutcome { committed: true })
    }
}

/// Buffers ADDs while a bulk mode (`rebuild`, `insert`) is active.
#[derive(Debug)]
pub struct BulkBuffer {
    threshold: usize,
    active: bool,
    stage: StagedSegment,
}

impl BulkBuffer {
    pub fn new(threshold: usize) -> Self {
        BulkBuffer {
            threshold: threshold.max(1),
            active: false,
            stage: StagedSegment::new(),
        }
    }

    pub fn begin(&mut self) {
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn staged(&self) -> usize {
        self.stage.len()
    }

    /// Stage `doc`; returns the sealed segment once the threshold is reached.
    pub fn stage(&mut self, doc: TantivyDocument) -> Option<StagedSegment> {
        self.stage.push(doc);
        if self.stage.len() >= self.threshold {
            self.seal()
        } else {
            None
        }
    }

    /// Seal whatever is staged, if anything.
    pub fn seal(&mut self) -> Option<StagedSegment> {
        if self.stage.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.stage))
        }
    }

    /// Leave bulk mode, sealing the remainder.
    pub fn end(&mut self) -> Option<StagedSegment> {
        self.active = false;
        self.seal()
    }
}

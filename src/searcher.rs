use crate::config::SearcherConfig;
use crate::error::{Result, SearchError};
use crate::index::action::{BulkBuffer, StagedSegment, WriterJob};
use crate::index::context::SharedIndexContext;
use crate::index::document::build_document;
use crate::index::fields::FieldRegistry;
use crate::index::usage::FieldUsageTracker;
use crate::index::write_queue::WriteExecutor;
use crate::index::IndexHandle;
use crate::query::QueryCompiler;
use crate::results::{MaterializedResults, ResultCursor, Results};
use crate::tokenizer::Analyzer;
use crate::types::{Condition, FieldData, IndexMode, SortBy};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tantivy::query::{EmptyQuery, Query};
use tantivy::Term;

/// The operations the rest of the repository uses to talk to one index.
pub trait Searcher: Send + Sync {
    fn id(&self) -> &str;

    /// Compile `condition`, run it and return the ranked hits. A
    /// `max_results` of zero returns every match.
    fn search(
        &self,
        condition: &Condition,
        max_results: usize,
        sort: &[SortBy],
        add_sort_data: bool,
    ) -> Result<Box<dyn Results>>;

    /// Queue an ADD. Runs asynchronously; failures are only logged.
    fn add_to_index(&self, entry_id: &str, return_id: &str, fields: &[FieldData]) -> Result<()>;

    /// Queue a DELETE of every document stored under `entry_id`.
    fn remove_from_index(&self, entry_id: &str) -> Result<()>;

    fn notify_searcher(&self, mode: IndexMode) -> Result<()>;
}

/// Tantivy-backed [`Searcher`] for one index directory.
///
/// Owns the write executor, the shared reader context and the field usage
/// statistics of its index. Must be opened inside a tokio runtime; call
/// [`close`](IndexSearcher::close) before dropping it so the last changes
/// and the usage statistics reach disk.
pub struct IndexSearcher {
    index: Arc<IndexHandle>,
    registry: Arc<dyn FieldRegistry>,
    config: SearcherConfig,
    executor: WriteExecutor,
    context: Arc<SharedIndexContext>,
    usage: FieldUsageTracker,
    usage_path: PathBuf,
    bulk: Mutex<BulkBuffer>,
}

impl IndexSearcher {
    /// Open (or create) the index `id` under `data_dir/<id>`.
    pub fn open(
        id: &str,
        data_dir: &Path,
        registry: Arc<dyn FieldRegistry>,
        config: SearcherConfig,
    ) -> Result<Self> {
        config.validate()?;
        let defs = registry.get_field_defs(id);
        if defs.is_empty() {
            tracing::warn!("[SEARCH {}] no field definitions registered", id);
        }

        let analyzer = Analyzer::new(config.stop_words.iter().cloned());
        let index = Arc::new(IndexHandle::open_or_create(
            id,
            data_dir.join(id),
            &defs,
            analyzer,
            config.writer_buffer_bytes,
        )?);

        let usage_path = config
            .usage_stats_file
            .clone()
            .unwrap_or_else(|| data_dir.join(format!("{}.fieldusage.properties", id)));
        let usage = FieldUsageTracker::load(&usage_path)?;

        let version = Arc::new(AtomicU64::new(0));
        let executor = WriteExecutor::new(Arc::clone(&index), &config, Arc::clone(&version));
        let context = Arc::new(SharedIndexContext::new(Arc::clone(&index), version));
        let bulk = Mutex::new(BulkBuffer::new(config.bulk_merge_threshold));

        tracing::info!(
            "[SEARCH {}] searcher ready ({} fields, usage stats at {})",
            id,
            defs.len(),
            usage_path.display()
        );
        Ok(IndexSearcher {
            index,
            registry,
            config,
            executor,
            context,
            usage,
            usage_path,
            bulk,
        })
    }

    pub fn num_docs(&self) -> Result<u64> {
        Ok(self.context.snapshot()?.num_docs())
    }

    pub fn usage(&self) -> &FieldUsageTracker {
        &self.usage
    }

    pub fn executor(&self) -> &WriteExecutor {
        &self.executor
    }

    pub fn context(&self) -> &Arc<SharedIndexContext> {
        &self.context
    }

    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    /// Submit anything staged for bulk ingestion and wait until every queued
    /// change is committed.
    pub async fn flush(&self) -> Result<()> {
        let staged = self.lock_bulk()?.seal();
        self.submit_staged(staged)?;
        self.executor.flush().await
    }

    /// Orderly shutdown: submit the staged segment, drain the queue, close
    /// the writer and persist the field usage statistics.
    pub async fn close(&self) -> Result<()> {
        let staged = self.lock_bulk()?.end();
        if let Err(e) = self.submit_staged(staged) {
            tracing::warn!("[SEARCH {}] staged documents lost on close: {}", self.id(), e);
        }
        self.executor.shutdown().await;
        self.context.close();
        self.usage.persist(&self.usage_path)?;
        tracing::info!("[SEARCH {}] closed", self.id());
        Ok(())
    }

    fn lock_bulk(&self) -> Result<std::sync::MutexGuard<'_, BulkBuffer>> {
        self.bulk
            .lock()
            .map_err(|_| SearchError::Config("bulk buffer lock poisoned".to_string()))
    }

    fn submit_staged(&self, staged: Option<StagedSegment>) -> Result<()> {
        match staged {
            Some(segment) => {
                tracing::debug!(
                    "[SEARCH {}] submitting staged segment of {} documents",
                    self.id(),
                    segment.len()
                );
                self.executor.submit(WriterJob::Merge(segment))
            }
            None => Ok(()),
        }
    }

    fn compile(&self, condition: &Condition) -> Result<Box<dyn Query>> {
        let compiler =
            QueryCompiler::new(&self.index, self.registry.as_ref()).with_usage(&self.usage);
        match compiler.compile(condition, true)? {
            Some(compiled) => {
                tracing::debug!("[SEARCH {}] compiled {:?}", self.id(), compiled);
                compiled.to_tantivy(&self.index)
            }
            None => {
                tracing::debug!("[SEARCH {}] condition compiled to nothing", self.id());
                Ok(Box::new(EmptyQuery))
            }
        }
    }
}

impl Searcher for IndexSearcher {
    fn id(&self) -> &str {
        self.index.id()
    }

    fn search(
        &self,
        condition: &Condition,
        max_results: usize,
        sort: &[SortBy],
        add_sort_data: bool,
    ) -> Result<Box<dyn Results>> {
        let query = self.compile(condition)?;
        let mut cursor = ResultCursor::execute(
            Arc::clone(&self.context),
            Arc::clone(&self.index),
            query,
            sort,
            add_sort_data,
            max_results,
        )?;
        if self.config.materialize_results {
            return Ok(Box::new(MaterializedResults::from_results(&mut cursor)?));
        }
        Ok(Box::new(cursor))
    }

    fn add_to_index(&self, entry_id: &str, return_id: &str, fields: &[FieldData]) -> Result<()> {
        let doc = build_document(&self.index, entry_id, return_id, fields)?;
        let mut bulk = self.lock_bulk()?;
        if bulk.is_active() {
            let sealed = bulk.stage(doc);
            return self.submit_staged(sealed);
        }
        drop(bulk);
        self.executor.submit(WriterJob::Add(doc))
    }

    fn remove_from_index(&self, entry_id: &str) -> Result<()> {
        // Staged ADDs go first so the DELETE sees them.
        let staged = self.lock_bulk()?.seal();
        self.submit_staged(staged)?;
        let term = Term::from_field_text(self.index.entry_id_field(), entry_id);
        self.executor.submit(WriterJob::Delete(term))
    }

    fn notify_searcher(&self, mode: IndexMode) -> Result<()> {
        tracing::info!("[SEARCH {}] notified: {:?}", self.id(), mode);
        let mut bulk = self.lock_bulk()?;
        match mode {
            IndexMode::Rebuild | IndexMode::Insert => {
                bulk.begin();
                Ok(())
            }
            IndexMode::Finish => {
                let staged = bulk.end();
                drop(bulk);
                self.submit_staged(staged)
            }
            IndexMode::Optimize => {
                let staged = bulk.seal();
                drop(bulk);
                self.submit_staged(staged)?;
                self.executor.submit(WriterJob::Optimize)
            }
        }
    }
}

impl std::fmt::Debug for IndexSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSearcher")
            .field("index", &self.index)
            .field("usage_path", &self.usage_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fields::{DataType, FieldDefinition, StaticFieldRegistry};
    use tempfile::TempDir;

    fn registry() -> Arc<dyn FieldRegistry> {
        Arc::new(
            StaticFieldRegistry::new()
                .with_field("metadata", FieldDefinition::new("title", DataType::Text))
                .with_field("metadata", FieldDefinition::new("state", DataType::Identifier)),
        )
    }

    #[tokio::test]
    async fn test_bulk_mode_stages_until_finish() {
        let dir = TempDir::new().unwrap();
        let searcher =
            IndexSearcher::open("metadata", dir.path(), registry(), SearcherConfig::default())
                .unwrap();

        searcher.notify_searcher(IndexMode::Rebuild).unwrap();
        for i in 0..3 {
            let id = format!("obj_{}", i);
            searcher
                .add_to_index(&id, &id, &[FieldData::new("title", "bulk")])
                .unwrap();
        }
        assert_eq!(searcher.lock_bulk().unwrap().staged(), 3);
        assert_eq!(searcher.executor().pending_jobs(), 0);

        searcher.notify_searcher(IndexMode::Finish).unwrap();
        assert_eq!(searcher.lock_bulk().unwrap().staged(), 0);
        searcher.flush().await.unwrap();
        assert_eq!(searcher.num_docs().unwrap(), 3);
        searcher.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_seals_staged_adds() {
        let dir = TempDir::new().unwrap();
        let searcher =
            IndexSearcher::open("metadata", dir.path(), registry(), SearcherConfig::default())
                .unwrap();

        searcher.notify_searcher(IndexMode::Insert).unwrap();
        searcher
            .add_to_index("obj_1", "obj_1", &[FieldData::new("title", "gone")])
            .unwrap();
        searcher.remove_from_index("obj_1").unwrap();
        searcher.notify_searcher(IndexMode::Finish).unwrap();
        searcher.flush().await.unwrap();
        assert_eq!(searcher.num_docs().unwrap(), 0);
        searcher.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_condition_matches_nothing() {
        let dir = TempDir::new().unwrap();
        let searcher =
            IndexSearcher::open("metadata", dir.path(), registry(), SearcherConfig::default())
                .unwrap();
        searcher
            .add_to_index("obj_1", "obj_1", &[FieldData::new("title", "anything")])
            .unwrap();
        searcher.flush().await.unwrap();

        let results = searcher.search(&Condition::and(vec![]), 10, &[], false).unwrap();
        assert_eq!(results.num_hits(), 0);
        searcher.close().await.unwrap();
    }
}

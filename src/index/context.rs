//! Shared reader/searcher snapshot for all concurrent searches of one index.

use crate::error::{Result, SearchError};
use crate::index::IndexHandle;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tantivy::{DocAddress, IndexReader, Searcher, TantivyDocument};

/// Result of fetching a stored document from a snapshot.
#[derive(Debug)]
pub enum FetchOutcome {
    Ok(TantivyDocument),
    /// The snapshot was replaced and closed; requery against a fresh one.
    StaleSnapshot,
    Fatal(SearchError),
}

/// One searcher generation handed out to search calls.
///
/// A snapshot stays usable for searches already running against it, but once
/// the context installs a newer generation the old one is closed and
/// [`IndexSnapshot::fetch`] reports [`FetchOutcome::StaleSnapshot`].
pub struct IndexSnapshot {
    searcher: Searcher,
    version: AtomicU64,
    closed: AtomicBool,
}

impl IndexSnapshot {
    fn new(searcher: Searcher, version: u64) -> Self {
        IndexSnapshot {
            searcher,
            version: AtomicU64::new(version),
            closed: AtomicBool::new(false),
        }
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    /// Index version (writer close count) this snapshot is known to reflect.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.searcher.generation().generation_id()
    }

    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn fetch(&self, addr: DocAddress) -> FetchOutcome {
        if self.is_closed() {
            return FetchOutcome::StaleSnapshot;
        }
        match self.searcher.doc::<TantivyDocument>(addr) {
            Ok(doc) => FetchOutcome::Ok(doc),
            Err(e) => FetchOutcome::Fatal(e.into()),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("generation", &self.generation())
            .field("version", &self.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Current {
    reader: IndexReader,
    snapshot: Arc<IndexSnapshot>,
}

/// Owns the single live snapshot of an index.
///
/// The write executor bumps the shared `version` every time it closes its
/// writer. A caller that sees a snapshot older than the current version
/// reloads the reader; if that produces a different segment set, the new
/// snapshot is installed under the exclusive lock and the old one is closed.
/// Callers clone the `Arc` and drop the guard immediately, so nobody waits on
/// the exclusive side while holding the shared side.
pub struct SharedIndexContext {
    index: Arc<IndexHandle>,
    version: Arc<AtomicU64>,
    current: RwLock<Option<Current>>,
}

impl SharedIndexContext {
    pub fn new(index: Arc<IndexHandle>, version: Arc<AtomicU64>) -> Self {
        SharedIndexContext {
            index,
            version,
            current: RwLock::new(None),
        }
    }

    /// Current snapshot, opened or refreshed as needed.
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        let version = self.version.load(Ordering::Acquire);
        {
            let guard = self.current.read().map_err(|_| poisoned())?;
            if let Some(current) = guard.as_ref() {
                if current.snapshot.version() >= version {
                    return Ok(Arc::clone(&current.snapshot));
                }
            }
        }

        let mut guard = self.current.write().map_err(|_| poisoned())?;
        // Re-read: another caller may have refreshed while we waited.
        let version = self.version.load(Ordering::Acquire);
        match guard.as_mut() {
            None => {
                let reader = self.index.reader()?;
                let snapshot = Arc::new(IndexSnapshot::new(reader.searcher(), version));
                tracing::info!(
                    "[CTX {}] opened reader, generation={} docs={}",
                    self.index.id(),
                    snapshot.generation(),
                    snapshot.num_docs()
                );
                *guard = Some(Current {
                    reader,
                    snapshot: Arc::clone(&snapshot),
                });
                Ok(snapshot)
            }
            Some(current) => {
                if current.snapshot.version() >= version {
                    return Ok(Arc::clone(&current.snapshot));
                }
                current.reader.reload()?;
                let searcher = current.reader.searcher();
                let changed = searcher.generation().segments()
                    != current.snapshot.searcher().generation().segments();
                if changed {
                    let fresh = Arc::new(IndexSnapshot::new(searcher, version));
                    let old = std::mem::replace(&mut current.snapshot, Arc::clone(&fresh));
                    old.close();
                    tracing::debug!(
                        "[CTX {}] swapped reader generation {} -> {} (version {})",
                        self.index.id(),
                        old.generation(),
                        fresh.generation(),
                        version
                    );
                    Ok(fresh)
                } else {
                    current.snapshot.version.store(version, Ordering::Release);
                    tracing::trace!(
                        "[CTX {}] reader still current at version {}",
                        self.index.id(),
                        version
                    );
                    Ok(Arc::clone(&current.snapshot))
                }
            }
        }
    }

    /// Whether `snapshot` is still the one being handed out.
    pub fn is_valid(&self, snapshot: &Arc<IndexSnapshot>) -> bool {
        match self.current.read() {
            Ok(guard) => guard
                .as_ref()
                .map(|current| Arc::ptr_eq(&current.snapshot, snapshot))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Drop the live snapshot; the next call to [`snapshot`](Self::snapshot)
    /// opens a new reader.
    pub fn close(&self) {
        if let Ok(mut guard) = self.current.write() {
            if let Some(current) = guard.take() {
                current.snapshot.close();
                tracing::info!("[CTX {}] reader closed", self.index.id());
            }
        }
    }
}

fn poisoned() -> SearchError {
    SearchError::Tantivy("index context lock poisoned".to_string())
}

use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// An open tantivy writer plus the bookkeeping the write executor logs when
/// it closes the writer again.
pub struct ManagedIndexWriter {
    inner: tantivy::IndexWriter,
    opened_at: Instant,
}

impl ManagedIndexWriter {
    pub(crate) fn new(inner: tantivy::IndexWriter) -> Self {
        // Segments with more than 30% deleted docs become merge candidates.
        let mut merge_policy = tantivy::merge_policy::LogMergePolicy::default();
        merge_policy.set_del_docs_ratio_before_merge(0.3);
        inner.set_merge_policy(Box::new(merge_policy));
        ManagedIndexWriter {
            inner,
            opened_at: Instant::now(),
        }
    }

    pub fn open_for(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub(crate) fn into_inner(self) -> tantivy::IndexWriter {
        self.inner
    }
}

impl Deref for ManagedIndexWriter {
    type Target = tantivy::IndexWriter;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ManagedIndexWriter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

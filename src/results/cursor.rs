use super::sorting::{resolve_sort, sort_data, top_sorted, ResolvedSort};
use super::Results;
use crate::error::{Result, SearchError};
use crate::index::context::{FetchOutcome, IndexSnapshot, SharedIndexContext};
use crate::index::document::stored_to_string;
use crate::index::IndexHandle;
use crate::types::{Hit, SortBy};
use std::collections::HashMap;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::Query;
use tantivy::schema::{Field, OwnedValue};
use tantivy::{DocAddress, Score, TantivyDocument};

/// Lazily materializing view over one executed search.
///
/// Executing the query only ranks documents; stored fields are loaded the
/// first time a rank is requested and cached in its slot. If the shared
/// context replaced the snapshot in the meantime, the whole search is run
/// again against the new one and the fetch is retried once.
pub struct ResultCursor {
    context: Arc<SharedIndexContext>,
    index: Arc<IndexHandle>,
    query: Box<dyn Query>,
    sorts: Vec<ResolvedSort>,
    add_sort_data: bool,
    max_results: usize,
    addable: Vec<(String, Field)>,
    snapshot: Arc<IndexSnapshot>,
    top_docs: Vec<(Score, DocAddress)>,
    slots: Vec<Option<Hit>>,
    by_key: HashMap<String, Hit>,
    load_complete: bool,
}

impl ResultCursor {
    /// Run `query` against the current snapshot. `max_results == 0` keeps
    /// every match.
    pub fn execute(
        context: Arc<SharedIndexContext>,
        index: Arc<IndexHandle>,
        query: Box<dyn Query>,
        sort: &[SortBy],
        add_sort_data: bool,
        max_results: usize,
    ) -> Result<Self> {
        let sorts = resolve_sort(&index, sort)?;
        let mut addable: Vec<(String, Field)> = index
            .defs()
            .filter(|def| def.addable)
            .map(|def| Ok((def.name.clone(), index.field(&def.name)?)))
            .collect::<Result<_>>()?;
        addable.sort_by(|a, b| a.0.cmp(&b.0));

        let snapshot = context.snapshot()?;
        let top_docs = run_query(&snapshot, query.as_ref(), &sorts, max_results)?;
        tracing::debug!(
            "[SEARCH {}] {:?} matched {} hits (generation {})",
            index.id(),
            query,
            top_docs.len(),
            snapshot.generation()
        );

        let slots = vec![None; top_docs.len()];
        Ok(ResultCursor {
            context,
            index,
            query,
            sorts,
            add_sort_data,
            max_results,
            addable,
            snapshot,
            top_docs,
            slots,
            by_key: HashMap::new(),
            load_complete: false,
        })
    }

    /// Whether every rank has been materialized.
    pub fn is_load_complete(&self) -> bool {
        self.load_complete
    }

    /// Snapshot generation the current top docs were computed on.
    pub fn generation(&self) -> u64 {
        self.snapshot.generation()
    }

    fn requery(&mut self) -> Result<()> {
        let snapshot = self.context.snapshot()?;
        let top_docs = run_query(&snapshot, self.query.as_ref(), &self.sorts, self.max_results)?;
        tracing::info!(
            "[SEARCH {}] snapshot replaced, requeried: generation {} -> {}, {} hits",
            self.index.id(),
            self.snapshot.generation(),
            snapshot.generation(),
            top_docs.len()
        );
        self.snapshot = snapshot;
        self.slots = vec![None; top_docs.len()];
        self.top_docs = top_docs;
        self.by_key.clear();
        self.load_complete = false;
        Ok(())
    }

    fn fetch(&mut self, i: usize) -> Result<Option<TantivyDocument>> {
        let addr = self.top_docs[i].1;
        match self.snapshot.fetch(addr) {
            FetchOutcome::Ok(doc) => return Ok(Some(doc)),
            FetchOutcome::Fatal(e) => return Err(e),
            FetchOutcome::StaleSnapshot => {}
        }

        self.requery()?;
        let Some(&(_, addr)) = self.top_docs.get(i) else {
            return Ok(None);
        };
        match self.snapshot.fetch(addr) {
            FetchOutcome::Ok(doc) => Ok(Some(doc)),
            FetchOutcome::StaleSnapshot => Err(SearchError::StaleSnapshot(i)),
            FetchOutcome::Fatal(e) => Err(e),
        }
    }

    fn build_hit(&self, score: Score, doc: &TantivyDocument) -> Hit {
        let id = first_string(doc, self.index.return_id_field())
            .filter(|id| !id.is_empty())
            .or_else(|| first_string(doc, self.index.entry_id_field()))
            .unwrap_or_default();
        let mut hit = Hit::new(id);
        hit.score = format!("{:.11}", score);

        for (name, field) in &self.addable {
            for value in doc.get_all(*field) {
                let value: OwnedValue = value.into();
                if let Some(value) = stored_to_string(&value) {
                    hit.metadata.push((name.clone(), value));
                }
            }
        }

        if self.add_sort_data {
            for sort in &self.sorts {
                if let Some(value) = sort_data(doc, sort.field) {
                    hit.sort_data.insert(sort.name.clone(), value);
                }
            }
        }
        hit
    }

    fn rebuild_keys(&mut self) {
        self.by_key.clear();
        for hit in self.slots.iter().flatten() {
            match self.by_key.get_mut(&hit.id) {
                Some(existing) => existing.merge(hit),
                None => {
                    self.by_key.insert(hit.id.clone(), hit.clone());
                }
            }
        }
    }
}

impl Results for ResultCursor {
    fn num_hits(&self) -> usize {
        self.top_docs.len()
    }

    fn get_hit(&mut self, i: usize) -> Result<Option<Hit>> {
        if i >= self.top_docs.len() {
            return Ok(None);
        }
        if let Some(hit) = &self.slots[i] {
            return Ok(Some(hit.clone()));
        }

        let Some(doc) = self.fetch(i)? else {
            return Ok(None);
        };
        let hit = self.build_hit(self.top_docs[i].0, &doc);
        match self.by_key.get_mut(&hit.id) {
            Some(existing) => existing.merge(&hit),
            None => {
                self.by_key.insert(hit.id.clone(), hit.clone());
            }
        }
        self.slots[i] = Some(hit.clone());
        Ok(Some(hit))
    }

    fn get_hit_by_key(&mut self, key: &str) -> Result<Option<Hit>> {
        if !self.load_complete {
            while let Some(i) = self.slots.iter().position(Option::is_none) {
                if self.get_hit(i)?.is_none() {
                    break;
                }
            }
            self.load_complete = self.slots.iter().all(Option::is_some);
        }
        Ok(self.by_key.get(key).cloned())
    }

    fn cut_results(&mut self, max: usize) {
        if max >= self.top_docs.len() {
            return;
        }
        self.top_docs.truncate(max);
        self.slots.truncate(max);
        self.max_results = max;
        self.rebuild_keys();
        tracing::debug!("[SEARCH {}] results cut to {}", self.index.id(), max);
    }

    fn add_hit(&mut self, _hit: Hit) -> Result<()> {
        Err(SearchError::ReadOnlyResults(
            "cannot add hits to a search cursor".to_string(),
        ))
    }

    fn merge(&mut self, _other: &mut dyn Results) -> Result<()> {
        Err(SearchError::ReadOnlyResults(
            "cannot merge into a search cursor".to_string(),
        ))
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("index", &self.index.id())
            .field("hits", &self.top_docs.len())
            .field("materialized", &self.slots.iter().flatten().count())
            .field("load_complete", &self.load_complete)
            .finish()
    }
}

fn first_string(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field)
        .map(OwnedValue::from)
        .and_then(|v| stored_to_string(&v))
}

fn run_query(
    snapshot: &IndexSnapshot,
    query: &dyn Query,
    sorts: &[ResolvedSort],
    max_results: usize,
) -> Result<Vec<(Score, DocAddress)>> {
    let searcher = snapshot.searcher();
    let num_docs = searcher.num_docs() as usize;
    let limit = if max_results == 0 {
        num_docs
    } else {
        max_results.min(num_docs)
    };
    // TopDocs rejects a zero limit.
    if limit == 0 {
        return Ok(Vec::new());
    }

    if sorts.is_empty() {
        return Ok(searcher.search(query, &TopDocs::with_limit(limit))?);
    }
    top_sorted(searcher, query, sorts, limit)
}

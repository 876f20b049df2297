use crate::error::{Result, SearchError};
use crate::index::document::stored_to_string;
use crate::index::IndexHandle;
use crate::types::{SortBy, SortOrder};
use std::cmp::Ordering;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::columnar::{Column, StrColumn};
use tantivy::query::Query;
use tantivy::schema::{Field, FieldType, OwnedValue};
use tantivy::{DocAddress, DocId, Score, Searcher, SegmentReader, TantivyDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortKind {
    Integer,
    Float,
    Text,
}

/// A sort criterion bound to the schema field that carries its keys.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSort {
    pub name: String,
    pub field: Field,
    pub column: String,
    pub kind: SortKind,
    pub fast: bool,
    pub order: SortOrder,
}

/// Map requested sort fields onto their key fields; tokenized sortable fields
/// sort on their `<name>_sort` companion.
pub(crate) fn resolve_sort(index: &IndexHandle, sort: &[SortBy]) -> Result<Vec<ResolvedSort>> {
    let schema = index.schema();
    sort.iter()
        .map(|by| {
            let def = index
                .def(&by.field)
                .ok_or_else(|| SearchError::FieldNotFound(by.field.clone()))?;
            let column = def.sort_field_name();
            let field = index.field(&column)?;
            let entry = schema.get_field_entry(field);
            let kind = match entry.field_type() {
                FieldType::I64(_) => SortKind::Integer,
                FieldType::F64(_) => SortKind::Float,
                _ => SortKind::Text,
            };
            Ok(ResolvedSort {
                name: def.name.clone(),
                field,
                column,
                kind,
                fast: entry.is_fast(),
                order: by.order,
            })
        })
        .collect()
}

pub(crate) fn stored_value(doc: &TantivyDocument, field: Field) -> Option<OwnedValue> {
    doc.get_first(field).map(|v| v.into())
}

/// Sort key string attached to hits when sort data is requested.
pub(crate) fn sort_data(doc: &TantivyDocument, field: Field) -> Option<String> {
    stored_value(doc, field).and_then(|v| stored_to_string(&v))
}

/// Rank the matches of `query` by `sorts` and keep the first `limit`.
///
/// Keys are read from fast columns while collecting, so only the returned
/// ranks ever touch the doc store. A sort on a field without a fast column
/// falls back to loading every match.
pub(crate) fn top_sorted(
    searcher: &Searcher,
    query: &dyn Query,
    sorts: &[ResolvedSort],
    limit: usize,
) -> Result<Vec<(Score, DocAddress)>> {
    if let Some(slow) = sorts.iter().find(|sort| !sort.fast) {
        tracing::warn!(
            "[SORT] no fast column for {}, sorting on stored values",
            slow.column
        );
        let matches = searcher.search(query, &TopDocs::with_limit(searcher.num_docs() as usize))?;
        return sort_stored(searcher, matches, sorts, limit);
    }

    let columns: Arc<[ResolvedSort]> = sorts.into();
    let orders: Arc<[SortOrder]> = sorts.iter().map(|sort| sort.order).collect();
    let collector = TopDocs::with_limit(limit).tweak_score(
        move |segment_reader: &SegmentReader| {
            let readers: Vec<KeyReader> = columns
                .iter()
                .map(|sort| KeyReader::open(segment_reader, sort))
                .collect();
            let orders = Arc::clone(&orders);
            move |doc: DocId, score: Score| RankKey {
                keys: readers.iter().map(|reader| reader.read(doc)).collect(),
                orders: Arc::clone(&orders),
                score,
            }
        },
    );
    let ranked = searcher.search(query, &collector)?;
    tracing::trace!("[SORT] ranked top {} on fast columns", ranked.len());
    Ok(ranked
        .into_iter()
        .map(|(key, addr)| (key.score, addr))
        .collect())
}

/// Per-segment accessor for one sort key column.
enum KeyReader {
    Integer(Column<i64>),
    Float(Column<f64>),
    Text(StrColumn),
    Missing,
}

impl KeyReader {
    fn open(segment_reader: &SegmentReader, sort: &ResolvedSort) -> KeyReader {
        let ff = segment_reader.fast_fields();
        let reader = match sort.kind {
            SortKind::Integer => ff
                .column_opt::<i64>(&sort.column)
                .ok()
                .flatten()
                .map(KeyReader::Integer),
            SortKind::Float => ff
                .column_opt::<f64>(&sort.column)
                .ok()
                .flatten()
                .map(KeyReader::Float),
            SortKind::Text => ff.str(&sort.column).ok().flatten().map(KeyReader::Text),
        };
        reader.unwrap_or(KeyReader::Missing)
    }

    fn read(&self, doc: DocId) -> SortValue {
        let value = match self {
            KeyReader::Integer(column) => column.first(doc).map(SortValue::Integer),
            KeyReader::Float(column) => column.first(doc).map(SortValue::Float),
            // Term ordinals are segment local, so compare the terms themselves.
            KeyReader::Text(column) => column.term_ords(doc).next().and_then(|ord| {
                let mut term = String::new();
                match column.ord_to_str(ord, &mut term) {
                    Ok(true) => Some(SortValue::Text(term)),
                    _ => None,
                }
            }),
            KeyReader::Missing => None,
        };
        value.unwrap_or(SortValue::Missing)
    }
}

/// Collector score for sorted searches. TopDocs keeps the greatest scores, so
/// a key that sorts first compares greater. Relevance breaks full ties.
#[derive(Debug, Clone)]
pub(crate) struct RankKey {
    keys: Vec<SortValue>,
    orders: Arc<[SortOrder]>,
    score: Score,
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let ordering = compare_keys(&other.keys, &self.keys, &self.orders).then_with(|| {
            self.score
                .partial_cmp(&other.score)
                .unwrap_or(Ordering::Equal)
        });
        Some(ordering)
    }
}

/// Order matches by their stored sort keys and keep the first `limit`.
fn sort_stored(
    searcher: &Searcher,
    docs: Vec<(Score, DocAddress)>,
    sorts: &[ResolvedSort],
    limit: usize,
) -> Result<Vec<(Score, DocAddress)>> {
    let orders: Vec<SortOrder> = sorts.iter().map(|sort| sort.order).collect();
    let mut keyed: Vec<(Vec<SortValue>, Score, DocAddress)> = Vec::with_capacity(docs.len());
    for (score, addr) in docs {
        let doc: TantivyDocument = searcher.doc(addr)?;
        let keys = sorts
            .iter()
            .map(|sort| {
                stored_value(&doc, sort.field)
                    .map(|v| SortValue::from_owned(&v))
                    .unwrap_or(SortValue::Missing)
            })
            .collect();
        keyed.push((keys, score, addr));
    }

    keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, &orders));
    tracing::trace!("[SORT] sorted {} matches, keeping {}", keyed.len(), limit);
    keyed.truncate(limit);
    Ok(keyed
        .into_iter()
        .map(|(_, score, addr)| (score, addr))
        .collect())
}

fn compare_keys(a: &[SortValue], b: &[SortValue], orders: &[SortOrder]) -> Ordering {
    for ((left, right), order) in a.iter().zip(b).zip(orders) {
        let ordering = match (left, right) {
            // Missing values go last in either direction.
            (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
            (SortValue::Missing, _) => Ordering::Greater,
            (_, SortValue::Missing) => Ordering::Less,
            _ => match order {
                SortOrder::Asc => left.cmp(right),
                SortOrder::Desc => right.cmp(left),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SortValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Missing,
}

impl SortValue {
    fn from_owned(value: &OwnedValue) -> SortValue {
        match value {
            OwnedValue::I64(i) => SortValue::Integer(*i),
            OwnedValue::U64(u) => SortValue::Integer(*u as i64),
            OwnedValue::F64(f) => SortValue::Float(*f),
            OwnedValue::Str(s) => SortValue::Text(s.clone()),
            _ => SortValue::Missing,
        }
    }
}

impl Eq for SortValue {}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
            (SortValue::Missing, _) => Ordering::Less,
            (_, SortValue::Missing) => Ordering::Greater,
            (SortValue::Integer(a), SortValue::Integer(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Integer(_), _) => Ordering::Less,
            (SortValue::Float(_), SortValue::Text(_)) => Ordering::Less,
            (SortValue::Float(_), SortValue::Integer(_)) => Ordering::Greater,
            (SortValue::Text(_), _) => Ordering::Greater,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(keys: Vec<SortValue>, orders: &[SortOrder], score: Score) -> RankKey {
        RankKey {
            keys,
            orders: orders.into(),
            score,
        }
    }

    #[test]
    fn test_missing_sorts_last_both_ways() {
        let values = [
            vec![SortValue::Missing],
            vec![SortValue::Integer(2)],
            vec![SortValue::Integer(1)],
        ];
        for order in [SortOrder::Asc, SortOrder::Desc] {
            let mut sorted = values.to_vec();
            sorted.sort_by(|a, b| compare_keys(a, b, &[order]));
            assert_eq!(sorted[2], vec![SortValue::Missing], "order {:?}", order);
        }
    }

    #[test]
    fn test_secondary_key_breaks_ties() {
        let orders = [SortOrder::Asc, SortOrder::Desc];
        let a = vec![SortValue::Text("a".into()), SortValue::Integer(1)];
        let b = vec![SortValue::Text("a".into()), SortValue::Integer(2)];
        assert_eq!(compare_keys(&a, &b, &orders), Ordering::Greater);
    }

    #[test]
    fn test_value_ordering() {
        assert!(SortValue::Integer(5) < SortValue::Text("a".into()));
        assert!(SortValue::Float(1.5) < SortValue::Float(2.0));
        assert!(SortValue::Missing < SortValue::Integer(i64::MIN));
    }

    #[test]
    fn test_rank_key_prefers_first_in_sort_order() {
        let asc = [SortOrder::Asc];
        let first = rank(vec![SortValue::Integer(1)], &asc, 0.5);
        let second = rank(vec![SortValue::Integer(2)], &asc, 2.0);
        let missing = rank(vec![SortValue::Missing], &asc, 9.0);
        assert!(first > second);
        assert!(second > missing);

        let desc = [SortOrder::Desc];
        let high = rank(vec![SortValue::Integer(2)], &desc, 0.0);
        let low = rank(vec![SortValue::Integer(1)], &desc, 0.0);
        assert!(high > low);
        assert!(rank(vec![SortValue::Missing], &desc, 0.0) < low);
    }

    #[test]
    fn test_rank_key_ties_fall_back_to_relevance() {
        let asc = [SortOrder::Asc];
        let key = || vec![SortValue::Text("same".into())];
        assert!(rank(key(), &asc, 2.0) > rank(key(), &asc, 1.0));
        assert!(rank(key(), &asc, 1.0) == rank(key(), &asc, 1.0));
    }
}

//! Search results: the lazy [`ResultCursor`] and the fully materialized
//! [`MaterializedResults`].

pub mod cursor;
pub(crate) mod sorting;

pub use cursor::ResultCursor;

use crate::error::Result;
use crate::types::Hit;
use std::collections::HashMap;

/// Ordered, finite view over the hits of one search.
pub trait Results: Send {
    fn num_hits(&self) -> usize;

    /// Hit at rank `i`, or `None` past the end.
    fn get_hit(&mut self, i: usize) -> Result<Option<Hit>>;

    /// Merged record of all hits sharing `key`.
    fn get_hit_by_key(&mut self, key: &str) -> Result<Option<Hit>>;

    /// Keep only the first `max` hits.
    fn cut_results(&mut self, max: usize);

    fn add_hit(&mut self, hit: Hit) -> Result<()>;

    /// Add every hit of `other` to this result set.
    fn merge(&mut self, other: &mut dyn Results) -> Result<()>;
}

impl<'r> dyn Results + 'r {
    /// Forward-only iteration from rank zero. Calling `iter` again restarts.
    pub fn iter(&mut self) -> ResultsIter<'_> {
        ResultsIter {
            results: self,
            next: 0,
        }
    }

    /// Materialize every hit in rank order.
    pub fn collect_hits(&mut self) -> Result<Vec<Hit>> {
        self.iter().collect()
    }
}

pub struct ResultsIter<'a> {
    results: &'a mut dyn Results,
    next: usize,
}

impl Iterator for ResultsIter<'_> {
    type Item = Result<Hit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.results.num_hits() {
            return None;
        }
        let i = self.next;
        self.next += 1;
        self.results.get_hit(i).transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.results.num_hits().saturating_sub(self.next);
        (0, Some(remaining))
    }
}

/// Results held entirely in memory. Hits with the same id are merged into
/// one record, so this also serves as the union of several result sets.
#[derive(Debug, Clone, Default)]
pub struct MaterializedResults {
    hits: Vec<Hit>,
    by_key: HashMap<String, usize>,
}

impl MaterializedResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `results` into memory.
    pub fn from_results(results: &mut dyn Results) -> Result<Self> {
        let mut materialized = MaterializedResults::new();
        materialized.merge(results)?;
        Ok(materialized)
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    fn reindex(&mut self) {
        self.by_key = self
            .hits
            .iter()
            .enumerate()
            .map(|(i, hit)| (hit.id.clone(), i))
            .collect();
    }
}

impl Results for MaterializedResults {
    fn num_hits(&self) -> usize {
        self.hits.len()
    }

    fn get_hit(&mut self, i: usize) -> Result<Option<Hit>> {
        Ok(self.hits.get(i).cloned())
    }

    fn get_hit_by_key(&mut self, key: &str) -> Result<Option<Hit>> {
        Ok(self.by_key.get(key).map(|&i| self.hits[i].clone()))
    }

    fn cut_results(&mut self, max: usize) {
        if max < self.hits.len() {
            self.hits.truncate(max);
            self.reindex();
        }
    }

    fn add_hit(&mut self, hit: Hit) -> Result<()> {
        match self.by_key.get(&hit.id) {
            Some(&i) => self.hits[i].merge(&hit),
            None => {
                self.by_key.insert(hit.id.clone(), self.hits.len());
                self.hits.push(hit);
            }
        }
        Ok(())
    }

    fn merge(&mut self, other: &mut dyn Results) -> Result<()> {
        for hit in other.iter() {
            self.add_hit(hit?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, derivate: &str) -> Hit {
        let mut hit = Hit::new(id);
        hit.metadata
            .push(("derivate".to_string(), derivate.to_string()));
        hit
    }

    #[test]
    fn test_add_hit_merges_same_id() {
        let mut results = MaterializedResults::new();
        results.add_hit(hit("obj_1", "der_1")).unwrap();
        results.add_hit(hit("obj_2", "der_2")).unwrap();
        results.add_hit(hit("obj_1", "der_3")).unwrap();

        assert_eq!(results.num_hits(), 2);
        let merged = results.get_hit_by_key("obj_1").unwrap().unwrap();
        let derivates: Vec<&str> = merged.metadata_values("derivate").collect();
        assert_eq!(derivates, vec!["der_1", "der_3"]);
    }

    #[test]
    fn test_union_and_cut() {
        let mut left = MaterializedResults::new();
        left.add_hit(hit("obj_1", "a")).unwrap();
        left.add_hit(hit("obj_2", "b")).unwrap();
        let mut right = MaterializedResults::new();
        right.add_hit(hit("obj_2", "c")).unwrap();
        right.add_hit(hit("obj_3", "d")).unwrap();

        left.merge(&mut right).unwrap();
        assert_eq!(left.num_hits(), 3);

        left.cut_results(2);
        assert_eq!(left.num_hits(), 2);
        assert!(left.get_hit_by_key("obj_3").unwrap().is_none());
        assert!(left.get_hit_by_key("obj_2").unwrap().is_some());
    }

    #[test]
    fn test_iter_restarts() {
        let mut results = MaterializedResults::new();
        results.add_hit(hit("obj_1", "a")).unwrap();
        results.add_hit(hit("obj_2", "b")).unwrap();
        let results: &mut dyn Results = &mut results;

        let ids: Vec<String> = results.iter().map(|h| h.unwrap().id).collect();
        assert_eq!(ids, vec!["obj_1", "obj_2"]);
        assert_eq!(results.iter().count(), 2);
        assert_eq!(results.collect_hits().unwrap().len(), 2);
    }
}

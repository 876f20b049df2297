use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node of the declarative condition tree handed over by the query UI.
///
/// Boolean nodes carry their children in order; leaves name a field from the
/// [`FieldRegistry`](crate::index::fields::FieldRegistry), an operator such as
/// `contains`, `like`, `phrase`, `=`, `<=` or `lucene`, and the raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    And { children: Vec<Condition> },
    Or { children: Vec<Condition> },
    Not { children: Vec<Condition> },
    Condition {
        field: String,
        operator: String,
        value: String,
    },
}

impl Condition {
    pub fn leaf(field: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Condition {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Condition::And { children }
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Or { children }
    }

    pub fn not(children: Vec<Condition>) -> Self {
        Condition::Not { children }
    }
}

/// One `(field, value)` pair submitted for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
    pub name: String,
    pub value: String,
}

impl FieldData {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        FieldData {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One sort criterion. An empty sort list means "by relevance".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub order: SortOrder,
}

impl SortBy {
    pub fn asc(field: impl Into<String>) -> Self {
        SortBy {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortBy {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Signals sent by the indexing layer around bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    Rebuild,
    Insert,
    Optimize,
    Finish,
}

impl std::str::FromStr for IndexMode {
    type Err = crate::error::SearchError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "rebuild" => Ok(IndexMode::Rebuild),
            "insert" => Ok(IndexMode::Insert),
            "optimize" => Ok(IndexMode::Optimize),
            "finish" => Ok(IndexMode::Finish),
            other => Err(crate::error::SearchError::Config(format!(
                "unknown index mode '{}'",
                other
            ))),
        }
    }
}

/// A materialized search hit.
///
/// `metadata` keeps the values of addable fields in stored order; hits that
/// share an `id` are merged so that their metadata accumulates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub score: String,
    pub metadata: Vec<(String, String)>,
    pub sort_data: BTreeMap<String, String>,
}

impl Hit {
    pub fn new(id: impl Into<String>) -> Self {
        Hit {
            id: id.into(),
            score: String::new(),
            metadata: Vec::new(),
            sort_data: BTreeMap::new(),
        }
    }

    pub fn metadata_values<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.metadata
            .iter()
            .filter(move |(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Fold `other` into this hit. Metadata pairs are unioned, sort data
    /// only fills keys this hit does not carry yet.
    pub fn merge(&mut self, other: &Hit) {
        for pair in &other.metadata {
            if !self.metadata.contains(pair) {
                self.metadata.push(pair.clone());
            }
        }
        for (key, value) in &other.sort_data {
            self.sort_data
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if self.score.is_empty() {
            self.score = other.score.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_json_shape() {
        let cond = Condition::and(vec![
            Condition::leaf("title", "contains", "hello"),
            Condition::not(vec![Condition::leaf("state", "=", "deleted")]),
        ]);
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "and");
        assert_eq!(json["children"][0]["type"], "condition");
        assert_eq!(json["children"][1]["children"][0]["operator"], "=");

        let back: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(back, cond);
    }

    #[test]
    fn test_hit_merge_unions_metadata() {
        let mut a = Hit::new("obj_1");
        a.score = "1.00000000000".to_string();
        a.metadata.push(("derivate".to_string(), "der_1".to_string()));
        a.sort_data.insert("title".to_string(), "alpha".to_string());

        let mut b = Hit::new("obj_1");
        b.metadata.push(("derivate".to_string(), "der_1".to_string()));
        b.metadata.push(("derivate".to_string(), "der_2".to_string()));
        b.sort_data.insert("title".to_string(), "beta".to_string());
        b.sort_data.insert("year".to_string(), "2001".to_string());

        a.merge(&b);
        let derivates: Vec<&str> = a.metadata_values("derivate").collect();
        assert_eq!(derivates, vec!["der_1", "der_2"]);
        assert_eq!(a.sort_data["title"], "alpha");
        assert_eq!(a.sort_data["year"], "2001");
        assert_eq!(a.score, "1.00000000000");
    }

    #[test]
    fn test_index_mode_from_str() {
        assert_eq!("rebuild".parse::<IndexMode>().unwrap(), IndexMode::Rebuild);
        assert_eq!("finish".parse::<IndexMode>().unwrap(), IndexMode::Finish);
        assert!("later".parse::<IndexMode>().is_err());
    }
}

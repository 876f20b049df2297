use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SearchError {
    #[error("Field not found in registry: {0}")]
    FieldNotFound(String),

    #[error("Invalid value for field {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Results are read-only: {0}")]
    ReadOnlyResults(String),

    #[error("Index snapshot was replaced while fetching rank {0}")]
    StaleSnapshot(usize),

    #[error("Write executor for index {0} is closed")]
    ExecutorClosed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tantivy error: {0}")]
    Tantivy(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl From<std::io::Error> for SearchError {
    fn from(e: std::io::Error) -> Self {
        SearchError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(e: tantivy::TantivyError) -> Self {
        SearchError::Tantivy(e.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for SearchError {
    fn from(e: tantivy::query::QueryParserError) -> Self {
        SearchError::QueryParse(e.to_string())
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for SearchError {
    fn from(e: tantivy::directory::error::OpenDirectoryError) -> Self {
        SearchError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Json(e.to_string())
    }
}

impl SearchError {
    /// Errors caused by the request itself (unknown field, bad value, bad
    /// native query). Retrying the same search cannot succeed.
    pub fn is_fatal_for_search(&self) -> bool {
        matches!(
            self,
            SearchError::FieldNotFound(_)
                | SearchError::InvalidValue { .. }
                | SearchError::InvalidQuery(_)
                | SearchError::QueryParse(_)
        )
    }

    pub(crate) fn invalid_value(field: &str, value: &str, reason: impl ToString) -> Self {
        SearchError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SearchError::FieldNotFound("x".to_string()).is_fatal_for_search());
        assert!(SearchError::invalid_value("d", "2024-13", "bad month").is_fatal_for_search());
        assert!(!SearchError::Io("disk".to_string()).is_fatal_for_search());
        assert!(!SearchError::StaleSnapshot(3).is_fatal_for_search());
    }

    #[test]
    fn test_display_includes_context() {
        let e = SearchError::invalid_value("created", "yesterday", "not ISO-8601");
        assert_eq!(
            e.to_string(),
            "Invalid value for field created: yesterday (not ISO-8601)"
        );
    }
}

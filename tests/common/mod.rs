use mycore_search::index::fields::{DataType, FieldDefinition, StaticFieldRegistry};
use mycore_search::{FieldData, IndexSearcher, SearcherConfig};
use std::sync::Arc;
use tempfile::TempDir;

pub const INDEX_ID: &str = "metadata";

pub fn registry() -> StaticFieldRegistry {
    StaticFieldRegistry::new()
        .with_field(INDEX_ID, FieldDefinition::new("title", DataType::Text).sortable())
        .with_field(INDEX_ID, FieldDefinition::new("author", DataType::Name))
        .with_field(INDEX_ID, FieldDefinition::new("derivate", DataType::Identifier).addable())
        .with_field(INDEX_ID, FieldDefinition::new("shelfmark", DataType::Index))
        .with_field(INDEX_ID, FieldDefinition::new("year", DataType::Integer).sortable())
        .with_field(INDEX_ID, FieldDefinition::new("price", DataType::Decimal))
        .with_field(INDEX_ID, FieldDefinition::new("created", DataType::Date))
        .with_field(INDEX_ID, FieldDefinition::new("public", DataType::Boolean))
}

/// Short idle delay so tests that wait for the closer stay fast.
pub fn test_config() -> SearcherConfig {
    SearcherConfig {
        idle_close_delay_ms: 50,
        ..SearcherConfig::default()
    }
}

#[allow(dead_code)]
pub fn open_searcher(dir: &TempDir) -> IndexSearcher {
    open_with(dir, test_config())
}

pub fn open_with(dir: &TempDir, config: SearcherConfig) -> IndexSearcher {
    IndexSearcher::open(INDEX_ID, dir.path(), Arc::new(registry()), config).unwrap()
}

#[allow(dead_code)]
pub fn fields(pairs: &[(&str, &str)]) -> Vec<FieldData> {
    pairs
        .iter()
        .map(|(name, value)| FieldData::new(*name, *value))
        .collect()
}

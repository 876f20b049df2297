use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Suffix of the untokenized companion field kept for sorting text fields.
pub const SORTABLE_SUFFIX: &str = "_sort";

/// Stored, untokenized id of the indexed entry (used for deletes).
pub const ENTRY_ID_FIELD: &str = "mcrid";

/// Stored id that search hits report (usually the owning object).
pub const RETURN_ID_FIELD: &str = "returnid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Name,
    Identifier,
    Index,
    Date,
    Time,
    Timestamp,
    Boolean,
    Decimal,
    Integer,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Name => "name",
            DataType::Identifier => "identifier",
            DataType::Index => "index",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::Timestamp => "timestamp",
            DataType::Boolean => "boolean",
            DataType::Decimal => "decimal",
            DataType::Integer => "integer",
        }
    }

    /// Fields run through the text analyzer at index time.
    pub fn is_tokenized(&self) -> bool {
        matches!(self, DataType::Text | DataType::Name)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub addable: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        FieldDefinition {
            name: name.into(),
            data_type,
            sortable: false,
            addable: false,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn addable(mut self) -> Self {
        self.addable = true;
        self
    }

    /// Name of the field that holds sort keys for this definition.
    pub fn sort_field_name(&self) -> String {
        if self.sortable && self.data_type.is_tokenized() {
            format!("{}{}", self.name, SORTABLE_SUFFIX)
        } else {
            self.name.clone()
        }
    }
}

/// Lookup of field definitions by name and by index.
pub trait FieldRegistry: Send + Sync {
    fn get_def(&self, name: &str) -> Option<FieldDefinition>;

    fn get_field_defs(&self, index_id: &str) -> Vec<FieldDefinition>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryFile {
    indexes: HashMap<String, Vec<FieldDefinition>>,
}

/// In-memory registry, built in code or loaded from a JSON file of the form
/// `{"indexes": {"metadata": [{"name": "title", "type": "text"}]}}`.
#[derive(Debug, Clone, Default)]
pub struct StaticFieldRegistry {
    by_index: HashMap<String, Vec<FieldDefinition>>,
    by_name: HashMap<String, FieldDefinition>,
}

impl StaticFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, index_id: &str, def: FieldDefinition) -> Self {
        self.add_field(index_id, def);
        self
    }

    pub fn add_field(&mut self, index_id: &str, def: FieldDefinition) {
        self.by_name.insert(def.name.clone(), def.clone());
        let defs = self.by_index.entry(index_id.to_string()).or_default();
        defs.retain(|d| d.name != def.name);
        defs.push(def);
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: RegistryFile = serde_json::from_str(&content)?;
        let mut registry = StaticFieldRegistry::new();
        for (index_id, defs) in file.indexes {
            for def in defs {
                if def.name == ENTRY_ID_FIELD || def.name == RETURN_ID_FIELD {
                    return Err(SearchError::Config(format!(
                        "field name '{}' is reserved",
                        def.name
                    )));
                }
                registry.add_field(&index_id, def);
            }
        }
        Ok(registry)
    }
}

impl FieldRegistry for StaticFieldRegistry {
    fn get_def(&self, name: &str) -> Option<FieldDefinition> {
        self.by_name.get(name).cloned()
    }

    fn get_field_defs(&self, index_id: &str) -> Vec<FieldDefinition> {
        self.by_index.get(index_id).cloned().unwrap_or_default()
    }
}

pub mod action;
pub mod context;
pub mod document;
pub mod fields;
pub mod usage;
pub mod write_queue;
pub mod writer;

use crate::error::{Result, SearchError};
use crate::tokenizer::{Analyzer, TEXT_TOKENIZER};
use fields::{DataType, FieldDefinition, ENTRY_ID_FIELD, RETURN_ID_FIELD};
use std::collections::HashMap;
use std::path::Path;
use tantivy::directory::MmapDirectory;
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema, SchemaBuilder, TextFieldIndexing,
    TextOptions, FAST, STORED, STRING,
};
use tantivy::Index as TantivyIndex;
pub use writer::ManagedIndexWriter;

/// One on-disk index together with the field layout it was built from.
///
/// The schema is derived from the field definitions registered for the
/// index: tokenized fields run through the per-searcher [`Analyzer`],
/// sortable tokenized fields get an untokenized `<name>_sort` companion, and
/// date-like and numeric fields are stored as i64/f64 terms. Every field a
/// search can sort on without loading documents carries a fast column.
pub struct IndexHandle {
    id: String,
    inner: TantivyIndex,
    analyzer: Analyzer,
    defs: HashMap<String, FieldDefinition>,
    entry_id: Field,
    return_id: Field,
    writer_buffer_bytes: usize,
}

impl IndexHandle {
    /// Open the index under `path`, creating directory and index on first use.
    pub fn open_or_create<P: AsRef<Path>>(
        id: &str,
        path: P,
        defs: &[FieldDefinition],
        analyzer: Analyzer,
        writer_buffer_bytes: usize,
    ) -> Result<Self> {
        std::fs::create_dir_all(path.as_ref())?;
        let schema = build_schema(defs);
        let directory = MmapDirectory::open(path.as_ref())?;
        let inner = TantivyIndex::open_or_create(directory, schema)?;
        tracing::info!(
            "[INDEX {}] opened at {} with {} fields",
            id,
            path.as_ref().display(),
            defs.len()
        );
        Self::from_tantivy(id, inner, defs, analyzer, writer_buffer_bytes)
    }

    /// RAM-backed index, used by tests and benchmarks.
    pub fn in_memory(id: &str, defs: &[FieldDefinition], analyzer: Analyzer) -> Result<Self> {
        let inner = TantivyIndex::create_in_ram(build_schema(defs));
        Self::from_tantivy(id, inner, defs, analyzer, 15_000_000)
    }

    fn from_tantivy(
        id: &str,
        inner: TantivyIndex,
        defs: &[FieldDefinition],
        analyzer: Analyzer,
        writer_buffer_bytes: usize,
    ) -> Result<Self> {
        analyzer.register(&inner);
        let schema = inner.schema();
        let entry_id = lookup(&schema, ENTRY_ID_FIELD)?;
        let return_id = lookup(&schema, RETURN_ID_FIELD)?;
        let defs = defs
            .iter()
            .map(|def| (def.name.clone(), def.clone()))
            .collect();
        Ok(IndexHandle {
            id: id.to_string(),
            inner,
            analyzer,
            defs,
            entry_id,
            return_id,
            writer_buffer_bytes,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn inner(&self) -> &TantivyIndex {
        &self.inner
    }

    pub fn schema(&self) -> Schema {
        self.inner.schema()
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Definition of a field that belongs to this index.
    pub fn def(&self, name: &str) -> Option<&FieldDefinition> {
        self.defs.get(name)
    }

    pub fn defs(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.defs.values()
    }

    pub fn field(&self, name: &str) -> Result<Field> {
        lookup(&self.inner.schema(), name)
    }

    pub fn entry_id_field(&self) -> Field {
        self.entry_id
    }

    pub fn return_id_field(&self) -> Field {
        self.return_id
    }

    /// Open a new writer. Only the write executor holds one at a time.
    pub fn writer(&self) -> Result<ManagedIndexWriter> {
        let writer = self.inner.writer(self.writer_buffer_bytes)?;
        Ok(ManagedIndexWriter::new(writer))
    }

    /// Open a reader that only moves forward when explicitly reloaded.
    pub fn reader(&self) -> Result<tantivy::IndexReader> {
        Ok(self
            .inner
            .reader_builder()
            .reload_policy(tantivy::ReloadPolicy::Manual)
            .try_into()?)
    }
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("id", &self.id)
            .field("fields", &self.defs.len())
            .finish()
    }
}

fn lookup(schema: &Schema, name: &str) -> Result<Field> {
    schema
        .get_field(name)
        .map_err(|_| SearchError::FieldNotFound(name.to_string()))
}

/// Translate field definitions into a tantivy schema.
pub fn build_schema(defs: &[FieldDefinition]) -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(ENTRY_ID_FIELD, STRING | STORED);
    builder.add_text_field(RETURN_ID_FIELD, STRING | STORED);

    for def in defs {
        if def.name == ENTRY_ID_FIELD || def.name == RETURN_ID_FIELD {
            continue;
        }
        add_field(&mut builder, def);
    }
    builder.build()
}

fn add_field(builder: &mut SchemaBuilder, def: &FieldDefinition) {
    match def.data_type {
        DataType::Text | DataType::Name => {
            let indexing = TextFieldIndexing::default()
                .set_tokenizer(TEXT_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions);
            let options = TextOptions::default()
                .set_indexing_options(indexing)
                .set_stored();
            builder.add_text_field(&def.name, options);
            if def.sortable {
                builder.add_text_field(&def.sort_field_name(), STRING | STORED | FAST);
            }
        }
        DataType::Identifier | DataType::Index | DataType::Boolean => {
            builder.add_text_field(&def.name, STRING | STORED | FAST);
        }
        DataType::Date | DataType::Time | DataType::Timestamp | DataType::Integer => {
            builder.add_i64_field(&def.name, numeric_options());
        }
        DataType::Decimal => {
            builder.add_f64_field(&def.name, numeric_options());
        }
    }
}

fn numeric_options() -> NumericOptions {
    NumericOptions::default()
        .set_indexed()
        .set_stored()
        .set_fast()
}

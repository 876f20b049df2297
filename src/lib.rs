//! # mycore-search
//!
//! Search indexing and querying for MyCoRe repositories, built on
//! [Tantivy](https://github.com/quickwit-oss/tantivy).
//!
//! A repository declares its fields once in a [`FieldRegistry`]. Each
//! [`IndexSearcher`] then owns one index directory: mutations go through a
//! single-worker [`WriteExecutor`](index::write_queue::WriteExecutor),
//! searches compile a [`Condition`] tree into a Tantivy query and return a
//! lazily materializing [`Results`] cursor.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mycore_search::index::fields::{DataType, FieldDefinition, StaticFieldRegistry};
//! use mycore_search::{Condition, FieldData, IndexSearcher, Searcher, SearcherConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> mycore_search::Result<()> {
//! let registry = StaticFieldRegistry::new()
//!     .with_field("metadata", FieldDefinition::new("title", DataType::Text).sortable())
//!     .with_field("metadata", FieldDefinition::new("derivate", DataType::Identifier).addable());
//!
//! let searcher = IndexSearcher::open(
//!     "metadata",
//!     std::path::Path::new("./data"),
//!     Arc::new(registry),
//!     SearcherConfig::from_env(),
//! )?;
//!
//! searcher.add_to_index("obj_1", "obj_1", &[FieldData::new("title", "Hello World")])?;
//! searcher.flush().await?;
//!
//! let mut results = searcher.search(&Condition::leaf("title", "contains", "hello"), 10, &[], false)?;
//! println!("{} hits", results.num_hits());
//! for hit in results.iter() {
//!     let hit = hit?;
//!     println!("{} {:?}", hit.id, hit.metadata);
//! }
//! searcher.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The library never installs a `tracing` subscriber; log output is up to the
//! embedding application.

pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod results;
pub mod searcher;
pub mod tokenizer;
pub mod types;

pub use config::SearcherConfig;
pub use error::{Result, SearchError};
pub use index::fields::{DataType, FieldDefinition, FieldRegistry, StaticFieldRegistry};
pub use index::usage::FieldUsageTracker;
pub use index::{IndexHandle, ManagedIndexWriter};
pub use query::{fix_query, to_numeric, CompiledQuery, QueryCompiler};
pub use results::{MaterializedResults, ResultCursor, Results};
pub use searcher::{IndexSearcher, Searcher};
pub use types::*;

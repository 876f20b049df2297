pub mod analyzer;
pub use analyzer::{Analyzer, TEXT_TOKENIZER};

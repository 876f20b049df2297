pub mod compiled;
pub mod compiler;
pub mod fix;
pub mod fuzzy;
pub mod values;

pub use compiled::{Clause, CompiledQuery, NumericRange, Occurrence};
pub use compiler::QueryCompiler;
pub use fix::fix_query;
pub use values::to_numeric;

pub mod executor;
pub mod index;
pub mod sanitizer;

pub use executor::{ToolExecutor, classify_output, truncate};
pub use index::{ResolvedTool, ToolCatalog, ToolIndex};
pub use sanitizer::{FieldPath, SanitizeError, Sanitizer};

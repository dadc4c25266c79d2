//! Target analysis (C10): resolves an `(entity, configuration)` pair to an
//! [`AnalysedTarget`], falling back to the source-target map for entities
//! absent from their module's targets file and dispatching present entries
//! to their rule's built-in implementation.

mod builtins;
mod error;
mod result_map;
mod source_map;
mod staging;
mod target_map;

pub use error::TargetsError;
pub use result_map::ResultTargetMap;
pub use source_map::source_target_map;
pub use target_map::{target_map, TargetKey};

//! Repository configuration and the base async maps over a workspace's
//! directory tree, expression files, rule files, and target files (C9):
//! content-fixed repository keys (§4.9), `DirectoryEntriesMap`, the generic
//! `JsonFileMap` template, `ExpressionFunctionMap`, and `RuleMap` (§4.4,
//! §4.6). Dependency resolution between targets lives in `bb-targets`; this
//! crate only produces the per-module building blocks that map consumes.

mod config;
mod dir_map;
mod expression_map;
mod json_map;
mod paths;
mod rule_map;

pub use config::{RepositoryConfig, RepositoryInfo};
pub use dir_map::directory_entries_map;
pub use expression_map::expression_function_map;
pub use json_map::{expression_file_map, json_file_map, rule_file_map, targets_file_map};
pub use paths::{module_escapes, module_path};
pub use rule_map::rule_map;

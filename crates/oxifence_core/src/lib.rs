//! Core of oxifence: everything needed to turn an entry file into an import
//! graph.
//!
//! - Reading files through an explicit [`FileSystem`]
//! - Extracting raw import specifiers from TS/JS sources
//! - Loading tsconfig path aliases, following `extends` chains
//! - Resolving specifiers to files, libraries or "unresolved"
//! - Building and traversing the (possibly cyclic) import graph

mod constants;
mod error;
mod fs;
mod graph;
mod parser;
mod resolver;
mod tsconfig;

// Re-export public API
pub use constants::{
    DEFAULT_IGNORED_EXTENSIONS, INDEX_FILES, JS_TS_EXTENSIONS, RESOLVE_EXTENSIONS, TSCONFIG_FILE,
};
pub use error::{UserError, user_error};
pub use fs::{
    FileSystem, MemoryFileSystem, OsFileSystem, find_upwards, join, relative_path, to_slash,
};
pub use graph::{
    FileId, FileInfo, Import, ImportGraph, ImportTarget, Traversal, traverse_all_files,
};
pub use parser::{ImportCache, imports_for, parse_imports};
pub use resolver::{Resolution, Resolver, find_source_file};
pub use tsconfig::{PathAlias, PathAliasTable, load_path_aliases, strip_jsonc};

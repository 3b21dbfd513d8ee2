//! File system storage management
//!
//! Storage roots, path resolution and the filesystem operations that run on
//! resolved paths.

pub mod filesystem;
pub mod hierarchy;
pub mod operations;
pub mod resolver;
pub mod results;
pub mod roots;
pub mod validation;

pub use resolver::{PathResolver, ResolvedPath};
pub use results::{DirectoryEntry, DownloadTarget, SearchHit, TreeNode};
pub use roots::{Scope, StorageRoots};
pub use validation::validate_entry_name;

//! Folder structure indexing.
//!
//! This module discovers the folder topology under a search root:
//! - Bounded breadth-first listing of child folders
//! - Per-folder display paths, seeded into the session path cache
//! - One shared index per root and depth bound

mod build;
mod data;

// Re-export main types
pub use build::StructureIndexer;
pub use data::{FolderIndex, FolderIndexEntry};

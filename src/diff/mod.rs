//! Unified diff data model and parser.

pub mod file;
pub mod full;
pub mod hunk;

pub use file::{ChangeKind, FileDiff};
pub use full::Diff;
pub use hunk::{DiffHunk, DiffLine, HunkMeta, LineKind};

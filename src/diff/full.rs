use std::collections::HashMap;

use super::file::FileDiff;
use super::hunk::DiffHunk;

/// A complete git diff containing changes for multiple files.
///
/// File order and hunk order are emission order; walking files then hunks
/// gives the canonical global hunk order every later stage relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub base_commit: Option<String>,
    pub target_commit: Option<String>,
    pub files: Vec<FileDiff>,
}

impl Diff {
    /// Parse a complete unified diff.
    ///
    /// Anything before the first `diff --git` line (commit headers and the
    /// like) is skipped. Never fails: malformed lines are kept as context
    /// and left for `git apply` to judge.
    pub fn parse(text: &str) -> Self {
        let lines = split_raw_lines(text);
        let starts: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.starts_with("diff --git "))
            .map(|(idx, _)| idx)
            .collect();

        let files = starts
            .iter()
            .enumerate()
            .filter_map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(lines.len());
                FileDiff::parse(&lines[start..end])
            })
            .collect();

        Diff {
            base_commit: None,
            target_commit: None,
            files,
        }
    }

    /// Attach the commit ids the diff was taken between
    #[must_use]
    pub fn with_commits(mut self, base: Option<String>, target: Option<String>) -> Self {
        self.base_commit = base;
        self.target_commit = target;
        self
    }

    /// All hunks in canonical order
    pub fn hunks(&self) -> impl Iterator<Item = &DiffHunk> {
        self.files.iter().flat_map(|file| file.hunks.iter())
    }

    /// All hunk ids in canonical order
    pub fn hunk_ids(&self) -> Vec<&str> {
        self.hunks().map(|h| h.id.as_str()).collect()
    }

    /// Map from hunk id to its canonical order index
    pub fn canonical_order(&self) -> HashMap<&str, usize> {
        self.hunks()
            .enumerate()
            .map(|(idx, h)| (h.id.as_str(), idx))
            .collect()
    }

    pub fn hunk_count(&self) -> usize {
        self.files.iter().map(|f| f.hunks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hunk_count() == 0
    }
}

/// Split on `\n` only, so a `\r` before the newline stays in the content
fn split_raw_lines(text: &str) -> Vec<&str> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').collect()
}

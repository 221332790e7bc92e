use crate::UnsupportedError;
use crate::diff::{ChangeKind, Diff, FileDiff};

/// Where the diff being split came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Commit,
    Staged,
}

/// Reject inputs that cannot be split safely outside dry-run mode.
///
/// Staged changes and root commits are refused, as is any file whose change
/// has no hunks to carry it (binary, rename-only, mode-only, empty add or
/// delete). Dry-run is always allowed.
pub fn check(diff: &Diff, source: Source, dry_run: bool) -> Result<(), UnsupportedError> {
    if dry_run {
        return Ok(());
    }
    if source == Source::Staged {
        return Err(UnsupportedError::StagedApply);
    }
    if diff.base_commit.is_none() {
        return Err(UnsupportedError::RootCommit);
    }

    let binary = paths(diff, |f| f.binary);
    let rename_only = paths(diff, |f| {
        !f.binary && f.kind == ChangeKind::Rename && f.hunks.is_empty()
    });
    let mode_only = paths(diff, |f| {
        !f.binary && f.kind == ChangeKind::Modify && f.hunks.is_empty()
    });
    // Added or deleted empty files have no hunk to carry them.
    let empty = paths(diff, |f| {
        !f.binary && matches!(f.kind, ChangeKind::Add | ChangeKind::Delete) && f.hunks.is_empty()
    });

    let details: Vec<String> = [
        ("binary files", binary),
        ("rename-only changes", rename_only),
        ("mode-only changes", mode_only),
        ("empty files", empty),
    ]
    .into_iter()
    .filter(|(_, paths)| !paths.is_empty())
    .map(|(label, paths)| format!("{label}: {}", paths.join(", ")))
    .collect();

    if details.is_empty() {
        Ok(())
    } else {
        Err(UnsupportedError::UnsupportedContent {
            details: details.join("; "),
        })
    }
}

fn paths(diff: &Diff, pred: impl Fn(&FileDiff) -> bool) -> Vec<String> {
    diff.files
        .iter()
        .filter(|f| pred(f))
        .map(FileDiff::display_path)
        .collect()
}

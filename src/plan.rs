//! Plans: a diff, its atomic changes and the commits proposed for them.
//!
//! A plan starts unchecked. [`Plan::validate`] is the only way to mark it
//! checked, and the apply engine refuses anything else.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::PlanError;
use crate::atomize::AtomicChange;
use crate::diff::Diff;

/// One proposed commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedCommit {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub atomic_change_ids: Vec<String>,
    /// Flattened hunks of the referenced atomic changes
    pub hunk_ids: Vec<String>,
    pub risk: Option<String>,
}

impl SuggestedCommit {
    /// Commit message: title, then a blank line and the body if present
    pub fn message(&self) -> String {
        match self.body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            Some(body) => format!("{}\n\n{}", self.title, body),
            None => self.title.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    diff: Diff,
    atomic_changes: Vec<AtomicChange>,
    commits: Vec<SuggestedCommit>,
    checked: bool,
}

impl Plan {
    /// Create an unchecked plan
    pub fn new(
        diff: Diff,
        atomic_changes: Vec<AtomicChange>,
        commits: Vec<SuggestedCommit>,
    ) -> Self {
        Self {
            diff,
            atomic_changes,
            commits,
            checked: false,
        }
    }

    pub fn diff(&self) -> &Diff {
        &self.diff
    }

    pub fn atomic_changes(&self) -> &[AtomicChange] {
        &self.atomic_changes
    }

    pub fn commits(&self) -> &[SuggestedCommit] {
        &self.commits
    }

    /// Mutable access to the commits. Clears the checked flag.
    pub fn commits_mut(&mut self) -> &mut Vec<SuggestedCommit> {
        self.checked = false;
        &mut self.commits
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Check coverage, uniqueness and per-file order, sorting the commits
    /// into canonical order on the way.
    ///
    /// Checks run in a fixed order and the first violation is returned:
    /// unknown hunk ids, coverage mismatch, duplicates, then reordering.
    pub fn validate(&mut self) -> Result<(), PlanError> {
        self.checked = false;
        let order = self.diff.canonical_order();

        for commit in &self.commits {
            if let Some(hunk) = commit
                .hunk_ids
                .iter()
                .find(|h| !order.contains_key(h.as_str()))
            {
                return Err(PlanError::UnknownHunk {
                    commit: commit.id.clone(),
                    hunk: hunk.clone(),
                });
            }
        }

        let covered: BTreeSet<&str> = self
            .commits
            .iter()
            .flat_map(|c| c.hunk_ids.iter().map(String::as_str))
            .collect();
        let expected: BTreeSet<&str> = order.keys().copied().collect();
        if covered != expected {
            return Err(PlanError::CoverageMismatch {
                missing: join(expected.difference(&covered)),
                extra: join(covered.difference(&expected)),
            });
        }

        let mut seen = HashSet::new();
        for commit in &self.commits {
            for hunk in &commit.hunk_ids {
                if !seen.insert(hunk.as_str()) {
                    return Err(PlanError::DuplicateHunk {
                        commit: commit.id.clone(),
                        hunk: hunk.clone(),
                    });
                }
            }
        }

        // Commits with no hunks sort last.
        self.commits.sort_by_key(|commit| {
            commit
                .hunk_ids
                .iter()
                .filter_map(|h| order.get(h.as_str()).copied())
                .min()
                .unwrap_or(usize::MAX)
        });

        let file_of: HashMap<&str, usize> = self
            .diff
            .files
            .iter()
            .enumerate()
            .flat_map(|(idx, file)| file.hunks.iter().map(move |h| (h.id.as_str(), idx)))
            .collect();
        let mut induced: Vec<Vec<&str>> = vec![Vec::new(); self.diff.files.len()];
        for hunk in self.commits.iter().flat_map(|c| c.hunk_ids.iter()) {
            if let Some(&idx) = file_of.get(hunk.as_str()) {
                induced[idx].push(hunk);
            }
        }
        for (file, actual) in self.diff.files.iter().zip(&induced) {
            let native: Vec<&str> = file.hunks.iter().map(|h| h.id.as_str()).collect();
            if &native != actual {
                return Err(PlanError::Reordered {
                    path: file.path().to_string(),
                    expected: native.join(", "),
                    actual: actual.join(", "),
                });
            }
        }

        debug!(commits = self.commits.len(), "plan validated");
        self.checked = true;
        Ok(())
    }
}

fn join<S: AsRef<str>>(ids: impl Iterator<Item = S>) -> String {
    ids.map(|id| id.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

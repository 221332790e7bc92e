use error_set::error_set;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

pub mod apply;
pub mod atomize;
pub mod config;
pub mod diff;
pub mod lang;
pub mod patch;
pub mod plan;
pub mod preflight;
pub mod propose;
pub mod repo;

pub use apply::{ApplyOutcome, CommitSummary, apply_plan};
pub use atomize::{AtomicChange, Tags, atomize};
pub use config::Config;
pub use diff::Diff;
pub use plan::{Plan, SuggestedCommit};
pub use propose::{CommitProposer, DefaultProposer};
pub use repo::{GitCli, RawDiff, Repository};

use preflight::Source;

error_set! {
    /// Top-level error for a split run
    SplitError := {
        #[display("interrupted")]
        Interrupted,
        #[display("No changes found in {target}")]
        NoChanges { target: String },
    } || RepoError || PlanError || UnsupportedError || PreconditionError || ConsistencyError || ProposeError

    /// Failure of a single repository operation
    RepoError := {
        #[display("git {operation} failed: {diagnostic}")]
        OperationFailed { operation: String, diagnostic: String },
    }

    /// Plan invariant violations
    PlanError := {
        #[display("commit {commit} references unknown hunk {hunk}")]
        UnknownHunk { commit: String, hunk: String },
        #[display("commits do not cover the diff exactly (missing: {missing}; extra: {extra})")]
        CoverageMismatch { missing: String, extra: String },
        #[display("hunk {hunk} appears in more than one commit (again in {commit})")]
        DuplicateHunk { commit: String, hunk: String },
        #[display("commit order reorders hunks of {path}: expected [{expected}], got [{actual}]")]
        Reordered { path: String, expected: String, actual: String },
        #[display("plan has not been validated")]
        NotValidated,
    }

    /// Inputs that can only be inspected with --dry-run
    UnsupportedError := {
        #[display("splitting staged changes is only supported with --dry-run")]
        StagedApply,
        #[display("root commits can only be split with --dry-run")]
        RootCommit,
        #[display("unsupported changes outside --dry-run: {details}")]
        UnsupportedContent { details: String },
    }

    /// Repository state that rules out applying
    PreconditionError := {
        #[display("cannot apply a plan without both base and target commits")]
        MissingCommits,
        #[display("working tree has uncommitted changes")]
        DirtyWorkingTree,
    }

    /// Post-apply checks that indicate a defect rather than user error
    ConsistencyError := {
        #[display("tree of {branch} does not match {target} after applying the plan")]
        TreeMismatch { target: String, branch: String },
    }

    /// Errors from a commit proposer
    ProposeError := {
        #[display("commit proposal failed: {message}")]
        ProposalFailed { message: String },
    }
}

/// Main interface for splitting a commit
pub struct Splitter<'a> {
    repo: &'a dyn Repository,
    proposer: &'a dyn CommitProposer,
    config: &'a Config,
}

impl<'a> Splitter<'a> {
    /// Create a splitter using the default one-commit-per-change proposer
    pub fn new(repo: &'a dyn Repository, config: &'a Config) -> Self {
        Self {
            repo,
            proposer: &DefaultProposer,
            config,
        }
    }

    /// Use a different commit proposer
    #[must_use]
    pub fn with_proposer(mut self, proposer: &'a dyn CommitProposer) -> Self {
        self.proposer = proposer;
        self
    }

    /// Build and validate a plan without touching the repository
    ///
    /// # Examples
    /// ```no_run
    /// # use git_split::{Config, GitCli, Splitter};
    /// let config = Config::default();
    /// let repo = GitCli::new(&config.repo_path);
    /// let plan = Splitter::new(&repo, &config).plan().unwrap();
    /// for commit in plan.commits() {
    ///     println!("{}: {}", commit.id, commit.title);
    /// }
    /// ```
    pub fn plan(&self) -> Result<Plan, SplitError> {
        let (raw, source) = if self.config.staged {
            (self.repo.diff_for_staged()?, Source::Staged)
        } else {
            (
                self.repo.diff_for_commit(self.config.target())?,
                Source::Commit,
            )
        };

        let diff = Diff::parse(&raw.text).with_commits(raw.base, raw.target);
        if diff.files.is_empty() {
            return Err(SplitError::NoChanges {
                target: match source {
                    Source::Staged => "the index".to_string(),
                    Source::Commit => self.config.target().to_string(),
                },
            });
        }
        debug!(
            files = diff.files.len(),
            hunks = diff.hunk_count(),
            "parsed diff"
        );

        preflight::check(&diff, source, self.config.dry_run)?;

        let changes = atomize(&diff);
        let commits = self.proposer.propose(&changes)?;
        let mut plan = Plan::new(diff, changes, commits);
        plan.validate()?;

        info!(
            "planned {} commits from {} atomic changes",
            plan.commits().len(),
            plan.atomic_changes().len()
        );
        for commit in plan.commits() {
            debug!(
                "  {}: {} ({} hunks)",
                commit.id,
                commit.title,
                commit.hunk_ids.len()
            );
        }
        Ok(plan)
    }

    /// Plan, then apply (or describe, with `dry_run`) the split
    ///
    /// # Examples
    /// ```no_run
    /// # use git_split::{Config, GitCli, Splitter};
    /// # use std::sync::atomic::AtomicBool;
    /// let config = Config { dry_run: true, ..Config::default() };
    /// let repo = GitCli::new(&config.repo_path);
    /// let outcome = Splitter::new(&repo, &config)
    ///     .run(&AtomicBool::new(false))
    ///     .unwrap();
    /// ```
    pub fn run(&self, cancel: &AtomicBool) -> Result<ApplyOutcome, SplitError> {
        apply_plan(self.plan()?, self.repo, self.config, cancel)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::repo::MockRepository;

    const COMMIT_DIFF: &str = r#"diff --git a/src/calc.py b/src/calc.py
--- a/src/calc.py
+++ b/src/calc.py
@@ -1 +1 @@ def compute
-x = 1
+x = 2
diff --git a/tests/test_calc.py b/tests/test_calc.py
--- a/tests/test_calc.py
+++ b/tests/test_calc.py
@@ -3 +3 @@ def compute
-assert x == 1
+assert x == 2
"#;

    fn raw(base: Option<&str>, target: Option<&str>) -> RawDiff {
        RawDiff {
            text: COMMIT_DIFF.to_string(),
            base: base.map(str::to_string),
            target: target.map(str::to_string),
        }
    }

    #[test]
    fn plan_from_commit() {
        let mut repo = MockRepository::new();
        repo.expect_diff_for_commit()
            .withf(|target: &str| target == "HEAD")
            .times(1)
            .returning(|_| Ok(raw(Some("base"), Some("target"))));

        let config = Config::default();
        let plan = Splitter::new(&repo, &config).plan().unwrap();
        assert!(plan.is_checked());
        let ids: Vec<&str> = plan.commits().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["src/calc.py::ac0", "tests/test_calc.py::ac0"]);
    }

    #[test]
    fn staged_needs_dry_run() {
        let mut repo = MockRepository::new();
        repo.expect_diff_for_staged()
            .returning(|| Ok(raw(Some("head"), None)));

        let config = Config {
            staged: true,
            ..Config::default()
        };
        let err = Splitter::new(&repo, &config).plan().unwrap_err();
        assert!(matches!(err, SplitError::StagedApply));

        let config = Config {
            staged: true,
            dry_run: true,
            ..Config::default()
        };
        let outcome = Splitter::new(&repo, &config)
            .run(&AtomicBool::new(false))
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::DryRun(ref commits) if commits.len() == 2));
    }

    #[test]
    fn empty_diff_reports_no_changes() {
        let mut repo = MockRepository::new();
        repo.expect_diff_for_commit().returning(|_| {
            Ok(RawDiff {
                text: String::new(),
                base: Some("base".into()),
                target: Some("target".into()),
            })
        });
        let config = Config {
            target: Some("abc123".into()),
            ..Config::default()
        };
        let err = Splitter::new(&repo, &config).plan().unwrap_err();
        assert_eq!(err.to_string(), "No changes found in abc123");
    }

    struct Everything;

    impl CommitProposer for Everything {
        fn propose(&self, changes: &[AtomicChange]) -> Result<Vec<SuggestedCommit>, ProposeError> {
            Ok(vec![SuggestedCommit {
                id: "all".into(),
                title: "Everything at once".into(),
                body: None,
                atomic_change_ids: changes.iter().map(|c| c.id.clone()).collect(),
                hunk_ids: changes.iter().flat_map(|c| c.hunk_ids.clone()).collect(),
                risk: None,
            }])
        }
    }

    struct Broken;

    impl CommitProposer for Broken {
        fn propose(&self, changes: &[AtomicChange]) -> Result<Vec<SuggestedCommit>, ProposeError> {
            Ok(changes
                .iter()
                .skip(1)
                .map(|c| SuggestedCommit {
                    id: c.id.clone(),
                    title: "partial".into(),
                    body: None,
                    atomic_change_ids: vec![c.id.clone()],
                    hunk_ids: c.hunk_ids.clone(),
                    risk: Some("high".into()),
                })
                .collect())
        }
    }

    #[test]
    fn custom_proposer_is_validated() {
        let mut repo = MockRepository::new();
        repo.expect_diff_for_commit()
            .returning(|_| Ok(raw(Some("base"), Some("target"))));
        let config = Config::default();

        let plan = Splitter::new(&repo, &config)
            .with_proposer(&Everything)
            .plan()
            .unwrap();
        assert_eq!(plan.commits().len(), 1);

        let err = Splitter::new(&repo, &config)
            .with_proposer(&Broken)
            .plan()
            .unwrap_err();
        assert!(matches!(err, SplitError::CoverageMismatch { .. }));
    }
}

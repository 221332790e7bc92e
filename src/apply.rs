//! Executing a validated plan as a series of commits on a fresh branch.
//!
//! Once the work branch exists every failure, interruption or panic rolls
//! the repository back: the original ref is checked out again and the
//! branch is force-deleted. Rollback errors are logged and never replace
//! the error that caused them.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::patch;
use crate::plan::Plan;
use crate::repo::Repository;
use crate::{ConsistencyError, PlanError, PreconditionError, SplitError};

/// Dry-run line for one commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub id: String,
    pub title: String,
    pub hunks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing was written
    DryRun(Vec<CommitSummary>),
    /// `commits` commits were created on `branch`
    Applied { branch: String, commits: usize },
}

/// Undo a partial apply unless disarmed
struct Rollback<'a, R: Repository + ?Sized> {
    repo: &'a R,
    original_ref: String,
    branch: String,
    armed: bool,
}

impl<'a, R: Repository + ?Sized> Rollback<'a, R> {
    fn arm(repo: &'a R, original_ref: String, branch: String) -> Self {
        Self {
            repo,
            original_ref,
            branch,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<R: Repository + ?Sized> Drop for Rollback<'_, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(branch = %self.branch, original = %self.original_ref, "rolling back partial split");
        if let Err(e) = self.repo.force_checkout(&self.original_ref) {
            error!(reference = %self.original_ref, "rollback could not return to original ref: {e}");
        }
        if let Err(e) = self.repo.delete_branch(&self.branch) {
            error!(branch = %self.branch, "rollback could not delete work branch: {e}");
        }
    }
}

/// Apply `plan` to `repo`, or describe it when `config.dry_run` is set.
///
/// `cancel` is polled before each mutating step; once set the run stops
/// with [`SplitError::Interrupted`] and rolls back. A git failure seen
/// after the flag is set is reported as an interruption too, since the
/// signal reaches the running `git` child as well.
pub fn apply_plan<R>(
    plan: Plan,
    repo: &R,
    config: &Config,
    cancel: &AtomicBool,
) -> Result<ApplyOutcome, SplitError>
where
    R: Repository + ?Sized,
{
    if !plan.is_checked() {
        return Err(PlanError::NotValidated.into());
    }
    check_cancel(cancel)?;

    if config.dry_run {
        info!("dry run: would apply {} commits", plan.commits().len());
        let summaries = plan
            .commits()
            .iter()
            .map(|commit| {
                info!("  commit {}: {} ({} hunks)", commit.id, commit.title, commit.hunk_ids.len());
                CommitSummary {
                    id: commit.id.clone(),
                    title: commit.title.clone(),
                    hunks: commit.hunk_ids.len(),
                }
            })
            .collect();
        return Ok(ApplyOutcome::DryRun(summaries));
    }

    execute(&plan, repo, config, cancel).map_err(|e| match e {
        e @ SplitError::OperationFailed { .. } if cancel.load(Ordering::SeqCst) => {
            warn!("git failed after interrupt: {e}");
            SplitError::Interrupted
        }
        other => other,
    })
}

fn execute<R>(
    plan: &Plan,
    repo: &R,
    config: &Config,
    cancel: &AtomicBool,
) -> Result<ApplyOutcome, SplitError>
where
    R: Repository + ?Sized,
{
    let diff = plan.diff();
    let (Some(base), Some(target)) = (diff.base_commit.as_deref(), diff.target_commit.as_deref())
    else {
        return Err(PreconditionError::MissingCommits.into());
    };

    if !repo.is_clean()? {
        return Err(PreconditionError::DirtyWorkingTree.into());
    }
    let original_ref = repo.current_ref()?;
    let branch = config.branch_name(target);

    check_cancel(cancel)?;
    info!(%branch, %base, "creating work branch");
    repo.create_branch(&branch, base)?;
    let mut rollback = Rollback::arm(repo, original_ref, branch.clone());

    check_cancel(cancel)?;
    repo.checkout(&branch)?;

    let mut created = 0;
    for commit in plan.commits() {
        check_cancel(cancel)?;

        let patch = patch::render(diff, &commit.hunk_ids);
        if patch.trim().is_empty() {
            warn!(commit = %commit.id, "generated empty patch, skipping");
            continue;
        }

        info!(commit = %commit.id, "applying: {}", commit.title);
        repo.apply_to_index(&patch)?;
        check_cancel(cancel)?;
        repo.commit(&commit.message())?;
        created += 1;
    }

    if !repo.trees_equal(target, "HEAD")? {
        return Err(ConsistencyError::TreeMismatch {
            target: target.to_string(),
            branch,
        }
        .into());
    }
    debug!("final tree matches target");

    repo.sync_worktree()?;
    rollback.disarm();

    info!(%branch, commits = created, "split applied; final tree matches {target}");
    Ok(ApplyOutcome::Applied {
        branch,
        commits: created,
    })
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), SplitError> {
    if cancel.load(Ordering::SeqCst) {
        return Err(SplitError::Interrupted);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::RepoError;
    use crate::atomize::atomize;
    use crate::diff::Diff;
    use crate::plan::SuggestedCommit;
    use crate::propose::{CommitProposer, DefaultProposer};
    use crate::repo::MockRepository;
    use mockall::Sequence;
    use std::sync::Arc;
    use similar_asserts::assert_eq;

    const BASE: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TARGET: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const BRANCH: &str = "git-split/split-bbbbbbb";

    const DIFF: &str = r#"diff --git a/m.py b/m.py
--- a/m.py
+++ b/m.py
@@ -1 +1 @@ def foo
-a = 1
+a = 2
@@ -9 +9 @@ def bar
-b = 1
+b = 2
"#;

    fn plan_from(diff: Diff, extra: Vec<SuggestedCommit>) -> Plan {
        let changes = atomize(&diff);
        let mut commits = DefaultProposer.propose(&changes).unwrap();
        commits.extend(extra);
        let mut plan = Plan::new(diff, changes, commits);
        plan.validate().unwrap();
        plan
    }

    fn plan() -> Plan {
        plan_from(
            Diff::parse(DIFF).with_commits(Some(BASE.into()), Some(TARGET.into())),
            vec![],
        )
    }

    fn failure(operation: &str) -> RepoError {
        RepoError::OperationFailed {
            operation: operation.to_string(),
            diagnostic: "boom".to_string(),
        }
    }

    /// Expectations for everything up to and including checkout
    fn expect_setup(repo: &mut MockRepository) {
        repo.expect_is_clean().times(1).returning(|| Ok(true));
        repo.expect_current_ref()
            .times(1)
            .returning(|| Ok("main".to_string()));
        repo.expect_create_branch()
            .withf(|name: &str, start: &str| name == BRANCH && start == BASE)
            .times(1)
            .returning(|_, _| Ok(()));
        repo.expect_checkout()
            .withf(|reference: &str| reference == BRANCH)
            .times(1)
            .returning(|_| Ok(()));
    }

    fn expect_rollback(repo: &mut MockRepository) {
        repo.expect_force_checkout()
            .withf(|reference: &str| reference == "main")
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_delete_branch()
            .withf(|name: &str| name == BRANCH)
            .times(1)
            .returning(|_| Ok(()));
    }

    fn run(plan: Plan, repo: &MockRepository) -> Result<ApplyOutcome, SplitError> {
        apply_plan(plan, repo, &Config::default(), &AtomicBool::new(false))
    }

    #[test]
    fn dry_run_touches_nothing() {
        let repo = MockRepository::new();
        let config = Config {
            dry_run: true,
            ..Config::default()
        };
        let outcome = apply_plan(plan(), &repo, &config, &AtomicBool::new(false)).unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::DryRun(vec![
                CommitSummary {
                    id: "m.py::ac0".into(),
                    title: "Changes in m.py (def foo)".into(),
                    hunks: 1,
                },
                CommitSummary {
                    id: "m.py::ac1".into(),
                    title: "Changes in m.py (def bar)".into(),
                    hunks: 1,
                },
            ])
        );
    }

    #[test]
    fn unvalidated_plan_is_refused() {
        let repo = MockRepository::new();
        let unchecked = Plan::new(Diff::parse(DIFF), vec![], vec![]);
        let err = run(unchecked, &repo).unwrap_err();
        assert!(matches!(err, SplitError::NotValidated));
    }

    #[test]
    fn missing_commit_ids_are_refused() {
        let repo = MockRepository::new();
        let err = run(plan_from(Diff::parse(DIFF), vec![]), &repo).unwrap_err();
        assert!(matches!(err, SplitError::MissingCommits));
    }

    #[test]
    fn dirty_tree_is_refused_before_branching() {
        let mut repo = MockRepository::new();
        repo.expect_is_clean().times(1).returning(|| Ok(false));
        let err = run(plan(), &repo).unwrap_err();
        assert!(matches!(err, SplitError::DirtyWorkingTree));
    }

    #[test]
    fn existing_branch_fails_without_rollback() {
        let mut repo = MockRepository::new();
        repo.expect_is_clean().returning(|| Ok(true));
        repo.expect_current_ref().returning(|| Ok("main".to_string()));
        repo.expect_create_branch()
            .returning(|_, _| Err(failure("branch")));
        let err = run(plan(), &repo).unwrap_err();
        assert!(matches!(err, SplitError::OperationFailed { ref operation, .. } if operation == "branch"));
    }

    #[test]
    fn applies_each_commit_in_order() {
        let mut repo = MockRepository::new();
        let mut seq = Sequence::new();
        expect_setup(&mut repo);

        for (header, title) in [
            ("@@ -1 +1 @@ def foo", "Changes in m.py (def foo)"),
            ("@@ -9 +9 @@ def bar", "Changes in m.py (def bar)"),
        ] {
            repo.expect_apply_to_index()
                .withf(move |patch: &str| {
                    patch.starts_with("diff --git a/m.py b/m.py\n") && patch.contains(header)
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
            repo.expect_commit()
                .withf(move |message: &str| message == title)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }
        repo.expect_trees_equal()
            .withf(|a: &str, b: &str| a == TARGET && b == "HEAD")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(true));
        repo.expect_sync_worktree()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let outcome = run(plan(), &repo).unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Applied {
                branch: BRANCH.to_string(),
                commits: 2,
            }
        );
    }

    #[test]
    fn empty_commits_are_skipped() {
        let mut repo = MockRepository::new();
        expect_setup(&mut repo);
        repo.expect_apply_to_index().times(2).returning(|_| Ok(()));
        repo.expect_commit().times(2).returning(|_| Ok(()));
        repo.expect_trees_equal().returning(|_, _| Ok(true));
        repo.expect_sync_worktree().returning(|| Ok(()));

        let empty = SuggestedCommit {
            id: "empty".into(),
            title: "Nothing".into(),
            body: None,
            atomic_change_ids: vec![],
            hunk_ids: vec![],
            risk: None,
        };
        let plan = plan_from(
            Diff::parse(DIFF).with_commits(Some(BASE.into()), Some(TARGET.into())),
            vec![empty],
        );
        let outcome = run(plan, &repo).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { commits: 2, .. }));
    }

    #[test]
    fn tree_mismatch_rolls_back_and_reports() {
        let mut repo = MockRepository::new();
        expect_setup(&mut repo);
        repo.expect_apply_to_index().returning(|_| Ok(()));
        repo.expect_commit().returning(|_| Ok(()));
        repo.expect_trees_equal().times(1).returning(|_, _| Ok(false));
        expect_rollback(&mut repo);

        let err = run(plan(), &repo).unwrap_err();
        match &err {
            SplitError::TreeMismatch { target, branch } => {
                assert_eq!(target, TARGET);
                assert_eq!(branch, BRANCH);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rollback_failure_keeps_original_error() {
        let mut repo = MockRepository::new();
        expect_setup(&mut repo);
        repo.expect_apply_to_index()
            .times(1)
            .returning(|_| Err(failure("apply")));
        repo.expect_force_checkout()
            .times(1)
            .returning(|_| Err(failure("checkout")));
        repo.expect_delete_branch()
            .withf(|name: &str| name == BRANCH)
            .times(1)
            .returning(|_| Ok(()));

        let err = run(plan(), &repo).unwrap_err();
        assert!(matches!(err, SplitError::OperationFailed { ref operation, .. } if operation == "apply"));
    }

    #[test]
    fn interruption_before_branching_touches_nothing() {
        let mut repo = MockRepository::new();
        repo.expect_is_clean().never();
        repo.expect_create_branch().never();
        repo.expect_force_checkout().never();

        let cancel = AtomicBool::new(true);
        let err = apply_plan(plan(), &repo, &Config::default(), &cancel).unwrap_err();
        assert!(matches!(err, SplitError::Interrupted));

        let config = Config {
            dry_run: true,
            ..Config::default()
        };
        let err = apply_plan(plan(), &repo, &config, &cancel).unwrap_err();
        assert!(matches!(err, SplitError::Interrupted));
    }

    #[test]
    fn interruption_after_branching_rolls_back() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut repo = MockRepository::new();
        repo.expect_is_clean().returning(|| Ok(true));
        repo.expect_current_ref().returning(|| Ok("main".to_string()));
        let flag = Arc::clone(&cancel);
        repo.expect_create_branch().times(1).returning(move |_, _| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        repo.expect_checkout().never();
        repo.expect_apply_to_index().never();
        expect_rollback(&mut repo);

        let err = apply_plan(plan(), &repo, &Config::default(), &cancel).unwrap_err();
        assert!(matches!(err, SplitError::Interrupted));
    }

    #[test]
    fn git_killed_by_interrupt_reports_interruption() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut repo = MockRepository::new();
        expect_setup(&mut repo);
        let flag = Arc::clone(&cancel);
        repo.expect_apply_to_index().times(1).returning(move |_| {
            flag.store(true, Ordering::SeqCst);
            Err(RepoError::OperationFailed {
                operation: "apply".to_string(),
                diagnostic: "killed by signal".to_string(),
            })
        });
        repo.expect_commit().never();
        expect_rollback(&mut repo);

        let err = apply_plan(plan(), &repo, &Config::default(), &cancel).unwrap_err();
        assert!(matches!(err, SplitError::Interrupted));
    }
}

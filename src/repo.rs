//! Repository access.
//!
//! The pipeline only talks to git through [`Repository`]; [`GitCli`] is the
//! implementation that shells out to the `git` binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::RepoError;

/// Object id of the empty tree, used as the base of root commits
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

const DIFF_ARGS: [&str; 6] = [
    "--no-ext-diff",
    "--no-color",
    "--no-textconv",
    "--find-renames",
    "--src-prefix=a/",
    "--dst-prefix=b/",
];

/// Diff text plus the commits it was taken between
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDiff {
    pub text: String,
    /// Absent for root commits
    pub base: Option<String>,
    /// Absent for staged changes
    pub target: Option<String>,
}

/// Version-control operations the split pipeline depends on
#[cfg_attr(test, mockall::automock)]
pub trait Repository {
    /// Current branch name, or the commit id when detached
    fn current_ref(&self) -> Result<String, RepoError>;

    /// True when tracked files have no staged or unstaged changes
    fn is_clean(&self) -> Result<bool, RepoError>;

    /// Diff of `target` against its first parent (or the empty tree)
    fn diff_for_commit(&self, target: &str) -> Result<RawDiff, RepoError>;

    /// Diff of the index against HEAD
    fn diff_for_staged(&self) -> Result<RawDiff, RepoError>;

    /// Create `name` at `start`; fails if it already exists
    fn create_branch(&self, name: &str, start: &str) -> Result<(), RepoError>;

    fn checkout(&self, reference: &str) -> Result<(), RepoError>;

    /// Checkout discarding index and working tree changes
    fn force_checkout(&self, reference: &str) -> Result<(), RepoError>;

    /// Apply a patch to the index only
    fn apply_to_index(&self, patch: &str) -> Result<(), RepoError>;

    /// Commit the index
    fn commit(&self, message: &str) -> Result<(), RepoError>;

    fn trees_equal(&self, a: &str, b: &str) -> Result<bool, RepoError>;

    fn delete_branch(&self, name: &str) -> Result<(), RepoError>;

    /// Bring index and working tree in line with HEAD
    fn sync_worktree(&self) -> Result<(), RepoError>;
}

/// [`Repository`] backed by the `git` command line
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
}

impl GitCli {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn command(&self, args: &[&str]) -> Command {
        debug!(?args, "running git");
        let mut command = Command::new("git");
        command.arg("-C").arg(&self.repo_path).args(args);
        command
    }

    /// Run git and return stdout, failing on a non-zero exit
    fn run(&self, operation: &str, args: &[&str]) -> Result<String, RepoError> {
        let output = self
            .command(args)
            .output()
            .map_err(|e| failed(operation, e))?;
        stdout_of(operation, output)
    }

    /// Run git and return stdout, or `None` on a non-zero exit
    fn probe(&self, operation: &str, args: &[&str]) -> Result<Option<String>, RepoError> {
        let output = self
            .command(args)
            .output()
            .map_err(|e| failed(operation, e))?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    /// Run git with `input` on stdin
    fn run_with_input(&self, operation: &str, args: &[&str], input: &str) -> Result<(), RepoError> {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(operation, e))?;

        child
            .stdin
            .take()
            .ok_or_else(|| failed(operation, "no stdin handle"))?
            .write_all(input.as_bytes())
            .map_err(|e| failed(operation, e))?;

        let output = child
            .wait_with_output()
            .map_err(|e| failed(operation, e))?;
        stdout_of(operation, output).map(|_| ())
    }

    fn resolve_commit(&self, rev: &str) -> Result<Option<String>, RepoError> {
        self.probe(
            "rev-parse",
            &["rev-parse", "--verify", "--quiet", &format!("{rev}^{{commit}}")],
        )
    }
}

impl Repository for GitCli {
    fn current_ref(&self) -> Result<String, RepoError> {
        if let Some(branch) = self.probe(
            "symbolic-ref",
            &["symbolic-ref", "--quiet", "--short", "HEAD"],
        )? {
            return Ok(branch);
        }
        Ok(self.run("rev-parse", &["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn is_clean(&self) -> Result<bool, RepoError> {
        let status = self.run(
            "status",
            &["status", "--porcelain", "--untracked-files=no"],
        )?;
        Ok(status.trim().is_empty())
    }

    fn diff_for_commit(&self, target: &str) -> Result<RawDiff, RepoError> {
        let target_id = self
            .resolve_commit(target)?
            .ok_or_else(|| failed("rev-parse", format!("unknown revision {target}")))?;
        let base = self.resolve_commit(&format!("{target_id}^"))?;

        let mut args = vec!["diff"];
        args.extend(DIFF_ARGS);
        args.push(base.as_deref().unwrap_or(EMPTY_TREE));
        args.push(&target_id);
        let text = self.run("diff", &args)?;

        Ok(RawDiff {
            text,
            base,
            target: Some(target_id),
        })
    }

    fn diff_for_staged(&self) -> Result<RawDiff, RepoError> {
        let base = self.resolve_commit("HEAD")?;

        let mut args = vec!["diff", "--cached"];
        args.extend(DIFF_ARGS);
        let text = self.run("diff", &args)?;

        Ok(RawDiff {
            text,
            base,
            target: None,
        })
    }

    fn create_branch(&self, name: &str, start: &str) -> Result<(), RepoError> {
        self.run("branch", &["branch", name, start]).map(|_| ())
    }

    fn checkout(&self, reference: &str) -> Result<(), RepoError> {
        self.run("checkout", &["checkout", "-q", reference]).map(|_| ())
    }

    fn force_checkout(&self, reference: &str) -> Result<(), RepoError> {
        self.run("checkout", &["checkout", "-q", "-f", reference])
            .map(|_| ())
    }

    fn apply_to_index(&self, patch: &str) -> Result<(), RepoError> {
        self.run_with_input("apply", &["apply", "--cached", "-"], patch)
    }

    fn commit(&self, message: &str) -> Result<(), RepoError> {
        self.run("commit", &["commit", "-q", "--no-verify", "-m", message])
            .map(|_| ())
    }

    fn trees_equal(&self, a: &str, b: &str) -> Result<bool, RepoError> {
        let tree_a = self.run("rev-parse", &["rev-parse", &format!("{a}^{{tree}}")])?;
        let tree_b = self.run("rev-parse", &["rev-parse", &format!("{b}^{{tree}}")])?;
        Ok(tree_a.trim() == tree_b.trim())
    }

    fn delete_branch(&self, name: &str) -> Result<(), RepoError> {
        self.run("branch", &["branch", "-D", name]).map(|_| ())
    }

    fn sync_worktree(&self) -> Result<(), RepoError> {
        self.run("reset", &["reset", "-q", "--hard", "HEAD"]).map(|_| ())
    }
}

fn failed(operation: &str, diagnostic: impl ToString) -> RepoError {
    RepoError::OperationFailed {
        operation: operation.to_string(),
        diagnostic: diagnostic.to_string(),
    }
}

fn stdout_of(operation: &str, output: Output) -> Result<String, RepoError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(operation, stderr.trim()));
    }
    String::from_utf8(output.stdout).map_err(|e| failed(operation, e))
}

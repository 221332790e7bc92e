use std::path::PathBuf;

/// Branch namespace used when none is given
pub const DEFAULT_BRANCH_PREFIX: &str = "git-split";

/// Settings for one split run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub repo_path: PathBuf,
    /// Commit to split; `HEAD` when absent
    pub target: Option<String>,
    /// Split the staged index instead of a commit
    pub staged: bool,
    pub dry_run: bool,
    pub branch_prefix: String,
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            target: None,
            staged: false,
            dry_run: false,
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            verbosity: 0,
        }
    }
}

impl Config {
    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or("HEAD")
    }

    /// Work branch for a target commit id: `<prefix>/split-<short id>`
    pub fn branch_name(&self, target_id: &str) -> String {
        let short: String = target_id.chars().take(7).collect();
        format!("{}/split-{short}", self.branch_prefix)
    }
}

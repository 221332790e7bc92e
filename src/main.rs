use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing_subscriber::EnvFilter;

use git_split::config::DEFAULT_BRANCH_PREFIX;
use git_split::{ApplyOutcome, Config, GitCli, SplitError, Splitter};

#[derive(Parser)]
#[command(name = "git-split")]
#[command(about = "Split one oversized commit into an ordered series of smaller commits")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a commit (default HEAD) onto a new branch
    Split {
        /// Commit to split
        target: Option<String>,

        /// Split the staged index instead of a commit (dry-run only)
        #[arg(long, conflicts_with = "target")]
        staged: bool,

        /// Print the planned commits without touching the repository
        #[arg(long)]
        dry_run: bool,

        /// Repository to operate on
        #[arg(short = 'C', value_name = "PATH", default_value = ".")]
        repo: PathBuf,

        /// Namespace for the work branch
        #[arg(long, value_name = "PREFIX", default_value = DEFAULT_BRANCH_PREFIX)]
        branch_prefix: String,

        /// Increase log output (-v info, -vv debug)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
    /// Print the man page
    Man,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Split {
            target,
            staged,
            dry_run,
            repo,
            branch_prefix,
            verbose,
        } => {
            let config = Config {
                repo_path: repo,
                target,
                staged,
                dry_run,
                branch_prefix,
                verbosity: verbose,
            };
            init_logging(config.verbosity);
            match split(&config) {
                Ok(()) => ExitCode::SUCCESS,
                Err(SplitError::Interrupted) => {
                    eprintln!("git-split: interrupted");
                    ExitCode::from(130)
                }
                Err(e) => {
                    eprintln!("git-split: error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "git-split", &mut io::stdout());
            ExitCode::SUCCESS
        }
        Commands::Man => match clap_mangen::Man::new(Cli::command()).render(&mut io::stdout()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("git-split: error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn split(config: &Config) -> Result<(), SplitError> {
    let cancel = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        // A second signal while the first is still being handled exits at once.
        let registered = signal_hook::flag::register_conditional_shutdown(signal, 130, Arc::clone(&cancel))
            .and_then(|_| signal_hook::flag::register(signal, Arc::clone(&cancel)));
        if let Err(e) = registered {
            tracing::warn!("could not register handler for signal {signal}: {e}");
        }
    }

    let repo = GitCli::new(&config.repo_path);
    match Splitter::new(&repo, config).run(&cancel)? {
        ApplyOutcome::DryRun(commits) => {
            for commit in commits {
                println!("{}: {} ({} hunks)", commit.id, commit.title, commit.hunks);
            }
        }
        ApplyOutcome::Applied { branch, commits } => {
            println!("Created {commits} commits on {branch}");
        }
    }
    Ok(())
}

/// Install the stderr subscriber; `RUST_LOG` overrides `-v`
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

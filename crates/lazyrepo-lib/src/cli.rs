use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands;

/// Env var controlling log verbosity, in `tracing_subscriber::EnvFilter`
/// syntax (e.g. `LAZY_LOG=lazyrepo_lib=debug`).
pub const LOG_ENV_VAR: &str = "LAZY_LOG";

#[derive(Debug, Parser)]
#[command(name = "lazy", version, about = "A caching task runner for workspaces")]
pub struct Args {
    /// Run as if started in this directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub cwd: Option<Utf8PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run tasks across the workspace, skipping work whose inputs are
    /// unchanged.
    Run {
        /// Task names to run.
        #[arg(required = true)]
        tasks: Vec<String>,
        /// Only run in packages whose directory is prefix-related to one of
        /// these paths.
        #[arg(long, value_name = "PATH")]
        filter: Vec<Utf8PathBuf>,
        /// Run everything even when the cache says it is fresh.
        #[arg(long)]
        force: bool,
        /// Maximum number of concurrently running tasks. Defaults to the
        /// number of CPUs.
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
        /// Extra arguments appended to every task command.
        #[arg(last = true)]
        pass_through_args: Vec<String>,
    },
    /// Delete all cached task state (`.lazy` directories).
    Clean,
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    #[error(transparent)]
    Path(#[from] lazyrepo_paths::PathError),
    #[error(transparent)]
    Repository(#[from] lazyrepo_repository::Error),
    #[error(transparent)]
    Config(#[from] crate::config::Error),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] crate::engine::BuilderError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Run(#[from] crate::run::Error),
    #[error("--filter path {path} is outside the workspace rooted at {root}")]
    FilterOutsideWorkspace { path: String, root: String },
    #[error("failed to start the async runtime: {0}")]
    Runtime(std::io::Error),
}

/// Parses args, sets up logging, and dispatches. Returns the exit code.
pub fn run() -> Result<i32, Error> {
    init_logging();
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;

    match args.command {
        Command::Run {
            ref tasks,
            ref filter,
            force,
            concurrency,
            ref pass_through_args,
        } => runtime.block_on(commands::run::run(
            args.cwd.as_deref(),
            tasks,
            filter,
            force,
            concurrency,
            pass_through_args,
        )),
        Command::Clean => commands::clean::run(args.cwd.as_deref()),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_passthrough() {
        let args = Args::parse_from([
            "lazy",
            "run",
            "build",
            "--filter",
            "packages/utils",
            "--force",
            "--",
            "--watch",
        ]);
        match args.command {
            Command::Run {
                tasks,
                filter,
                force,
                pass_through_args,
                ..
            } => {
                assert_eq!(tasks, vec!["build"]);
                assert_eq!(filter, vec![Utf8PathBuf::from("packages/utils")]);
                assert!(force);
                assert_eq!(pass_through_args, vec!["--watch"]);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_requires_a_task() {
        assert!(Args::try_parse_from(["lazy", "run"]).is_err());
    }
}

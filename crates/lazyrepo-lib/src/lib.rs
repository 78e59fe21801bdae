//! The lazyrepo library: CLI surface, configuration, task-graph engine, and
//! the caching scheduler. The `lazy` binary is a thin shim over
//! [`main`].

mod cli;
mod commands;
mod config;
mod engine;
mod env;
mod run;
mod task_config;
mod ui;

pub use cli::Args;
pub use config::ConfigLoader;
pub use engine::{Engine, EngineBuilder, ResolvedRunsAfter, RunRequest, ScheduledTask};
pub use env::EnvironmentMap;
pub use run::{Run, RunOpts, RunSummary, TaskStatus};
pub use task_config::{
    BaseCacheConfig, CacheConfig, CacheSetting, GlobSpec, LazyConfig, RunType, RunsAfter,
    TaskConfig,
};

/// Entry point used by the binary shim. Returns the process exit code.
pub fn main() -> i32 {
    match cli::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            1
        }
    }
}

// CLI subcommand dispatch.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use tracing::debug;

use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

pub mod publish;
pub mod status;
pub mod token;

#[derive(Subcommand)]
pub enum Command {
    /// Commit pending changes and push them with a verified credential
    Publish(publish::PublishArgs),
    /// Show branch, remote, and pending changes without touching credentials
    Status(status::StatusArgs),
    /// Check or store the hosting-service credential
    Token(token::TokenArgs),
}

pub fn run(cmd: Command) -> ExitCode {
    let (format, result) = match cmd {
        Command::Publish(args) => (OutputFormat::detect(args.json), publish::run(args)),
        Command::Status(args) => (OutputFormat::detect(args.json), status::run(args)),
        Command::Token(args) => (OutputFormat::detect(args.json()), token::run(args)),
    };
    let code = match result {
        Ok(code) => code,
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error)
        }
    };
    debug!(exit_code = code.code(), "command finished");
    code
}

/// Absolute repository path; relative paths resolve against the cwd.
pub(crate) fn resolve_repo(repo: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(repo).with_context(|| format!("repository `{}` not found", repo.display()))
}

/// The whole invocation runs on one current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_repo_makes_paths_absolute() {
        let tmp = TempDir::new().unwrap();
        let resolved = resolve_repo(tmp.path()).unwrap();
        assert!(resolved.is_absolute());
    }

    #[test]
    fn resolve_repo_reports_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_repo(&tmp.path().join("missing")).unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }

    #[test]
    fn block_on_drives_a_future() {
        assert_eq!(block_on(async { 7 }).unwrap(), 7);
    }
}

// `catsync status`: repository, remote, and pending changes.

use std::path::PathBuf;

use anyhow::Context;
use catsync_engine::config::SyncConfig;
use catsync_engine::git::worker::GitWorker;
use catsync_engine::StatusReport;
use clap::Args;

use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatusArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let repo = super::resolve_repo(&args.repo)?;
    let config = SyncConfig::load_for(&repo).context("failed to load catsync config")?;
    let report = catsync_engine::status(&GitWorker::new(&repo), &config)?;
    output::print_output(format, &report, format_human)?;
    Ok(ExitCode::Success)
}

fn format_human(report: &StatusReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} on {}",
        report.repo.display(),
        report.branch.as_deref().unwrap_or("(detached)")
    ));

    match (&report.remote_url, report.protocol) {
        (Some(url), Some(protocol)) => {
            lines.push(format!("  remote {}: {url} ({})", report.remote, protocol.as_str()));
        }
        (Some(url), None) => lines.push(format!("  remote {}: {url} (unsupported)", report.remote)),
        (None, _) => lines.push(format!("  remote {}: not configured", report.remote)),
    }
    if report.credential_in_url {
        lines.push("  warning: the remote URL still embeds a credential".into());
    }

    if report.pending.is_empty() {
        lines.push("  Working tree clean.".into());
    } else {
        lines.push(format!("  Pending changes ({})", report.pending.len()));
        for entry in &report.pending {
            lines.push(format!("    {entry}"));
        }
    }
    lines.join("\n")
}

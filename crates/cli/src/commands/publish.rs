// `catsync publish`: commit pending changes and push them.

use std::path::PathBuf;

use anyhow::Context;
use catsync_engine::confirm::ConfirmationOutcome;
use catsync_engine::{PublishOptions, PublishReport, PublishRequest};
use clap::Args;

use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Repository to publish.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    /// Commit message (default: configured prefix plus timestamp).
    #[arg(short, long)]
    pub message: Option<String>,
    /// Branch to push (default: configured branch, else the current one).
    #[arg(long)]
    pub branch: Option<String>,
    /// Never prompt for a credential; fail if none is stored.
    #[arg(long)]
    pub no_prompt: bool,
    /// Skip the graphical history viewer and print the text graph.
    #[arg(long)]
    pub no_viewer: bool,
    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PublishArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let repo = super::resolve_repo(&args.repo)?;
    let request = PublishRequest { message: args.message, branch: args.branch };
    let options = PublishOptions { prompt: !args.no_prompt, viewer: !args.no_viewer };

    let report = super::block_on(catsync_engine::publish(&repo, request, options))?
        .context("publish could not start")?;

    output::print_output(format, &report, format_human)?;
    Ok(ExitCode::from_report(&report))
}

fn format_human(report: &PublishReport) -> String {
    let mut lines = vec![report.summary()];
    for attempt in &report.attempts {
        lines.push(format!("  push {}: {:?}", attempt.sequence, attempt.outcome));
    }
    match &report.confirmation {
        Some(ConfirmationOutcome::ViewerShown { .. }) => lines.push("  history opened in viewer".into()),
        Some(ConfirmationOutcome::Unavailable { reason }) => {
            lines.push(format!("  history unavailable: {reason}"));
        }
        Some(ConfirmationOutcome::TextGraph { .. }) | None => {}
    }
    if report.success {
        lines.push(format!("  log: {}", report.masked_log.display()));
    }
    lines.join("\n")
}

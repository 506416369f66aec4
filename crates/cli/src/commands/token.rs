// `catsync token`: check or store the hosting-service credential.

use std::path::PathBuf;

use anyhow::Context;
use catsync_common::remote::normalize;
use catsync_engine::config::SyncConfig;
use catsync_engine::credential::AcquiredCredential;
use catsync_engine::git::worker::GitWorker;
use catsync_engine::prompt::{Prompter, TerminalPrompter};
use catsync_engine::secret::SecretStore;
use catsync_engine::{credential_acquirer, RunContext};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

/// Probe host when the repository has no usable remote.
const DEFAULT_HOST: &str = "github.com";

#[derive(Debug, Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub action: TokenAction,
}

impl TokenArgs {
    pub fn json(&self) -> bool {
        match &self.action {
            TokenAction::Check(args) => args.json,
            TokenAction::Set(args) => args.json,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum TokenAction {
    /// Validate the stored credential, prompting if none is usable
    Check(TokenCheckArgs),
    /// Prompt for a new credential, validate it, and store it
    Set(TokenSetArgs),
}

#[derive(Debug, Args)]
pub struct TokenCheckArgs {
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    /// Only check stored sources.
    #[arg(long)]
    pub no_prompt: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TokenSetArgs {
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenReport {
    pub source: String,
    /// Syntactic class, e.g. `classic` or `fine-grained`.
    pub classification: String,
    pub length: usize,
    pub login: Option<String>,
    pub saved_to: Option<PathBuf>,
    pub masked_log: PathBuf,
}

impl TokenReport {
    fn new(acquired: &AcquiredCredential, saved_to: Option<PathBuf>, ctx: &RunContext) -> Self {
        Self {
            source: acquired.credential.source().to_string(),
            classification: acquired.credential.classification().label().to_string(),
            length: acquired.credential.len(),
            login: acquired.login.clone(),
            saved_to,
            masked_log: ctx.audit.masked_path().to_path_buf(),
        }
    }
}

pub fn run(args: TokenArgs) -> anyhow::Result<ExitCode> {
    match args.action {
        TokenAction::Check(args) => check(args),
        TokenAction::Set(args) => set(args),
    }
}

fn check(args: TokenCheckArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let prompter = if args.no_prompt {
        None
    } else {
        TerminalPrompter::open().map(|p| Box::new(p) as Box<dyn Prompter>)
    };
    let ctx = open_context(&args.repo, prompter.is_some())?;

    let mut acquirer = credential_acquirer(&ctx, &remote_host(&ctx), None, prompter, None)?;
    let acquired = super::block_on(acquirer.acquire(false))??;

    output::print_output(format, &TokenReport::new(&acquired, None, &ctx), format_human)?;
    Ok(ExitCode::Success)
}

fn set(args: TokenSetArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let prompter = TerminalPrompter::open().context("no terminal available to read the token")?;
    let ctx = open_context(&args.repo, true)?;

    let mut acquirer =
        credential_acquirer(&ctx, &remote_host(&ctx), None, Some(Box::new(prompter)), None)?
            .with_persist_prompted(false);
    let acquired = super::block_on(acquirer.acquire(true))??;

    let store = SecretStore::from_config(&ctx.config.credential, &ctx.repo);
    let path = store.persist(&acquired.credential)?;
    ctx.audit.info(format!("credential saved to {}", path.display()));

    output::print_output(format, &TokenReport::new(&acquired, Some(path), &ctx), format_human)?;
    Ok(ExitCode::Success)
}

fn open_context(repo: &std::path::Path, interactive: bool) -> anyhow::Result<RunContext> {
    let repo = super::resolve_repo(repo)?;
    let config = SyncConfig::load_for(&repo).context("failed to load catsync config")?;
    RunContext::open(&repo, config, interactive).context("failed to open the audit log")
}

/// Host of the configured remote, so enterprise remotes probe their own API.
fn remote_host(ctx: &RunContext) -> String {
    GitWorker::new(&ctx.repo)
        .remote_get_url(&ctx.config.publish.remote)
        .ok()
        .and_then(|output| normalize(output.stdout.trim()).ok())
        .map_or_else(|| DEFAULT_HOST.to_string(), |descriptor| descriptor.host().to_string())
}

fn format_human(report: &TokenReport) -> String {
    let mut line = format!(
        "valid {} token ({} chars) from {}",
        report.classification, report.length, report.source
    );
    if let Some(login) = &report.login {
        line.push_str(&format!(" for {login}"));
    }
    if let Some(path) = &report.saved_to {
        line.push_str(&format!("\n  saved to {}", path.display()));
    }
    line
}

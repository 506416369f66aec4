// catsync-engine library entry point (driven by the `catsync` CLI).

pub mod audit;
pub mod config;
pub mod confirm;
pub mod context;
pub mod credential;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod prompt;
pub mod publish;
pub mod secret;
pub mod security;

use std::path::Path;

pub use context::RunContext;
pub use error::PipelineError;
pub use pipeline::{
    credential_acquirer, status, Pipeline, PipelineDeps, PublishReport, PublishRequest, StatusReport,
};

/// Interaction channels for [`publish()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Prompt on the controlling terminal when no stored credential works.
    pub prompt: bool,
    /// Open the graphical history viewer after a successful push.
    pub viewer: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self { prompt: true, viewer: true }
    }
}

/// Publish `repo` with the configuration found for it and real git.
///
/// Pipeline failures are part of the returned report; `Err` means the run
/// could not start (unreadable config, audit directory not writable).
pub async fn publish(
    repo: &Path,
    request: PublishRequest,
    options: PublishOptions,
) -> anyhow::Result<PublishReport> {
    let config = config::SyncConfig::load_for(repo)?;
    let deps = PipelineDeps::production(&config, options.prompt, options.viewer);
    let ctx = RunContext::open(repo, config, deps.prompter.is_some())?;
    Ok(Pipeline::new(ctx, deps).run(request).await)
}

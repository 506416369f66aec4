// The publish pipeline: verify, bind, commit, push, restore, confirm.
//
// The remote URL carries the credential only between `embed` and `restore`;
// restore runs on every path that reached the embed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use catsync_common::error::ErrorKind;
use catsync_common::remote::{normalize, sanitize_url, RemoteDescriptor, RemoteProtocol};
use catsync_common::types::{Credential, PublishAttempt};
use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::confirm::{Clock, ConfirmationOutcome, ConfirmationPresenter, DisplaySession, SystemClock};
use crate::config::SyncConfig;
use crate::context::RunContext;
use crate::credential::{
    api_base_for_host, CredentialAcquirer, CredentialError, CredentialValidator, GitHubProbe, IdentityProbe,
};
use crate::error::PipelineError;
use crate::git::commit::{default_message, ChangeCommitter};
use crate::git::remote::RemoteBinding;
use crate::git::worker::{CommandExecutor, GitWorker, ProcessCommandExecutor, PushLimits};
use crate::prompt::Prompter;
use crate::publish::{publish, PublishDriver, PushOutput};
use crate::secret::SecretStore;

/// Pending files listed individually before the rest are summarized.
const LISTED_PENDING: usize = 5;

pub type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Injected effects. Everything except the executor is optional.
pub struct PipelineDeps<E> {
    pub executor: E,
    /// Replaces the hosting-service probe built from the remote host.
    pub probe: Option<Arc<dyn IdentityProbe>>,
    pub prompter: Option<Box<dyn Prompter>>,
    pub session: Option<Box<dyn DisplaySession>>,
    pub clock: Box<dyn Clock>,
    /// Replaces the process environment for credential lookup.
    pub env: Option<EnvLookup>,
}

impl<E> PipelineDeps<E> {
    pub fn new(executor: E) -> Self {
        Self { executor, probe: None, prompter: None, session: None, clock: Box::new(SystemClock), env: None }
    }
}

impl PipelineDeps<ProcessCommandExecutor> {
    /// Real git, real terminal, real desktop.
    pub fn production(config: &SyncConfig, prompt: bool, viewer: bool) -> Self {
        let mut deps = Self::new(ProcessCommandExecutor);
        if prompt {
            deps.prompter =
                crate::prompt::TerminalPrompter::open().map(|p| Box::new(p) as Box<dyn Prompter>);
        }
        if viewer {
            deps.session = Some(Box::new(crate::confirm::DesktopSession::detect(&config.confirm)));
        }
        deps
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub message: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub run_id: Uuid,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    /// Human-readable outcome, already masked.
    pub message: String,
    pub commit: Option<String>,
    pub files_committed: usize,
    pub branch: Option<String>,
    pub attempts: Vec<PublishAttempt>,
    pub up_to_date: bool,
    pub confirmation: Option<ConfirmationOutcome>,
    pub masked_log: PathBuf,
    pub raw_log: PathBuf,
}

impl PublishReport {
    pub fn summary(&self) -> String {
        if self.success {
            format!("published: {}", self.message)
        } else {
            let kind = self.error_kind.map_or("error", ErrorKind::as_str);
            format!("publish failed ({kind}): {} (log: {})", self.message, self.masked_log.display())
        }
    }
}

/// Facts gathered while the run progresses, for the report.
#[derive(Debug, Default)]
struct Progress {
    slug: Option<String>,
    commit: Option<String>,
    files_committed: usize,
    branch: Option<String>,
    attempts: Vec<PublishAttempt>,
    up_to_date: bool,
    confirmation: Option<ConfirmationOutcome>,
}

pub struct Pipeline<E> {
    ctx: RunContext,
    worker: GitWorker<E>,
    probe: Option<Arc<dyn IdentityProbe>>,
    prompter: Option<Box<dyn Prompter>>,
    session: Option<Box<dyn DisplaySession>>,
    clock: Box<dyn Clock>,
    env: Option<EnvLookup>,
}

impl<E: CommandExecutor> Pipeline<E> {
    pub fn new(ctx: RunContext, deps: PipelineDeps<E>) -> Self {
        let worker = GitWorker::with_executor(ctx.repo.clone(), deps.executor);
        Self {
            ctx,
            worker,
            probe: deps.probe,
            prompter: deps.prompter,
            session: deps.session,
            clock: deps.clock,
            env: deps.env,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub async fn run(mut self, request: PublishRequest) -> PublishReport {
        let audit = self.ctx.audit.clone();
        let mut progress = Progress::default();
        let result = self.execute(&request, &mut progress).await;

        let (success, error_kind, message) = match result {
            Ok(()) => (true, None, audit.mask(&success_message(&progress))),
            Err(error) => {
                let message = audit.mask(&error.to_string());
                audit.error(&message);
                (false, Some(error.kind()), message)
            }
        };
        info!(run_id = %self.ctx.run_id, success, "publish run finished");

        PublishReport {
            run_id: self.ctx.run_id,
            success,
            error_kind,
            message,
            commit: progress.commit,
            files_committed: progress.files_committed,
            branch: progress.branch,
            attempts: progress.attempts,
            up_to_date: progress.up_to_date,
            confirmation: progress.confirmation,
            masked_log: audit.masked_path().to_path_buf(),
            raw_log: audit.raw_path().to_path_buf(),
        }
    }

    async fn execute(
        &mut self,
        request: &PublishRequest,
        progress: &mut Progress,
    ) -> Result<(), PipelineError> {
        let audit = self.ctx.audit.clone();
        let config = self.ctx.config.clone();

        self.worker
            .rev_parse_git_dir()
            .map_err(|_| PipelineError::NotARepository(self.ctx.repo.clone()))?;

        let remote = config.publish.remote.clone();
        let url = self
            .worker
            .remote_get_url(&remote)
            .map_err(|_| PipelineError::RemoteMissing(remote.clone()))?
            .stdout
            .trim()
            .to_string();
        let descriptor = match normalize(&url) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                audit.error(format!("remote `{remote}` uses an unsupported URL form"));
                return Err(error.into());
            }
        };
        if let Some(secret) = descriptor.embedded_secret() {
            audit.register_value(secret);
            audit.warn(format!("remote `{remote}` already embeds a credential; it will be replaced"));
        }
        audit.info(format!(
            "remote `{remote}` ({}) -> {}",
            descriptor.protocol().as_str(),
            descriptor.public_url()
        ));
        progress.slug = Some(descriptor.slug());

        let mut acquirer = self.acquirer(&descriptor)?;
        let acquired = acquirer.acquire(false).await?;

        let mut binding = RemoteBinding::new(remote, descriptor);
        binding.embed(&self.worker, &acquired.credential)?;

        let bound = self
            .while_bound(request, progress, &mut binding, &mut acquirer, acquired.credential, acquired.login)
            .await;
        let restored = binding.restore(&self.worker);
        match (&bound, restored) {
            (_, Ok(())) => audit.info(format!("remote `{}` restored to its public URL", binding.remote())),
            (Ok(()), Err(error)) => {
                audit.error("failed to restore the remote URL; check `git remote -v`");
                return Err(error.into());
            }
            (Err(_), Err(error)) => {
                audit.error(format!("failed to restore the remote URL: {error}"));
            }
        }
        bound?;

        let presenter = ConfirmationPresenter::new(&config.confirm, self.clock.as_ref());
        let session = self.session.as_deref_mut().map(|session| session as &mut dyn DisplaySession);
        let outcome = presenter.present(&self.worker, &audit, session).await;
        progress.confirmation = Some(outcome);
        Ok(())
    }

    async fn while_bound(
        &self,
        request: &PublishRequest,
        progress: &mut Progress,
        binding: &mut RemoteBinding,
        acquirer: &mut CredentialAcquirer,
        credential: Credential,
        login: Option<String>,
    ) -> Result<(), PipelineError> {
        let audit = self.ctx.audit.as_ref();
        let config = &self.ctx.config;
        let committer = ChangeCommitter::new(&self.worker);

        let guarded = repo_local_files(&config.credential.files);
        let guarded: Vec<&str> = guarded.iter().map(String::as_str).collect();
        let hygiene = committer.ensure_secret_files_ignored(&guarded)?;
        if !hygiene.ignored.is_empty() {
            audit.info(format!("added to .gitignore: {}", hygiene.ignored.join(", ")));
        }
        if !hygiene.untracked.is_empty() {
            audit.warn(format!("stopped tracking credential files: {}", hygiene.untracked.join(", ")));
        }

        let pending = committer.pending_files()?;
        if pending.is_empty() {
            audit.info("working tree clean; nothing to commit");
        } else {
            audit.info(format!("{} pending changes", pending.len()));
            for entry in pending.iter().take(LISTED_PENDING) {
                audit.info(format!("  {entry}"));
            }
            if pending.len() > LISTED_PENDING {
                audit.info(format!("  ... and {} more", pending.len() - LISTED_PENDING));
            }

            if committer.ensure_identity(login.as_deref())? {
                audit.info("configured commit identity from the hosting account");
            }
            let message = request
                .message
                .clone()
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| default_message(&config.publish.message_prefix, Local::now()));
            let commit = committer.commit_all(&message)?;
            audit.info(format!("committed {} as {commit}", pending.len()));
            progress.commit = Some(commit.short().to_string());
            progress.files_committed = pending.len();
        }

        let branch = match request.branch.clone().or_else(|| config.publish.branch.clone()) {
            Some(branch) => branch,
            None => self.worker.current_branch()?.stdout.trim().to_string(),
        };
        progress.branch = Some(branch.clone());

        let mut driver = GitDriver {
            worker: &self.worker,
            audit,
            binding,
            acquirer,
            credential,
            pushed: 0,
            limits: PushLimits {
                low_speed_time_sec: config.publish.low_speed_time_sec,
                ..PushLimits::default()
            },
        };
        let run = publish(&mut driver, &branch, config.publish.attempts).await;
        progress.up_to_date = run.up_to_date();
        progress.attempts = run.attempts;
        match run.failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn acquirer(&mut self, descriptor: &RemoteDescriptor) -> Result<CredentialAcquirer, PipelineError> {
        credential_acquirer(
            &self.ctx,
            descriptor.host(),
            self.probe.clone(),
            self.prompter.take(),
            self.env.take(),
        )
    }
}

/// An acquirer wired from the run's configuration: the configured sources,
/// the hosting probe for `host` (unless disabled or overridden), and the
/// given prompter.
pub fn credential_acquirer(
    ctx: &RunContext,
    host: &str,
    probe: Option<Arc<dyn IdentityProbe>>,
    prompter: Option<Box<dyn Prompter>>,
    env: Option<EnvLookup>,
) -> Result<CredentialAcquirer, PipelineError> {
    let config = &ctx.config;
    let mut store = SecretStore::from_config(&config.credential, &ctx.repo);
    if let Some(env) = env {
        store = store.with_env(env);
    }

    let probe = match probe {
        _ if !config.hosting.probe => None,
        Some(probe) => Some(probe),
        None => {
            let api_base =
                config.hosting.api_base.clone().unwrap_or_else(|| api_base_for_host(host));
            let probe = GitHubProbe::new(&api_base, config.hosting.probe_timeout())
                .map_err(CredentialError::ProbeFailed)?;
            Some(Arc::new(probe) as Arc<dyn IdentityProbe>)
        }
    };

    let validator = CredentialValidator::new(probe, config.hosting.required_scopes.clone());
    Ok(CredentialAcquirer::new(store, validator, prompter, ctx.audit.clone())
        .with_attempts(config.credential.attempts)
        .with_persist_prompted(config.credential.persist_prompted))
}

/// Push effects backed by git, the acquirer, and the remote binding.
struct GitDriver<'a, E> {
    worker: &'a GitWorker<E>,
    audit: &'a AuditLogger,
    binding: &'a mut RemoteBinding,
    acquirer: &'a mut CredentialAcquirer,
    credential: Credential,
    /// Pushes issued so far.
    pushed: u32,
    limits: PushLimits,
}

impl<E: CommandExecutor> PublishDriver for GitDriver<'_, E> {
    fn push(&mut self, branch: &str, attempt: u32) -> Result<PushOutput, PipelineError> {
        self.audit.info(format!(
            "pushing {branch} to {} (attempt {attempt})",
            self.binding.descriptor().public_url()
        ));
        self.pushed = attempt;
        let result = self.worker.push(self.binding.remote(), branch, self.limits)?;
        let raw = result.combined();
        self.audit.raw(format!("git push attempt {attempt} exited with {:?}", result.code));
        self.audit.raw(&raw);
        let masked = self.audit.mask(&raw);
        if !masked.is_empty() {
            self.audit.info(&masked);
        }
        Ok(PushOutput { success: result.success, raw, masked })
    }

    async fn reacquire_credential(&mut self) -> Result<(), PipelineError> {
        self.audit.warn("the remote refused the credential; a new one is needed");
        if !self.acquirer.is_interactive() {
            // Nobody to ask: the stored credential was the only candidate.
            return Err(PipelineError::PushAuthFailure { attempts: self.pushed });
        }
        let acquired = self.acquirer.acquire(true).await?;
        self.credential = acquired.credential;
        Ok(())
    }

    fn renormalize_remote(&mut self) -> Result<(), PipelineError> {
        self.binding.embed(self.worker, &self.credential)?;
        Ok(())
    }
}

/// Credential files that live inside the repository, as repo-relative paths.
fn repo_local_files(files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|file| !file.starts_with("~/") && !Path::new(file.as_str()).is_absolute())
        .map(|file| file.trim_start_matches("./").to_string())
        .collect()
}

fn success_message(progress: &Progress) -> String {
    let target = format!(
        "{} ({})",
        progress.slug.as_deref().unwrap_or("remote"),
        progress.branch.as_deref().unwrap_or("HEAD")
    );
    match (&progress.commit, progress.up_to_date) {
        (Some(commit), _) => {
            format!("{} files committed as {commit} and pushed to {target}", progress.files_committed)
        }
        (None, true) => format!("nothing to commit; {target} already up to date"),
        (None, false) => format!("nothing to commit; pushed existing commits to {target}"),
    }
}

/// Repository state without touching any credential.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub repo: PathBuf,
    pub branch: Option<String>,
    pub remote: String,
    /// Userinfo stripped.
    pub remote_url: Option<String>,
    pub protocol: Option<RemoteProtocol>,
    pub supported: bool,
    /// The configured URL still carries a credential.
    pub credential_in_url: bool,
    pub pending: Vec<String>,
}

pub fn status<E: CommandExecutor>(
    worker: &GitWorker<E>,
    config: &SyncConfig,
) -> Result<StatusReport, PipelineError> {
    worker
        .rev_parse_git_dir()
        .map_err(|_| PipelineError::NotARepository(worker.repo_path().to_path_buf()))?;

    let remote = config.publish.remote.clone();
    let url = worker.remote_get_url(&remote).ok().map(|output| output.stdout.trim().to_string());
    let descriptor = url.as_deref().and_then(|url| normalize(url).ok());
    let credential_in_url = descriptor.as_ref().is_some_and(|d| d.embedded_secret().is_some())
        || url.as_deref().is_some_and(|url| url.starts_with("http") && sanitize_url(url) != url);
    if credential_in_url {
        warn!(%remote, "remote URL carries a credential");
    }

    let branch = worker.current_branch().ok().map(|output| output.stdout.trim().to_string());
    let pending = ChangeCommitter::new(worker).pending_files()?;

    Ok(StatusReport {
        repo: worker.repo_path().to_path_buf(),
        branch,
        remote,
        remote_url: url.as_deref().map(sanitize_url),
        protocol: descriptor.as_ref().map(RemoteDescriptor::protocol),
        supported: descriptor.is_some(),
        credential_in_url,
        pending,
    })
}

// Per-invocation state threaded through every pipeline step.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::config::SyncConfig;

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub repo: PathBuf,
    pub config: SyncConfig,
    pub audit: Arc<AuditLogger>,
    /// Whether a terminal prompt channel is available.
    pub interactive: bool,
}

impl RunContext {
    /// Fresh run id and audit directory; masked lines echo to stderr.
    pub fn open(repo: &Path, config: SyncConfig, interactive: bool) -> Result<Self> {
        Self::open_with_terminal(repo, config, interactive, Some(Box::new(std::io::stderr())))
    }

    pub fn open_with_terminal(
        repo: &Path,
        config: SyncConfig,
        interactive: bool,
        terminal: Option<Box<dyn Write + Send>>,
    ) -> Result<Self> {
        let run_id = Uuid::new_v4();
        let started_at = Local::now();
        let audit = AuditLogger::open(&config.log_root(), run_id, started_at)?.with_terminal(terminal);
        audit.raw(format!("run {run_id} started for {}", repo.display()));

        Ok(Self {
            run_id,
            started_at,
            repo: repo.to_path_buf(),
            config,
            audit: Arc::new(audit),
            interactive,
        })
    }
}

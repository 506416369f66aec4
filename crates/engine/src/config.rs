// Local configuration files for catsync.
//
// Global config: `~/.catsync/config.toml`
// Workspace config: `<repo>/.catsync/workspace.toml` (replaces the global one)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::{create_private_dir_all, ensure_owner_only_file};

/// Root directory for catsync global state: `~/.catsync/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".catsync"))
}

/// Path to the global config file: `~/.catsync/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Path to the workspace config file: `<repo>/.catsync/workspace.toml`.
pub fn workspace_config_path(repo: &Path) -> PathBuf {
    repo.join(".catsync").join("workspace.toml")
}

/// Expand a leading `~/` and resolve relative paths against `base`.
pub fn resolve_path(raw: &str, base: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory for per-run audit logs. Defaults to `~/.catsync/logs`.
    pub log_root: Option<PathBuf>,
    pub credential: CredentialConfig,
    pub hosting: HostingConfig,
    pub publish: PublishConfig,
    pub confirm: ConfirmConfig,
}

impl SyncConfig {
    /// Workspace config when present, otherwise the global config,
    /// otherwise defaults. A file that exists but fails to parse is an error.
    pub fn load_for(repo: &Path) -> Result<Self, ConfigError> {
        let workspace = workspace_config_path(repo);
        if workspace.is_file() {
            return Self::load_from(&workspace);
        }
        match global_config_path() {
            Some(global) if global.is_file() => Self::load_from(&global),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates owner-only parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            create_private_dir_all(parent)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)?;
        ensure_owner_only_file(path)
            .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))
    }

    pub fn log_root(&self) -> PathBuf {
        self.log_root
            .clone()
            .or_else(|| global_dir().map(|d| d.join("logs")))
            .unwrap_or_else(|| std::env::temp_dir().join("catsync-logs"))
    }
}

// ── Sections ───────────────────────────────────────────────────────

/// Where credentials are looked up. Secret values never live here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialConfig {
    pub env_vars: Vec<String>,
    /// `~/` is expanded; relative paths are resolved against the repository.
    pub files: Vec<String>,
    pub keys: Vec<String>,
    pub attempts: u32,
    pub persist_prompted: bool,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_vars: vec!["GITHUB_TOKEN".into(), "GH_TOKEN".into()],
            files: vec!["~/.catsync/credentials".into(), ".env.local".into(), ".env".into()],
            keys: vec!["GITHUB_TOKEN".into(), "GH_TOKEN".into()],
            attempts: 3,
            persist_prompted: true,
        }
    }
}

impl CredentialConfig {
    pub fn file_paths(&self, repo: &Path) -> Vec<PathBuf> {
        self.files.iter().map(|raw| resolve_path(raw, repo)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostingConfig {
    /// Overrides the API base derived from the remote host.
    pub api_base: Option<String>,
    pub required_scopes: Vec<String>,
    /// Disable for offline use; only the syntactic check runs.
    pub probe: bool,
    pub probe_timeout_sec: u64,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            required_scopes: vec!["repo".into()],
            probe: true,
            probe_timeout_sec: 10,
        }
    }
}

impl HostingConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_sec.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PublishConfig {
    pub remote: String,
    /// Defaults to the currently checked-out branch.
    pub branch: Option<String>,
    pub attempts: u32,
    pub low_speed_time_sec: u32,
    pub message_prefix: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            remote: "origin".into(),
            branch: None,
            attempts: 2,
            low_speed_time_sec: 30,
            message_prefix: "Catalog update".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfirmConfig {
    pub enabled: bool,
    pub viewer: String,
    pub viewer_args: Vec<String>,
    pub window_title: String,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub graph_entries: u32,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            viewer: "gitk".into(),
            viewer_args: vec!["--all".into()],
            window_title: "gitk".into(),
            poll_attempts: 45,
            poll_interval_ms: 1000,
            graph_entries: 40,
        }
    }
}

impl ConfirmConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Wall-clock bound on the whole poll loop.
    pub fn poll_deadline(&self) -> Duration {
        self.poll_interval() * self.poll_attempts
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(std::io::Error),
    #[error("config parse error: {0}")]
    Parse(toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(toml::ser::Error),
}

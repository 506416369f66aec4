// Credential lookup and persistence across ordered sources.
//
// Sources are environment variables and `KEY=value` files. Values are never
// logged; only the label of the source that produced them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use catsync_common::types::{Credential, CredentialSource};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CredentialConfig;
use crate::security::{
    create_private_dir_all, ensure_owner_only_file, open_private_truncate, rotate_to_backup,
};

/// Values that mean "not configured yet".
const PLACEHOLDERS: &[&str] = &["__REPLACE_ME__", "__REDACTED__"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    Environment { var: String },
    ConfigFile { path: PathBuf, keys: Vec<String> },
}

impl SecretSource {
    pub fn label(&self) -> String {
        match self {
            Self::Environment { var } => format!("${var}"),
            Self::ConfigFile { path, .. } => path.display().to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("no credential found in {searched} configured sources")]
    NotFound { searched: usize },
    #[error("no credential file could be written")]
    NoWritableSource,
    #[error("failed to write `{}`: {message}", .path.display())]
    Write { path: PathBuf, message: String },
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct SecretStore {
    sources: Vec<SecretSource>,
    env: EnvLookup,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore").field("sources", &self.sources).finish_non_exhaustive()
    }
}

/// Environment variables first, then files, in configured order.
pub fn default_sources(config: &CredentialConfig, repo: &Path) -> Vec<SecretSource> {
    let mut sources: Vec<SecretSource> =
        config.env_vars.iter().map(|var| SecretSource::Environment { var: var.clone() }).collect();
    sources.extend(
        config
            .file_paths(repo)
            .into_iter()
            .map(|path| SecretSource::ConfigFile { path, keys: config.keys.clone() }),
    );
    sources
}

impl SecretStore {
    pub fn new(sources: Vec<SecretSource>) -> Self {
        Self { sources, env: Box::new(|var| std::env::var(var).ok()) }
    }

    pub fn from_config(config: &CredentialConfig, repo: &Path) -> Self {
        Self::new(default_sources(config, repo))
    }

    /// Replace the process environment lookup.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn sources(&self) -> &[SecretSource] {
        &self.sources
    }

    /// First non-placeholder value in source order.
    pub fn load(&self) -> Result<Credential, SecretError> {
        for source in &self.sources {
            let found = match source {
                SecretSource::Environment { var } => (self.env)(var)
                    .filter(|value| !is_placeholder(value))
                    .map(|value| (value, CredentialSource::Environment { var: var.clone() })),
                SecretSource::ConfigFile { path, keys } => read_file_value(path, keys)
                    .map(|value| (value, CredentialSource::ConfigFile { path: path.clone() })),
            };

            if let Some((value, origin)) = found {
                debug!(source = %source.label(), "credential found");
                return Ok(Credential::new(value, origin));
            }
        }

        Err(SecretError::NotFound { searched: self.sources.len() })
    }

    /// Write `credential` to the first file source that accepts it.
    pub fn persist(&self, credential: &Credential) -> Result<PathBuf, SecretError> {
        for source in &self.sources {
            let SecretSource::ConfigFile { path, keys } = source else {
                continue;
            };
            let Some(key) = keys.first() else {
                continue;
            };

            match write_value(path, key, credential.secret().expose()) {
                Ok(()) => return Ok(path.clone()),
                Err(error) => warn!(path = %path.display(), %error, "credential file not writable"),
            }
        }
        Err(SecretError::NoWritableSource)
    }
}

pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || PLACEHOLDERS.contains(&value)
}

fn read_file_value(path: &Path, keys: &[String]) -> Option<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
        Err(error) => {
            warn!(path = %path.display(), %error, "credential file unreadable");
            return None;
        }
    };

    let assignments = parse_assignments(&contents);
    keys.iter().find_map(|key| {
        assignments
            .iter()
            .find(|(name, value)| name == key && !is_placeholder(value))
            .map(|(_, value)| value.clone())
    })
}

/// Parse `KEY=value` lines: `export ` prefix, `#` comments, quoted values.
pub fn parse_assignments(contents: &str) -> Vec<(String, String)> {
    contents.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let value = match value.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = &value[1..];
            match inner.find(quote) {
                Some(end) => &inner[..end],
                None => inner,
            }
        }
        _ => value.split(" #").next().unwrap_or(value).trim_end(),
    };
    Some((key.to_string(), value.to_string()))
}

fn write_value(path: &Path, key: &str, value: &str) -> Result<(), SecretError> {
    let fail = |message: String| SecretError::Write { path: path.to_path_buf(), message };

    // Only a directory created here is made owner-only; an existing parent
    // may be the repository root.
    if let Some(parent) = path.parent().filter(|parent| !parent.exists()) {
        create_private_dir_all(parent).map_err(|error| fail(error.to_string()))?;
    }

    let existing = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(error) => return Err(fail(error.to_string())),
    };

    let assignment = format!("{key}=\"{value}\"");
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| match parse_line(line) {
            Some((name, _)) if name == key => {
                replaced = true;
                assignment.clone()
            }
            _ => line.to_string(),
        })
        .collect();
    if !replaced {
        lines.push(assignment);
    }

    rotate_to_backup(path).map_err(|error| fail(error.to_string()))?;
    let mut file = open_private_truncate(path).map_err(|error| fail(error.to_string()))?;
    for line in &lines {
        writeln!(file, "{line}").map_err(|error| fail(error.to_string()))?;
    }
    ensure_owner_only_file(path).map_err(|error| fail(error.to_string()))
}

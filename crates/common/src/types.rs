// Core domain types shared across all catsync crates.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::classify::{classify, Classification};

/// Raw credential value. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value. Callers must not route this into masked output.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<{} chars>)", self.len())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Where a credential was obtained from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialSource {
    Environment { var: String },
    ConfigFile { path: PathBuf },
    InteractivePrompt,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment { var } => write!(f, "environment variable {var}"),
            Self::ConfigFile { path } => write!(f, "config file {}", path.display()),
            Self::InteractivePrompt => f.write_str("interactive prompt"),
        }
    }
}

/// A bearer credential with its classification, fixed at construction.
///
/// Credentials are replaced wholesale on re-prompt, never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    secret: Secret,
    classification: Classification,
    source: CredentialSource,
}

impl Credential {
    pub fn new(raw: impl Into<String>, source: CredentialSource) -> Self {
        let secret = Secret::new(raw.into().trim().to_string());
        let classification = classify(secret.expose());
        Self { secret, classification, source }
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.secret.len()
    }
}

/// Result of one push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    Success,
    AuthFailure,
    NetworkFailure,
    /// The remote refused the update for a non-credential reason
    /// (non-fast-forward, hook rejection, protected branch).
    Rejected,
}

/// One entry in a run's push history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAttempt {
    /// 1-based, strictly increasing within a run.
    pub sequence: u32,
    pub outcome: PublishOutcome,
    /// Only meaningful for `Success`: the remote already had the commits.
    pub up_to_date: bool,
    /// Combined push output after redaction.
    pub transcript: String,
}

/// Destination of an audit line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStream {
    Masked,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

impl AuditLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// A single timestamped line as it was written to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp: DateTime<Local>,
    pub stream: AuditStream,
    pub level: AuditLevel,
    pub line: String,
}

impl AuditRecord {
    pub fn render(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            self.level.as_str(),
            self.line
        )
    }
}

/// A commit object id as printed by `git rev-parse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map_or(self.0.len(), |(index, _)| index);
        &self.0[..end]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

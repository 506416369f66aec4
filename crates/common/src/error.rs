// Error taxonomy tags shared by the engine, the CLI, and callers.

use serde::{Deserialize, Serialize};

/// Stable category for every failure the pipeline can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No source yielded a credential and no interactive channel exists.
    CredentialNotFound,
    CredentialInvalidFormat,
    CredentialUnauthorized,
    /// The identity probe could not reach the hosting service.
    CredentialProbeFailed,
    ExceededAttempts,
    NotARepository,
    RemoteMissing,
    RemoteUnsupported,
    /// Signal, not a failure: the tree was already clean.
    NothingToCommit,
    PushAuthFailure,
    PushNetworkFailure,
    PushRejected,
    /// Downgraded to a warning by the pipeline.
    ConfirmationUnavailable,
    Git,
    Io,
}

impl ErrorKind {
    /// Errors that a fresh credential from the prompt can fix.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::CredentialInvalidFormat | Self::CredentialUnauthorized)
    }

    /// Errors that never fail a run.
    pub fn is_advisory(self) -> bool {
        matches!(self, Self::NothingToCommit | Self::ConfirmationUnavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CredentialNotFound => "credential_not_found",
            Self::CredentialInvalidFormat => "credential_invalid_format",
            Self::CredentialUnauthorized => "credential_unauthorized",
            Self::CredentialProbeFailed => "credential_probe_failed",
            Self::ExceededAttempts => "exceeded_attempts",
            Self::NotARepository => "not_a_repository",
            Self::RemoteMissing => "remote_missing",
            Self::RemoteUnsupported => "remote_unsupported",
            Self::NothingToCommit => "nothing_to_commit",
            Self::PushAuthFailure => "push_auth_failure",
            Self::PushNetworkFailure => "push_network_failure",
            Self::PushRejected => "push_rejected",
            Self::ConfirmationUnavailable => "confirmation_unavailable",
            Self::Git => "git",
            Self::Io => "io",
        }
    }
}

// Pipeline error type and its mapping onto the shared taxonomy.

use std::path::PathBuf;

use catsync_common::error::ErrorKind;
use catsync_common::remote::RemoteError;
use thiserror::Error;

use crate::credential::CredentialError;
use crate::git::commit::CommitError;
use crate::git::worker::GitWorkerError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("`{}` is not a git repository", .0.display())]
    NotARepository(PathBuf),
    #[error("remote `{0}` is not configured")]
    RemoteMissing(String),
    #[error(transparent)]
    RemoteUnsupported(#[from] RemoteError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("nothing to commit, working tree clean")]
    NothingToCommit,
    #[error("push still unauthorized after {attempts} attempts")]
    PushAuthFailure { attempts: u32 },
    #[error("push failed on the network: {0}")]
    PushNetworkFailure(String),
    #[error("push rejected by the remote: {0}")]
    PushRejected(String),
    #[error(transparent)]
    Git(#[from] GitWorkerError),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<CommitError> for PipelineError {
    fn from(error: CommitError) -> Self {
        match error {
            CommitError::NothingToCommit => Self::NothingToCommit,
            CommitError::Git(error) => Self::Git(error),
            CommitError::Io(error) => Self::Io(error.to_string()),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotARepository(_) => ErrorKind::NotARepository,
            Self::RemoteMissing(_) => ErrorKind::RemoteMissing,
            Self::RemoteUnsupported(_) => ErrorKind::RemoteUnsupported,
            Self::Credential(error) => error.kind(),
            Self::NothingToCommit => ErrorKind::NothingToCommit,
            Self::PushAuthFailure { .. } => ErrorKind::PushAuthFailure,
            Self::PushNetworkFailure(_) => ErrorKind::PushNetworkFailure,
            Self::PushRejected(_) => ErrorKind::PushRejected,
            Self::Git(_) => ErrorKind::Git,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

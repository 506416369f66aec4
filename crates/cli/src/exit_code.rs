// Consistent exit codes for the catsync CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   11 = credential or authorization error
//   12 = remote missing or unsupported
//   13 = network error

use std::process;

use catsync_common::error::ErrorKind;
use catsync_engine::config::ConfigError;
use catsync_engine::credential::CredentialError;
use catsync_engine::{PipelineError, PublishReport};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Auth = 11,
    Remote = 12,
    Network = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::CredentialNotFound
            | ErrorKind::CredentialInvalidFormat
            | ErrorKind::CredentialUnauthorized
            | ErrorKind::ExceededAttempts
            | ErrorKind::PushAuthFailure => Self::Auth,

            ErrorKind::RemoteMissing | ErrorKind::RemoteUnsupported => Self::Remote,

            ErrorKind::CredentialProbeFailed | ErrorKind::PushNetworkFailure => Self::Network,

            ErrorKind::NotARepository => Self::Usage,

            ErrorKind::NothingToCommit | ErrorKind::ConfirmationUnavailable => Self::Success,

            ErrorKind::PushRejected | ErrorKind::Git | ErrorKind::Io => Self::Error,
        }
    }

    pub fn from_report(report: &PublishReport) -> Self {
        if report.success {
            return Self::Success;
        }
        report.error_kind.map_or(Self::Error, Self::from_kind)
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(error) = cause.downcast_ref::<PipelineError>() {
                return Self::from_kind(error.kind());
            }
            if let Some(error) = cause.downcast_ref::<CredentialError>() {
                return Self::from_kind(error.kind());
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Usage;
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::TimedOut => Self::Network,
                    _ => Self::Error,
                };
            }
        }
        Self::Error
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

// Push with bounded retry on authorization failure.
//
// Ready -> Pushing(n) -> Success(n) | AuthFailed(n) | NetworkFailed(n) | Rejected(n)
// AuthFailed(n), n < limit -> ReacquireCredential(n) -> RenormalizeRemote(n) -> Pushing(n+1)
// AuthFailed(limit), NetworkFailed, Rejected, failed reacquire/renormalize -> FatalFailure

use std::future::Future;

use catsync_common::types::{PublishAttempt, PublishOutcome};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// Substrings (lowercase) that mean the remote refused the credential.
const AUTH_PATTERNS: &[&str] = &[
    "authentication failed",
    "invalid username or password",
    "could not read username",
    "could not read password",
    "terminal prompts disabled",
    "returned error: 401",
    "returned error: 403",
    "bad credentials",
    "repository not found",
    "write access to repository not granted",
];

/// Substrings (lowercase) that mean the remote was never reached properly.
const NETWORK_PATTERNS: &[&str] = &[
    "could not resolve host",
    "failed to connect",
    "connection timed out",
    "operation timed out",
    "connection refused",
    "network is unreachable",
    "the remote end hung up unexpectedly",
    "rpc failed",
    "ssl certificate problem",
    "ssl_connect",
    "ssl_read",
    "gnutls",
    "tls connection",
    "unable to access",
];

const UP_TO_DATE: &str = "everything up-to-date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PublishState {
    Ready,
    Pushing { attempt: u32 },
    Success { attempt: u32 },
    AuthFailed { attempt: u32 },
    ReacquireCredential { attempt: u32 },
    RenormalizeRemote { attempt: u32 },
    NetworkFailed { attempt: u32 },
    Rejected { attempt: u32 },
    FatalFailure,
}

impl PublishState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success { .. } | Self::FatalFailure)
    }

    /// Whether `next` may follow `self` when pushes are limited to `limit`.
    pub fn allows(self, next: PublishState, limit: u32) -> bool {
        use PublishState::*;
        match (self, next) {
            (Ready, Pushing { attempt }) => attempt == 1,
            (Pushing { attempt: a }, Success { attempt: b })
            | (Pushing { attempt: a }, AuthFailed { attempt: b })
            | (Pushing { attempt: a }, NetworkFailed { attempt: b })
            | (Pushing { attempt: a }, Rejected { attempt: b }) => a == b,
            (Pushing { .. }, FatalFailure) => true,
            (AuthFailed { attempt: a }, ReacquireCredential { attempt: b }) => a == b && a < limit,
            (AuthFailed { attempt }, FatalFailure) => attempt >= limit,
            (ReacquireCredential { attempt: a }, RenormalizeRemote { attempt: b }) => a == b,
            (RenormalizeRemote { attempt: a }, Pushing { attempt: b }) => b == a + 1 && b <= limit,
            (ReacquireCredential { .. } | RenormalizeRemote { .. }, FatalFailure) => true,
            (NetworkFailed { .. } | Rejected { .. }, FatalFailure) => true,
            _ => false,
        }
    }
}

/// Output of one `git push`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutput {
    pub success: bool,
    /// Combined stdout and stderr, verbatim.
    pub raw: String,
    /// Same text after redaction.
    pub masked: String,
}

/// The effects the retryer needs. The pipeline implements this with git,
/// the credential acquirer, and the remote binding.
pub trait PublishDriver {
    fn push(&mut self, branch: &str, attempt: u32) -> Result<PushOutput, PipelineError>;

    fn reacquire_credential(&mut self) -> impl Future<Output = Result<(), PipelineError>>;

    fn renormalize_remote(&mut self) -> Result<(), PipelineError>;
}

/// Result of a publish run.
#[derive(Debug)]
pub struct PublishRun {
    pub final_state: PublishState,
    pub attempts: Vec<PublishAttempt>,
    pub trace: Vec<PublishState>,
    pub failure: Option<PipelineError>,
}

impl PublishRun {
    pub fn succeeded(&self) -> bool {
        matches!(self.final_state, PublishState::Success { .. })
    }

    pub fn final_attempt(&self) -> Option<&PublishAttempt> {
        self.attempts.last()
    }

    pub fn up_to_date(&self) -> bool {
        self.succeeded() && self.final_attempt().is_some_and(|attempt| attempt.up_to_date)
    }

    /// All masked push transcripts in order.
    pub fn transcript(&self) -> String {
        self.attempts.iter().map(|attempt| attempt.transcript.as_str()).collect::<Vec<_>>().join("\n")
    }
}

struct Machine {
    limit: u32,
    state: PublishState,
    trace: Vec<PublishState>,
    attempts: Vec<PublishAttempt>,
}

impl Machine {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            state: PublishState::Ready,
            trace: vec![PublishState::Ready],
            attempts: Vec::new(),
        }
    }

    fn enter(&mut self, next: PublishState) {
        debug_assert!(
            self.state.allows(next, self.limit),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        debug!(from = ?self.state, to = ?next, "publish transition");
        self.state = next;
        self.trace.push(next);
    }

    fn fail(mut self, error: PipelineError) -> PublishRun {
        self.enter(PublishState::FatalFailure);
        warn!(error = %error, "publish failed");
        self.finish(Some(error))
    }

    fn finish(self, failure: Option<PipelineError>) -> PublishRun {
        PublishRun { final_state: self.state, attempts: self.attempts, trace: self.trace, failure }
    }
}

/// Classify a finished push. Auth patterns win over network patterns.
pub fn classify_push(success: bool, output: &str) -> (PublishOutcome, bool) {
    let lower = output.to_lowercase();
    if success {
        return (PublishOutcome::Success, lower.contains(UP_TO_DATE));
    }

    let permission_denied = lower
        .find("permission to ")
        .is_some_and(|start| lower[start..].lines().next().is_some_and(|line| line.contains("denied")));
    if permission_denied || AUTH_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return (PublishOutcome::AuthFailure, false);
    }
    if NETWORK_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return (PublishOutcome::NetworkFailure, false);
    }
    (PublishOutcome::Rejected, false)
}

/// Last non-empty line, used as the short reason in error messages.
fn headline(transcript: &str) -> String {
    transcript
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or("no output")
        .to_string()
}

/// Drive pushes until success or a fatal condition. At most `limit` pushes.
pub async fn publish<D: PublishDriver>(driver: &mut D, branch: &str, limit: u32) -> PublishRun {
    let limit = limit.max(1);
    let mut machine = Machine::new(limit);
    let mut attempt = 1;

    loop {
        machine.enter(PublishState::Pushing { attempt });
        let output = match driver.push(branch, attempt) {
            Ok(output) => output,
            Err(error) => return machine.fail(error),
        };

        let (outcome, up_to_date) = classify_push(output.success, &output.raw);
        info!(attempt, ?outcome, up_to_date, "push finished");
        let reason = headline(&output.masked);
        machine.attempts.push(PublishAttempt {
            sequence: attempt,
            outcome,
            up_to_date,
            transcript: output.masked,
        });

        match outcome {
            PublishOutcome::Success => {
                machine.enter(PublishState::Success { attempt });
                return machine.finish(None);
            }
            PublishOutcome::NetworkFailure => {
                machine.enter(PublishState::NetworkFailed { attempt });
                return machine.fail(PipelineError::PushNetworkFailure(reason));
            }
            PublishOutcome::Rejected => {
                machine.enter(PublishState::Rejected { attempt });
                return machine.fail(PipelineError::PushRejected(reason));
            }
            PublishOutcome::AuthFailure => {
                machine.enter(PublishState::AuthFailed { attempt });
                if attempt >= limit {
                    return machine.fail(PipelineError::PushAuthFailure { attempts: attempt });
                }
            }
        }

        machine.enter(PublishState::ReacquireCredential { attempt });
        if let Err(error) = driver.reacquire_credential().await {
            return machine.fail(error);
        }

        machine.enter(PublishState::RenormalizeRemote { attempt });
        if let Err(error) = driver.renormalize_remote() {
            return machine.fail(error);
        }

        attempt += 1;
    }
}

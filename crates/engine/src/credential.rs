// Credential validation and bounded acquisition.
//
// A candidate is first classified syntactically; only well-formed values are
// sent to the hosting service's identity endpoint. Every candidate is
// registered with the audit redactor before it is validated or logged.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use catsync_common::classify::{Classification, InvalidReason};
use catsync_common::error::ErrorKind;
use catsync_common::types::{Credential, CredentialSource, Secret};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::audit::AuditLogger;
use crate::prompt::Prompter;
use crate::secret::{SecretError, SecretStore};

const USER_AGENT: &str = concat!("catsync/", env!("CARGO_PKG_VERSION"));
const TOKEN_HELP_URL: &str = "https://github.com/settings/tokens";

/// What the identity endpoint said about a credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub status: u16,
    pub login: Option<String>,
    pub scopes: BTreeSet<String>,
    /// False for fine-grained tokens, which carry no scope header.
    pub scopes_header_present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("identity probe could not reach the hosting service: {0}")]
    Transport(String),
    #[error("identity probe client could not be built: {0}")]
    Client(String),
}

/// Identity check against the hosting service.
///
/// In production this calls the GitHub REST API. Tests inject a fake that
/// returns canned reports and counts calls.
pub trait IdentityProbe: Send + Sync {
    fn probe(
        &self,
        secret: &Secret,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeReport, ProbeError>> + Send>>;
}

/// `github.com` uses the public API host; anything else is treated as
/// GitHub Enterprise.
pub fn api_base_for_host(host: &str) -> String {
    if host.eq_ignore_ascii_case("github.com") {
        "https://api.github.com".to_string()
    } else {
        format!("https://{host}/api/v3")
    }
}

/// Parse an `X-OAuth-Scopes` value. Returns whether any scope was listed.
pub fn parse_scopes(header: Option<&str>) -> (bool, BTreeSet<String>) {
    let scopes: BTreeSet<String> = header
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect();
    (!scopes.is_empty(), scopes)
}

pub struct GitHubProbe {
    client: reqwest::Client,
    endpoint: Url,
}

impl GitHubProbe {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let endpoint = Url::parse(&format!("{}/user", api_base.trim_end_matches('/')))
            .map_err(|error| ProbeError::Client(format!("invalid API base `{api_base}`: {error}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| ProbeError::Client(error.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl IdentityProbe for GitHubProbe {
    fn probe(
        &self,
        secret: &Secret,
    ) -> Pin<Box<dyn Future<Output = Result<ProbeReport, ProbeError>> + Send>> {
        let client = self.client.clone();
        let url = self.endpoint.clone();
        let auth_header = format!("token {}", secret.expose());

        Box::pin(async move {
            let resp = client
                .get(url)
                .header("Authorization", auth_header)
                .header("Accept", "application/vnd.github+json")
                .send()
                .await
                .map_err(|error| ProbeError::Transport(error.without_url().to_string()))?;

            let status = resp.status().as_u16();
            let header = resp
                .headers()
                .get("x-oauth-scopes")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let (scopes_header_present, scopes) = parse_scopes(header.as_deref());

            let login = if resp.status().is_success() {
                resp.json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|body| body.get("login").and_then(|v| v.as_str()).map(str::to_string))
            } else {
                None
            };

            debug!(status, scopes_header_present, "identity probe finished");
            Ok(ProbeReport { status, login, scopes, scopes_header_present })
        })
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential rejected before use: {0}")]
    InvalidFormat(InvalidReason),
    #[error("credential not authorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    ProbeFailed(ProbeError),
    #[error("no credential found and no interactive terminal to ask for one")]
    NotFound,
    #[error("credential entry aborted")]
    Aborted,
    #[error("no valid credential after {attempts} attempts")]
    ExceededAttempts { attempts: u32 },
    #[error("terminal prompt failed: {0}")]
    Prompt(std::io::Error),
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat(_) => ErrorKind::CredentialInvalidFormat,
            Self::Unauthorized(_) => ErrorKind::CredentialUnauthorized,
            Self::ProbeFailed(_) => ErrorKind::CredentialProbeFailed,
            Self::NotFound | Self::Aborted => ErrorKind::CredentialNotFound,
            Self::ExceededAttempts { .. } => ErrorKind::ExceededAttempts,
            Self::Prompt(_) => ErrorKind::Io,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

/// A credential the hosting service accepted.
#[derive(Debug, Clone)]
pub struct AcquiredCredential {
    pub credential: Credential,
    /// Account name reported by the probe, when probing is enabled.
    pub login: Option<String>,
}

pub struct CredentialValidator {
    probe: Option<Arc<dyn IdentityProbe>>,
    required_scopes: Vec<String>,
}

impl CredentialValidator {
    /// `probe: None` limits validation to the syntactic check.
    pub fn new(probe: Option<Arc<dyn IdentityProbe>>, required_scopes: Vec<String>) -> Self {
        Self { probe, required_scopes }
    }

    pub async fn validate(
        &self,
        credential: &Credential,
        audit: &AuditLogger,
    ) -> Result<Option<String>, CredentialError> {
        match credential.classification() {
            Classification::Invalid(reason) => {
                return Err(CredentialError::InvalidFormat(reason.clone()));
            }
            Classification::UnknownLong => audit.warn(format!(
                "credential from {} has no recognized prefix; validating anyway",
                credential.source()
            )),
            Classification::Classic | Classification::FineGrained => {}
        }

        let Some(probe) = self.probe.as_ref() else {
            debug!("identity probe disabled");
            return Ok(None);
        };

        let report =
            probe.probe(credential.secret()).await.map_err(CredentialError::ProbeFailed)?;
        if report.status != 200 {
            return Err(CredentialError::Unauthorized(format!(
                "hosting service answered HTTP {}",
                report.status
            )));
        }

        if !report.scopes_header_present {
            audit.warn("credential reports no OAuth scopes (fine-grained token?); scope check skipped");
        } else {
            let missing: Vec<&str> = self
                .required_scopes
                .iter()
                .filter(|scope| !report.scopes.contains(scope.as_str()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(CredentialError::Unauthorized(format!(
                    "missing required scopes: {}",
                    missing.join(", ")
                )));
            }
        }

        Ok(report.login)
    }
}

/// Finds a credential the hosting service accepts, re-prompting up to a limit.
pub struct CredentialAcquirer {
    store: SecretStore,
    validator: CredentialValidator,
    prompter: Option<Box<dyn Prompter>>,
    audit: Arc<AuditLogger>,
    attempts: u32,
    persist_prompted: bool,
}

impl CredentialAcquirer {
    pub fn new(
        store: SecretStore,
        validator: CredentialValidator,
        prompter: Option<Box<dyn Prompter>>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self { store, validator, prompter, audit, attempts: 3, persist_prompted: true }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_persist_prompted(mut self, persist: bool) -> Self {
        self.persist_prompted = persist;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.prompter.is_some()
    }

    /// Stored credential first (unless `force_prompt`), then the prompter.
    pub async fn acquire(&mut self, force_prompt: bool) -> Result<AcquiredCredential, CredentialError> {
        let limit = self.attempts.max(1);
        let mut stored = if force_prompt { None } else { self.load_stored() };
        let mut last_error: Option<CredentialError> = None;

        for attempt in 1..=limit {
            let candidate = match stored.take() {
                Some(credential) => credential,
                None => self.prompt(attempt, limit, last_error.take())?,
            };

            self.audit.info(format!(
                "validating credential from {} ({} chars, {})",
                candidate.source(),
                candidate.len(),
                candidate.classification().label()
            ));

            match self.validator.validate(&candidate, &self.audit).await {
                Ok(login) => {
                    self.audit.info(match &login {
                        Some(login) => format!("credential accepted for {login}"),
                        None => "credential accepted".to_string(),
                    });
                    if candidate.source() == &CredentialSource::InteractivePrompt {
                        self.persist(&candidate);
                    }
                    return Ok(AcquiredCredential { credential: candidate, login });
                }
                Err(error) if error.is_recoverable() => {
                    self.audit.warn(format!("attempt {attempt}/{limit}: {error}"));
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        if self.prompter.is_none() {
            if let Some(error) = last_error {
                return Err(error);
            }
        }
        Err(CredentialError::ExceededAttempts { attempts: limit })
    }

    fn load_stored(&self) -> Option<Credential> {
        match self.store.load() {
            Ok(credential) => {
                self.audit.register_secret(credential.secret());
                Some(credential)
            }
            Err(SecretError::NotFound { searched }) => {
                self.audit.info(format!("no stored credential in {searched} sources"));
                None
            }
            Err(error) => {
                self.audit.warn(format!("credential store unavailable: {error}"));
                None
            }
        }
    }

    fn prompt(
        &mut self,
        attempt: u32,
        limit: u32,
        last_error: Option<CredentialError>,
    ) -> Result<Credential, CredentialError> {
        let Some(prompter) = self.prompter.as_mut() else {
            return Err(last_error.unwrap_or(CredentialError::NotFound));
        };

        if attempt == 1 || last_error.is_some() {
            self.audit
                .info(format!("create a token with the `repo` scope at {TOKEN_HELP_URL}"));
        }
        let message = format!("GitHub token (attempt {attempt} of {limit})");
        let raw = prompter.prompt_secret(&message).map_err(CredentialError::Prompt)?;
        let Some(raw) = raw else {
            return Err(CredentialError::Aborted);
        };

        let credential = Credential::new(raw, CredentialSource::InteractivePrompt);
        self.audit.register_secret(credential.secret());
        Ok(credential)
    }

    fn persist(&self, credential: &Credential) {
        if !self.persist_prompted {
            return;
        }
        match self.store.persist(credential) {
            Ok(path) => {
                info!(path = %path.display(), "stored prompted credential");
                self.audit.info(format!("credential saved to {}", path.display()));
            }
            Err(error) => self.audit.warn(format!("could not save credential: {error}")),
        }
    }
}

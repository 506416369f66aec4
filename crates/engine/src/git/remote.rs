// Binds the active credential into the remote URL and restores it afterwards.

use catsync_common::remote::RemoteDescriptor;
use catsync_common::types::Credential;
use tracing::debug;

use super::worker::{CommandExecutor, GitWorker, GitWorkerError};

#[derive(Debug)]
pub struct RemoteBinding {
    remote: String,
    descriptor: RemoteDescriptor,
    last_applied: Option<String>,
}

impl RemoteBinding {
    pub fn new(remote: impl Into<String>, descriptor: RemoteDescriptor) -> Self {
        Self { remote: remote.into(), descriptor, last_applied: None }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn descriptor(&self) -> &RemoteDescriptor {
        &self.descriptor
    }

    pub fn is_bound(&self) -> bool {
        self.last_applied.is_some()
    }

    /// Point the remote at the authenticated URL for `credential`.
    ///
    /// `git remote set-url` runs only when the URL differs from the last one
    /// applied, so re-embedding the same credential is a no-op.
    pub fn embed<E: CommandExecutor>(
        &mut self,
        worker: &GitWorker<E>,
        credential: &Credential,
    ) -> Result<String, GitWorkerError> {
        let url = self.descriptor.authenticated_url(credential.secret().expose());
        if self.last_applied.as_deref() == Some(url.as_str()) {
            debug!(remote = %self.remote, "remote already bound to active credential");
            return Ok(url);
        }

        worker.remote_set_url(&self.remote, &url)?;
        self.last_applied = Some(url.clone());
        Ok(url)
    }

    /// Put the credential-free canonical URL back. No-op if never embedded.
    pub fn restore<E: CommandExecutor>(&mut self, worker: &GitWorker<E>) -> Result<(), GitWorkerError> {
        if self.last_applied.is_none() {
            return Ok(());
        }
        worker.remote_set_url(&self.remote, &self.descriptor.public_url())?;
        self.last_applied = None;
        Ok(())
    }
}

// Stage-and-commit of pending work, plus the hygiene that runs before it.

use std::fs;
use std::io::Write;

use catsync_common::types::CommitId;
use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, info};

use super::worker::{CommandExecutor, GitWorker, GitWorkerError};

/// Marker written above entries this module appends to `.gitignore`.
pub const GITIGNORE_MARKER: &str = "# catsync: local credential files";

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("nothing to commit, working tree clean")]
    NothingToCommit,
    #[error(transparent)]
    Git(#[from] GitWorkerError),
    #[error("failed to update .gitignore: {0}")]
    Io(#[from] std::io::Error),
}

/// What [`ChangeCommitter::ensure_secret_files_ignored`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HygieneReport {
    pub ignored: Vec<String>,
    pub untracked: Vec<String>,
}

impl HygieneReport {
    pub fn is_empty(&self) -> bool {
        self.ignored.is_empty() && self.untracked.is_empty()
    }
}

/// `Catalog update - YYYY-MM-DD HH:MM:SS` style message.
pub fn default_message(prefix: &str, now: DateTime<Local>) -> String {
    format!("{prefix} - {}", now.format("%Y-%m-%d %H:%M:%S"))
}

pub struct ChangeCommitter<'a, E> {
    worker: &'a GitWorker<E>,
}

impl<'a, E: CommandExecutor> ChangeCommitter<'a, E> {
    pub fn new(worker: &'a GitWorker<E>) -> Self {
        Self { worker }
    }

    /// Porcelain status entries, e.g. ` M catalog.csv`.
    pub fn pending_files(&self) -> Result<Vec<String>, GitWorkerError> {
        let output = self.worker.status_porcelain()?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn has_pending_changes(&self) -> Result<bool, GitWorkerError> {
        Ok(!self.pending_files()?.is_empty())
    }

    /// Stage everything and commit. Fails with `NothingToCommit` on a clean tree.
    pub fn commit_all(&self, message: &str) -> Result<CommitId, CommitError> {
        if !self.has_pending_changes()? {
            return Err(CommitError::NothingToCommit);
        }

        self.worker.add_all()?;
        self.worker.commit(message)?;
        let head = self.worker.rev_parse_head()?;
        let id = CommitId::new(head.stdout);
        info!(commit = %id, "created commit");
        Ok(id)
    }

    /// Make sure local credential files can never be staged: add `.gitignore`
    /// entries for those present in the working tree (or tracked) and
    /// un-track any that are already tracked. Absent files leave the tree
    /// untouched.
    pub fn ensure_secret_files_ignored(&self, paths: &[&str]) -> Result<HygieneReport, CommitError> {
        let mut report = HygieneReport::default();
        if paths.is_empty() {
            return Ok(report);
        }

        let tracked = self.worker.ls_files(paths)?;
        report.untracked = tracked
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        let repo = self.worker.repo_path();
        let gitignore = repo.join(".gitignore");
        let existing = match fs::read_to_string(&gitignore) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(error) => return Err(error.into()),
        };

        for &entry in paths {
            let present = repo.join(entry).exists() || report.untracked.iter().any(|t| t == entry);
            if !present {
                continue;
            }
            let listed = existing
                .lines()
                .map(str::trim)
                .any(|line| line == entry || line.strip_prefix('/') == Some(entry));
            if !listed {
                report.ignored.push(entry.to_string());
            }
        }

        if !report.ignored.is_empty() {
            let mut file = fs::OpenOptions::new().create(true).append(true).open(&gitignore)?;
            if !existing.is_empty() && !existing.ends_with('\n') {
                writeln!(file)?;
            }
            if !existing.contains(GITIGNORE_MARKER) {
                writeln!(file, "{GITIGNORE_MARKER}")?;
            }
            for entry in &report.ignored {
                writeln!(file, "{entry}")?;
            }
            debug!(entries = ?report.ignored, "extended .gitignore");
        }

        if !report.untracked.is_empty() {
            self.worker.rm_cached(&report.untracked)?;
        }

        Ok(report)
    }

    /// Set `user.name`/`user.email` from the hosting login when unset.
    /// Returns true if anything was written.
    pub fn ensure_identity(&self, login: Option<&str>) -> Result<bool, GitWorkerError> {
        let Some(login) = login.filter(|login| !login.trim().is_empty()) else {
            return Ok(false);
        };

        let mut changed = false;
        if self.worker.config_get("user.name")?.is_none() {
            self.worker.config_set("user.name", login)?;
            changed = true;
        }
        if self.worker.config_get("user.email")?.is_none() {
            self.worker.config_set("user.email", &format!("{login}@users.noreply.github.com"))?;
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::worker::tests::{fail, ok, MockExecutor};
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn default_message_has_prefix_and_timestamp() {
        let now = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(default_message("Catalog update", now), "Catalog update - 2026-03-04 05:06:07");
    }

    #[test]
    fn clean_tree_is_nothing_to_commit() {
        let mock = MockExecutor::new(vec![ok("")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let error = ChangeCommitter::new(&worker).commit_all("msg").expect_err("clean tree");
        assert!(matches!(error, CommitError::NothingToCommit));
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn dirty_tree_is_staged_committed_and_resolved() {
        let mock = MockExecutor::new(vec![
            ok(" M catalog.csv\n?? images/card-001.jpg\n"),
            ok(""),
            ok("[main 0123456] msg\n"),
            ok("0123456789abcdef0123456789abcdef01234567\n"),
        ]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        let id = ChangeCommitter::new(&worker).commit_all("msg").expect("commit should succeed");

        assert_eq!(id.short(), "01234567");
        let calls = mock.calls();
        assert_eq!(calls[1].args, vec!["add", "-A"]);
        assert_eq!(calls[2].args, vec!["commit", "-m", "msg"]);
        assert_eq!(calls[3].args, vec!["rev-parse", "HEAD"]);
    }

    #[test]
    fn pending_files_keeps_porcelain_entries() {
        let mock = MockExecutor::new(vec![ok(" M a.csv\n?? b.jpg\n\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock);

        let files = ChangeCommitter::new(&worker).pending_files().unwrap();
        assert_eq!(files, vec![" M a.csv", "?? b.jpg"]);
    }

    #[test]
    fn secret_files_are_ignored_and_untracked() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join(".gitignore"), "target/\n/.env.local").unwrap();
        let mock = MockExecutor::new(vec![ok(".env\n"), ok("")]);
        let worker = GitWorker::with_executor(repo.path(), mock.clone());

        let report = ChangeCommitter::new(&worker)
            .ensure_secret_files_ignored(&[".env", ".env.local"])
            .unwrap();

        assert_eq!(report.ignored, vec![".env"]);
        assert_eq!(report.untracked, vec![".env"]);
        let gitignore = fs::read_to_string(repo.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore, format!("target/\n/.env.local\n{GITIGNORE_MARKER}\n.env\n"));

        let calls = mock.calls();
        assert_eq!(calls[0].args, vec!["ls-files", "--", ".env", ".env.local"]);
        assert_eq!(calls[1].args, vec!["rm", "--cached", "--ignore-unmatch", "--quiet", "--", ".env"]);
    }

    #[test]
    fn hygiene_is_idempotent() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join(".env"), "GITHUB_TOKEN=x\n").unwrap();
        let mock = MockExecutor::new(vec![ok(""), ok("")]);
        let worker = GitWorker::with_executor(repo.path(), mock);
        let committer = ChangeCommitter::new(&worker);

        let first = committer.ensure_secret_files_ignored(&[".env"]).unwrap();
        let second = committer.ensure_secret_files_ignored(&[".env"]).unwrap();

        assert_eq!(first.ignored, vec![".env"]);
        assert!(second.is_empty());
        let gitignore = fs::read_to_string(repo.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(".env").count(), 1);
    }

    #[test]
    fn absent_credential_files_leave_gitignore_alone() {
        let repo = TempDir::new().unwrap();
        let mock = MockExecutor::new(vec![ok("")]);
        let worker = GitWorker::with_executor(repo.path(), mock.clone());

        let report = ChangeCommitter::new(&worker)
            .ensure_secret_files_ignored(&[".env", ".env.local"])
            .unwrap();

        assert!(report.is_empty());
        assert!(!repo.path().join(".gitignore").exists());
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn identity_is_filled_from_login_when_unset() {
        let mock = MockExecutor::new(vec![fail(1, ""), ok(""), ok("someone@example.test\n")]);
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        assert!(ChangeCommitter::new(&worker).ensure_identity(Some("octocat")).unwrap());

        let calls = mock.calls();
        assert_eq!(calls[1].args, vec!["config", "user.name", "octocat"]);
        assert_eq!(calls.len(), 3);
    }

    #[test]
    fn identity_without_login_touches_nothing() {
        let mock = MockExecutor::new(Vec::new());
        let worker = GitWorker::with_executor("/tmp/repo", mock.clone());

        assert!(!ChangeCommitter::new(&worker).ensure_identity(None).unwrap());
        assert!(mock.calls().is_empty());
    }
}

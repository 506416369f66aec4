// Thin git subprocess wrapper with an injectable executor.
//
// Error messages and diagnostics name only the subcommand: arguments can
// carry an authenticated remote URL.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommandOutput {
    /// Both streams, stdout first, as git interleaves them for a user.
    pub fn combined(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitWorkerError {
    #[error("failed to run `{command}`: {message}")]
    SpawnFailed { command: String, message: String },
    #[error("`{command}` failed with code {code:?}: {}", .stderr.trim())]
    CommandFailed { command: String, code: Option<i32>, stderr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn combined(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

fn combine(stdout: &str, stderr: &str) -> String {
    match (stdout.trim_end().is_empty(), stderr.trim_end().is_empty()) {
        (true, _) => stderr.trim_end().to_string(),
        (false, true) => stdout.trim_end().to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
    }
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program)
            .args(args)
            .envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<E> {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        (**self).execute(program, args, env, cwd)
    }
}

/// Limits applied to every push so a stalled transfer fails instead of hanging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushLimits {
    pub low_speed_limit: u32,
    pub low_speed_time_sec: u32,
}

impl Default for PushLimits {
    fn default() -> Self {
        Self { low_speed_limit: 1000, low_speed_time_sec: 30 }
    }
}

#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into(), executor: ProcessCommandExecutor }
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn rev_parse_git_dir(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["rev-parse", "--git-dir"]))
    }

    pub fn status_porcelain(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["status", "--porcelain"]))
    }

    pub fn add_all(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["add", "-A"]))
    }

    pub fn commit(&self, message: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["commit", "-m", message]))
    }

    pub fn rev_parse_head(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["rev-parse", "HEAD"]))
    }

    pub fn current_branch(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["rev-parse", "--abbrev-ref", "HEAD"]))
    }

    pub fn remote_get_url(&self, remote: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["remote", "get-url", remote]))
    }

    pub fn remote_set_url(&self, remote: &str, url: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["remote", "set-url", remote, url]))
    }

    /// `git push -u <remote> <branch>`. The raw result is returned even on a
    /// non-zero exit because the caller classifies the output.
    pub fn push(
        &self,
        remote: &str,
        branch: &str,
        limits: PushLimits,
    ) -> Result<CommandResult, GitWorkerError> {
        let env = vec![
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
            ("GIT_HTTP_LOW_SPEED_LIMIT".to_string(), limits.low_speed_limit.to_string()),
            ("GIT_HTTP_LOW_SPEED_TIME".to_string(), limits.low_speed_time_sec.to_string()),
        ];
        self.execute(args(&["push", "-u", remote, branch]), &env)
    }

    pub fn log_graph(&self, entries: u32) -> Result<GitCommandOutput, GitWorkerError> {
        let count = entries.to_string();
        self.run(args(&["log", "--graph", "--oneline", "--decorate", "--all", "-n", &count]))
    }

    /// `Ok(None)` when the key is unset.
    pub fn config_get(&self, key: &str) -> Result<Option<String>, GitWorkerError> {
        let result = self.execute(args(&["config", "--get", key]), &[])?;
        if result.success {
            let value = result.stdout.trim().to_string();
            return Ok((!value.is_empty()).then_some(value));
        }
        if result.code == Some(1) {
            return Ok(None);
        }
        Err(GitWorkerError::CommandFailed {
            command: "git config".to_string(),
            code: result.code,
            stderr: result.stderr,
        })
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["config", key, value]))
    }

    pub fn ls_files<S: AsRef<str>>(&self, paths: &[S]) -> Result<GitCommandOutput, GitWorkerError> {
        let mut argv = args(&["ls-files", "--"]);
        argv.extend(paths.iter().map(|path| path.as_ref().to_string()));
        self.run(argv)
    }

    pub fn rm_cached<S: AsRef<str>>(&self, paths: &[S]) -> Result<GitCommandOutput, GitWorkerError> {
        let mut argv = args(&["rm", "--cached", "--ignore-unmatch", "--quiet", "--"]);
        argv.extend(paths.iter().map(|path| path.as_ref().to_string()));
        self.run(argv)
    }

    fn run(&self, args: Vec<String>) -> Result<GitCommandOutput, GitWorkerError> {
        let command = label(&args);
        let result = self.execute(args, &[])?;

        if result.success {
            return Ok(GitCommandOutput { stdout: result.stdout, stderr: result.stderr });
        }

        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };

        Err(GitWorkerError::CommandFailed { command, code: result.code, stderr })
    }

    fn execute(
        &self,
        args: Vec<String>,
        env: &[(String, String)],
    ) -> Result<CommandResult, GitWorkerError> {
        let command = label(&args);
        debug!(%command, repo = %self.repo_path.display(), "running git");
        self.executor.execute("git", &args, env, &self.repo_path).map_err(|error| {
            GitWorkerError::SpawnFailed { command, message: error.to_string() }
        })
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

/// `git <subcommand>` plus a leading literal like `get-url`, never values.
fn label(args: &[String]) -> String {
    match args.first().map(String::as_str) {
        Some("remote") => format!("git remote {}", args.get(1).map_or("", String::as_str)),
        Some(subcommand) => format!("git {subcommand}"),
        None => "git".to_string(),
    }
}

// Per-run audit trail with a masked stream and a raw stream.
//
// Layout: `<root>/<YYYY-MM-DD>/<HHMMSS>-<run_id>/{masked.log,raw.log}`.
// Masked lines pass through the redactor and are echoed to the terminal
// sink. Raw lines are written verbatim and never echoed.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use catsync_common::redact::Redactor;
use catsync_common::types::{AuditLevel, AuditRecord, AuditStream, Secret};
use chrono::{DateTime, Local};
use tracing::warn;
use uuid::Uuid;

use crate::security::{create_private_dir_all, open_private_append};

pub const MASKED_LOG: &str = "masked.log";
pub const RAW_LOG: &str = "raw.log";

type TerminalSink = Box<dyn Write + Send>;

struct Sinks {
    masked: File,
    raw: File,
    terminal: Option<TerminalSink>,
    redactor: Redactor,
}

pub struct AuditLogger {
    run_dir: PathBuf,
    masked_path: PathBuf,
    raw_path: PathBuf,
    sinks: Mutex<Sinks>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").field("run_dir", &self.run_dir).finish_non_exhaustive()
    }
}

/// Directory for one run, relative to the log root.
pub fn run_dir(root: &Path, run_id: Uuid, started_at: DateTime<Local>) -> PathBuf {
    root.join(started_at.format("%Y-%m-%d").to_string())
        .join(format!("{}-{run_id}", started_at.format("%H%M%S")))
}

impl AuditLogger {
    /// Create the run directory and both log files. Echoes masked lines to
    /// stderr until [`AuditLogger::with_terminal`] says otherwise.
    pub fn open(root: &Path, run_id: Uuid, started_at: DateTime<Local>) -> Result<Self> {
        let run_dir = run_dir(root, run_id, started_at);
        create_private_dir_all(&run_dir)?;

        let masked_path = run_dir.join(MASKED_LOG);
        let raw_path = run_dir.join(RAW_LOG);
        let masked = open_private_append(&masked_path)
            .with_context(|| format!("failed to open `{}`", masked_path.display()))?;
        let raw = open_private_append(&raw_path)
            .with_context(|| format!("failed to open `{}`", raw_path.display()))?;

        Ok(Self {
            run_dir,
            masked_path,
            raw_path,
            sinks: Mutex::new(Sinks {
                masked,
                raw,
                terminal: Some(Box::new(std::io::stderr())),
                redactor: Redactor::new(),
            }),
        })
    }

    /// Replace the terminal sink. `None` disables echoing.
    pub fn with_terminal(self, terminal: Option<TerminalSink>) -> Self {
        self.sinks().terminal = terminal;
        self
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn masked_path(&self) -> &Path {
        &self.masked_path
    }

    pub fn raw_path(&self) -> &Path {
        &self.raw_path
    }

    pub fn register_secret(&self, secret: &Secret) {
        self.register_value(secret.expose());
    }

    pub fn register_value(&self, value: &str) {
        self.sinks().redactor.register(value);
    }

    /// Apply the run's redaction filter without writing anything.
    pub fn mask(&self, text: &str) -> String {
        self.sinks().redactor.redact(text)
    }

    pub fn info(&self, line: impl AsRef<str>) {
        self.write(AuditStream::Masked, AuditLevel::Info, line.as_ref());
    }

    pub fn warn(&self, line: impl AsRef<str>) {
        self.write(AuditStream::Masked, AuditLevel::Warn, line.as_ref());
    }

    pub fn error(&self, line: impl AsRef<str>) {
        self.write(AuditStream::Masked, AuditLevel::Error, line.as_ref());
    }

    pub fn raw(&self, line: impl AsRef<str>) {
        self.write(AuditStream::Raw, AuditLevel::Info, line.as_ref());
    }

    /// Append `text` to `stream`, one timestamped record per physical line.
    pub fn write(&self, stream: AuditStream, level: AuditLevel, text: &str) {
        let mut sinks = self.sinks();
        let text = match stream {
            AuditStream::Masked => sinks.redactor.redact(text),
            AuditStream::Raw => text.to_string(),
        };

        let lines: Vec<&str> = if text.is_empty() { vec![""] } else { text.lines().collect() };
        for line in lines {
            let record =
                AuditRecord { timestamp: Local::now(), stream, level, line: line.to_string() };
            sinks.append(&record);
        }
    }

    fn sinks(&self) -> MutexGuard<'_, Sinks> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sinks {
    fn append(&mut self, record: &AuditRecord) {
        let rendered = record.render();
        let file = match record.stream {
            AuditStream::Masked => &mut self.masked,
            AuditStream::Raw => &mut self.raw,
        };
        if let Err(error) = writeln!(file, "{rendered}") {
            warn!(stream = ?record.stream, %error, "audit sink write failed");
        }

        if record.stream != AuditStream::Masked {
            return;
        }
        if let Some(terminal) = self.terminal.as_mut() {
            let echoed = match record.level {
                AuditLevel::Info => writeln!(terminal, "{}", record.line),
                AuditLevel::Warn => writeln!(terminal, "warning: {}", record.line),
                AuditLevel::Error => writeln!(terminal, "error: {}", record.line),
            };
            if let Err(error) = echoed.and_then(|_| terminal.flush()) {
                warn!(%error, "terminal echo failed");
            }
        }
    }
}

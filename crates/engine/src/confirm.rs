// Post-push confirmation: a graph viewer window, or a text graph fallback.
//
// Never fails the run. The viewer poll is bounded by both an attempt count
// and a wall-clock deadline.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::audit::AuditLogger;
use crate::config::ConfirmConfig;
use crate::git::worker::{CommandExecutor, GitWorker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// The viewer window appeared after `polls` checks.
    ViewerShown { polls: u32 },
    /// The commit graph was printed to the masked stream.
    TextGraph { lines: usize },
    Unavailable { reason: String },
}

/// Access to a graphical session for launching and finding the viewer.
pub trait DisplaySession {
    fn is_available(&self) -> bool;
    fn launch_viewer(&mut self, repo: &Path) -> std::io::Result<()>;
    fn window_visible(&mut self) -> bool;
    fn focus_window(&mut self) -> bool;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// X11/Wayland desktop with `wmctrl` for window lookup.
#[derive(Debug)]
pub struct DesktopSession {
    display: bool,
    viewer: Option<PathBuf>,
    viewer_args: Vec<String>,
    window_title: String,
    wmctrl: Option<PathBuf>,
    child: Option<Child>,
}

impl DesktopSession {
    pub fn detect(config: &ConfirmConfig) -> Self {
        let display = ["DISPLAY", "WAYLAND_DISPLAY"]
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|value| !value.is_empty()));
        Self {
            display,
            viewer: which::which(&config.viewer).ok(),
            viewer_args: config.viewer_args.clone(),
            window_title: config.window_title.to_lowercase(),
            wmctrl: which::which("wmctrl").ok(),
            child: None,
        }
    }

    fn viewer_exited(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(Some(status))) => {
                debug!(%status, "viewer exited before its window was found");
                true
            }
            _ => false,
        }
    }
}

impl DisplaySession for DesktopSession {
    fn is_available(&self) -> bool {
        self.display && self.viewer.is_some() && self.wmctrl.is_some()
    }

    fn launch_viewer(&mut self, repo: &Path) -> std::io::Result<()> {
        let Some(viewer) = self.viewer.as_ref() else {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "viewer not installed"));
        };
        let child = Command::new(viewer)
            .args(&self.viewer_args)
            .current_dir(repo)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        self.child = Some(child);
        Ok(())
    }

    fn window_visible(&mut self) -> bool {
        if self.viewer_exited() {
            return false;
        }
        let Some(wmctrl) = self.wmctrl.as_ref() else {
            return false;
        };
        match Command::new(wmctrl).arg("-l").stdin(Stdio::null()).output() {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .any(|line| line.to_lowercase().contains(&self.window_title)),
            _ => false,
        }
    }

    fn focus_window(&mut self) -> bool {
        let Some(wmctrl) = self.wmctrl.as_ref() else {
            return false;
        };
        Command::new(wmctrl)
            .args(["-a", self.window_title.as_str()])
            .stdin(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}

pub struct ConfirmationPresenter<'a> {
    config: &'a ConfirmConfig,
    clock: &'a dyn Clock,
}

impl<'a> ConfirmationPresenter<'a> {
    pub fn new(config: &'a ConfirmConfig, clock: &'a dyn Clock) -> Self {
        Self { config, clock }
    }

    /// Show the viewer when a session is given and usable, otherwise print
    /// the text graph.
    pub async fn present<E: CommandExecutor>(
        &self,
        worker: &GitWorker<E>,
        audit: &AuditLogger,
        session: Option<&mut dyn DisplaySession>,
    ) -> ConfirmationOutcome {
        let session = match session {
            Some(session) if self.config.enabled && session.is_available() => session,
            Some(_) if self.config.enabled => {
                audit.info("no graphical session or viewer available; showing text graph");
                return self.text_graph(worker, audit);
            }
            _ => return self.text_graph(worker, audit),
        };

        if let Err(error) = session.launch_viewer(worker.repo_path()) {
            audit.warn(format!("could not launch {}: {error}", self.config.viewer));
            return self.text_graph(worker, audit);
        }

        match self.poll(session).await {
            Some(polls) => {
                session.focus_window();
                audit.info(format!("{} window open", self.config.viewer));
                ConfirmationOutcome::ViewerShown { polls }
            }
            None => {
                audit.warn(format!(
                    "{} window did not appear within {}s; showing text graph",
                    self.config.viewer,
                    self.config.poll_deadline().as_secs()
                ));
                self.text_graph(worker, audit)
            }
        }
    }

    async fn poll(&self, session: &mut dyn DisplaySession) -> Option<u32> {
        let attempts = self.config.poll_attempts.max(1);
        let deadline = self.clock.now() + self.config.poll_deadline();

        for poll in 1..=attempts {
            if session.window_visible() {
                return Some(poll);
            }
            if poll == attempts || self.clock.now() >= deadline {
                break;
            }
            self.clock.sleep(self.config.poll_interval()).await;
        }
        None
    }

    fn text_graph<E: CommandExecutor>(
        &self,
        worker: &GitWorker<E>,
        audit: &AuditLogger,
    ) -> ConfirmationOutcome {
        match worker.log_graph(self.config.graph_entries) {
            Ok(output) => {
                let lines: Vec<&str> = output.stdout.lines().collect();
                for line in &lines {
                    audit.info(line);
                }
                ConfirmationOutcome::TextGraph { lines: lines.len() }
            }
            Err(error) => {
                let reason = audit.mask(&error.to_string());
                audit.warn(format!("confirmation unavailable: {reason}"));
                ConfirmationOutcome::Unavailable { reason }
            }
        }
    }
}

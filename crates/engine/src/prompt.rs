// Hidden-input prompt on the controlling terminal.

use std::io::Write;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

pub trait Prompter: Send {
    /// Ask for a secret. `Ok(None)` means the user aborted.
    fn prompt_secret(&mut self, message: &str) -> std::io::Result<Option<String>>;
}

/// Prompts on `/dev/tty` with echo off, independent of stdout and stderr.
pub struct TerminalPrompter {
    out: Box<dyn Write + Send>,
}

impl std::fmt::Debug for TerminalPrompter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalPrompter").finish_non_exhaustive()
    }
}

impl TerminalPrompter {
    /// `None` when no terminal is attached to this process.
    pub fn open() -> Option<Self> {
        #[cfg(unix)]
        {
            let tty = std::fs::OpenOptions::new().read(true).write(true).open("/dev/tty").ok()?;
            Some(Self { out: Box::new(tty) })
        }
        #[cfg(not(unix))]
        {
            use std::io::IsTerminal;

            std::io::stdin()
                .is_terminal()
                .then(|| Self { out: Box::new(std::io::stderr()) })
        }
    }
}

impl Prompter for TerminalPrompter {
    fn prompt_secret(&mut self, message: &str) -> std::io::Result<Option<String>> {
        write!(self.out, "{message}: ")?;
        self.out.flush()?;

        let entered = {
            let _raw = RawMode::enable()?;
            read_hidden()?
        };

        writeln!(self.out)?;
        self.out.flush()?;
        Ok(entered)
    }
}

struct RawMode;

impl RawMode {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn read_hidden() -> std::io::Result<Option<String>> {
    let mut buffer = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match apply_key(&mut buffer, key) {
            KeyOutcome::Continue => {}
            KeyOutcome::Submit => return Ok(Some(buffer)),
            KeyOutcome::Abort => return Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Submit,
    Abort,
}

fn apply_key(buffer: &mut String, key: KeyEvent) -> KeyOutcome {
    if key.kind == KeyEventKind::Release {
        return KeyOutcome::Continue;
    }
    match key.code {
        KeyCode::Enter => KeyOutcome::Submit,
        KeyCode::Esc => KeyOutcome::Abort,
        KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            KeyOutcome::Abort
        }
        KeyCode::Backspace => {
            buffer.pop();
            KeyOutcome::Continue
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            buffer.push(c);
            KeyOutcome::Continue
        }
        _ => KeyOutcome::Continue,
    }
}

//! User-facing output. Side-effect only; library code reports progress
//! through this trait instead of printing directly.

use std::fmt;
use std::sync::Mutex;

pub trait Console {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
    fn success(&self, msg: &str);
    fn line_break(&self);

    fn printf(&self, args: fmt::Arguments<'_>) {
        self.info(&args.to_string());
    }
}

/// Writes to the terminal: info and success to stdout, warnings and errors
/// to stderr.
#[derive(Debug, Default)]
pub struct TermConsole {
    quiet: bool,
}

impl TermConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress info and success lines (used for `--json` output).
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

impl Console for TermConsole {
    fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {msg}");
        }
    }

    fn warn(&self, msg: &str) {
        eprintln!("warning: {msg}");
    }

    fn error(&self, msg: &str) {
        eprintln!("error: {msg}");
    }

    fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{msg}");
        }
    }

    fn line_break(&self) {
        if !self.quiet {
            println!();
        }
    }
}

/// Captures every line in memory. Each entry is prefixed with its level.
#[derive(Debug, Default)]
pub struct MemConsole {
    lines: Mutex<Vec<String>>,
}

impl MemConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn push(&self, level: &str, msg: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format!("{level}: {msg}"));
        }
    }
}

impl Console for MemConsole {
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }

    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }

    fn error(&self, msg: &str) {
        self.push("error", msg);
    }

    fn success(&self, msg: &str) {
        self.push("success", msg);
    }

    fn line_break(&self) {
        self.push("info", "");
    }
}

//! Append-only run log plus colored console echo.
//!
//! Every event lands in the log file as `[timestamp] [LEVEL] message`.
//! Console output is a convenience layer on top: `quiet` mode (used by the
//! cron-driven updater) silences it, except for errors.

use crate::error::AppError;
use chrono::Local;
use console::style;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Debug => "DEBUG",
        }
    }
}

/// Render one log line without the trailing newline.
pub fn format_line(timestamp: &str, level: Level, message: &str) -> String {
    format!("[{timestamp}] [{}] {message}", level.as_str())
}

pub struct Logger {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
    quiet: bool,
    debug: bool,
}

impl Logger {
    /// Open (or create) the log file in append mode.
    pub fn open(path: &Path, quiet: bool) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Mutex::new(Some(file)),
            quiet,
            debug: std::env::var_os("CLAWSTRAP_DEBUG").is_some(),
        })
    }

    /// A logger with no file sink, for paths that run before a home is known.
    pub fn console_only(quiet: bool) -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
            quiet,
            debug: std::env::var_os("CLAWSTRAP_DEBUG").is_some(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Write a run header carrying a fresh run id.
    pub fn start_run(&self, command: &str) -> String {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.write_file(Level::Info, &format!("=== {command} run {run_id} started ==="));
        run_id
    }

    pub fn info(&self, msg: &str) {
        self.log(Level::Info, msg);
    }

    pub fn success(&self, msg: &str) {
        self.log(Level::Success, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.log(Level::Warning, msg);
    }

    pub fn error(&self, msg: &str) {
        self.log(Level::Error, msg);
    }

    pub fn debug(&self, msg: &str) {
        self.log(Level::Debug, msg);
    }

    /// `[Step n/N] title` progress line.
    pub fn step(&self, n: usize, total: usize, title: &str) {
        let line = format!("[Step {n}/{total}] {title}");
        self.write_file(Level::Info, &line);
        if !self.quiet {
            println!("\n{}", style(line).bold());
        }
    }

    pub fn log(&self, level: Level, msg: &str) {
        self.write_file(level, msg);
        self.echo(level, msg);
    }

    fn echo(&self, level: Level, msg: &str) {
        if self.quiet && level != Level::Error {
            return;
        }
        match level {
            Level::Info => println!("  {msg}"),
            Level::Success => println!("  {} {msg}", style("✓").green()),
            Level::Warning => println!("  {} {}", style("!").yellow(), style(msg).yellow()),
            Level::Error => eprintln!("  {} {}", style("✗").red(), style(msg).red()),
            Level::Debug if self.debug => println!("  {}", style(msg).dim()),
            Level::Debug => {}
        }
    }

    fn write_file(&self, level: Level, msg: &str) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        if let Some(file) = guard.as_mut() {
            let ts = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            let _ = writeln!(file, "{}", format_line(&ts, level, msg));
        }
    }
}

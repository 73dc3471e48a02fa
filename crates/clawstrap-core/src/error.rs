use thiserror::Error;

/// Exit code for failures that don't fit a narrower class.
pub const EXIT_GENERAL: i32 = 1;
/// Exit code when a prerequisite (OS, disk, network) is not met.
pub const EXIT_PREREQUISITE: i32 = 2;
/// Exit code when a provisioning phase fails to apply or verify.
pub const EXIT_INSTALL: i32 = 3;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Missing prerequisite: {0}")]
    Prerequisite(String),

    #[error("Identity hand-off failed ({step}): {message}")]
    Handoff { step: String, message: String },

    #[error("Provision error ({phase}): {message}")]
    Provision { phase: String, message: String },

    #[error("Verification failed ({phase}): {missing} is missing after install")]
    Verify { phase: String, missing: String },

    #[error("Command `{command}` failed with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Lock file {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Installation record error: {0}")]
    Record(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Not published: {0} returned 404")]
    NotPublished(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Wrap any displayable error as a failure of `phase`.
    pub fn provision(phase: &str, err: impl std::fmt::Display) -> Self {
        AppError::Provision {
            phase: phase.to_string(),
            message: err.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Prerequisite(_) => EXIT_PREREQUISITE,
            AppError::Provision { .. } | AppError::Verify { .. } => EXIT_INSTALL,
            _ => EXIT_GENERAL,
        }
    }
}

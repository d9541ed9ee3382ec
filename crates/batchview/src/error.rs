//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use batchview_config::ConfigError;
use batchview_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(batchview::not_found),
        help("Run: batchview list {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{message}")]
    #[diagnostic(code(batchview::missing))]
    Missing { message: String },

    #[error("{message}")]
    #[diagnostic(code(batchview::conflict))]
    Conflict { message: String },

    // ── Backend ──────────────────────────────────────────────────────

    #[error("API error (HTTP {status}{}): {message}", code_suffix(.code.as_deref()))]
    #[diagnostic(code(batchview::api_error))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Could not reach the backend: {reason}")]
    #[diagnostic(code(batchview::connection_failed))]
    Connection { reason: String },

    #[error("Malformed record: {message}")]
    #[diagnostic(
        code(batchview::invalid_record),
        help("Check the record in the fixture file.\nRaw body: {body}")
    )]
    InvalidRecord { message: String, body: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(batchview::validation))]
    Validation { field: String, reason: String },

    // ── Fixture / Configuration ─────────────────────────────────────

    #[error("No fixture configured")]
    #[diagnostic(
        code(batchview::no_fixture),
        help(
            "Pass --fixture <PATH>, set BATCHVIEW_FIXTURE, or record one with:\n\
             batchview config init --with-fixture <PATH>\n\
             Config file: {path}"
        )
    )]
    NoFixture { path: String },

    #[error("Could not load fixture {path}: {reason}")]
    #[diagnostic(
        code(batchview::fixture),
        help("The fixture is a JSON object with pools, jobs, certificates, tasks, and nodeFiles.")
    )]
    Fixture { path: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(batchview::config))]
    Config(#[from] ConfigError),

    // ── Internal ─────────────────────────────────────────────────────

    #[error("Internal error: {0}")]
    #[diagnostic(code(batchview::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(batchview::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::Missing { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Connection { .. } => exit_code::CONNECTION,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        if err.is_not_found() {
            return CliError::Missing {
                message: err_message(&err),
            };
        }
        if err.is_conflict() {
            return CliError::Conflict {
                message: err_message(&err),
            };
        }

        match err {
            CoreError::Server {
                status,
                code,
                message,
            } => CliError::Api {
                status,
                code,
                message,
            },

            CoreError::Transport(reason) => CliError::Connection { reason },

            CoreError::Deserialization { message, body } => {
                CliError::InvalidRecord { message, body }
            }

            CoreError::InvalidSelect { select, reason } => CliError::Validation {
                field: format!("select '{select}'"),
                reason,
            },

            CoreError::UnknownSortKey(key) => CliError::Validation {
                field: "sort".into(),
                reason: format!("unknown sort key '{key}'"),
            },

            CoreError::Config(reason) => CliError::Validation {
                field: "engine".into(),
                reason,
            },

            other @ (CoreError::MissingParams | CoreError::Disposed | CoreError::Runtime(_)) => {
                CliError::Internal(other.to_string())
            }
        }
    }
}

fn code_suffix(code: Option<&str>) -> String {
    code.map(|c| format!(", {c}")).unwrap_or_default()
}

fn err_message(err: &CoreError) -> String {
    match err {
        CoreError::Server { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

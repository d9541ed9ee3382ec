use thiserror::Error;

/// HTTP status codes the engine treats specially.
pub mod status_code {
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
}

/// Top-level error type for `batchview-core`.
///
/// Covers every failure the engine can surface: errors reported by the
/// injected fetch functions, entity transformation failures, and misuse of
/// views. Cloneable so views can keep the last error in a watch channel.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Remote ──────────────────────────────────────────────────────
    /// The backing service answered with an error status.
    #[error("Server error (HTTP {status}): {message}")]
    Server {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never produced a response (connection refused, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    // ── Data ────────────────────────────────────────────────────────
    /// A raw payload could not be turned into an entity, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A partial-update `select` could not be applied to the cached entity.
    #[error("Cannot apply select '{select}': {reason}")]
    InvalidSelect { select: String, reason: String },

    // ── Usage ───────────────────────────────────────────────────────
    /// The presenter was asked to sort by a key it has no comparator for.
    #[error("Unknown sort key '{0}'")]
    UnknownSortKey(String),

    /// An entity view was asked to fetch before any params were set.
    #[error("No params set on view")]
    MissingParams,

    /// The view was disposed before or while the operation ran.
    #[error("View has been disposed")]
    Disposed,

    /// Background work (polling, stream bridging) needs a Tokio runtime.
    #[error("No Tokio runtime available: {0}")]
    Runtime(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Build a server error from a status code and message.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Shorthand for a 404 server error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::server(status_code::NOT_FOUND, message)
    }

    pub(crate) fn deserialization(err: &serde_json::Error, body: &serde_json::Value) -> Self {
        Self::Deserialization {
            message: err.to_string(),
            body: body.to_string(),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(status_code::NOT_FOUND)
    }

    /// Returns `true` if this is a "conflict" error.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(status_code::CONFLICT)
    }

    /// Returns `true` if the error's status is in `codes`, meaning callers
    /// expect it and it should not be reported as unexpected.
    pub fn is_ignored(&self, codes: &[u16]) -> bool {
        self.status().is_some_and(|s| codes.contains(&s))
    }

    /// Extract the service error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

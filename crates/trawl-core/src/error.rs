use thiserror::Error;

/// Failure reported for a single job.
///
/// The `Display` form is the stable, user-visible message: callers assert on
/// it (`err.to_string() == "timeout"`), so the strings below are part of the
/// engine contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The network call exceeded the job's timeout.
    #[error("timeout")]
    Timeout,

    /// DNS / address resolution failed for the target host.
    #[error("host-not-found")]
    HostNotFound,

    /// The server answered with a status >= 400 (or no usable status).
    #[error("status-{}", .status.map_or_else(|| "unknown".to_string(), |s| s.to_string()))]
    Status { status: Option<u16> },

    /// Any other transport failure, message passed through unchanged.
    #[error("{0}")]
    Transport(String),

    /// The response body could not be turned into a document.
    #[error("parse-error: {0}")]
    Parse(String),

    /// The scraper script faulted (returned an error, panicked, or never completed).
    #[error("{0}")]
    Scraper(String),

    /// The extracted data failed validation.
    #[error("invalid-data")]
    InvalidData,
}

impl JobError {
    /// Numeric HTTP status carried by a `status-*` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            JobError::Status { status } => *status,
            _ => None,
        }
    }

    /// Short kind tag, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Timeout => "timeout",
            JobError::HostNotFound => "host-not-found",
            JobError::Status { .. } => "status",
            JobError::Transport(_) => "transport",
            JobError::Parse(_) => "parse",
            JobError::Scraper(_) => "scraper",
            JobError::InvalidData => "invalid-data",
        }
    }

    /// Returns true for the fixed taxonomy kinds (everything but passthrough
    /// transport errors and script faults).
    pub fn is_classified(&self) -> bool {
        matches!(
            self,
            JobError::Timeout
                | JobError::HostNotFound
                | JobError::Status { .. }
                | JobError::InvalidData
        )
    }
}

/// Errors raised while setting the engine up, outside of any job.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP client construction failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Invalid engine or transport configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A declarative scraper source could not be parsed.
    #[error("Invalid scraper source: {0}")]
    ScriptSource(String),

    /// A validation type expression names an unknown category.
    #[error("Invalid type expression: {0}")]
    TypeExpression(String),

    /// A JSON Schema used for validation could not be compiled.
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Reading a script or configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Portable classification of a vendor database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The database detected a cyclic lock wait.
    Deadlock,
    /// A lock wait exceeded the database threshold.
    LockTimeout,
    /// Transport or connectivity failure.
    ConnectionError,
    /// Unique constraint violation.
    Duplicate,
    /// The DDL target is already present.
    AlreadyExists,
    /// A referenced object does not exist.
    UndefinedName,
    /// Anything not classified above.
    Generic,
}

impl ErrorKind {
    /// Only lock conflicts are recovered locally by the retry loop.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Deadlock | ErrorKind::LockTimeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Deadlock => "deadlock",
            ErrorKind::LockTimeout => "lock timeout",
            ErrorKind::ConnectionError => "connection error",
            ErrorKind::Duplicate => "unique constraint violation",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::UndefinedName => "undefined name",
            ErrorKind::Generic => "database error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw error surface reported by a database driver, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VendorError {
    pub sql_state: Option<String>,
    pub code: Option<i32>,
    pub message: String,
}

impl VendorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            sql_state: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }
}

impl fmt::Display for VendorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sql_state, self.code) {
            (Some(state), Some(code)) => {
                write!(f, "{} [SQLSTATE={state}, SQLCODE={code}]", self.message)
            }
            (Some(state), None) => write!(f, "{} [SQLSTATE={state}]", self.message),
            (None, Some(code)) => write!(f, "{} [SQLCODE={code}]", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// A vendor error after the dialect translator has classified it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {vendor}")]
pub struct DataAccessError {
    kind: ErrorKind,
    vendor: VendorError,
}

impl DataAccessError {
    pub fn new(kind: ErrorKind, vendor: VendorError) -> Self {
        Self { kind, vendor }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn vendor(&self) -> &VendorError {
        &self.vendor
    }

    pub fn is_deadlock(&self) -> bool {
        self.kind == ErrorKind::Deadlock
    }
}

/// Core error type shared across dbdeploy crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Classified failure reported by the database.
    #[error("database error: {0}")]
    DataAccess(#[from] DataAccessError),
    /// The object model violates its own invariants.
    #[error("invalid model: {0}")]
    InvalidModel(String),
    /// The dependency graph is not a DAG.
    #[error("dependency cycle among: {}", .0.join(", "))]
    Cycle(Vec<String>),
    /// A requested capability is not available.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// A deployment worker died without reporting an outcome.
    #[error("worker failed: {0}")]
    Worker(String),
    /// Deployment of a single object reached the failed state.
    #[error("[FAILED] {object} [remaining={remaining_attempts}]: {source}")]
    Deploy {
        object: String,
        remaining_attempts: u32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn deploy(object: impl Into<String>, remaining_attempts: u32, source: Error) -> Self {
        Error::Deploy {
            object: object.into(),
            remaining_attempts,
            source: Box::new(source),
        }
    }

    /// Classification of the underlying database failure, if there is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::DataAccess(err) => Some(err.kind()),
            Error::Deploy { source, .. } => source.kind(),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_some_and(ErrorKind::is_retryable)
    }
}

/// Convenience alias for results returned by dbdeploy crates.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for query invocations.
//!
//! Every failure of a single invocation maps onto exactly one [`QueryError`]
//! category. The engine layer reports opaque [`EngineError`] messages which the
//! connector and materializer tag with the category of the step that failed.

use serde::Serialize;
use thiserror::Error;

/// Tagged failure of one query invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The database file could not be opened read-only.
    #[error("open sqlite db failed: {0}")]
    Open(String),

    /// The query text does not begin with SELECT.
    #[error("query must be SELECT: Only read-only SELECT queries are allowed.")]
    PolicyViolation,

    /// A statement parameter has no matching supplied argument.
    #[error("parameter binding failed: {0}")]
    Binding(String),

    /// The engine rejected the statement (syntax error, missing table, ...).
    #[error("query failed: {0}")]
    Execution(String),

    /// Column metadata was unavailable after execution.
    #[error("columns failed: {0}")]
    Columns(String),

    /// A row's cell values could not be read.
    #[error("scan failed: {0}")]
    Scan(String),

    /// The cursor reported a fault once row consumption ended.
    #[error("row iteration failed: {0}")]
    RowIteration(String),

    /// The row list could not be encoded as JSON.
    #[error("result encoding failed: {0}")]
    Encode(String),

    /// The caller cancelled the invocation.
    #[error("query cancelled")]
    Cancelled,

    /// The configured deadline elapsed.
    #[error("query timed out after {0} ms")]
    TimedOut(u64),

    /// The worker running the invocation failed unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn open(msg: impl Into<String>) -> Self {
        Self::Open(msg.into())
    }

    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn columns(msg: impl Into<String>) -> Self {
        Self::Columns(msg.into())
    }

    pub fn scan(msg: impl Into<String>) -> Self {
        Self::Scan(msg.into())
    }

    pub fn row_iteration(msg: impl Into<String>) -> Self {
        Self::RowIteration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short, fixed description of the failure category.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Open(_) => "open sqlite db failed",
            Self::PolicyViolation => "query must be SELECT",
            Self::Binding(_) => "parameter binding failed",
            Self::Execution(_) => "query failed",
            Self::Columns(_) => "columns failed",
            Self::Scan(_) => "scan failed",
            Self::RowIteration(_) => "row iteration failed",
            Self::Encode(_) => "result encoding failed",
            Self::Cancelled => "query cancelled",
            Self::TimedOut(_) => "query timed out",
            Self::Internal(_) => "internal error",
        }
    }

    /// Human-readable detail, usually the engine's own message.
    pub fn detail(&self) -> String {
        match self {
            Self::Open(msg)
            | Self::Binding(msg)
            | Self::Execution(msg)
            | Self::Columns(msg)
            | Self::Scan(msg)
            | Self::RowIteration(msg)
            | Self::Encode(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::PolicyViolation => "Only read-only SELECT queries are allowed.".to_string(),
            Self::Cancelled => "The query was cancelled before it completed.".to_string(),
            Self::TimedOut(ms) => format!("The query did not complete within {ms} ms."),
        }
    }

    /// Structured form handed back to the orchestrating tool.
    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic {
            summary: self.summary().to_string(),
            detail: self.detail(),
        }
    }
}

/// Summary and detail pair describing a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub summary: String,
    pub detail: String,
}

/// Opaque failure reported by an engine capability call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Result type alias using QueryError.
pub type Result<T> = std::result::Result<T, QueryError>;

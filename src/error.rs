//! Unified application error model and mapping helpers.
//! Each layer of the query path has its own `thiserror` enum; all of them fold
//! into `AppError`, which carries a stable code and maps to an HTTP status.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Malformed or incomplete query request. Fatal to the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no breakdown set")]
    MissingBreakdown,
    #[error("no start time given")]
    MissingStartTime,
    #[error("no end time given")]
    MissingEndTime,
    #[error("unable to parse time {value:?}: {reason}")]
    TimeParse { value: String, reason: String },
    #[error("start time {start} is after end time {end}")]
    InvertedTimeRange { start: i64, end: i64 },
}

/// A single field or filter could not be turned into SQL. Recovered per field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("{0:?} is not a valid identifier")]
    InvalidIdentifier(String),
    #[error("field {0:?} is not in the catalog")]
    UnknownField(String),
    #[error("dict for field {0} not found")]
    MissingDictionary(String),
    #[error("key expression {template:?} expects {slots} argument(s), got {args}")]
    KeyTemplate { template: String, slots: usize, args: usize },
    #[error("breakdown field {0:?} selected more than once")]
    DuplicateBreakdown(String),
}

/// Inconsistent catalog or dictionary configuration. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("field {0:?} is declared twice")]
    DuplicateField(String),
    #[error("{0:?} is not a valid field or key name")]
    InvalidName(String),
    #[error("dict {dict:?} is bound to unknown field {field:?}")]
    UnknownDictField { field: String, dict: String },
}

/// Failure talking to the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage rejected statement (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed storage response: {0}")]
    Malformed(String),
}

/// A result cell could not be decoded according to its declared column type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("column {column:?} has unsupported type {ty}")]
    UnsupportedType { column: String, ty: String },
    #[error("column {column:?}: cannot read {value} as {ty}")]
    BadValue { column: String, ty: String, value: String },
    #[error("result has {0} column(s); need at least a time and a value column")]
    TooFewColumns(usize),
    #[error("row {row} has {got} cell(s), expected {expected}")]
    RowWidth { row: usize, got: usize, expected: usize },
    #[error("column {column:?} holds {kind} where {expected} was expected")]
    UnexpectedKind { column: String, kind: &'static str, expected: &'static str },
}

/// Fatal failure while running a built query.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("query failed: {0}")]
    Store(#[from] StoreError),
    #[error("query exceeded deadline of {0:?}")]
    Timeout(std::time::Duration),
    #[error("unable to decode result: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Exec { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Exec { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Exec { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn exec<S: Into<String>>(code: S, msg: S) -> Self { AppError::Exec { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Exec { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self { AppError::user("invalid_request".to_string(), err.to_string()) }
}

impl From<ResolutionError> for AppError {
    fn from(err: ResolutionError) -> Self { AppError::user("unresolved_field".to_string(), err.to_string()) }
}

impl From<ExecError> for AppError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Store(StoreError::Transport(e)) => AppError::exec("store_unreachable".to_string(), e.to_string()),
            ExecError::Timeout(_) => AppError::exec("query_timeout".to_string(), err.to_string()),
            other => AppError::exec("exec_error".to_string(), other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self { ExecError::Store(err).into() }
}

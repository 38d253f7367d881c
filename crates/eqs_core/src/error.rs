//! Error types for the Environment Query System.
//!
//! Grid indexing errors ([`EqsError::OutOfRange`]) are programming errors and
//! are returned immediately. Query-level errors are folded into a
//! [`crate::query::QueryResult`] with `Failure` status by the executor and
//! engine, so they never escape the query boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-checkable error classification exposed across the tool boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    EnvironmentNotInitialized,
    InvalidSceneIdentifier,
    InvalidAreaOfInterest,
    QueryExecutionFailed,
    ObjectNotFound,
    PrefabNotFound,
    InvalidPosition,
    NoQueryResults,
    InvalidCustomRegion,
    OutOfRange,
    InvalidParameter,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// All failures produced by the core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EqsError {
    #[error("Environment has not been built yet")]
    EnvironmentNotInitialized,

    #[error("Unknown scene: {0}")]
    InvalidSceneIdentifier(String),

    #[error("Invalid area of interest: {0}")]
    InvalidAreaOfInterest(String),

    #[error("Query execution failed: {0}")]
    QueryExecutionFailed(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Prefab not found: {0}")]
    PrefabNotFound(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("No query results: {0}")]
    NoQueryResults(String),

    #[error("Invalid custom region: {0}")]
    InvalidCustomRegion(String),

    #[error("Grid access out of range: {what} {value} (limit {limit})")]
    OutOfRange {
        what: &'static str,
        value: i64,
        limit: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl EqsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EqsError::EnvironmentNotInitialized => ErrorKind::EnvironmentNotInitialized,
            EqsError::InvalidSceneIdentifier(_) => ErrorKind::InvalidSceneIdentifier,
            EqsError::InvalidAreaOfInterest(_) => ErrorKind::InvalidAreaOfInterest,
            EqsError::QueryExecutionFailed(_) => ErrorKind::QueryExecutionFailed,
            EqsError::ObjectNotFound(_) => ErrorKind::ObjectNotFound,
            EqsError::PrefabNotFound(_) => ErrorKind::PrefabNotFound,
            EqsError::InvalidPosition(_) => ErrorKind::InvalidPosition,
            EqsError::NoQueryResults(_) => ErrorKind::NoQueryResults,
            EqsError::InvalidCustomRegion(_) => ErrorKind::InvalidCustomRegion,
            EqsError::OutOfRange { .. } => ErrorKind::OutOfRange,
            EqsError::InvalidParameter(_) => ErrorKind::InvalidParameter,
        }
    }
}

impl From<serde_json::Error> for EqsError {
    fn from(e: serde_json::Error) -> Self {
        EqsError::QueryExecutionFailed(e.to_string())
    }
}

/// Structured error payload for tool responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EqsError> for ErrorPayload {
    fn from(e: &EqsError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

pub type EqsResult<T> = Result<T, EqsError>;

/// Query results as returned to callers and stored in the cache
use crate::error::{EqsError, ErrorKind};
use crate::types::{GridCoord, ObjectId, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryStatus {
    Success,
    /// Some conditions or criteria were skipped; see `warnings`
    PartialSuccess,
    Failure,
    /// Reserved for asynchronous hosts; the core never returns it
    Processing,
}

/// One ranked location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub world_position: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Quat>,
    pub score: f64,
    /// Weighted contribution of each criterion, keyed by criterion label
    pub breakdown_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub cell_indices: Option<GridCoord>,
    pub cell_index: usize,
    /// Dynamic objects occupying the candidate cell
    #[serde(default)]
    pub associated_object_ids: Vec<ObjectId>,
}

/// Outcome of one query execution.
///
/// Either `results` holds at least one candidate (`Success` /
/// `PartialSuccess`) or `status` is `Failure` with `error_kind` and
/// `error_message` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub query_id: String,
    pub status: QueryStatus,
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Informational only
    pub execution_time_ms: f64,
    /// Hash of the snapshot the query ran against (empty if none)
    #[serde(default)]
    pub environment_hash: String,
    pub candidates_evaluated: usize,
    pub candidates_passed: usize,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub results: Vec<Candidate>,
}

impl QueryResult {
    pub fn failure(query_id: impl Into<String>, error: &EqsError) -> Self {
        Self {
            query_id: query_id.into(),
            status: QueryStatus::Failure,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            execution_time_ms: 0.0,
            environment_hash: String::new(),
            candidates_evaluated: 0,
            candidates_passed: 0,
            warnings: Vec::new(),
            results: Vec::new(),
        }
    }

    /// `Success` or `PartialSuccess`.
    pub fn is_success(&self) -> bool {
        matches!(self.status, QueryStatus::Success | QueryStatus::PartialSuccess)
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.results.first()
    }
}

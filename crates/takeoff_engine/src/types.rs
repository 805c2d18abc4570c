use std::collections::BTreeMap;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type RunId = String;

/// One `data:` frame from a run's progress stream.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub stats: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub approach: Option<String>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProgressFrame {
    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind.as_str(), "complete" | "error")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct RunAccepted {
    pub run_id: RunId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ResultsPayload {
    #[serde(default)]
    pub plans: Vec<PlanEntry>,
    #[serde(default)]
    pub fixtures: Vec<ItemEntry>,
    #[serde(default)]
    pub keynotes: Vec<ItemEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanEntry {
    pub id: String,
    #[serde(default)]
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemEntry {
    pub identifier: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub counts: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionsQuery {
    pub page: Option<u32>,
    pub plan: String,
    /// `fixture` or `keynote`.
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PositionsPayload {
    pub page_width: f64,
    pub page_height: f64,
    #[serde(default)]
    pub detections: BTreeMap<String, Vec<DetectionBox>>,
}

/// Bounding box in document units. Centers are optional on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DetectionBox {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
    #[serde(default)]
    pub center_x: Option<f64>,
    #[serde(default)]
    pub center_y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackPayload {
    pub action: String,
    pub target: String,
    pub target_kind: String,
    pub reason: String,
    pub detail: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FeedbackAck {
    pub feedback_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunStarted {
        result: Result<RunId, BackendError>,
    },
    Progress {
        run_id: RunId,
        frame: ProgressFrame,
    },
    /// The stream ended on its own. Cancelled subscriptions do not report.
    StreamClosed {
        run_id: RunId,
        error: Option<BackendError>,
    },
    ResultsFetched {
        run_id: Option<RunId>,
        result: Result<ResultsPayload, BackendError>,
    },
    PositionsFetched {
        request_id: u64,
        result: Result<PositionsPayload, BackendError>,
    },
    FeedbackSubmitted {
        result: Result<FeedbackAck, BackendError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    Decode,
    Stream,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "decode error"),
            FailureKind::Stream => write!(f, "stream error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend setup failed: {0}")]
    Backend(#[from] BackendError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] io::Error),
}

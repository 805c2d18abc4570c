//! Takeoff engine: backend IO and effect execution.
mod client;
mod engine;
mod persist;
mod sse;
mod types;

pub use client::{Backend, BackendSettings, ChannelProgressSink, ProgressSink, ReqwestBackend};
pub use engine::EngineHandle;
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use sse::SseDecoder;
pub use types::{
    BackendError, DetectionBox, EngineError, EngineEvent, FailureKind, FeedbackAck,
    FeedbackPayload, ItemEntry, PlanEntry, PositionsPayload, PositionsQuery, ProgressFrame,
    ResultsPayload, RunId,
};

//! Takeoff core: pure state machine for supervising an extraction pipeline.
//!
//! Everything here is synchronous and free of IO. Inputs arrive as [`Msg`]s,
//! [`update`] applies them, and any IO the shell must perform comes back as
//! [`Effect`]s.
pub mod diff;
mod effect;
mod feedback;
pub mod geometry;
mod item;
mod ledger;
mod msg;
mod overlay;
mod progress;
mod state;
mod update;
mod view_model;

pub use diff::{compute_diff, DiffEntry, DiffSummary};
pub use effect::Effect;
pub use feedback::{FeedbackAction, FeedbackItem, FeedbackSync};
pub use geometry::{PageTransform, PixelRect, Position};
pub use item::{ItemCollection, ItemKey, ItemKind, ItemRecord, PlanId, PlanSheet};
pub use ledger::{Correction, CorrectionKind, Ledger, LedgerError, Snapshot, SnapshotTag};
pub use msg::Msg;
pub use overlay::{
    BackgroundClick, FetchedPositions, HighlightSession, MarkerChange, MarkerEdit, MarkerPlacement,
    OverlayEngine, OverlayNotice, OverlayPhase, PositionsRequest, ReviewMarks, ReviewMarksSnapshot,
};
pub use progress::{
    default_pipeline, AgentTask, Applied, PlanningState, ProgressEvent, ProgressTracker, RunId,
    RunState, StatValue, SubscriptionHandle, TaskStatus, TaskTemplate, TrackingChange,
    VerificationState,
};
pub use state::{AppState, DiffOrigin, DiffReport};
pub use update::update;
pub use view_model::{AppViewModel, ItemRowView, OverlayView, TaskRowView};

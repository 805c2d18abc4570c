use crate::{
    FetchedPositions, ItemCollection, ItemKey, PlanId, ProgressEvent, ReviewMarksSnapshot, RunId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User asked for a fresh pipeline run.
    RunRequested,
    /// User asked the backend to reprocess with the corrections so far.
    ReprocessRequested,
    /// Backend answered a run or reprocess request.
    RunStarted { result: Result<RunId, String> },
    /// One frame from the progress stream of `run_id`.
    Progress { run_id: RunId, event: ProgressEvent },
    /// The progress stream for `run_id` ended, with or without an error.
    StreamClosed {
        run_id: RunId,
        error: Option<String>,
    },
    /// User asked to reload results without a run.
    ResultsRefreshRequested,
    ResultsFetched {
        run_id: Option<RunId>,
        result: Result<ItemCollection, String>,
    },
    /// User picked an item to verify on the page overlay.
    ItemSelected { item: ItemKey, plan: Option<PlanId> },
    OverlayDismissed,
    PositionsFetched {
        request_id: u64,
        result: Result<FetchedPositions, String>,
    },
    DetectionToggled { index: usize },
    /// Explicit marker placement at a pixel on a page rendered at the given size.
    MarkerAddedAt {
        px: f64,
        py: f64,
        rendered_width: f64,
        rendered_height: f64,
    },
    AddedMarkerRemoved { index: usize },
    AddModeToggled,
    OverlayBackgroundClicked {
        px: f64,
        py: f64,
        rendered_width: f64,
        rendered_height: f64,
    },
    NextPlan,
    PreviousPlan,
    CountEdited {
        item: ItemKey,
        plan: PlanId,
        value: u32,
    },
    FieldEdited {
        item: ItemKey,
        field: String,
        value: String,
    },
    ItemAdded { item: ItemKey },
    ItemRemoved { item: ItemKey },
    CompareWithOriginalRequested,
    FeedbackSubmitted { result: Result<u64, String> },
    /// Restore review marks persisted by a previous session.
    RestoreReviewMarks(Vec<ReviewMarksSnapshot>),
    /// Fallback for placeholder wiring.
    NoOp,
}

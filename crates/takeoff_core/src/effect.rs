use crate::{FeedbackItem, PositionsRequest, RunId};

/// IO the shell must perform on behalf of the core. Completions come back as
/// `Msg`s.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartRun {
        project_id: String,
    },
    Reprocess {
        project_id: String,
    },
    Subscribe {
        run_id: RunId,
    },
    CloseSubscription {
        run_id: RunId,
    },
    FetchResults {
        project_id: String,
        /// The completed run that triggered the fetch, if any.
        run_id: Option<RunId>,
    },
    FetchPositions {
        project_id: String,
        request: PositionsRequest,
    },
    SubmitFeedback {
        project_id: String,
        item: FeedbackItem,
    },
}

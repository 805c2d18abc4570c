use crate::state::DiffReport;
use crate::{
    ItemKey, OverlayNotice, PlanId, PlanningState, RunId, RunState, TaskStatus, VerificationState,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub project_id: String,
    pub run_state: RunState,
    pub active_run: Option<RunId>,
    pub tasks: Vec<TaskRowView>,
    pub plans: Vec<PlanId>,
    pub items: Vec<ItemRowView>,
    pub project_total: u64,
    pub edit_count: u64,
    /// Save/export actions unlock after the first correction.
    pub can_save: bool,
    pub last_diff: Option<DiffReport>,
    pub overlay: Option<OverlayView>,
    pub feedback_reported: u64,
    pub feedback_confirmed: u64,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRowView {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub planning: PlanningState,
    pub verification: VerificationState,
    pub elapsed_seconds: Option<f64>,
    pub confidence: Option<f64>,
    pub issue_count: usize,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRowView {
    pub key: ItemKey,
    pub counts: Vec<(PlanId, u32)>,
    pub total: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayView {
    pub item: ItemKey,
    pub plan: PlanId,
    /// Index of `plan` on the session's navigation route.
    pub plan_position: Option<usize>,
    pub plan_count: usize,
    pub loading: bool,
    pub detections: usize,
    pub rejected: Vec<usize>,
    pub added: usize,
    pub acceptance: u32,
    pub ledger_count: u32,
    pub add_mode: bool,
    pub notice: Option<OverlayNotice>,
}

use crate::diff::DiffSummary;
use crate::view_model::{AppViewModel, ItemRowView, OverlayView, TaskRowView};
use crate::{
    FeedbackSync, Ledger, OverlayEngine, ProgressTracker, ReviewMarksSnapshot, TaskTemplate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOrigin {
    /// Pre-reprocess baseline against the results of the reprocess run.
    Reprocess,
    /// First pipeline output against the current, edited state.
    Original,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub origin: DiffOrigin,
    pub summary: DiffSummary,
}

/// All mutable project state. Owned by one dispatch loop and changed only
/// through `update`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub(crate) project_id: String,
    pub(crate) tracker: ProgressTracker,
    pub(crate) ledger: Ledger,
    pub(crate) overlay: OverlayEngine,
    pub(crate) feedback: FeedbackSync,
    pub(crate) last_diff: Option<DiffReport>,
    dirty: bool,
}

impl AppState {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn with_pipeline(project_id: impl Into<String>, template: Vec<TaskTemplate>) -> Self {
        Self {
            project_id: project_id.into(),
            tracker: ProgressTracker::new(template),
            ..Self::default()
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn overlay(&self) -> &OverlayEngine {
        &self.overlay
    }

    pub fn feedback(&self) -> &FeedbackSync {
        &self.feedback
    }

    pub fn last_diff(&self) -> Option<&DiffReport> {
        self.last_diff.as_ref()
    }

    pub fn review_snapshot(&self) -> Vec<ReviewMarksSnapshot> {
        self.overlay.review_snapshot()
    }

    pub fn view(&self) -> AppViewModel {
        let collection = self.ledger.collection();
        let tasks = self
            .tracker
            .tasks()
            .iter()
            .map(|task| TaskRowView {
                id: task.id.clone(),
                name: task.name.clone(),
                status: task.status,
                planning: task.planning_state,
                verification: task.verification_state,
                elapsed_seconds: task.elapsed_seconds,
                confidence: task.verification_confidence,
                issue_count: task.verification_issues.len(),
                flags: task.flags.clone(),
            })
            .collect();
        let items = collection
            .items
            .values()
            .map(|record| ItemRowView {
                key: record.key.clone(),
                counts: record
                    .counts_by_plan
                    .iter()
                    .map(|(plan, count)| (plan.clone(), *count))
                    .collect(),
                total: record.total,
                description: record
                    .text_fields
                    .get("description")
                    .or_else(|| record.text_fields.get("text"))
                    .cloned(),
            })
            .collect();
        let overlay = self.overlay.session().map(|session| OverlayView {
            item: session.item.clone(),
            plan: session.plan.clone(),
            plan_position: session
                .available_plans
                .iter()
                .position(|plan| *plan == session.plan),
            plan_count: session.available_plans.len(),
            loading: session.is_loading(),
            detections: session.detections.len(),
            rejected: session.rejected.iter().copied().collect(),
            added: session.added.len(),
            acceptance: session.acceptance_count(),
            ledger_count: self
                .ledger
                .item(&session.item)
                .map(|record| record.count_on(&session.plan))
                .unwrap_or(0),
            add_mode: session.add_mode,
            notice: session.notice,
        });

        AppViewModel {
            project_id: self.project_id.clone(),
            run_state: self.tracker.run_state().clone(),
            active_run: self.tracker.active_run().map(str::to_string),
            tasks,
            plans: collection.plans.iter().map(|sheet| sheet.id.clone()).collect(),
            items,
            project_total: self.ledger.project_total(),
            edit_count: self.ledger.edit_count(),
            can_save: self.ledger.edit_count() > 0,
            last_diff: self.last_diff.clone(),
            overlay,
            feedback_reported: self.feedback.reported(),
            feedback_confirmed: self.feedback.confirmed(),
            dirty: self.dirty,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns whether anything visible changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Returns whether the persisted review marks changed since the last call.
    pub fn consume_review_dirty(&mut self) -> bool {
        self.overlay.consume_marks_dirty()
    }
}

use takeoff_logging::{takeoff_debug, takeoff_warn};

use crate::geometry::Position;
use crate::overlay::{MarkerChange, MarkerEdit};
use crate::{ItemKey, PlanId};

/// What the human did. Each variant carries its own payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackAction {
    CountOverride {
        plan: PlanId,
        original: u32,
        corrected: u32,
    },
    ItemAdded,
    ItemRemoved {
        total: u32,
    },
    FieldEdited {
        field: String,
        original: Option<String>,
        corrected: String,
    },
    DetectionRejected {
        plan: PlanId,
        index: usize,
        position: Position,
        acceptance: u32,
    },
    DetectionRestored {
        plan: PlanId,
        index: usize,
        position: Position,
        acceptance: u32,
    },
    MarkerAdded {
        plan: PlanId,
        position: Position,
        acceptance: u32,
    },
    MarkerRemoved {
        plan: PlanId,
        position: Position,
        acceptance: u32,
    },
}

impl FeedbackAction {
    pub fn name(&self) -> &'static str {
        match self {
            FeedbackAction::CountOverride { .. } => "count_override",
            FeedbackAction::ItemAdded => "item_added",
            FeedbackAction::ItemRemoved { .. } => "item_removed",
            FeedbackAction::FieldEdited { .. } => "field_edited",
            FeedbackAction::DetectionRejected { .. } => "detection_rejected",
            FeedbackAction::DetectionRestored { .. } => "detection_restored",
            FeedbackAction::MarkerAdded { .. } => "marker_added",
            FeedbackAction::MarkerRemoved { .. } => "marker_removed",
        }
    }
}

/// A report sent to the backend. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackItem {
    pub action: FeedbackAction,
    pub target: ItemKey,
    pub reason: String,
    pub detail: String,
}

impl FeedbackItem {
    pub fn count_override(target: ItemKey, plan: PlanId, original: u32, corrected: u32) -> Self {
        let detail = format!("{target} on {plan}: {original} -> {corrected}");
        Self {
            action: FeedbackAction::CountOverride {
                plan,
                original,
                corrected,
            },
            target,
            reason: "manual_count".to_string(),
            detail,
        }
    }

    pub fn item_added(target: ItemKey) -> Self {
        Self {
            detail: format!("{target} added by reviewer"),
            action: FeedbackAction::ItemAdded,
            target,
            reason: "missed_item".to_string(),
        }
    }

    pub fn item_removed(target: ItemKey, total: u32) -> Self {
        Self {
            detail: format!("{target} removed by reviewer (had {total})"),
            action: FeedbackAction::ItemRemoved { total },
            target,
            reason: "spurious_item".to_string(),
        }
    }

    pub fn field_edited(
        target: ItemKey,
        field: &str,
        original: Option<String>,
        corrected: &str,
    ) -> Self {
        Self {
            detail: format!("{target} {field} set to {corrected:?}"),
            action: FeedbackAction::FieldEdited {
                field: field.to_string(),
                original,
                corrected: corrected.to_string(),
            },
            target,
            reason: "spec_correction".to_string(),
        }
    }

    pub fn from_marker(change: &MarkerChange) -> Self {
        let plan = change.plan.clone();
        let acceptance = change.acceptance;
        let (action, reason, detail) = match change.edit {
            MarkerEdit::Rejected { index, position } => (
                FeedbackAction::DetectionRejected {
                    plan,
                    index,
                    position,
                    acceptance,
                },
                "false_positive",
                format!("rejected detection #{index}"),
            ),
            MarkerEdit::Restored { index, position } => (
                FeedbackAction::DetectionRestored {
                    plan,
                    index,
                    position,
                    acceptance,
                },
                "rejection_undone",
                format!("restored detection #{index}"),
            ),
            MarkerEdit::Added { position } => (
                FeedbackAction::MarkerAdded {
                    plan,
                    position,
                    acceptance,
                },
                "missed_detection",
                format!(
                    "added marker at ({:.1}, {:.1})",
                    position.center_x, position.center_y
                ),
            ),
            MarkerEdit::Removed { index, position } => (
                FeedbackAction::MarkerRemoved {
                    plan,
                    position,
                    acceptance,
                },
                "marker_removed",
                format!("removed added marker #{index}"),
            ),
        };
        Self {
            action,
            target: change.item.clone(),
            reason: reason.to_string(),
            detail: format!("{detail} on {} (now {acceptance})", change.plan),
        }
    }
}

/// Local bookkeeping for fire-and-forget reports. `reported` is what this
/// client sent; `confirmed` is the backend's authoritative count and only
/// ever grows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedbackSync {
    reported: u64,
    confirmed: u64,
    dropped: u64,
}

impl FeedbackSync {
    pub fn reported(&self) -> u64 {
        self.reported
    }

    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn note_reported(&mut self, item: &FeedbackItem) {
        self.reported += 1;
        takeoff_debug!(
            "feedback: reporting {} for {}",
            item.action.name(),
            item.target
        );
    }

    /// Returns whether the confirmed count moved.
    pub fn acknowledged(&mut self, accepted_count: u64) -> bool {
        if accepted_count > self.confirmed {
            self.confirmed = accepted_count;
            true
        } else {
            false
        }
    }

    pub fn failed(&mut self, message: &str) {
        self.dropped += 1;
        takeoff_warn!("feedback: submission dropped: {}", message);
    }
}

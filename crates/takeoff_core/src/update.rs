use takeoff_logging::{takeoff_debug, takeoff_info, takeoff_warn};

use crate::overlay::{BackgroundClick, MarkerPlacement};
use crate::state::{DiffOrigin, DiffReport};
use crate::{
    AppState, Applied, Correction, CorrectionKind, Effect, FeedbackItem, ItemCollection, ItemKey,
    ItemRecord, MarkerChange, Msg, PositionsRequest, ProgressEvent, RunId, SnapshotTag,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::RunRequested => request_run(&mut state, false),
        Msg::ReprocessRequested => request_run(&mut state, true),
        Msg::RunStarted { result } => run_started(&mut state, result),
        Msg::Progress { run_id, event } => progress(&mut state, &run_id, event),
        Msg::StreamClosed { run_id, error } => stream_closed(&mut state, &run_id, error),
        Msg::ResultsRefreshRequested => vec![Effect::FetchResults {
            project_id: state.project_id.clone(),
            run_id: None,
        }],
        Msg::ResultsFetched { run_id, result } => results_fetched(&mut state, run_id, result),
        Msg::ItemSelected { item, plan } => {
            let request = state.overlay.select(state.ledger.collection(), item, plan);
            fetch_positions(&mut state, request)
        }
        Msg::OverlayDismissed => {
            if state.overlay.dismiss() {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::PositionsFetched { request_id, result } => {
            if state.overlay.positions_loaded(request_id, result) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::DetectionToggled { index } => {
            let change = state.overlay.toggle_detection(index);
            marker_changed(&mut state, change)
        }
        Msg::MarkerAddedAt {
            px,
            py,
            rendered_width,
            rendered_height,
        } => match state
            .overlay
            .add_marker_at_pixel(px, py, rendered_width, rendered_height)
        {
            MarkerPlacement::Added(change) => marker_changed(&mut state, Some(change)),
            MarkerPlacement::NotPlaced => {
                state.mark_dirty();
                Vec::new()
            }
            MarkerPlacement::Ignored => Vec::new(),
        },
        Msg::AddedMarkerRemoved { index } => {
            let change = state.overlay.remove_added(index);
            marker_changed(&mut state, change)
        }
        Msg::AddModeToggled => {
            if state.overlay.toggle_add_mode().is_some() {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::OverlayBackgroundClicked {
            px,
            py,
            rendered_width,
            rendered_height,
        } => match state
            .overlay
            .background_click(px, py, rendered_width, rendered_height)
        {
            BackgroundClick::Added(change) => marker_changed(&mut state, Some(change)),
            BackgroundClick::NotPlaced | BackgroundClick::Dismissed => {
                state.mark_dirty();
                Vec::new()
            }
            BackgroundClick::Ignored => Vec::new(),
        },
        Msg::NextPlan => step_plan(&mut state, true),
        Msg::PreviousPlan => step_plan(&mut state, false),
        Msg::CountEdited { item, plan, value } => count_edited(&mut state, item, plan, value),
        Msg::FieldEdited { item, field, value } => field_edited(&mut state, item, &field, &value),
        Msg::ItemAdded { item } => item_added(&mut state, item),
        Msg::ItemRemoved { item } => item_removed(&mut state, item),
        Msg::CompareWithOriginalRequested => {
            match state.ledger.compare_with_original() {
                Some(summary) => {
                    state.last_diff = Some(DiffReport {
                        origin: DiffOrigin::Original,
                        summary,
                    });
                    state.mark_dirty();
                }
                None => takeoff_info!("no original results to compare against yet"),
            }
            Vec::new()
        }
        Msg::FeedbackSubmitted { result } => {
            match result {
                Ok(accepted) => {
                    if state.feedback.acknowledged(accepted) {
                        state.mark_dirty();
                    }
                }
                Err(message) => state.feedback.failed(&message),
            }
            Vec::new()
        }
        Msg::RestoreReviewMarks(entries) => {
            state.overlay.restore_review(entries);
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn request_run(state: &mut AppState, reprocess: bool) -> Vec<Effect> {
    if state
        .tracker
        .subscription()
        .is_some_and(|handle| handle.is_open())
    {
        takeoff_debug!("run already in progress; ignoring request");
        return Vec::new();
    }
    let project_id = state.project_id.clone();
    if reprocess {
        // Baseline for the diff shown when the reprocessed results land.
        state.ledger.snapshot(SnapshotTag::PreReprocess);
        state.mark_dirty();
        vec![Effect::Reprocess { project_id }]
    } else {
        vec![Effect::StartRun { project_id }]
    }
}

fn run_started(state: &mut AppState, result: Result<RunId, String>) -> Vec<Effect> {
    state.mark_dirty();
    let run_id = match result {
        Ok(run_id) => run_id,
        Err(message) => {
            discard_reprocess_baseline(state, "run did not start");
            state.tracker.start_failed(message);
            return Vec::new();
        }
    };

    let change = state.tracker.start_tracking(run_id.clone());
    let mut effects = Vec::with_capacity(2);
    if let Some(previous) = change.closed {
        effects.push(Effect::CloseSubscription { run_id: previous });
    }
    if change.opened {
        effects.push(Effect::Subscribe { run_id });
    }
    effects
}

fn progress(state: &mut AppState, run_id: &str, event: ProgressEvent) -> Vec<Effect> {
    match state.tracker.apply(run_id, event) {
        Applied::Ignored => Vec::new(),
        Applied::Updated => {
            state.mark_dirty();
            Vec::new()
        }
        Applied::Completed => {
            state.mark_dirty();
            vec![
                Effect::CloseSubscription {
                    run_id: run_id.to_string(),
                },
                Effect::FetchResults {
                    project_id: state.project_id.clone(),
                    run_id: Some(run_id.to_string()),
                },
            ]
        }
        Applied::Failed => {
            state.mark_dirty();
            discard_reprocess_baseline(state, "run failed");
            vec![Effect::CloseSubscription {
                run_id: run_id.to_string(),
            }]
        }
    }
}

/// A stream that ends before `complete`/`error` is a fatal run error.
fn stream_closed(state: &mut AppState, run_id: &str, error: Option<String>) -> Vec<Effect> {
    let still_open = state
        .tracker
        .subscription()
        .is_some_and(|handle| handle.run_id() == run_id && handle.is_open());
    if !still_open {
        takeoff_debug!("stream for run {} closed after terminal event", run_id);
        return Vec::new();
    }
    let message = error.unwrap_or_else(|| "progress stream ended before completion".to_string());
    progress(
        state,
        run_id,
        ProgressEvent::PipelineError {
            agent_id: None,
            message,
        },
    )
}

/// Only results of the run that just completed may consume the reprocess
/// baseline. Run-less refreshes replace the collection and leave snapshots
/// alone.
fn results_fetched(
    state: &mut AppState,
    run_id: Option<RunId>,
    result: Result<ItemCollection, String>,
) -> Vec<Effect> {
    let from_run = match run_id.as_deref() {
        Some(run_id) if !state.tracker.take_awaiting_results(run_id) => {
            takeoff_debug!("dropping results for stale run {}", run_id);
            return Vec::new();
        }
        Some(_) => true,
        None => false,
    };
    let collection = match result {
        Ok(collection) => collection,
        Err(message) => {
            takeoff_warn!("results fetch failed: {}", message);
            if from_run {
                discard_reprocess_baseline(state, "results unavailable");
            }
            return Vec::new();
        }
    };

    let baseline = if from_run {
        state.ledger.consume_snapshot(SnapshotTag::PreReprocess)
    } else {
        None
    };
    state.ledger.replace_collection(collection);
    if state.overlay.retain_known(state.ledger.collection()) {
        takeoff_info!("closing overlay: item no longer in results");
    }
    if state.ledger.snapshot_ref(SnapshotTag::Original).is_none() {
        state.ledger.snapshot(SnapshotTag::Original);
    }
    if let Some(baseline) = baseline {
        let summary = state.ledger.diff_against(&baseline);
        takeoff_info!(
            "reprocess diff: {} changes (rerun needed: {})",
            summary.total_diffs,
            summary.needs_rerun
        );
        state.last_diff = Some(DiffReport {
            origin: DiffOrigin::Reprocess,
            summary,
        });
    }
    state.mark_dirty();
    Vec::new()
}

fn discard_reprocess_baseline(state: &mut AppState, reason: &str) {
    if state
        .ledger
        .consume_snapshot(SnapshotTag::PreReprocess)
        .is_some()
    {
        takeoff_info!("dropping reprocess baseline: {}", reason);
    }
}

fn fetch_positions(state: &mut AppState, request: Option<PositionsRequest>) -> Vec<Effect> {
    match request {
        Some(request) => {
            state.mark_dirty();
            vec![Effect::FetchPositions {
                project_id: state.project_id.clone(),
                request,
            }]
        }
        None => Vec::new(),
    }
}

fn step_plan(state: &mut AppState, forward: bool) -> Vec<Effect> {
    let request = state.overlay.step_plan(state.ledger.collection(), forward);
    fetch_positions(state, request)
}

/// Folds an overlay mutation back into the ledger and reports it.
fn marker_changed(state: &mut AppState, change: Option<MarkerChange>) -> Vec<Effect> {
    let Some(change) = change else {
        return Vec::new();
    };
    state.mark_dirty();
    let previous = match state
        .ledger
        .set_count(&change.item, &change.plan, change.acceptance)
    {
        Ok(previous) => previous,
        Err(err) => {
            takeoff_warn!("overlay write-back skipped: {}", err);
            return Vec::new();
        }
    };
    state.ledger.recalculate();
    state.ledger.record_correction(Correction {
        kind: CorrectionKind::OverlayReview,
        item: change.item.clone(),
        plan: Some(change.plan.clone()),
        original_count: previous,
        corrected_count: change.acceptance,
    });
    vec![report(state, FeedbackItem::from_marker(&change))]
}

fn count_edited(state: &mut AppState, item: ItemKey, plan: String, value: u32) -> Vec<Effect> {
    let previous = match state.ledger.set_count(&item, &plan, value) {
        Ok(previous) => previous,
        Err(err) => {
            takeoff_warn!("count edit rejected: {}", err);
            return Vec::new();
        }
    };
    if previous == value {
        return Vec::new();
    }
    state.ledger.recalculate();
    state.ledger.record_correction(Correction {
        kind: CorrectionKind::CountOverride,
        item: item.clone(),
        plan: Some(plan.clone()),
        original_count: previous,
        corrected_count: value,
    });
    state.mark_dirty();
    vec![report(
        state,
        FeedbackItem::count_override(item, plan, previous, value),
    )]
}

fn field_edited(state: &mut AppState, item: ItemKey, field: &str, value: &str) -> Vec<Effect> {
    let original = match state.ledger.set_field(&item, field, value) {
        Ok(original) => original,
        Err(err) => {
            takeoff_warn!("field edit rejected: {}", err);
            return Vec::new();
        }
    };
    if original.as_deref() == Some(value) {
        return Vec::new();
    }
    let total = state.ledger.item(&item).map_or(0, |record| record.total);
    state.ledger.record_correction(Correction {
        kind: CorrectionKind::FieldEdited,
        item: item.clone(),
        plan: None,
        original_count: total,
        corrected_count: total,
    });
    state.mark_dirty();
    vec![report(
        state,
        FeedbackItem::field_edited(item, field, original, value),
    )]
}

fn item_added(state: &mut AppState, item: ItemKey) -> Vec<Effect> {
    if let Err(err) = state.ledger.add_item(ItemRecord::new(item.clone())) {
        takeoff_warn!("add rejected: {}", err);
        return Vec::new();
    }
    state.ledger.recalculate();
    state.ledger.record_correction(Correction {
        kind: CorrectionKind::ItemAdded,
        item: item.clone(),
        plan: None,
        original_count: 0,
        corrected_count: 0,
    });
    state.mark_dirty();
    vec![report(state, FeedbackItem::item_added(item))]
}

fn item_removed(state: &mut AppState, item: ItemKey) -> Vec<Effect> {
    let removed = match state.ledger.remove_item(&item) {
        Ok(removed) => removed,
        Err(err) => {
            takeoff_warn!("remove rejected: {}", err);
            return Vec::new();
        }
    };
    state.ledger.recalculate();
    state.overlay.retain_known(state.ledger.collection());
    state.ledger.record_correction(Correction {
        kind: CorrectionKind::ItemRemoved,
        item: item.clone(),
        plan: None,
        original_count: removed.total,
        corrected_count: 0,
    });
    state.mark_dirty();
    vec![report(state, FeedbackItem::item_removed(item, removed.total))]
}

fn report(state: &mut AppState, item: FeedbackItem) -> Effect {
    state.feedback.note_reported(&item);
    Effect::SubmitFeedback {
        project_id: state.project_id.clone(),
        item,
    }
}

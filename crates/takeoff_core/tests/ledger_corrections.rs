use pretty_assertions::assert_eq;
use takeoff_core::{
    compute_diff, update, AppState, CorrectionKind, DiffOrigin, Effect, FeedbackAction,
    ItemCollection, ItemKey, ItemRecord, Ledger, Msg, PlanSheet, ProgressEvent,
};

fn plans() -> Vec<PlanSheet> {
    vec![
        PlanSheet {
            id: "E1".into(),
            page: 1,
        },
        PlanSheet {
            id: "E2".into(),
            page: 2,
        },
    ]
}

fn fixtures(ids: &[&str]) -> ItemCollection {
    ItemCollection::new(
        plans(),
        ids.iter().map(|id| {
            ItemRecord::new(ItemKey::fixture(*id))
                .with_count("E1", 1)
                .with_count("E2", 2)
                .with_field("description", format!("{id} troffer"))
        }),
    )
}

/// Runs a full pipeline cycle and lands `collection` as its results.
fn complete_run(state: AppState, run_id: &str, collection: ItemCollection) -> AppState {
    let (state, _) = update(
        state,
        Msg::RunStarted {
            result: Ok(run_id.to_string()),
        },
    );
    let (state, _) = update(
        state,
        Msg::Progress {
            run_id: run_id.to_string(),
            event: ProgressEvent::PipelineComplete,
        },
    );
    let (state, _) = update(
        state,
        Msg::ResultsFetched {
            run_id: Some(run_id.to_string()),
            result: Ok(collection),
        },
    );
    state
}

#[test]
fn totals_track_counts_after_any_edit_sequence() {
    let mut ledger = Ledger::new();
    ledger.replace_collection(fixtures(&["A1", "A2", "B6"]));
    let edits = [
        ("A1", "E1", 7),
        ("A2", "E2", 0),
        ("B6", "E3", 4),
        ("A1", "E1", 3),
        ("B6", "E1", 12),
    ];
    for (id, plan, value) in edits {
        ledger.set_count(&ItemKey::fixture(id), plan, value).unwrap();
        ledger.recalculate();
        for record in ledger.collection().items.values() {
            assert_eq!(record.total, record.counts_by_plan.values().sum::<u32>());
        }
    }
    let project: u64 = ledger
        .collection()
        .items
        .values()
        .map(|r| u64::from(r.total))
        .sum();
    assert_eq!(ledger.project_total(), project);
    assert_eq!(ledger.project_total(), 3 + 2 + 1 + 0 + 12 + 2 + 4);
}

#[test]
fn diff_of_a_snapshot_with_itself_is_empty() {
    let collection = fixtures(&["A1", "A2"]);
    let diff = compute_diff(&collection.items, &collection.items);
    assert_eq!(diff.count_changes, 0);
    assert_eq!(diff.spec_changes, 0);
    assert_eq!(diff.items_added, 0);
    assert_eq!(diff.items_removed, 0);
    assert_eq!(diff.total_diffs, 0);
    assert!(!diff.needs_rerun);
}

#[test]
fn structural_changes_need_a_rerun() {
    let baseline = fixtures(&["A1", "A2"]);
    let current = fixtures(&["A2", "A3"]);

    let diff = compute_diff(&baseline.items, &current.items);
    assert_eq!(diff.items_added, 1);
    assert_eq!(diff.added, vec![ItemKey::fixture("A3")]);
    assert_eq!(diff.items_removed, 1);
    assert_eq!(diff.removed, vec![ItemKey::fixture("A1")]);
    assert_eq!(diff.total_diffs, 2);
    assert!(diff.needs_rerun);
}

#[test]
fn count_edit_recalculates_records_and_reports() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1"]));
    let (mut state, effects) = update(
        state,
        Msg::CountEdited {
            item: ItemKey::fixture("A1"),
            plan: "E1".into(),
            value: 5,
        },
    );

    let view = state.view();
    assert_eq!(view.items[0].total, 7);
    assert_eq!(view.project_total, 7);
    assert_eq!(view.edit_count, 1);
    assert!(view.can_save);
    assert_eq!(view.feedback_reported, 1);
    assert!(state.consume_dirty());
    match &effects[..] {
        [Effect::SubmitFeedback { project_id, item }] => {
            assert_eq!(project_id, "proj");
            assert_eq!(
                item.action,
                FeedbackAction::CountOverride {
                    plan: "E1".into(),
                    original: 1,
                    corrected: 5,
                }
            );
        }
        other => panic!("unexpected effects {other:?}"),
    }

    let correction = &state.ledger().corrections()[0];
    assert_eq!(correction.kind, CorrectionKind::CountOverride);
    assert_eq!(correction.original_count, 1);
    assert_eq!(correction.corrected_count, 5);
}

#[test]
fn unchanged_count_edit_is_not_a_correction() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1"]));
    let (state, effects) = update(
        state,
        Msg::CountEdited {
            item: ItemKey::fixture("A1"),
            plan: "E1".into(),
            value: 1,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.ledger().edit_count(), 0);
}

#[test]
fn edits_to_unknown_items_are_rejected_quietly() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1"]));
    let (state, effects) = update(
        state,
        Msg::CountEdited {
            item: ItemKey::fixture("Z9"),
            plan: "E1".into(),
            value: 3,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.ledger().edit_count(), 0);
}

#[test]
fn add_and_remove_items_show_up_against_the_original() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1", "A2"]));
    let (state, _) = update(
        state,
        Msg::ItemAdded {
            item: ItemKey::fixture("A3"),
        },
    );
    let (state, effects) = update(
        state,
        Msg::ItemRemoved {
            item: ItemKey::fixture("A1"),
        },
    );
    assert_eq!(effects.len(), 1);
    assert_eq!(state.view().project_total, 3);

    let (state, _) = update(state, Msg::CompareWithOriginalRequested);
    let report = state.last_diff().unwrap();
    assert_eq!(report.origin, DiffOrigin::Original);
    assert_eq!(report.summary.items_added, 1);
    assert_eq!(report.summary.items_removed, 1);
    assert!(report.summary.needs_rerun);
    assert_eq!(state.ledger().edit_count(), 2);
}

#[test]
fn field_edits_count_as_spec_changes() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1"]));
    let (state, effects) = update(
        state,
        Msg::FieldEdited {
            item: ItemKey::fixture("A1"),
            field: "voltage".into(),
            value: "277".into(),
        },
    );
    assert_eq!(effects.len(), 1);

    let (state, _) = update(state, Msg::CompareWithOriginalRequested);
    let summary = &state.last_diff().unwrap().summary;
    assert_eq!(summary.spec_changes, 1);
    assert!(!summary.needs_rerun);
}

#[test]
fn reprocess_diffs_against_the_pre_reprocess_baseline_once() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1", "A2"]));
    let (state, _) = update(
        state,
        Msg::CountEdited {
            item: ItemKey::fixture("A2"),
            plan: "E2".into(),
            value: 6,
        },
    );
    let (state, effects) = update(state, Msg::ReprocessRequested);
    assert_eq!(
        effects,
        vec![Effect::Reprocess {
            project_id: "proj".into()
        }]
    );

    let state = complete_run(state, "r2", fixtures(&["A2", "A3"]));
    let report = state.last_diff().unwrap().clone();
    assert_eq!(report.origin, DiffOrigin::Reprocess);
    assert_eq!(report.summary.items_added, 1);
    assert_eq!(report.summary.items_removed, 1);
    // A2 on E2 went 6 -> 2 after the backend pass.
    assert_eq!(report.summary.count_changes, 1);
    assert!(state
        .ledger()
        .snapshot_ref(takeoff_core::SnapshotTag::PreReprocess)
        .is_none());

    // A later plain run has no baseline to diff against.
    let state = complete_run(state, "r3", fixtures(&["A2"]));
    assert_eq!(state.last_diff().unwrap(), &report);
}

#[test]
fn failed_reprocess_start_discards_the_baseline() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1"]));
    let (state, _) = update(state, Msg::ReprocessRequested);
    let (state, _) = update(
        state,
        Msg::RunStarted {
            result: Err("backend busy".into()),
        },
    );
    assert!(state
        .ledger()
        .snapshot_ref(takeoff_core::SnapshotTag::PreReprocess)
        .is_none());
}

#[test]
fn refresh_during_reprocess_keeps_the_baseline() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1"]));
    let (state, _) = update(state, Msg::ReprocessRequested);
    let (state, _) = update(
        state,
        Msg::RunStarted {
            result: Ok("r2".into()),
        },
    );

    // A manual refresh lands while the reprocess is still streaming.
    let (state, effects) = update(state, Msg::ResultsRefreshRequested);
    assert_eq!(
        effects,
        vec![Effect::FetchResults {
            project_id: "proj".into(),
            run_id: None,
        }]
    );
    let (state, _) = update(
        state,
        Msg::ResultsFetched {
            run_id: None,
            result: Ok(fixtures(&["A1"])),
        },
    );
    assert!(state
        .ledger()
        .snapshot_ref(takeoff_core::SnapshotTag::PreReprocess)
        .is_some());
    assert!(state.last_diff().is_none());

    let (state, _) = update(
        state,
        Msg::Progress {
            run_id: "r2".into(),
            event: ProgressEvent::PipelineComplete,
        },
    );
    let (state, _) = update(
        state,
        Msg::ResultsFetched {
            run_id: Some("r2".into()),
            result: Ok(fixtures(&["A1", "A9"])),
        },
    );
    let report = state.last_diff().unwrap();
    assert_eq!(report.origin, DiffOrigin::Reprocess);
    assert_eq!(report.summary.items_added, 1);
    assert!(report.summary.needs_rerun);
}

#[test]
fn failed_reprocess_run_discards_the_baseline() {
    let state = complete_run(AppState::new("proj"), "r1", fixtures(&["A1"]));
    let (state, _) = update(state, Msg::ReprocessRequested);
    let (state, _) = update(
        state,
        Msg::RunStarted {
            result: Ok("r2".into()),
        },
    );
    let (state, _) = update(
        state,
        Msg::Progress {
            run_id: "r2".into(),
            event: ProgressEvent::PipelineError {
                agent_id: None,
                message: "worker crashed".into(),
            },
        },
    );
    assert!(state
        .ledger()
        .snapshot_ref(takeoff_core::SnapshotTag::PreReprocess)
        .is_none());

    // The next plain run is not reported as a reprocess.
    let state = complete_run(state, "r3", fixtures(&["A1", "A9"]));
    assert!(state.last_diff().is_none());
}

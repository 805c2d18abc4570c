use std::collections::BTreeMap;
use std::sync::Once;

use pretty_assertions::assert_eq;
use takeoff_core::{
    update, AppState, Effect, ItemCollection, ItemKey, ItemRecord, Msg, PlanSheet, PlanningState,
    ProgressEvent, RunState, StatValue, TaskStatus, VerificationState,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(takeoff_logging::initialize_for_tests);
}

fn started(run_id: &str) -> (AppState, Vec<Effect>) {
    let (state, _) = update(AppState::new("proj"), Msg::RunRequested);
    update(
        state,
        Msg::RunStarted {
            result: Ok(run_id.to_string()),
        },
    )
}

fn progress(state: AppState, run_id: &str, event: ProgressEvent) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::Progress {
            run_id: run_id.to_string(),
            event,
        },
    )
}

fn results(identifiers: &[&str]) -> ItemCollection {
    ItemCollection::new(
        vec![PlanSheet {
            id: "E1".into(),
            page: 1,
        }],
        identifiers
            .iter()
            .map(|id| ItemRecord::new(ItemKey::fixture(*id)).with_count("E1", 2)),
    )
}

#[test]
fn run_request_emits_start_and_subscribe() {
    init_logging();
    let (state, effects) = update(AppState::new("proj"), Msg::RunRequested);
    assert_eq!(
        effects,
        vec![Effect::StartRun {
            project_id: "proj".into()
        }]
    );

    let (mut state, effects) = update(
        state,
        Msg::RunStarted {
            result: Ok("r1".into()),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::Subscribe {
            run_id: "r1".into()
        }]
    );
    let view = state.view();
    assert_eq!(view.run_state, RunState::Running);
    assert_eq!(view.active_run.as_deref(), Some("r1"));
    assert_eq!(view.tasks.len(), 5);
    assert!(view.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    assert!(state.consume_dirty());
}

#[test]
fn new_run_closes_previous_subscription_first() {
    init_logging();
    let (state, _) = started("r1");
    let (state, effects) = update(
        state,
        Msg::RunStarted {
            result: Ok("r2".into()),
        },
    );

    assert_eq!(
        effects,
        vec![
            Effect::CloseSubscription {
                run_id: "r1".into()
            },
            Effect::Subscribe {
                run_id: "r2".into()
            },
        ]
    );
    assert_eq!(state.view().active_run.as_deref(), Some("r2"));
}

#[test]
fn events_for_other_runs_change_nothing() {
    init_logging();
    let (state, _) = started("r1");
    let (mut state, _) = update(
        state,
        Msg::RunStarted {
            result: Ok("r2".into()),
        },
    );
    state.consume_dirty();
    let before = state.clone();

    let (mut next, effects) = progress(
        state,
        "r1",
        ProgressEvent::AgentStarted {
            agent_id: "discovery".into(),
        },
    );
    assert!(effects.is_empty());
    assert!(!next.consume_dirty());
    assert_eq!(next, before);

    let (next, effects) = progress(next, "r1", ProgressEvent::PipelineComplete);
    assert!(effects.is_empty());
    assert_eq!(next.view().run_state, RunState::Running);
}

#[test]
fn unknown_task_ids_are_ignored() {
    init_logging();
    let (mut state, _) = started("r1");
    state.consume_dirty();

    let (mut state, effects) = progress(
        state,
        "r1",
        ProgressEvent::AgentStarted {
            agent_id: "not-a-stage".into(),
        },
    );
    assert!(effects.is_empty());
    assert!(!state.consume_dirty());
}

#[test]
fn task_channels_follow_their_state_machines() {
    init_logging();
    let (state, _) = started("r1");
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::AgentStarted {
            agent_id: "counting".into(),
        },
    );
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::AgentProgress {
            agent_id: "counting".into(),
            stats: BTreeMap::from([("plans".to_string(), StatValue::Number(3.0))]),
        },
    );
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::PlanningStarted {
            agent_id: "counting".into(),
        },
    );
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::PlanningReady {
            agent_id: "counting".into(),
            strategy: Some("tiled".into()),
            approach: None,
        },
    );
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::AgentCompleted {
            agent_id: "counting".into(),
            stats: BTreeMap::from([("fixtures".to_string(), StatValue::Number(41.0))]),
            elapsed_seconds: Some(12.5),
            flags: vec!["low_contrast".into()],
        },
    );

    let task = state.tracker().task("counting").unwrap().clone();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.planning_state, PlanningState::Ready);
    assert_eq!(task.planning_strategy.as_deref(), Some("tiled"));
    assert_eq!(task.elapsed_seconds, Some(12.5));
    assert_eq!(task.flags, vec!["low_contrast".to_string()]);
    assert_eq!(task.stats.len(), 2);
}

#[test]
fn verification_retry_reopens_primary_and_verification() {
    init_logging();
    let (state, _) = started("r1");
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::AgentStarted {
            agent_id: "verification".into(),
        },
    );
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::AgentCompleted {
            agent_id: "verification".into(),
            stats: BTreeMap::new(),
            elapsed_seconds: None,
            flags: Vec::new(),
        },
    );
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::VerificationStarted {
            agent_id: "verification".into(),
        },
    );
    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::VerificationFinished {
            agent_id: "verification".into(),
            passed: false,
            confidence: Some(0.4),
            issues: vec!["B6 count mismatch".into()],
        },
    );
    let task = state.tracker().task("verification").unwrap();
    assert_eq!(task.verification_state, VerificationState::Failed);
    assert_eq!(task.verification_issues.len(), 1);

    let (state, _) = progress(
        state,
        "r1",
        ProgressEvent::VerificationRetry {
            agent_id: "verification".into(),
        },
    );
    let task = state.tracker().task("verification").unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.verification_state, VerificationState::Running);
}

#[test]
fn completion_closes_once_and_fetches_results() {
    init_logging();
    let (state, _) = started("r1");
    let (state, effects) = progress(state, "r1", ProgressEvent::PipelineComplete);
    assert_eq!(
        effects,
        vec![
            Effect::CloseSubscription {
                run_id: "r1".into()
            },
            Effect::FetchResults {
                project_id: "proj".into(),
                run_id: Some("r1".into()),
            },
        ]
    );
    assert_eq!(state.view().run_state, RunState::Completed);

    // Second terminal event is a no-op.
    let (state, effects) = progress(state, "r1", ProgressEvent::PipelineComplete);
    assert!(effects.is_empty());

    // Events after close are frozen out.
    let (state, effects) = progress(
        state,
        "r1",
        ProgressEvent::AgentStarted {
            agent_id: "discovery".into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(
        state.tracker().task("discovery").unwrap().status,
        TaskStatus::Pending
    );
}

#[test]
fn first_results_become_the_original_snapshot() {
    init_logging();
    let (state, _) = started("r1");
    let (state, _) = progress(state, "r1", ProgressEvent::PipelineComplete);
    let (state, effects) = update(
        state,
        Msg::ResultsFetched {
            run_id: Some("r1".into()),
            result: Ok(results(&["A1", "A2"])),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().items.len(), 2);
    assert_eq!(state.view().project_total, 4);
    assert!(state
        .ledger()
        .snapshot_ref(takeoff_core::SnapshotTag::Original)
        .is_some());
    assert!(state.last_diff().is_none());
}

#[test]
fn results_for_a_superseded_run_are_dropped() {
    init_logging();
    let (state, _) = started("r1");
    let (state, _) = progress(state, "r1", ProgressEvent::PipelineComplete);
    let (state, _) = update(
        state,
        Msg::ResultsFetched {
            run_id: Some("r0".into()),
            result: Ok(results(&["A1"])),
        },
    );
    assert!(state.view().items.is_empty());
}

#[test]
fn pipeline_error_is_terminal() {
    init_logging();
    let (state, _) = started("r1");
    let (state, effects) = progress(
        state,
        "r1",
        ProgressEvent::AgentFailed {
            agent_id: "schedule".into(),
            message: "no schedule found".into(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CloseSubscription {
            run_id: "r1".into()
        }]
    );
    assert_eq!(
        state.tracker().task("schedule").unwrap().status,
        TaskStatus::Error
    );
    assert_eq!(
        state.view().run_state,
        RunState::Failed {
            message: "schedule: no schedule found".into()
        }
    );

    // A fresh request is accepted again after the failure.
    let (_, effects) = update(state, Msg::RunRequested);
    assert_eq!(
        effects,
        vec![Effect::StartRun {
            project_id: "proj".into()
        }]
    );
}

#[test]
fn stream_dropping_mid_run_fails_the_run() {
    init_logging();
    let (state, _) = started("r1");
    let (state, effects) = update(
        state,
        Msg::StreamClosed {
            run_id: "r1".into(),
            error: Some("connection reset".into()),
        },
    );
    assert_eq!(effects.len(), 1);
    assert_eq!(
        state.view().run_state,
        RunState::Failed {
            message: "connection reset".into()
        }
    );
}

#[test]
fn stream_closing_after_completion_is_quiet() {
    init_logging();
    let (state, _) = started("r1");
    let (state, _) = progress(state, "r1", ProgressEvent::PipelineComplete);
    let (state, effects) = update(
        state,
        Msg::StreamClosed {
            run_id: "r1".into(),
            error: None,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().run_state, RunState::Completed);
}

#[test]
fn run_requests_are_ignored_while_streaming() {
    init_logging();
    let (state, _) = started("r1");
    let (_, effects) = update(state, Msg::ReprocessRequested);
    assert!(effects.is_empty());
}

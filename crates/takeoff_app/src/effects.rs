use std::collections::BTreeMap;

use serde_json::{json, Value};
use takeoff_core::{
    Effect, FeedbackAction, FeedbackItem, FetchedPositions, ItemCollection, ItemKey, ItemRecord,
    Msg, PlanSheet, Position, ProgressEvent, StatValue,
};
use takeoff_engine::{
    DetectionBox, EngineEvent, EngineHandle, FeedbackPayload, ItemEntry, PositionsPayload,
    PositionsQuery, ProgressFrame, ResultsPayload,
};
use takeoff_logging::{takeoff_debug, takeoff_info, takeoff_warn};

/// Hands core effects to the engine and turns engine events back into
/// messages.
pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartRun { project_id } => {
                    takeoff_info!("StartRun project={}", project_id);
                    self.engine.start_run(project_id);
                }
                Effect::Reprocess { project_id } => {
                    takeoff_info!("Reprocess project={}", project_id);
                    self.engine.reprocess(project_id);
                }
                Effect::Subscribe { run_id } => self.engine.subscribe(run_id),
                Effect::CloseSubscription { run_id } => self.engine.close_subscription(run_id),
                Effect::FetchResults { project_id, run_id } => {
                    self.engine.fetch_results(project_id, run_id);
                }
                Effect::FetchPositions {
                    project_id,
                    request,
                } => {
                    let query = PositionsQuery {
                        page: request.page,
                        plan: request.plan,
                        kind: request.item.kind.as_str().to_string(),
                    };
                    self.engine
                        .fetch_positions(project_id, request.request_id, query);
                }
                Effect::SubmitFeedback { project_id, item } => {
                    self.engine
                        .submit_feedback(project_id, feedback_payload(&item));
                }
            }
        }
    }

    /// Drains every engine event that is ready.
    pub fn poll(&self) -> Vec<Msg> {
        std::iter::from_fn(|| self.engine.try_recv())
            .filter_map(event_to_msg)
            .collect()
    }
}

pub(crate) fn event_to_msg(event: EngineEvent) -> Option<Msg> {
    let msg = match event {
        EngineEvent::RunStarted { result } => Msg::RunStarted {
            result: result.map_err(|err| err.to_string()),
        },
        EngineEvent::Progress { run_id, frame } => Msg::Progress {
            event: map_frame(frame)?,
            run_id,
        },
        EngineEvent::StreamClosed { run_id, error } => Msg::StreamClosed {
            run_id,
            error: error.map(|err| err.to_string()),
        },
        EngineEvent::ResultsFetched { run_id, result } => Msg::ResultsFetched {
            run_id,
            result: result
                .map(map_results)
                .map_err(|err| err.to_string()),
        },
        EngineEvent::PositionsFetched { request_id, result } => Msg::PositionsFetched {
            request_id,
            result: result
                .map(map_positions)
                .map_err(|err| err.to_string()),
        },
        EngineEvent::FeedbackSubmitted { result } => Msg::FeedbackSubmitted {
            result: result
                .map(|ack| ack.feedback_count)
                .map_err(|err| err.to_string()),
        },
    };
    Some(msg)
}

fn map_frame(frame: ProgressFrame) -> Option<ProgressEvent> {
    let ProgressFrame {
        kind,
        agent_id,
        stats,
        time,
        flags,
        strategy,
        approach,
        passed,
        confidence,
        issues,
        message,
    } = frame;

    let event = match kind.as_str() {
        "complete" => ProgressEvent::PipelineComplete,
        "error" => ProgressEvent::PipelineError {
            agent_id,
            message: message.unwrap_or_else(|| "pipeline failed".to_string()),
        },
        _ => {
            let Some(agent_id) = agent_id else {
                takeoff_warn!("progress frame `{}` without agentId", kind);
                return None;
            };
            match kind.as_str() {
                "agent_start" => ProgressEvent::AgentStarted { agent_id },
                "agent_progress" => ProgressEvent::AgentProgress {
                    agent_id,
                    stats: map_stats(stats),
                },
                "agent_complete" => ProgressEvent::AgentCompleted {
                    agent_id,
                    stats: map_stats(stats),
                    elapsed_seconds: time,
                    flags,
                },
                "agent_error" => ProgressEvent::AgentFailed {
                    agent_id,
                    message: message.unwrap_or_else(|| "agent failed".to_string()),
                },
                "planning_start" => ProgressEvent::PlanningStarted { agent_id },
                "planning_ready" => ProgressEvent::PlanningReady {
                    agent_id,
                    strategy,
                    approach,
                },
                "verification_start" => ProgressEvent::VerificationStarted { agent_id },
                "verification_result" => ProgressEvent::VerificationFinished {
                    agent_id,
                    passed: passed.unwrap_or(false),
                    confidence,
                    issues,
                },
                "verification_retry" => ProgressEvent::VerificationRetry { agent_id },
                other => {
                    takeoff_debug!("ignoring progress frame of type `{}`", other);
                    return None;
                }
            }
        }
    };
    Some(event)
}

fn map_stats(stats: BTreeMap<String, Value>) -> BTreeMap<String, StatValue> {
    stats
        .into_iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::Null => return None,
                Value::Number(number) => StatValue::Number(number.as_f64()?),
                Value::String(text) => StatValue::Text(text),
                other => StatValue::Text(other.to_string()),
            };
            Some((name, value))
        })
        .collect()
}

fn map_results(payload: ResultsPayload) -> ItemCollection {
    let ResultsPayload {
        plans,
        fixtures,
        keynotes,
    } = payload;
    let plans = plans
        .into_iter()
        .map(|plan| PlanSheet {
            id: plan.id,
            page: plan.page,
        })
        .collect();
    let records = fixtures
        .into_iter()
        .map(|entry| map_item(ItemKey::fixture(entry.identifier.clone()), entry))
        .chain(
            keynotes
                .into_iter()
                .map(|entry| map_item(ItemKey::keynote(entry.identifier.clone()), entry)),
        );
    ItemCollection::new(plans, records)
}

fn map_item(key: ItemKey, entry: ItemEntry) -> ItemRecord {
    let record = entry
        .counts
        .into_iter()
        .fold(ItemRecord::new(key), |record, (plan, count)| {
            record.with_count(plan, count)
        });
    entry
        .fields
        .into_iter()
        .fold(record, |record, (name, value)| record.with_field(name, value))
}

fn map_positions(payload: PositionsPayload) -> FetchedPositions {
    FetchedPositions {
        page_width: payload.page_width,
        page_height: payload.page_height,
        detections_by_item: payload
            .detections
            .into_iter()
            .map(|(identifier, boxes)| (identifier, boxes.iter().map(map_box).collect()))
            .collect(),
    }
}

fn map_box(detection: &DetectionBox) -> Position {
    let mut position =
        Position::from_bounds(detection.x0, detection.top, detection.x1, detection.bottom);
    if let Some(center_x) = detection.center_x {
        position.center_x = center_x;
    }
    if let Some(center_y) = detection.center_y {
        position.center_y = center_y;
    }
    position
}

pub(crate) fn feedback_payload(item: &FeedbackItem) -> FeedbackPayload {
    let payload = match &item.action {
        FeedbackAction::CountOverride {
            plan,
            original,
            corrected,
        } => json!({"plan": plan, "original": original, "corrected": corrected}),
        FeedbackAction::ItemAdded => json!({}),
        FeedbackAction::ItemRemoved { total } => json!({"total": total}),
        FeedbackAction::FieldEdited {
            field,
            original,
            corrected,
        } => json!({"field": field, "original": original, "corrected": corrected}),
        FeedbackAction::DetectionRejected {
            plan,
            index,
            position,
            acceptance,
        }
        | FeedbackAction::DetectionRestored {
            plan,
            index,
            position,
            acceptance,
        } => json!({
            "plan": plan,
            "index": index,
            "position": position_json(position),
            "acceptance": acceptance,
        }),
        FeedbackAction::MarkerAdded {
            plan,
            position,
            acceptance,
        }
        | FeedbackAction::MarkerRemoved {
            plan,
            position,
            acceptance,
        } => json!({
            "plan": plan,
            "position": position_json(position),
            "acceptance": acceptance,
        }),
    };
    FeedbackPayload {
        action: item.action.name().to_string(),
        target: item.target.identifier.clone(),
        target_kind: item.target.kind.as_str().to_string(),
        reason: item.reason.clone(),
        detail: item.detail.clone(),
        payload,
    }
}

fn position_json(position: &Position) -> Value {
    json!({
        "x0": position.x0,
        "top": position.top,
        "x1": position.x1,
        "bottom": position.bottom,
        "center_x": position.center_x,
        "center_y": position.center_y,
    })
}

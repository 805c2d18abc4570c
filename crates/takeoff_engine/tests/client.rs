use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use takeoff_engine::{
    Backend, BackendSettings, EngineEvent, FailureKind, FeedbackPayload, PositionsQuery,
    ProgressSink, ReqwestBackend,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    fn frame_kinds(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Progress { frame, .. } => Some(frame.kind.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn backend(server: &MockServer) -> ReqwestBackend {
    ReqwestBackend::new(BackendSettings {
        base_url: server.uri(),
        ..BackendSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn start_run_returns_the_run_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/projects/job-7/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": "r-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let run_id = backend(&server).start_run("job-7").await.unwrap();
    assert_eq!(run_id, "r-42");
}

#[tokio::test]
async fn reprocess_posts_to_its_own_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/projects/job-7/reprocess"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": "r-43"})))
        .mount(&server)
        .await;

    assert_eq!(backend(&server).reprocess("job-7").await.unwrap(), "r-43");
}

#[tokio::test]
async fn results_decode_plans_and_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/job-7/results"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "plans": [{"id": "E1", "page": 3}, {"id": "E2", "page": 4}],
            "fixtures": [{
                "identifier": "B6",
                "fields": {"description": "2x4 troffer", "voltage": "277"},
                "counts": {"E1": 26, "E2": 1}
            }],
            "keynotes": [{"identifier": "12", "fields": {"text": "Provide occupancy sensor"}}]
        })))
        .mount(&server)
        .await;

    let results = backend(&server).fetch_results("job-7").await.unwrap();
    assert_eq!(results.plans.len(), 2);
    assert_eq!(results.plans[1].page, 4);
    assert_eq!(results.fixtures[0].counts.get("E1"), Some(&26));
    assert_eq!(
        results.fixtures[0].fields.get("voltage").map(String::as_str),
        Some("277")
    );
    assert!(results.keynotes[0].counts.is_empty());
}

#[tokio::test]
async fn positions_send_the_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/job-7/positions"))
        .and(query_param("page", "3"))
        .and(query_param("plan", "E1"))
        .and(query_param("kind", "fixture"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "page_width": 2448.0,
            "page_height": 1584.0,
            "detections": {
                "B6": [
                    {"x0": 10.0, "top": 20.0, "x1": 30.0, "bottom": 40.0},
                    {"x0": 50.0, "top": 60.0, "x1": 70.0, "bottom": 80.0, "center_x": 61.0, "center_y": 71.0}
                ]
            }
        })))
        .mount(&server)
        .await;

    let query = PositionsQuery {
        page: Some(3),
        plan: "E1".into(),
        kind: "fixture".into(),
    };
    let positions = backend(&server)
        .fetch_positions("job-7", &query)
        .await
        .unwrap();
    assert_eq!(positions.page_width, 2448.0);
    let boxes = &positions.detections["B6"];
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].center_x, None);
    assert_eq!(boxes[1].center_y, Some(71.0));
}

#[tokio::test]
async fn feedback_posts_json_and_reads_the_count() {
    let server = MockServer::start().await;
    let payload = FeedbackPayload {
        action: "count_override".into(),
        target: "B6".into(),
        target_kind: "fixture".into(),
        reason: "manual_count".into(),
        detail: "F:B6 on E1: 26 -> 25".into(),
        payload: serde_json::json!({"plan": "E1", "original": 26, "corrected": 25}),
    };
    Mock::given(method("POST"))
        .and(path("/api/projects/job-7/feedback"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({
            "action": "count_override",
            "target": "B6",
            "target_kind": "fixture",
            "reason": "manual_count",
            "detail": "F:B6 on E1: 26 -> 25",
            "payload": {"plan": "E1", "original": 26, "corrected": 25}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"feedback_count": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let ack = backend(&server)
        .submit_feedback("job-7", &payload)
        .await
        .unwrap();
    assert_eq!(ack.feedback_count, 9);
}

#[tokio::test]
async fn http_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/gone/results"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = backend(&server).fetch_results("gone").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn malformed_bodies_are_decode_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/projects/job-7/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = backend(&server).start_run("job-7").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Decode);
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/job-7/results"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_json(serde_json::json!({})),
        )
        .mount(&server)
        .await;

    let backend = ReqwestBackend::new(BackendSettings {
        base_url: server.uri(),
        request_timeout: Duration::from_millis(50),
        ..BackendSettings::default()
    })
    .unwrap();
    let err = backend.fetch_results("job-7").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn progress_stream_emits_frames_until_complete() {
    let server = MockServer::start().await;
    let body = concat!(
        ": connected\n\n",
        "data: {\"type\":\"agent_start\",\"agentId\":\"discovery\"}\n\n",
        "data: {\"type\":\"agent_progress\",\"agentId\":\"discovery\",\"stats\":{\"pages\":3}}\n\n",
        "data: not json\n\n",
        "data: {\"type\":\"complete\"}\n\n",
        "data: {\"type\":\"agent_start\",\"agentId\":\"late\"}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/api/runs/r-42/events"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let sink = TestSink::default();
    backend(&server)
        .stream_progress("r-42", &sink)
        .await
        .unwrap();
    assert_eq!(
        sink.frame_kinds(),
        vec!["agent_start", "agent_progress", "complete"]
    );
}

#[tokio::test]
async fn progress_stream_rejects_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/runs/missing/events"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let sink = TestSink::default();
    let err = backend(&server)
        .stream_progress("missing", &sink)
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(410));
    assert!(sink.frame_kinds().is_empty());
}

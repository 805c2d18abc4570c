use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use takeoff_logging::{takeoff_debug, takeoff_warn};
use url::Url;

use crate::sse::SseDecoder;
use crate::types::RunAccepted;
use crate::{
    BackendError, EngineEvent, FailureKind, FeedbackAck, FeedbackPayload, PositionsPayload,
    PositionsQuery, ProgressFrame, ResultsPayload, RunId,
};

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applies to every call except the progress stream.
    pub request_timeout: Duration,
    /// Longest silence tolerated on the progress stream.
    pub stream_idle_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            stream_idle_timeout: Duration::from_secs(300),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn start_run(&self, project_id: &str) -> Result<RunId, BackendError>;

    async fn reprocess(&self, project_id: &str) -> Result<RunId, BackendError>;

    async fn fetch_results(&self, project_id: &str) -> Result<ResultsPayload, BackendError>;

    async fn fetch_positions(
        &self,
        project_id: &str,
        query: &PositionsQuery,
    ) -> Result<PositionsPayload, BackendError>;

    async fn submit_feedback(
        &self,
        project_id: &str,
        payload: &FeedbackPayload,
    ) -> Result<FeedbackAck, BackendError>;

    /// Reads the run's event stream until a terminal frame or end of stream,
    /// emitting one `EngineEvent::Progress` per frame.
    async fn stream_progress(
        &self,
        run_id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    settings: BackendSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| BackendError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::new(
                FailureKind::InvalidUrl,
                format!("{base} cannot be a base url"),
            ));
        }
        // No client-wide timeout: it would cut the progress stream.
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| BackendError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                BackendError::new(FailureKind::InvalidUrl, "base url cannot carry a path")
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&body)
            .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))
    }

    async fn post_run(&self, project_id: &str, action: &str) -> Result<RunId, BackendError> {
        let url = self.endpoint(&["api", "projects", project_id, action])?;
        let accepted: RunAccepted = self.send_json(self.client.post(url)).await?;
        Ok(accepted.run_id)
    }
}

#[async_trait::async_trait]
impl Backend for ReqwestBackend {
    async fn start_run(&self, project_id: &str) -> Result<RunId, BackendError> {
        self.post_run(project_id, "runs").await
    }

    async fn reprocess(&self, project_id: &str) -> Result<RunId, BackendError> {
        self.post_run(project_id, "reprocess").await
    }

    async fn fetch_results(&self, project_id: &str) -> Result<ResultsPayload, BackendError> {
        let url = self.endpoint(&["api", "projects", project_id, "results"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn fetch_positions(
        &self,
        project_id: &str,
        query: &PositionsQuery,
    ) -> Result<PositionsPayload, BackendError> {
        let mut url = self.endpoint(&["api", "projects", project_id, "positions"])?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(page) = query.page {
                pairs.append_pair("page", &page.to_string());
            }
            pairs
                .append_pair("plan", &query.plan)
                .append_pair("kind", &query.kind);
        }
        self.send_json(self.client.get(url)).await
    }

    async fn submit_feedback(
        &self,
        project_id: &str,
        payload: &FeedbackPayload,
    ) -> Result<FeedbackAck, BackendError> {
        let url = self.endpoint(&["api", "projects", project_id, "feedback"])?;
        let body = serde_json::to_vec(payload)
            .map_err(|err| BackendError::new(FailureKind::Decode, err.to_string()))?;
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.send_json(request).await
    }

    async fn stream_progress(
        &self,
        run_id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&["api", "runs", run_id, "events"])?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let mut decoder = SseDecoder::new();
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(self.settings.stream_idle_timeout, stream.next())
                .await
                .map_err(|_| BackendError::new(FailureKind::Timeout, "progress stream went idle"))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk =
                chunk.map_err(|err| BackendError::new(FailureKind::Stream, err.to_string()))?;
            for data in decoder.push(&chunk) {
                if emit_frame(run_id, &data, sink) {
                    return Ok(());
                }
            }
        }
        if let Some(data) = decoder.finish() {
            emit_frame(run_id, &data, sink);
        }
        takeoff_debug!("progress stream for run {} ended", run_id);
        Ok(())
    }
}

/// Decodes and emits one frame. Returns whether it ended the run. Malformed
/// frames are skipped.
fn emit_frame(run_id: &str, data: &str, sink: &dyn ProgressSink) -> bool {
    match serde_json::from_str::<ProgressFrame>(data) {
        Ok(frame) => {
            let terminal = frame.is_terminal();
            sink.emit(EngineEvent::Progress {
                run_id: run_id.to_string(),
                frame,
            });
            terminal
        }
        Err(err) => {
            takeoff_warn!("skipping malformed frame on run {}: {}", run_id, err);
            false
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        return BackendError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return BackendError::new(FailureKind::Decode, err.to_string());
    }
    BackendError::new(FailureKind::Network, err.to_string())
}

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use takeoff_logging::{takeoff_debug, takeoff_info};
use tokio_util::sync::CancellationToken;

use crate::client::{Backend, BackendSettings, ChannelProgressSink, ReqwestBackend};
use crate::{EngineError, EngineEvent, FeedbackPayload, PositionsQuery, RunId};

enum EngineCommand {
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
        run_id: Option<RunId>,
    },
    FetchPositions {
        project_id: String,
        request_id: u64,
        query: PositionsQuery,
    },
    SubmitFeedback {
        project_id: String,
        payload: FeedbackPayload,
    },
}

pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(settings: BackendSettings) -> Result<Self, EngineError> {
        let backend = ReqwestBackend::new(settings)?;
        Self::with_backend(Arc::new(backend))
    }

    pub fn with_backend(backend: Arc<dyn Backend>) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let runtime = tokio::runtime::Runtime::new()?;

        thread::spawn(move || {
            let mut subscriptions = Subscriptions::default();
            while let Ok(command) = cmd_rx.recv() {
                match command {
                    EngineCommand::Subscribe { run_id } => {
                        let token = subscriptions.open(&run_id);
                        let backend = backend.clone();
                        let event_tx = event_tx.clone();
                        runtime.spawn(async move {
                            follow_stream(backend.as_ref(), run_id, token, event_tx).await;
                        });
                    }
                    EngineCommand::CloseSubscription { run_id } => subscriptions.close(&run_id),
                    command => {
                        let backend = backend.clone();
                        let event_tx = event_tx.clone();
                        runtime.spawn(async move {
                            handle_command(backend.as_ref(), command, event_tx).await;
                        });
                    }
                }
            }
            subscriptions.close_all();
        });

        Ok(Self { cmd_tx, event_rx })
    }

    pub fn start_run(&self, project_id: impl Into<String>) {
        self.send(EngineCommand::StartRun {
            project_id: project_id.into(),
        });
    }

    pub fn reprocess(&self, project_id: impl Into<String>) {
        self.send(EngineCommand::Reprocess {
            project_id: project_id.into(),
        });
    }

    /// Follows a run's progress stream. Any other live stream is cancelled.
    pub fn subscribe(&self, run_id: impl Into<RunId>) {
        self.send(EngineCommand::Subscribe {
            run_id: run_id.into(),
        });
    }

    pub fn close_subscription(&self, run_id: impl Into<RunId>) {
        self.send(EngineCommand::CloseSubscription {
            run_id: run_id.into(),
        });
    }

    pub fn fetch_results(&self, project_id: impl Into<String>, run_id: Option<RunId>) {
        self.send(EngineCommand::FetchResults {
            project_id: project_id.into(),
            run_id,
        });
    }

    pub fn fetch_positions(
        &self,
        project_id: impl Into<String>,
        request_id: u64,
        query: PositionsQuery,
    ) {
        self.send(EngineCommand::FetchPositions {
            project_id: project_id.into(),
            request_id,
            query,
        });
    }

    pub fn submit_feedback(&self, project_id: impl Into<String>, payload: FeedbackPayload) {
        self.send(EngineCommand::SubmitFeedback {
            project_id: project_id.into(),
            payload,
        });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    fn send(&self, command: EngineCommand) {
        let _ = self.cmd_tx.send(command);
    }
}

/// Live progress streams by run. Opening one cancels all others.
#[derive(Default)]
struct Subscriptions {
    live: BTreeMap<RunId, CancellationToken>,
}

impl Subscriptions {
    fn open(&mut self, run_id: &str) -> CancellationToken {
        for (previous, token) in std::mem::take(&mut self.live) {
            takeoff_debug!("cancelling progress stream for run {}", previous);
            token.cancel();
        }
        let token = CancellationToken::new();
        self.live.insert(run_id.to_string(), token.clone());
        token
    }

    fn close(&mut self, run_id: &str) {
        if let Some(token) = self.live.remove(run_id) {
            token.cancel();
        }
    }

    fn close_all(&mut self) {
        for token in std::mem::take(&mut self.live).into_values() {
            token.cancel();
        }
    }
}

async fn follow_stream(
    backend: &dyn Backend,
    run_id: RunId,
    token: CancellationToken,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let sink = ChannelProgressSink::new(event_tx.clone());
    tokio::select! {
        _ = token.cancelled() => {
            takeoff_info!("progress stream for run {} cancelled", run_id);
        }
        result = backend.stream_progress(&run_id, &sink) => {
            let _ = event_tx.send(EngineEvent::StreamClosed {
                run_id,
                error: result.err(),
            });
        }
    }
}

async fn handle_command(
    backend: &dyn Backend,
    command: EngineCommand,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let event = match command {
        EngineCommand::StartRun { project_id } => EngineEvent::RunStarted {
            result: backend.start_run(&project_id).await,
        },
        EngineCommand::Reprocess { project_id } => EngineEvent::RunStarted {
            result: backend.reprocess(&project_id).await,
        },
        EngineCommand::FetchResults { project_id, run_id } => EngineEvent::ResultsFetched {
            run_id,
            result: backend.fetch_results(&project_id).await,
        },
        EngineCommand::FetchPositions {
            project_id,
            request_id,
            query,
        } => EngineEvent::PositionsFetched {
            request_id,
            result: backend.fetch_positions(&project_id, &query).await,
        },
        EngineCommand::SubmitFeedback {
            project_id,
            payload,
        } => EngineEvent::FeedbackSubmitted {
            result: backend.submit_feedback(&project_id, &payload).await,
        },
        EngineCommand::Subscribe { .. } | EngineCommand::CloseSubscription { .. } => return,
    };
    let _ = event_tx.send(event);
}

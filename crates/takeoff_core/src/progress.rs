use std::collections::BTreeMap;

use takeoff_logging::{takeoff_debug, takeoff_info, takeoff_warn};

pub type RunId = String;

#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSignal {
    Start,
    Complete,
    Fail,
    Retry,
}

impl TaskStatus {
    /// Transition table for the primary channel. `None` means the signal is
    /// not valid in this state and is dropped.
    pub fn on(self, signal: TaskSignal) -> Option<TaskStatus> {
        use TaskSignal as S;
        use TaskStatus::*;
        match (self, signal) {
            (Pending, S::Start) => Some(Running),
            (Running, S::Complete) => Some(Completed),
            (Pending | Running, S::Fail) => Some(Error),
            (Running | Completed, S::Retry) => Some(Running),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanningState {
    #[default]
    Idle,
    Planning,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningSignal {
    Start,
    Ready,
}

impl PlanningState {
    pub fn on(self, signal: PlanningSignal) -> Option<PlanningState> {
        use PlanningState::*;
        match (self, signal) {
            (Idle, PlanningSignal::Start) => Some(Planning),
            (Idle | Planning, PlanningSignal::Ready) => Some(Ready),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationState {
    #[default]
    Idle,
    Running,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationSignal {
    Start,
    Pass,
    Fail,
    Retry,
}

impl VerificationState {
    pub fn on(self, signal: VerificationSignal) -> Option<VerificationState> {
        use VerificationSignal as S;
        use VerificationState::*;
        match (self, signal) {
            (_, S::Start | S::Retry) => Some(Running),
            (Idle | Running, S::Pass) => Some(Passed),
            (Idle | Running, S::Fail) => Some(Failed),
            _ => None,
        }
    }
}

/// Static description of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl TaskTemplate {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

pub fn default_pipeline() -> Vec<TaskTemplate> {
    vec![
        TaskTemplate::new(
            "discovery",
            "Sheet discovery",
            "Classifies drawing sheets and locates schedules",
        ),
        TaskTemplate::new(
            "schedule",
            "Schedule extraction",
            "Reads fixture schedule tables",
        ),
        TaskTemplate::new("keynotes", "Keynote extraction", "Collects keynote legends"),
        TaskTemplate::new("counting", "Fixture counting", "Counts fixtures on each plan"),
        TaskTemplate::new(
            "verification",
            "QA verification",
            "Cross-checks counts against the schedule",
        ),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentTask {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub stats: BTreeMap<String, StatValue>,
    pub elapsed_seconds: Option<f64>,
    pub flags: Vec<String>,
    pub planning_state: PlanningState,
    pub planning_strategy: Option<String>,
    pub planning_approach: Option<String>,
    pub verification_state: VerificationState,
    pub verification_confidence: Option<f64>,
    pub verification_issues: Vec<String>,
}

impl AgentTask {
    fn from_template(template: &TaskTemplate) -> Self {
        Self {
            id: template.id.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            status: TaskStatus::Pending,
            stats: BTreeMap::new(),
            elapsed_seconds: None,
            flags: Vec::new(),
            planning_state: PlanningState::Idle,
            planning_strategy: None,
            planning_approach: None,
            verification_state: VerificationState::Idle,
            verification_confidence: None,
            verification_issues: Vec::new(),
        }
    }

    fn signal(&mut self, signal: TaskSignal) -> bool {
        match self.status.on(signal) {
            Some(next) => {
                self.status = next;
                true
            }
            None => {
                takeoff_debug!(
                    "task {}: dropping {:?} while {:?}",
                    self.id,
                    signal,
                    self.status
                );
                false
            }
        }
    }

    fn planning(&mut self, signal: PlanningSignal) -> bool {
        match self.planning_state.on(signal) {
            Some(next) => {
                self.planning_state = next;
                true
            }
            None => false,
        }
    }

    fn verification(&mut self, signal: VerificationSignal) -> bool {
        match self.verification_state.on(signal) {
            Some(next) => {
                self.verification_state = next;
                true
            }
            None => false,
        }
    }
}

/// Decoded progress stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    AgentStarted {
        agent_id: String,
    },
    AgentProgress {
        agent_id: String,
        stats: BTreeMap<String, StatValue>,
    },
    AgentCompleted {
        agent_id: String,
        stats: BTreeMap<String, StatValue>,
        elapsed_seconds: Option<f64>,
        flags: Vec<String>,
    },
    AgentFailed {
        agent_id: String,
        message: String,
    },
    PlanningStarted {
        agent_id: String,
    },
    PlanningReady {
        agent_id: String,
        strategy: Option<String>,
        approach: Option<String>,
    },
    VerificationStarted {
        agent_id: String,
    },
    VerificationFinished {
        agent_id: String,
        passed: bool,
        confidence: Option<f64>,
        issues: Vec<String>,
    },
    VerificationRetry {
        agent_id: String,
    },
    PipelineComplete,
    PipelineError {
        agent_id: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed {
        message: String,
    },
}

/// The one live subscription. Closing is exactly-once: only the first
/// `close` reports a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    run_id: RunId,
    open: bool,
}

impl SubscriptionHandle {
    fn open(run_id: RunId) -> Self {
        Self { run_id, open: true }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackingChange {
    /// Run whose subscription was closed to make room for the new one.
    pub closed: Option<RunId>,
    pub opened: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Stale run, closed subscription, or unknown task. Nothing changed.
    Ignored,
    Updated,
    /// Pipeline finished; the subscription was closed by this event.
    Completed,
    /// Fatal pipeline error; the subscription was closed by this event.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressTracker {
    template: Vec<TaskTemplate>,
    tasks: Vec<AgentTask>,
    subscription: Option<SubscriptionHandle>,
    run_state: RunState,
    awaiting_results: Option<RunId>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(default_pipeline())
    }
}

impl ProgressTracker {
    pub fn new(template: Vec<TaskTemplate>) -> Self {
        Self {
            template,
            tasks: Vec::new(),
            subscription: None,
            run_state: RunState::Idle,
            awaiting_results: None,
        }
    }

    pub fn tasks(&self) -> &[AgentTask] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&AgentTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    pub fn active_run(&self) -> Option<&str> {
        self.subscription.as_ref().map(SubscriptionHandle::run_id)
    }

    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.subscription.as_ref()
    }

    pub fn start_tracking(&mut self, run_id: RunId) -> TrackingChange {
        let mut change = TrackingChange::default();
        if let Some(current) = self.subscription.as_mut() {
            if current.run_id == run_id && current.is_open() {
                return change;
            }
            if current.close() {
                change.closed = Some(current.run_id.clone());
            }
        }

        takeoff_info!("tracking run {}", run_id);
        self.tasks = self.template.iter().map(AgentTask::from_template).collect();
        self.subscription = Some(SubscriptionHandle::open(run_id));
        self.run_state = RunState::Running;
        self.awaiting_results = None;
        change.opened = true;
        change
    }

    /// Closes the live subscription. Returns its run id only when this call
    /// performed the close.
    pub fn close_subscription(&mut self) -> Option<RunId> {
        let handle = self.subscription.as_mut()?;
        handle.close().then(|| handle.run_id.clone())
    }

    pub fn apply(&mut self, run_id: &str, event: ProgressEvent) -> Applied {
        match self.subscription.as_ref() {
            Some(handle) if handle.run_id == run_id && handle.is_open() => {}
            _ => {
                takeoff_debug!("dropping progress event for stale run {}", run_id);
                return Applied::Ignored;
            }
        }

        match event {
            ProgressEvent::PipelineComplete => {
                self.close_subscription();
                self.run_state = RunState::Completed;
                self.awaiting_results = Some(run_id.to_string());
                takeoff_info!("run {} complete", run_id);
                Applied::Completed
            }
            ProgressEvent::PipelineError { agent_id, message } => {
                if let Some(task) = agent_id.as_deref().and_then(|id| self.task_mut(id)) {
                    task.signal(TaskSignal::Fail);
                }
                self.fail(run_id, message)
            }
            ProgressEvent::AgentFailed { agent_id, message } => {
                let Some(task) = self.task_mut(&agent_id) else {
                    return Applied::Ignored;
                };
                task.signal(TaskSignal::Fail);
                self.fail(run_id, format!("{agent_id}: {message}"))
            }
            event => self.apply_task_event(event),
        }
    }

    /// The backend refused to start a run. No subscription was opened.
    pub fn start_failed(&mut self, message: String) {
        takeoff_warn!("run could not be started: {}", message);
        self.run_state = RunState::Failed { message };
    }

    /// Consumes the pending results marker if `run_id` is the run that just
    /// completed. Anything else is a stale fetch.
    pub fn take_awaiting_results(&mut self, run_id: &str) -> bool {
        if self.awaiting_results.as_deref() == Some(run_id) {
            self.awaiting_results = None;
            true
        } else {
            false
        }
    }

    fn fail(&mut self, run_id: &str, message: String) -> Applied {
        takeoff_warn!("run {} failed: {}", run_id, message);
        self.close_subscription();
        self.run_state = RunState::Failed { message };
        Applied::Failed
    }

    fn task_mut(&mut self, id: &str) -> Option<&mut AgentTask> {
        let found = self.tasks.iter_mut().find(|task| task.id == id);
        if found.is_none() {
            takeoff_debug!("ignoring event for unknown task {}", id);
        }
        found
    }

    fn apply_task_event(&mut self, event: ProgressEvent) -> Applied {
        let changed = match event {
            ProgressEvent::AgentStarted { agent_id } => self
                .task_mut(&agent_id)
                .map(|task| task.signal(TaskSignal::Start)),
            ProgressEvent::AgentProgress { agent_id, stats } => {
                self.task_mut(&agent_id).map(|task| {
                    task.stats.extend(stats);
                    true
                })
            }
            ProgressEvent::AgentCompleted {
                agent_id,
                stats,
                elapsed_seconds,
                flags,
            } => self.task_mut(&agent_id).map(|task| {
                task.stats.extend(stats);
                task.elapsed_seconds = elapsed_seconds.or(task.elapsed_seconds);
                task.flags = flags;
                task.signal(TaskSignal::Complete);
                true
            }),
            ProgressEvent::PlanningStarted { agent_id } => self
                .task_mut(&agent_id)
                .map(|task| task.planning(PlanningSignal::Start)),
            ProgressEvent::PlanningReady {
                agent_id,
                strategy,
                approach,
            } => self.task_mut(&agent_id).map(|task| {
                let moved = task.planning(PlanningSignal::Ready);
                if moved {
                    task.planning_strategy = strategy;
                    task.planning_approach = approach;
                }
                moved
            }),
            ProgressEvent::VerificationStarted { agent_id } => self
                .task_mut(&agent_id)
                .map(|task| task.verification(VerificationSignal::Start)),
            ProgressEvent::VerificationFinished {
                agent_id,
                passed,
                confidence,
                issues,
            } => self.task_mut(&agent_id).map(|task| {
                let signal = if passed {
                    VerificationSignal::Pass
                } else {
                    VerificationSignal::Fail
                };
                let moved = task.verification(signal);
                if moved {
                    task.verification_confidence = confidence;
                    task.verification_issues = issues;
                }
                moved
            }),
            ProgressEvent::VerificationRetry { agent_id } => {
                self.task_mut(&agent_id).map(|task| {
                    let primary = task.signal(TaskSignal::Retry);
                    let verification = task.verification(VerificationSignal::Retry);
                    primary || verification
                })
            }
            ProgressEvent::PipelineComplete
            | ProgressEvent::PipelineError { .. }
            | ProgressEvent::AgentFailed { .. } => None,
        };

        match changed {
            Some(true) => Applied::Updated,
            _ => Applied::Ignored,
        }
    }
}

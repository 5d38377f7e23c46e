use mdex_core::MdexError;
use mdex_types::{WorkerPayload, WorkerResult, WorkerTask};

/// Lifecycle of one worker request: `Requested -> Running -> {Done, Failed}`.
///
/// A search finishes on `done`. An index task finishes on `closed`, which
/// must follow its `done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Requested,
    Running { done: Option<WorkerPayload> },
    Done(WorkerPayload),
    Failed(String),
}

impl TaskState {
    pub fn start(self) -> Self {
        match self {
            TaskState::Requested => TaskState::Running { done: None },
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done(_) | TaskState::Failed(_))
    }

    pub fn on_result(self, task: &WorkerTask, result: WorkerResult) -> Self {
        let done = match self {
            TaskState::Running { done } => done,
            other => return other,
        };
        match result {
            WorkerResult::Error { message } => TaskState::Failed(message),
            WorkerResult::Done { payload } => match task {
                WorkerTask::Search { .. } => TaskState::Done(payload),
                WorkerTask::Index { .. } => TaskState::Running {
                    done: Some(payload),
                },
            },
            WorkerResult::Closed => match done {
                Some(payload) => TaskState::Done(payload),
                None => TaskState::Failed("worker closed before reporting a result".into()),
            },
        }
    }

    /// Output ended and the process exited
    pub fn on_exit(self, success: bool, status: &str) -> Self {
        match self {
            TaskState::Running {
                done: Some(payload),
            } if success => TaskState::Done(payload),
            TaskState::Running { .. } | TaskState::Requested if success => {
                TaskState::Failed("worker exited without a result".into())
            }
            TaskState::Running { .. } | TaskState::Requested => {
                TaskState::Failed(format!("worker exited with {status}"))
            }
            terminal => terminal,
        }
    }

    /// Deadline, cancellation or transport failure
    pub fn fail(self, reason: impl Into<String>) -> Self {
        if self.is_terminal() {
            self
        } else {
            TaskState::Failed(reason.into())
        }
    }

    pub fn into_result(self) -> Result<WorkerPayload, MdexError> {
        match self {
            TaskState::Done(payload) => Ok(payload),
            TaskState::Failed(reason) => Err(MdexError::WorkerFailure(reason)),
            TaskState::Requested | TaskState::Running { .. } => {
                Err(MdexError::WorkerFailure("worker never finished".into()))
            }
        }
    }
}

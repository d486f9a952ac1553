//! Train and task endpoints of the ML plugin.

use serde::Deserialize;

use super::client::{ClusterClient, TransportError, error_reason};
use crate::training::TrainingRequestPayload;

/// Status text the train and task endpoints use for a finished model.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Remote training boundary.
pub trait TrainingApi: Send + Sync {
    /// Submit a training request. `run_async` asks for a task id instead of waiting.
    fn train(
        &self,
        payload: &TrainingRequestPayload,
        run_async: bool,
    ) -> Result<TrainResponse, TransportError>;

    /// Fetch the state of an asynchronous training task.
    fn task(&self, task_id: &str) -> Result<TaskStatus, TransportError>;
}

/// Reply to a train call. Only these fields are interpreted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TrainResponse {
    /// Status text such as `COMPLETED` or `CREATED`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub model_id: Option<String>,
    /// Set when the call was accepted asynchronously.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Failure explanation from the cluster.
    #[serde(default)]
    pub message: Option<String>,
}

impl TrainResponse {
    pub fn completed(model_id: impl Into<String>) -> Self {
        Self {
            status: STATUS_COMPLETED.to_string(),
            model_id: Some(model_id.into()),
            ..Self::default()
        }
    }

    /// A failure the cluster reported with a readable reason.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: "FAILED".to_string(),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_COMPLETED)
    }
}

/// Coarse state of an asynchronous training task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Failed,
}

/// Snapshot of an asynchronous training task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskStatus {
    pub state: TaskState,
    pub model_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct TaskWire {
    #[serde(default)]
    state: String,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<TaskWire> for TaskStatus {
    fn from(wire: TaskWire) -> Self {
        let state = match wire.state.to_ascii_uppercase().as_str() {
            STATUS_COMPLETED => TaskState::Completed,
            "FAILED" | "CANCELLED" | "COMPLETED_WITH_ERROR" => TaskState::Failed,
            _ => TaskState::Running,
        };
        Self {
            state,
            model_id: wire.model_id,
            error: wire.error,
        }
    }
}

impl TrainingApi for ClusterClient {
    fn train(
        &self,
        payload: &TrainingRequestPayload,
        run_async: bool,
    ) -> Result<TrainResponse, TransportError> {
        let query: &[(&str, &str)] = if run_async { &[("async", "true")] } else { &[] };
        let url = self.url_for(
            &["_plugins", "_ml", "_train", payload.algorithm.as_str()],
            query,
        )?;
        tracing::debug!("POST {url}");
        match self.post_json::<_, TrainResponse>(&url, &payload.body) {
            Ok(response) => Ok(response),
            // Only a structured cluster error is shown; anything else stays a transport failure.
            Err(TransportError::Status { code, body }) if (400..500).contains(&code) => {
                match error_reason(&body) {
                    Some(reason) => Ok(TrainResponse::failed(reason)),
                    None => Err(TransportError::Status { code, body }),
                }
            }
            Err(err) => Err(err),
        }
    }

    fn task(&self, task_id: &str) -> Result<TaskStatus, TransportError> {
        let url = self.url_for(&["_plugins", "_ml", "tasks", task_id], &[])?;
        self.get_json::<TaskWire>(&url).map(TaskStatus::from)
    }
}

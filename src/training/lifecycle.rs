use crate::cluster::TrainResponse;

/// Shown for network-level failures; the underlying cause goes to the log only.
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Training request failed; see logs for details";

const MISSING_MODEL_ID_MESSAGE: &str = "Training completed but no model id was returned";
const UNKNOWN_FAILURE_MESSAGE: &str = "Training failed without a reason";

/// Progress of the most recent training submission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    Idle,
    Submitting,
    /// Accepted by the cluster but not finished. With a task id the session
    /// keeps polling; without one the result cannot be fetched.
    Pending { task_id: Option<String> },
    Succeeded { model_id: String },
    Failed { message: String },
}

impl Lifecycle {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Still waiting on the cluster for this submission.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Submitting | Self::Pending { task_id: Some(_) }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    pub fn model_id(&self) -> Option<&str> {
        match self {
            Self::Succeeded { model_id } => Some(model_id),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Classify a train reply.
///
/// `COMPLETED` with a model id succeeds. Any other status with a message or
/// no task id fails; a bare task id means the cluster is still working.
pub fn interpret_response(response: &TrainResponse) -> Lifecycle {
    if response.is_completed() {
        return match response.model_id.as_deref().filter(|id| !id.is_empty()) {
            Some(model_id) => Lifecycle::Succeeded {
                model_id: model_id.to_string(),
            },
            None => Lifecycle::failed(MISSING_MODEL_ID_MESSAGE),
        };
    }
    let status = response.status.to_ascii_uppercase();
    let failed_status = matches!(status.as_str(), "FAILED" | "COMPLETED_WITH_ERROR" | "CANCELLED");
    if failed_status || response.message.is_some() {
        let message = response
            .message
            .clone()
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_FAILURE_MESSAGE.to_string());
        return Lifecycle::failed(message);
    }
    Lifecycle::Pending {
        task_id: response.task_id.clone().filter(|id| !id.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_with_model_id_succeeds() {
        let lifecycle = interpret_response(&TrainResponse::completed("m-1"));
        assert_eq!(lifecycle.model_id(), Some("m-1"));
        assert!(lifecycle.is_terminal());
    }

    #[test]
    fn completed_without_model_id_fails() {
        let response = TrainResponse {
            status: "COMPLETED".into(),
            ..TrainResponse::default()
        };
        assert_eq!(
            interpret_response(&response),
            Lifecycle::failed(MISSING_MODEL_ID_MESSAGE)
        );
    }

    #[test]
    fn failure_message_is_surfaced_verbatim() {
        let lifecycle = interpret_response(&TrainResponse::failed("centroids must be positive"));
        assert_eq!(lifecycle.error_message(), Some("centroids must be positive"));
    }

    #[test]
    fn failed_status_without_message_gets_a_reason() {
        let response = TrainResponse {
            status: "FAILED".into(),
            ..TrainResponse::default()
        };
        assert_eq!(
            interpret_response(&response).error_message(),
            Some(UNKNOWN_FAILURE_MESSAGE)
        );
    }

    #[test]
    fn task_ids_mean_pending() {
        let response = TrainResponse {
            status: "CREATED".into(),
            task_id: Some("t-7".into()),
            ..TrainResponse::default()
        };
        let lifecycle = interpret_response(&response);
        assert_eq!(
            lifecycle,
            Lifecycle::Pending {
                task_id: Some("t-7".into())
            }
        );
        assert!(lifecycle.is_in_flight());

        let untracked = interpret_response(&TrainResponse::default());
        assert_eq!(untracked, Lifecycle::Pending { task_id: None });
        assert!(!untracked.is_in_flight());
    }
}

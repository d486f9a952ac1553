//! Background workers for a training session and the channel they report on.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::lifecycle::{Lifecycle, TRANSPORT_FAILURE_MESSAGE, interpret_response};
use super::request::TrainingRequestPayload;
use crate::cluster::{QueryApi, SearchRequest, TaskState, TrainingApi, TransportError};
use crate::tabular::{DecodeError, TabularTable, decode_file, from_search_hits};

pub(super) enum JobMessage {
    FileDecoded(DecodeResult),
    PreviewLoaded(PreviewResult),
    Training(TrainingUpdate),
}

#[derive(Debug)]
pub(super) struct DecodeJob {
    pub(super) generation: u64,
    pub(super) path: PathBuf,
    pub(super) max_bytes: u64,
}

#[derive(Debug)]
pub(super) struct DecodeResult {
    pub(super) generation: u64,
    pub(super) path: PathBuf,
    pub(super) result: Result<TabularTable, DecodeError>,
}

#[derive(Debug)]
pub(super) struct PreviewResult {
    pub(super) generation: u64,
    pub(super) result: Result<TabularTable, TransportError>,
}

/// Lifecycle reported by a training worker; non in-flight states end the job.
#[derive(Debug)]
pub(super) struct TrainingUpdate {
    pub(super) request_id: u64,
    pub(super) lifecycle: Lifecycle,
}

pub(super) struct TrainingJob {
    pub(super) request_id: u64,
    pub(super) payload: TrainingRequestPayload,
    pub(super) run_async: bool,
    pub(super) poll_interval: Duration,
    pub(super) max_poll_attempts: u32,
}

struct ActiveTraining {
    request_id: u64,
    cancel: Arc<AtomicBool>,
}

pub(super) struct SessionJobs {
    decode_job_tx: Sender<DecodeJob>,
    message_tx: Sender<JobMessage>,
    message_rx: Receiver<JobMessage>,
    next_request_id: u64,
    active_training: Option<ActiveTraining>,
}

impl SessionJobs {
    pub(super) fn new() -> Self {
        let (decode_job_tx, decode_result_rx) = spawn_file_decoder();
        let (message_tx, message_rx) = mpsc::channel::<JobMessage>();
        let jobs = Self {
            decode_job_tx,
            message_tx,
            message_rx,
            next_request_id: 1,
            active_training: None,
        };
        jobs.forward_decode_results(decode_result_rx);
        jobs
    }

    pub(super) fn try_recv_message(&self) -> Result<JobMessage, TryRecvError> {
        self.message_rx.try_recv()
    }

    fn forward_decode_results(&self, rx: Receiver<DecodeResult>) {
        let tx = self.message_tx.clone();
        thread::spawn(move || {
            while let Ok(message) = rx.recv() {
                let _ = tx.send(JobMessage::FileDecoded(message));
            }
        });
    }

    pub(super) fn send_decode_job(&self, job: DecodeJob) -> Result<(), DecodeJob> {
        self.decode_job_tx.send(job).map_err(|err| err.0)
    }

    pub(super) fn begin_preview(
        &self,
        api: Arc<dyn QueryApi>,
        generation: u64,
        request: SearchRequest,
    ) {
        let tx = self.message_tx.clone();
        thread::spawn(move || {
            let result = api
                .search(&request)
                .map(|hits| from_search_hits(&hits, &request.fields));
            let _ = tx.send(JobMessage::PreviewLoaded(PreviewResult { generation, result }));
        });
    }

    pub(super) fn next_request_id(&mut self) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        request_id
    }

    /// Request id whose updates are still applied, if any.
    pub(super) fn active_request_id(&self) -> Option<u64> {
        self.active_training.as_ref().map(|active| active.request_id)
    }

    /// Stop listening to the current submission; its worker stops polling at
    /// the next check and anything it still reports is discarded.
    pub(super) fn abandon_training(&mut self) -> Option<u64> {
        let active = self.active_training.take()?;
        active.cancel.store(true, Ordering::Relaxed);
        Some(active.request_id)
    }

    pub(super) fn finish_training(&mut self, request_id: u64) {
        if self.active_request_id() == Some(request_id) {
            self.active_training = None;
        }
    }

    pub(super) fn begin_training(&mut self, api: Arc<dyn TrainingApi>, job: TrainingJob) {
        self.abandon_training();
        let cancel = Arc::new(AtomicBool::new(false));
        self.active_training = Some(ActiveTraining {
            request_id: job.request_id,
            cancel: cancel.clone(),
        });
        let tx = self.message_tx.clone();
        thread::spawn(move || {
            let request_id = job.request_id;
            let report = |lifecycle: Lifecycle| {
                let _ = tx.send(JobMessage::Training(TrainingUpdate {
                    request_id,
                    lifecycle,
                }));
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                run_training(api.as_ref(), &job, &cancel, &report)
            }));
            match outcome {
                Ok(Some(lifecycle)) => report(lifecycle),
                Ok(None) => debug!("Training request {request_id} cancelled while polling"),
                Err(_) => {
                    warn!("Training worker for request {request_id} panicked");
                    report(Lifecycle::failed(TRANSPORT_FAILURE_MESSAGE));
                }
            }
        });
    }
}

fn spawn_file_decoder() -> (Sender<DecodeJob>, Receiver<DecodeResult>) {
    let (tx, rx) = mpsc::channel::<DecodeJob>();
    let (result_tx, result_rx) = mpsc::channel::<DecodeResult>();
    thread::spawn(move || {
        while let Ok(job) = rx.recv() {
            let result = decode_file(&job.path, job.max_bytes);
            let _ = result_tx.send(DecodeResult {
                generation: job.generation,
                path: job.path,
                result,
            });
        }
    });
    (tx, result_rx)
}

/// Submit and, for tracked asynchronous tasks, poll until a final state.
/// Returns `None` when cancelled before the task finished.
fn run_training(
    api: &dyn TrainingApi,
    job: &TrainingJob,
    cancel: &AtomicBool,
    report: &dyn Fn(Lifecycle),
) -> Option<Lifecycle> {
    let response = match api.train(&job.payload, job.run_async) {
        Ok(response) => response,
        Err(err) => {
            warn!(
                "Training request {} for {} failed: {err}",
                job.request_id, job.payload.algorithm
            );
            return Some(Lifecycle::failed(TRANSPORT_FAILURE_MESSAGE));
        }
    };
    let lifecycle = interpret_response(&response);
    let task_id = match &lifecycle {
        Lifecycle::Pending {
            task_id: Some(task_id),
        } => task_id.clone(),
        _ => return Some(lifecycle),
    };
    report(lifecycle);
    poll_task(api, job, &task_id, cancel)
}

fn poll_task(
    api: &dyn TrainingApi,
    job: &TrainingJob,
    task_id: &str,
    cancel: &AtomicBool,
) -> Option<Lifecycle> {
    for attempt in 1..=job.max_poll_attempts {
        thread::sleep(job.poll_interval);
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        match api.task(task_id) {
            Ok(status) => match status.state {
                TaskState::Running => {
                    debug!("Training task {task_id} still running (poll {attempt})");
                }
                TaskState::Completed => {
                    return Some(match status.model_id.filter(|id| !id.is_empty()) {
                        Some(model_id) => Lifecycle::Succeeded { model_id },
                        None => Lifecycle::failed(format!(
                            "Training task {task_id} completed without a model id"
                        )),
                    });
                }
                TaskState::Failed => {
                    return Some(Lifecycle::failed(status.error.unwrap_or_else(|| {
                        format!("Training task {task_id} failed")
                    })));
                }
            },
            Err(err) => {
                warn!("Polling training task {task_id} failed: {err}");
                return Some(Lifecycle::failed(TRANSPORT_FAILURE_MESSAGE));
            }
        }
    }
    Some(Lifecycle::failed(format!(
        "Timed out waiting for training task {task_id}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{AlgorithmId, defaults_for};
    use crate::cluster::{TaskStatus, TrainResponse};
    use crate::data_source::DataSourceMode;
    use crate::training::TrainBody;
    use std::sync::Mutex;

    struct ScriptedApi {
        train: Result<TrainResponse, TransportError>,
        tasks: Mutex<Vec<TaskStatus>>,
    }

    impl TrainingApi for ScriptedApi {
        fn train(
            &self,
            _payload: &TrainingRequestPayload,
            _run_async: bool,
        ) -> Result<TrainResponse, TransportError> {
            self.train.clone()
        }

        fn task(&self, _task_id: &str) -> Result<TaskStatus, TransportError> {
            let mut tasks = self.tasks.lock().unwrap();
            if tasks.is_empty() {
                return Err(TransportError::Transport("no more statuses".into()));
            }
            Ok(tasks.remove(0))
        }
    }

    fn job(max_poll_attempts: u32) -> TrainingJob {
        TrainingJob {
            request_id: 1,
            payload: TrainingRequestPayload {
                algorithm: AlgorithmId::Kmeans,
                mode: DataSourceMode::Upload,
                body: TrainBody {
                    parameters: defaults_for(AlgorithmId::Kmeans),
                    input_data: None,
                    input_index: None,
                    input_query: None,
                },
            },
            run_async: true,
            poll_interval: Duration::from_millis(1),
            max_poll_attempts,
        }
    }

    fn accepted(task_id: &str) -> TrainResponse {
        TrainResponse {
            status: "CREATED".into(),
            task_id: Some(task_id.into()),
            ..TrainResponse::default()
        }
    }

    fn status(state: TaskState, model_id: Option<&str>) -> TaskStatus {
        TaskStatus {
            state,
            model_id: model_id.map(str::to_string),
            error: None,
        }
    }

    #[test]
    fn transport_errors_become_generic_failures() {
        let api = ScriptedApi {
            train: Err(TransportError::Transport("connection refused".into())),
            tasks: Mutex::new(Vec::new()),
        };
        let outcome = run_training(&api, &job(3), &AtomicBool::new(false), &|_| {});
        assert_eq!(outcome, Some(Lifecycle::failed(TRANSPORT_FAILURE_MESSAGE)));
    }

    #[test]
    fn polls_task_until_completed() {
        let api = ScriptedApi {
            train: Ok(accepted("t-1")),
            tasks: Mutex::new(vec![
                status(TaskState::Running, None),
                status(TaskState::Completed, Some("m-5")),
            ]),
        };
        let reported = Mutex::new(Vec::new());
        let outcome = run_training(&api, &job(5), &AtomicBool::new(false), &|lifecycle| {
            reported.lock().unwrap().push(lifecycle)
        });
        assert_eq!(
            outcome,
            Some(Lifecycle::Succeeded {
                model_id: "m-5".into()
            })
        );
        assert_eq!(
            reported.into_inner().unwrap(),
            vec![Lifecycle::Pending {
                task_id: Some("t-1".into())
            }]
        );
    }

    #[test]
    fn gives_up_after_max_poll_attempts() {
        let api = ScriptedApi {
            train: Ok(accepted("t-2")),
            tasks: Mutex::new(vec![
                status(TaskState::Running, None),
                status(TaskState::Running, None),
            ]),
        };
        let outcome = run_training(&api, &job(2), &AtomicBool::new(false), &|_| {});
        assert_eq!(
            outcome,
            Some(Lifecycle::failed("Timed out waiting for training task t-2"))
        );
    }

    #[test]
    fn cancelled_polling_reports_nothing() {
        let api = ScriptedApi {
            train: Ok(accepted("t-3")),
            tasks: Mutex::new(Vec::new()),
        };
        let outcome = run_training(&api, &job(5), &AtomicBool::new(true), &|_| {});
        assert_eq!(outcome, None);
    }

    #[test]
    fn untracked_pending_ends_the_job() {
        let api = ScriptedApi {
            train: Ok(TrainResponse::default()),
            tasks: Mutex::new(Vec::new()),
        };
        let outcome = run_training(&api, &job(5), &AtomicBool::new(false), &|_| {});
        assert_eq!(outcome, Some(Lifecycle::Pending { task_id: None }));
    }
}

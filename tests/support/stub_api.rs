use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use mltrain::cluster::{
    IndexField, QueryApi, SearchRequest, TaskStatus, TrainResponse, TrainingApi, TransportError,
};
use mltrain::training::TrainingRequestPayload;
use serde_json::Value;

type Reply = Result<TrainResponse, TransportError>;

/// One blocked `train` call; the worker waits until the test answers it.
pub struct PendingCall {
    pub payload: TrainingRequestPayload,
    reply: Sender<Reply>,
}

impl PendingCall {
    pub fn respond(self, reply: Reply) {
        let _ = self.reply.send(reply);
    }
}

/// Training API whose calls block until the test releases them, in any order.
pub struct GatedTrainingApi {
    calls: Mutex<Sender<PendingCall>>,
}

impl GatedTrainingApi {
    pub fn new() -> (Self, Receiver<PendingCall>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                calls: Mutex::new(tx),
            },
            rx,
        )
    }
}

impl TrainingApi for GatedTrainingApi {
    fn train(&self, payload: &TrainingRequestPayload, _run_async: bool) -> Reply {
        let (reply_tx, reply_rx) = mpsc::channel();
        let call = PendingCall {
            payload: payload.clone(),
            reply: reply_tx,
        };
        if self.calls.lock().unwrap().send(call).is_err() {
            return Err(TransportError::Transport("test harness gone".into()));
        }
        reply_rx
            .recv()
            .unwrap_or_else(|_| Err(TransportError::Transport("call dropped".into())))
    }

    fn task(&self, task_id: &str) -> Result<TaskStatus, TransportError> {
        Err(TransportError::Transport(format!("unexpected poll of {task_id}")))
    }
}

/// Training API answering every call from a fixed script.
pub struct ScriptedTrainingApi {
    pub train_reply: Reply,
    pub task_replies: Mutex<Vec<TaskStatus>>,
    pub sent: Mutex<Vec<(TrainingRequestPayload, bool)>>,
}

impl ScriptedTrainingApi {
    pub fn new(train_reply: Reply) -> Self {
        Self {
            train_reply,
            task_replies: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tasks(self, tasks: Vec<TaskStatus>) -> Self {
        *self.task_replies.lock().unwrap() = tasks;
        self
    }
}

impl TrainingApi for ScriptedTrainingApi {
    fn train(&self, payload: &TrainingRequestPayload, run_async: bool) -> Reply {
        self.sent
            .lock()
            .unwrap()
            .push((payload.clone(), run_async));
        self.train_reply.clone()
    }

    fn task(&self, task_id: &str) -> Result<TaskStatus, TransportError> {
        let mut replies = self.task_replies.lock().unwrap();
        if replies.is_empty() {
            return Err(TransportError::Transport(format!("no status left for {task_id}")));
        }
        Ok(replies.remove(0))
    }
}

/// Query API serving canned hits, optionally after a delay.
pub struct StubQueryApi {
    pub hits: Vec<Value>,
    pub delay: Duration,
    pub searches: Mutex<Vec<SearchRequest>>,
}

impl StubQueryApi {
    pub fn new(hits: Vec<Value>) -> Self {
        Self {
            hits,
            delay: Duration::ZERO,
            searches: Mutex::new(Vec::new()),
        }
    }
}

impl QueryApi for StubQueryApi {
    fn index_patterns(&self) -> Result<Vec<String>, TransportError> {
        Ok(vec!["iris".to_string()])
    }

    fn fields(&self, _index: &str) -> Result<Vec<IndexField>, TransportError> {
        Ok(vec![IndexField {
            name: "petal_length".to_string(),
            field_type: "float".to_string(),
        }])
    }

    fn search(&self, request: &SearchRequest) -> Result<Vec<Value>, TransportError> {
        self.searches.lock().unwrap().push(request.clone());
        std::thread::sleep(self.delay);
        Ok(self.hits.clone())
    }
}

/// Write `contents` to a temp file with the given extension.
pub fn data_file(extension: &str, contents: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

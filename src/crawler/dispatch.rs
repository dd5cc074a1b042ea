//! Task definitions and dispatch
//!
//! The three pipeline operations are independent units of work, each
//! addressable by a stable name and carrying a single payload value. A
//! `Dispatcher` hands tasks off fire-and-forget; delivery is at-least-once,
//! so every operation must tolerate being run again for the same payload.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised when handing off or decoding a task
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("task queue is closed")]
    Closed,

    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("task '{name}' expects a {expected} payload")]
    BadPayload { name: String, expected: &'static str },
}

/// The single payload value a task carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPayload {
    None,
    Url(String),
    Id(i64),
}

/// A unit of pipeline work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Pick the next eligible frontier entry and request it
    SelectAndRequest,
    /// Fetch a canonical URL and store its content
    FetchAndStore { url: String },
    /// Extract links from a stored page and submit them
    ExtractAndSubmit { page_id: i64 },
}

impl Task {
    pub const SELECT_AND_REQUEST: &'static str = "select_and_request";
    pub const FETCH_AND_STORE: &'static str = "fetch_and_store";
    pub const EXTRACT_AND_SUBMIT: &'static str = "extract_and_submit";

    /// Returns the stable operation name
    pub fn name(&self) -> &'static str {
        match self {
            Task::SelectAndRequest => Self::SELECT_AND_REQUEST,
            Task::FetchAndStore { .. } => Self::FETCH_AND_STORE,
            Task::ExtractAndSubmit { .. } => Self::EXTRACT_AND_SUBMIT,
        }
    }

    pub fn payload(&self) -> TaskPayload {
        match self {
            Task::SelectAndRequest => TaskPayload::None,
            Task::FetchAndStore { url } => TaskPayload::Url(url.clone()),
            Task::ExtractAndSubmit { page_id } => TaskPayload::Id(*page_id),
        }
    }

    /// Rebuilds a task from its name and payload
    pub fn from_parts(name: &str, payload: TaskPayload) -> Result<Self, DispatchError> {
        match (name, payload) {
            (Self::SELECT_AND_REQUEST, TaskPayload::None) => Ok(Task::SelectAndRequest),
            (Self::FETCH_AND_STORE, TaskPayload::Url(url)) => Ok(Task::FetchAndStore { url }),
            (Self::EXTRACT_AND_SUBMIT, TaskPayload::Id(page_id)) => {
                Ok(Task::ExtractAndSubmit { page_id })
            }
            (Self::SELECT_AND_REQUEST, _) => Err(bad_payload(name, "empty")),
            (Self::FETCH_AND_STORE, _) => Err(bad_payload(name, "URL")),
            (Self::EXTRACT_AND_SUBMIT, _) => Err(bad_payload(name, "page id")),
            _ => Err(DispatchError::UnknownTask(name.to_string())),
        }
    }

    /// Parses the `name[=payload]` form used on the command line
    ///
    /// ```
    /// use moebius::crawler::Task;
    ///
    /// let task = Task::parse_spec("extract_and_submit=7").unwrap();
    /// assert_eq!(task, Task::ExtractAndSubmit { page_id: 7 });
    /// ```
    pub fn parse_spec(spec: &str) -> Result<Self, DispatchError> {
        let (name, payload) = match spec.split_once('=') {
            None => (spec, TaskPayload::None),
            Some((name, value)) if name == Self::EXTRACT_AND_SUBMIT => {
                let payload = value
                    .parse()
                    .map(TaskPayload::Id)
                    .map_err(|_| bad_payload(name, "page id"))?;
                (name, payload)
            }
            Some((name, value)) => (name, TaskPayload::Url(value.to_string())),
        };
        Self::from_parts(name.trim(), payload)
    }
}

fn bad_payload(name: &str, expected: &'static str) -> DispatchError {
    DispatchError::BadPayload {
        name: name.to_string(),
        expected,
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::SelectAndRequest => f.write_str(self.name()),
            Task::FetchAndStore { url } => write!(f, "{}({})", self.name(), url),
            Task::ExtractAndSubmit { page_id } => write!(f, "{}({})", self.name(), page_id),
        }
    }
}

/// Opaque handle returned for every dispatched task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

/// Hands tasks off for asynchronous execution
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, task: Task) -> Result<TaskHandle, DispatchError>;
}

/// A task as delivered to a worker
#[derive(Debug, Clone)]
pub struct TaskEnvelope {
    pub handle: TaskHandle,
    pub task: Task,
    /// 1 on first delivery
    pub attempt: u32,
}

/// In-process dispatcher backed by an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    sender: mpsc::UnboundedSender<TaskEnvelope>,
    next_handle: std::sync::Arc<AtomicU64>,
}

/// Receiving half of a `QueueDispatcher`
#[derive(Debug)]
pub struct TaskQueue {
    receiver: mpsc::UnboundedReceiver<TaskEnvelope>,
}

impl QueueDispatcher {
    /// Creates a dispatcher and the queue its tasks are delivered to
    pub fn new() -> (Self, TaskQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                next_handle: std::sync::Arc::new(AtomicU64::new(1)),
            },
            TaskQueue { receiver },
        )
    }

    /// Puts a failed task back on the queue for another attempt
    pub fn redeliver(&self, envelope: TaskEnvelope) -> Result<(), DispatchError> {
        self.sender
            .send(TaskEnvelope {
                attempt: envelope.attempt + 1,
                ..envelope
            })
            .map_err(|_| DispatchError::Closed)
    }
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, task: Task) -> Result<TaskHandle, DispatchError> {
        let handle = TaskHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.sender
            .send(TaskEnvelope {
                handle,
                task,
                attempt: 1,
            })
            .map_err(|_| DispatchError::Closed)?;
        Ok(handle)
    }
}

impl TaskQueue {
    /// Waits for the next task; `None` once every dispatcher is dropped
    pub async fn next(&mut self) -> Option<TaskEnvelope> {
        self.receiver.recv().await
    }

    pub fn try_next(&mut self) -> Option<TaskEnvelope> {
        self.receiver.try_recv().ok()
    }

    /// Stops accepting new tasks; already queued tasks can still be drained
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Dispatcher that only records what it was given
///
/// Used to run a single pipeline step in isolation and report its follow-up
/// work instead of executing it.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<Task>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every recorded task, oldest first
    pub fn take(&self) -> Vec<Task> {
        match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, task: Task) -> Result<TaskHandle, DispatchError> {
        let mut tasks = self.tasks.lock().map_err(|_| DispatchError::Closed)?;
        tasks.push(task);
        Ok(TaskHandle(tasks.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_names_are_stable() {
        assert_eq!(Task::SelectAndRequest.name(), "select_and_request");
        assert_eq!(
            Task::FetchAndStore {
                url: "http://example.com/".to_string()
            }
            .name(),
            "fetch_and_store"
        );
        assert_eq!(
            Task::ExtractAndSubmit { page_id: 1 }.name(),
            "extract_and_submit"
        );
    }

    #[test]
    fn test_from_parts_rebuilds_task() {
        let task = Task::FetchAndStore {
            url: "http://example.com/".to_string(),
        };
        assert_eq!(Task::from_parts(task.name(), task.payload()), Ok(task));
    }

    #[test]
    fn test_from_parts_rejects_unknown_and_mismatched() {
        assert_eq!(
            Task::from_parts("frobnicate", TaskPayload::None),
            Err(DispatchError::UnknownTask("frobnicate".to_string()))
        );
        assert!(matches!(
            Task::from_parts("extract_and_submit", TaskPayload::Url("x".to_string())),
            Err(DispatchError::BadPayload { .. })
        ));
    }

    #[test]
    fn test_parse_spec() {
        assert_eq!(
            Task::parse_spec("select_and_request"),
            Ok(Task::SelectAndRequest)
        );
        assert_eq!(
            Task::parse_spec("fetch_and_store=http://example.com/a?b=c"),
            Ok(Task::FetchAndStore {
                url: "http://example.com/a?b=c".to_string()
            })
        );
        assert!(Task::parse_spec("extract_and_submit=abc").is_err());
        assert!(Task::parse_spec("fetch_and_store").is_err());
    }

    #[tokio::test]
    async fn test_queue_delivers_in_order() {
        let (dispatcher, mut queue) = QueueDispatcher::new();

        let first = dispatcher.dispatch(Task::SelectAndRequest).unwrap();
        let second = dispatcher
            .dispatch(Task::ExtractAndSubmit { page_id: 3 })
            .unwrap();
        assert_ne!(first, second);

        let envelope = queue.next().await.unwrap();
        assert_eq!(envelope.handle, first);
        assert_eq!(envelope.attempt, 1);
        assert_eq!(envelope.task, Task::SelectAndRequest);

        let envelope = queue.next().await.unwrap();
        assert_eq!(envelope.task, Task::ExtractAndSubmit { page_id: 3 });
        assert!(queue.try_next().is_none());
    }

    #[tokio::test]
    async fn test_redeliver_bumps_attempt() {
        let (dispatcher, mut queue) = QueueDispatcher::new();
        dispatcher.dispatch(Task::SelectAndRequest).unwrap();

        let envelope = queue.next().await.unwrap();
        let handle = envelope.handle;
        dispatcher.redeliver(envelope).unwrap();

        let envelope = queue.next().await.unwrap();
        assert_eq!(envelope.handle, handle);
        assert_eq!(envelope.attempt, 2);
    }

    #[test]
    fn test_dispatch_after_close_fails() {
        let (dispatcher, mut queue) = QueueDispatcher::new();
        queue.close();
        assert_eq!(
            dispatcher.dispatch(Task::SelectAndRequest),
            Err(DispatchError::Closed)
        );
    }

    #[test]
    fn test_recording_dispatcher() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher.dispatch(Task::SelectAndRequest).unwrap();
        dispatcher
            .dispatch(Task::ExtractAndSubmit { page_id: 9 })
            .unwrap();

        assert_eq!(
            dispatcher.take(),
            vec![Task::SelectAndRequest, Task::ExtractAndSubmit { page_id: 9 }]
        );
        assert!(dispatcher.take().is_empty());
    }
}

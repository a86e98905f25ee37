//! Task plumbing for the gNB
//!
//! A task owns its state and drains one bounded channel of [`TaskMessage`]
//! envelopes, running each message to completion before taking the next.
//! Callers only ever see a [`TaskHandle`]; queries that need an answer carry
//! a oneshot sender inside the message (see [`TaskHandle::request`]).

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

/// Default capacity of task channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// The task is gone and its receiver dropped
    #[error("task {0} has stopped")]
    Stopped(&'static str),

    #[error("task {0} queue is full")]
    Busy(&'static str),

    /// The task took the request but dropped the reply sender
    #[error("task {0} dropped the reply")]
    NoReply(&'static str),
}

/// Envelope around a task's messages.
#[derive(Debug)]
pub enum TaskMessage<T> {
    Message(T),
    /// Stop after the messages queued before this one
    Shutdown,
}

impl<T> TaskMessage<T> {
    pub fn into_message(self) -> Option<T> {
        match self {
            TaskMessage::Message(msg) => Some(msg),
            TaskMessage::Shutdown => None,
        }
    }
}

/// An actor-style gNB task.
#[async_trait::async_trait]
pub trait Task: Send + 'static {
    /// Name used in logs and errors
    const NAME: &'static str;

    type Message: Send;

    /// Runs until a shutdown envelope arrives or every sender is gone.
    async fn run(&mut self, rx: mpsc::Receiver<TaskMessage<Self::Message>>);
}

/// Sending side of a task channel.
pub struct TaskHandle<T> {
    name: &'static str,
    tx: mpsc::Sender<TaskMessage<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self { name: self.name, tx: self.tx.clone() }
    }
}

impl<T> TaskHandle<T> {
    pub fn new(name: &'static str, tx: mpsc::Sender<TaskMessage<T>>) -> Self {
        Self { name, tx }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queues `msg`, waiting for room in the channel.
    pub async fn send(&self, msg: T) -> Result<(), TaskError> {
        self.tx
            .send(TaskMessage::Message(msg))
            .await
            .map_err(|_| TaskError::Stopped(self.name))
    }

    /// Queues `msg` only if there is room right now.
    pub fn try_send(&self, msg: T) -> Result<(), TaskError> {
        self.tx.try_send(TaskMessage::Message(msg)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TaskError::Busy(self.name),
            mpsc::error::TrySendError::Closed(_) => TaskError::Stopped(self.name),
        })
    }

    /// Sends the message built around a fresh reply sender and waits for
    /// the answer.
    pub async fn request<R>(&self, build: impl FnOnce(oneshot::Sender<R>) -> T) -> Result<R, TaskError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;
        reply_rx.await.map_err(|_| TaskError::NoReply(self.name))
    }

    pub async fn shutdown(&self) -> Result<(), TaskError> {
        debug!("Shutdown requested for task {}", self.name);
        self.tx
            .send(TaskMessage::Shutdown)
            .await
            .map_err(|_| TaskError::Stopped(self.name))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawns `task` on the tokio runtime.
///
/// The join handle gives the task back once it stopped, so its final state
/// can be inspected.
pub fn spawn_task<T: Task>(mut task: T, capacity: usize) -> (TaskHandle<T::Message>, JoinHandle<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let span = tracing::info_span!("task", name = T::NAME);
    let join = tokio::spawn(
        async move {
            task.run(rx).await;
            task
        }
        .instrument(span),
    );
    (TaskHandle::new(T::NAME, tx), join)
}

//! Readiness probes bound to the remote API.
//!
//! [`TaskStatusProbe`] watches an asynchronous task through the status
//! endpoint. [`FetchProbe`] fetches any object and lets the caller decide what
//! its state field means.

use std::marker::PhantomData;

use async_trait::async_trait;
use convergence::{CancellationToken, PollError, Poller, Probe, ProbeFailure, Readiness, StatusId, TransportError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::request::redirected;

/// Task state reported once the task is done.
pub const TASK_COMPLETED: &str = "COMPLETED";
/// Task state reported when the task failed for good.
pub const TASK_ERROR: &str = "ERROR";

// ---------------------------------------------------------------------------
// Asynchronous tasks
// ---------------------------------------------------------------------------

/// Body of `GET /status/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskStatus {
    pub status_id: String,
    pub status: String,
    pub message: String,
    pub code: i64,
    pub description: String,
    pub status_type: String,
}

/// How a task finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The status endpoint reported completion.
    Completed(TaskStatus),
    /// The status endpoint redirected to the object the task produced.
    Redirected { location: String },
}

/// Polls the status of one asynchronous task.
#[derive(Debug, Clone)]
pub struct TaskStatusProbe {
    client: Client,
    status_id: StatusId,
    genai: bool,
    cancel: CancellationToken,
}

impl TaskStatusProbe {
    pub fn new(client: Client, status_id: StatusId, cancel: CancellationToken) -> Self {
        Self {
            client,
            status_id,
            genai: false,
            cancel,
        }
    }

    /// Watches the GenAI status endpoint instead of the general one.
    pub fn genai(mut self) -> Self {
        self.genai = true;
        self
    }

    fn path(&self) -> String {
        if self.genai {
            format!("/genai/status/{}/", self.status_id)
        } else {
            format!("/status/{}/", self.status_id)
        }
    }
}

#[async_trait]
impl Probe for TaskStatusProbe {
    type Observation = TaskOutcome;

    fn target(&self) -> String {
        format!("task {}", self.status_id)
    }

    async fn probe(&self) -> Readiness<TaskOutcome> {
        match self.client.get::<TaskStatus>(&self.path(), &self.cancel).await {
            Ok(task) if task.status == TASK_ERROR => Readiness::Failed(ProbeFailure::Remote(task.message)),
            Ok(task) if task.status == TASK_COMPLETED => Readiness::Ready(TaskOutcome::Completed(task)),
            Ok(task) => Readiness::Pending(task.status),
            Err(err) => match redirected(&err) {
                Some(r) => Readiness::Ready(TaskOutcome::Redirected {
                    location: r.location.clone(),
                }),
                None => Readiness::Failed(err.into()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Arbitrary objects
// ---------------------------------------------------------------------------

/// What a fetched object's state field says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectState {
    Ready,
    Pending(String),
    Failed(String),
}

/// Fetches `path` and classifies the object with a caller-supplied function.
///
/// Once ready, the object is fetched once more so the caller receives its
/// settled representation.
pub struct FetchProbe<T, F> {
    client: Client,
    path: String,
    classify: F,
    cancel: CancellationToken,
    _object: PhantomData<fn() -> T>,
}

impl<T, F> FetchProbe<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(&T) -> ObjectState + Send + Sync,
{
    pub fn new(client: Client, path: impl Into<String>, classify: F, cancel: CancellationToken) -> Self {
        Self {
            client,
            path: path.into(),
            classify,
            cancel,
            _object: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> Probe for FetchProbe<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(&T) -> ObjectState + Send + Sync,
{
    type Observation = T;

    fn target(&self) -> String {
        self.path.clone()
    }

    async fn probe(&self) -> Readiness<T> {
        let object = match self.client.get::<T>(&self.path, &self.cancel).await {
            Ok(object) => object,
            Err(err) => return Readiness::Failed(err.into()),
        };
        match (self.classify)(&object) {
            ObjectState::Ready => Readiness::Ready(object),
            ObjectState::Pending(status) => Readiness::Pending(status),
            ObjectState::Failed(message) => Readiness::Failed(ProbeFailure::Remote(message)),
        }
    }

    async fn refresh(&self, _ready: T) -> Result<T, TransportError> {
        self.client.get(&self.path, &self.cancel).await
    }
}

impl Client {
    /// Waits for the asynchronous task `status_id` to finish.
    pub async fn wait_for_task(
        &self,
        poller: &Poller,
        status_id: StatusId,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, PollError> {
        let probe = TaskStatusProbe::new(self.clone(), status_id, cancel.clone());
        poller.wait_until_ready(&probe, cancel).await
    }
}

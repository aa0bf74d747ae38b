//! Remote task observation.
//!
//! Clusters watch a job-server task by polling `jobserver/get_task` until
//! the task reaches a terminal state. Each round carries a `start_from`
//! watermark so only new progress entries travel over the wire; the loop
//! reassembles the full log locally and hands the caller a fresh snapshot
//! per round.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::debug;

use swarmlink_types::envelope::{Envelope, Scope};
use swarmlink_types::task::{Task, TaskFor, TaskRef};

use crate::ipc::{FetchOptions, Ipc, SendOptions};
use crate::outbox::SendError;

/// Default wall-clock bound on one whole poll session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default pause between poll rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Options for one poll session.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Bound on the whole session, across all rounds.
    pub timeout: Duration,
    /// Pause between successive rounds.
    pub poll_interval: Duration,
    /// Bound on one round's request.
    pub round_timeout: Duration,
    /// Entity scope forwarded to the job server for access checks.
    pub target: Option<TaskFor>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SESSION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            round_timeout: crate::ipc::DEFAULT_FETCH_TIMEOUT,
            target: None,
        }
    }
}

/// Why a poll session ended without a terminal task.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Send(#[from] SendError),

    /// The job server did not answer within the round timeout.
    #[error("no response from the job server")]
    NoResponse,

    /// The job server answered with an error output.
    #[error("job server error: {0}")]
    Remote(String),

    /// The response could not be decoded into a task.
    #[error("malformed task response: {0}")]
    Malformed(String),

    #[error("poll session exceeded {0:?}")]
    SessionTimeout(Duration),

    /// The per-round callback asked to abort.
    #[error("poll callback failed: {0}")]
    Callback(String),
}

impl Ipc {
    /// Poll the job server for a task until it reaches a terminal state.
    ///
    /// `on_update` runs once per round with a snapshot whose `statuses`
    /// hold the full log accumulated so far; its error aborts the session.
    /// Any fault (no response, remote error, malformed task) is fatal --
    /// the loop never retries a failed round.
    pub async fn poll_for_task<F, Fut>(
        &self,
        task_ref: &TaskRef,
        opts: PollOptions,
        mut on_update: F,
    ) -> Result<Task, PollError>
    where
        F: FnMut(Task) -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        let task_json =
            serde_json::to_string(task_ref).map_err(|err| PollError::Malformed(err.to_string()))?;
        let deadline = Instant::now() + opts.timeout;
        let mut statuses: Vec<Value> = Vec::new();

        loop {
            if Instant::now() >= deadline {
                return Err(PollError::SessionTimeout(opts.timeout));
            }

            let mut envelope = Envelope::new(Scope::Jobserver, "get_task");
            let data = envelope.data_mut();
            data.extra.insert("task".to_string(), json!(task_json));
            data.extra
                .insert("start_from".to_string(), json!(statuses.len()));
            if let Some(target) = &opts.target {
                data.extra.insert("target_id".to_string(), json!(target.id));
                data.extra
                    .insert("target_type".to_string(), json!(target.target_type));
            }

            let handle = self
                .send_request(
                    envelope,
                    SendOptions::default(),
                    FetchOptions {
                        num_clusters_needed: Some(1),
                        timeout: opts.round_timeout,
                    },
                )
                .await?;

            let responses = handle.fetch().await;
            let Some(reply) = responses.into_values().next() else {
                return Err(PollError::NoResponse);
            };
            let Some(output) = reply.output else {
                return Err(PollError::Malformed("response without output".to_string()));
            };
            if let Some(error) = output.get("error").and_then(Value::as_str) {
                return Err(PollError::Remote(error.to_string()));
            }

            let mut task: Task = serde_json::from_value(output)
                .map_err(|err| PollError::Malformed(err.to_string()))?;
            if task.task_id.is_empty() {
                return Err(PollError::Malformed("response with empty task id".to_string()));
            }

            // The reply carries only entries beyond our watermark; splice
            // them onto the accumulated log and give the callback the
            // reassembled view.
            statuses.extend(task.statuses.drain(..));
            task.statuses = statuses.clone();
            debug!(
                task_id = %task.task_id,
                state = %task.state,
                statuses = statuses.len(),
                "task poll round"
            );

            on_update(task.clone()).await.map_err(PollError::Callback)?;

            if task.state.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(opts.poll_interval).await;
        }
    }
}

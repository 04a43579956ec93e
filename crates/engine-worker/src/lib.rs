// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Worker isolation: a single cooperative worker task, talked to over channels."]
#![deny(unsafe_code)]

//! Each subagent runs inside its own worker task, isolated from the host
//! (the orchestrator) by a message-passing protocol rather than shared
//! state. The host and worker exchange correlated messages over
//! `tokio::sync::mpsc` channels; cancellation is modeled as terminating
//! the worker task, which the host observes as a `worker_error`.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A message the host sends to a worker.
#[derive(Debug, Clone)]
pub enum HostMessage {
    /// Hand the worker a task to run.
    RunTask {
        correlation_id: u64,
        agent_name: String,
        prompt: String,
        input: serde_json::Value,
    },
    /// Deliver a model's result back into a worker that requested one.
    ModelResult {
        correlation_id: u64,
        output: serde_json::Value,
    },
}

/// A message a worker sends back to the host.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// The worker wants the host to spawn a child run on its behalf.
    RequestSpawn {
        correlation_id: u64,
        agent_name: String,
        prompt: String,
        input: serde_json::Value,
    },
    /// The worker finished its task successfully.
    Done {
        correlation_id: u64,
        output: serde_json::Value,
    },
    /// The worker failed its task.
    Fail {
        correlation_id: u64,
        reason: String,
    },
    /// A progress note, purely informational.
    Progress {
        correlation_id: u64,
        note: String,
    },
}

/// Errors surfaced to the host when a worker cannot be driven to completion.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker_error")]
    WorkerError,
}

/// A handle to a running worker task and its message channels.
pub struct WorkerHandle {
    to_worker: mpsc::Sender<HostMessage>,
    from_worker: mpsc::Receiver<WorkerMessage>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Send a message to the worker.
    pub async fn send(&self, msg: HostMessage) -> Result<(), WorkerError> {
        self.to_worker.send(msg).await.map_err(|_| WorkerError::WorkerError)
    }

    /// Wait for the next message from the worker, or `None` if the worker
    /// task has terminated and its channel has closed.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.from_worker.recv().await
    }

    /// Terminate the worker task immediately. The host should treat any
    /// in-flight correlation IDs as failed with `worker_error`.
    pub fn cancel(&self) {
        self.join.abort();
    }
}

/// Spawn a worker task running `body`, a function from a stream of host
/// messages to a stream of worker messages. `body` is expected to loop
/// receiving `HostMessage`s and sending `WorkerMessage`s until its inbound
/// channel closes.
pub fn spawn_worker<F, Fut>(body: F) -> WorkerHandle
where
    F: FnOnce(mpsc::Receiver<HostMessage>, mpsc::Sender<WorkerMessage>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (to_worker_tx, to_worker_rx) = mpsc::channel(16);
    let (from_worker_tx, from_worker_rx) = mpsc::channel(16);
    let join = tokio::spawn(body(to_worker_rx, from_worker_tx));
    WorkerHandle {
        to_worker: to_worker_tx,
        from_worker: from_worker_rx,
        join,
    }
}

/// Run a single task to completion on a worker, collecting `Done`/`Fail`
/// for the given correlation ID while forwarding any `RequestSpawn`
/// messages to `on_spawn_request`. This is the single-threaded cooperative
/// scheduling loop the orchestrator drives per subagent call: exactly one
/// worker is live at a time from the host's perspective, even though the
/// worker itself runs on the async runtime.
pub async fn run_task_to_completion(
    handle: &mut WorkerHandle,
    correlation_id: u64,
    agent_name: impl Into<String>,
    prompt: impl Into<String>,
    input: serde_json::Value,
    mut on_spawn_request: impl FnMut(String, String, serde_json::Value) -> serde_json::Value,
) -> Result<serde_json::Value, WorkerError> {
    handle
        .send(HostMessage::RunTask {
            correlation_id,
            agent_name: agent_name.into(),
            prompt: prompt.into(),
            input,
        })
        .await?;

    loop {
        match handle.recv().await {
            Some(WorkerMessage::Done {
                correlation_id: cid,
                output,
            }) if cid == correlation_id => return Ok(output),
            Some(WorkerMessage::Fail {
                correlation_id: cid,
                reason,
            }) if cid == correlation_id => {
                tracing::warn!(target: "engine.worker", %reason, "worker reported failure");
                return Err(WorkerError::WorkerError);
            }
            Some(WorkerMessage::Progress { note, .. }) => {
                tracing::debug!(target: "engine.worker", %note, "worker progress");
            }
            Some(WorkerMessage::RequestSpawn {
                correlation_id: cid,
                agent_name,
                prompt,
                input,
            }) => {
                let result = on_spawn_request(agent_name, prompt, input);
                handle
                    .send(HostMessage::ModelResult {
                        correlation_id: cid,
                        output: result,
                    })
                    .await?;
            }
            Some(_) => continue,
            None => return Err(WorkerError::WorkerError),
        }
    }
}

/// Tracks which correlation IDs are currently in flight, for hosts
/// juggling more than one outstanding worker call.
#[derive(Debug, Default)]
pub struct CorrelationTracker {
    next_id: u64,
    in_flight: HashMap<u64, String>,
}

impl CorrelationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, label: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.in_flight.insert(id, label.into());
        id
    }

    pub fn complete(&mut self, id: u64) -> Option<String> {
        self.in_flight.remove(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn worker_completes_with_done() {
        let mut handle = spawn_worker(|mut inbox, outbox| async move {
            while let Some(msg) = inbox.recv().await {
                if let HostMessage::RunTask { correlation_id, .. } = msg {
                    let _ = outbox
                        .send(WorkerMessage::Done {
                            correlation_id,
                            output: json!({"ok": true}),
                        })
                        .await;
                }
            }
        });

        let result = run_task_to_completion(
            &mut handle,
            1,
            "worker",
            "do it",
            json!({}),
            |_, _, _| json!({}),
        )
        .await
        .unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn cancelled_worker_yields_worker_error() {
        let mut handle = spawn_worker(|mut inbox, _outbox| async move {
            // Never respond; the test cancels before this matters.
            while inbox.recv().await.is_some() {
                tokio::task::yield_now().await;
            }
        });
        handle.cancel();
        let result = run_task_to_completion(
            &mut handle,
            1,
            "worker",
            "do it",
            json!({}),
            |_, _, _| json!({}),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn correlation_tracker_tracks_pending() {
        let mut tracker = CorrelationTracker::new();
        let id = tracker.begin("spawn worker");
        assert_eq!(tracker.pending_count(), 1);
        tracker.complete(id);
        assert_eq!(tracker.pending_count(), 0);
    }
}

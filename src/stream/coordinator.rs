//! Background pipeline execution feeding an event channel.
//!
//! [`StreamCoordinator::start`] hands back the receiving end immediately and
//! runs the pipeline on a tokio task. Whatever happens to the pipeline, the
//! channel ends with exactly one sentinel:
//!
//! - success pushes the answer text, then closes;
//! - an error or panic pushes `"Error: <message>"`, then closes;
//! - cancellation (explicit, or the consumer dropping the receiver) closes
//!   without a final answer;
//! - an aborted task closes from the worker's drop guard.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::channel::{EventReceiver, EventSender, channel};
use super::event::Event;
use crate::Result;
use crate::telemetry::STREAMS_TOTAL;

/// A query-answering pipeline.
///
/// Implementations push intermediate progress through the [`Reporter`] and
/// return the final answer text.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn invoke(&self, query: &str, reporter: &Reporter) -> Result<String>;
}

/// Pushes progress events onto a stream's channel.
#[derive(Clone)]
pub struct Reporter {
    sender: EventSender,
}

impl Reporter {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }

    /// Report a node state change as `{"event": "nodeChanged", "data": ...}`.
    pub fn report_node(&self, data: Value) -> Result<()> {
        self.emit(Event::record(json!({"event": "nodeChanged", "data": data})))
    }

    /// Report a pipeline state change as `{"event": "pipelineChanged", "data": ...}`.
    pub fn report_pipeline(&self, data: Value) -> Result<()> {
        self.emit(Event::record(json!({"event": "pipelineChanged", "data": data})))
    }

    /// Push an arbitrary event.
    pub fn emit(&self, event: impl Into<Event>) -> Result<()> {
        self.sender.push(event)
    }
}

/// Worker lifecycle as observed through a [`StreamHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Started,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Finished | StreamState::Failed | StreamState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Started => "started",
            StreamState::Running => "running",
            StreamState::Finished => "finished",
            StreamState::Failed => "failed",
            StreamState::Cancelled => "cancelled",
        }
    }
}

/// Control side of a running stream.
pub struct StreamHandle {
    state: watch::Receiver<StreamState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Ask the worker to stop. The channel still ends with a sentinel.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the worker reaches a terminal state.
    ///
    /// A worker that went away without reporting one (aborted, or unwound
    /// outside the pipeline) counts as [`StreamState::Failed`].
    pub async fn wait(&mut self) -> StreamState {
        // wait_for only errs once the sender is gone with a non-terminal value
        self.state
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| *state)
            .unwrap_or(StreamState::Failed)
    }

    /// Abort the worker task outright.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// The two halves returned by [`StreamCoordinator::start`].
pub struct StreamSession {
    pub events: EventReceiver,
    pub handle: StreamHandle,
}

impl StreamSession {
    pub fn into_parts(self) -> (EventReceiver, StreamHandle) {
        (self.events, self.handle)
    }
}

/// Spawns pipeline workers.
///
/// Streams started from one coordinator share a parent cancellation token,
/// so [`shutdown`](Self::shutdown) cancels all of them.
#[derive(Clone, Default)]
pub struct StreamCoordinator {
    cancel: CancellationToken,
}

impl StreamCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Cancel every stream started from this coordinator.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run `pipeline` on `query` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, pipeline: Arc<dyn Pipeline>, query: impl Into<String>) -> StreamSession {
        self.spawn(query.into(), move |query, reporter| async move {
            pipeline.invoke(&query, &reporter).await
        })
    }

    /// Run an arbitrary worker future in the background.
    ///
    /// The worker gets the query and a [`Reporter`] and follows the same
    /// termination rules as a [`Pipeline`].
    pub fn spawn<F, Fut>(&self, query: String, worker: F) -> StreamSession
    where
        F: FnOnce(String, Reporter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let (sender, events) = channel();
        let (state_tx, state_rx) = watch::channel(StreamState::Started);
        let cancel = self.cancel.child_token();

        let task = tokio::spawn(run_worker(sender, state_tx, cancel.clone(), query, worker));

        StreamSession {
            events,
            handle: StreamHandle {
                state: state_rx,
                cancel,
                task,
            },
        }
    }
}

/// Closes the channel when the worker future is dropped, including on abort.
struct CloseOnDrop(EventSender);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

enum Outcome {
    Completed(std::result::Result<Result<String>, Box<dyn Any + Send>>),
    Cancelled,
}

async fn run_worker<F, Fut>(
    sender: EventSender,
    state: watch::Sender<StreamState>,
    cancel: CancellationToken,
    query: String,
    worker: F,
) where
    F: FnOnce(String, Reporter) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let _guard = CloseOnDrop(sender.clone());
    state.send_replace(StreamState::Running);

    let reporter = Reporter::new(sender.clone());
    let work = AssertUnwindSafe(async move { worker(query, reporter).await }).catch_unwind();
    let outcome = tokio::select! {
        result = work => Outcome::Completed(result),
        _ = cancel.cancelled() => Outcome::Cancelled,
        _ = sender.abandoned() => Outcome::Cancelled,
    };

    let terminal = match outcome {
        Outcome::Completed(Ok(Ok(answer))) => {
            debug!(len = answer.len(), "pipeline finished");
            if sender.push(Event::Text(answer)).is_err() {
                debug!("consumer gone before final answer");
            }
            StreamState::Finished
        }
        Outcome::Completed(Ok(Err(e))) => {
            error!(error = %e, "pipeline failed");
            let _ = sender.push(Event::Text(format!("Error: {e}")));
            StreamState::Failed
        }
        Outcome::Completed(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!(panic = %message, "pipeline panicked");
            let _ = sender.push(Event::Text(format!("Error: {message}")));
            StreamState::Failed
        }
        Outcome::Cancelled => {
            warn!("pipeline cancelled");
            StreamState::Cancelled
        }
    };

    sender.close();
    metrics::counter!(STREAMS_TOTAL, "status" => terminal.as_str()).increment(1);
    state.send_replace(terminal);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "pipeline panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!StreamState::Started.is_terminal());
        assert!(!StreamState::Running.is_terminal());
        assert!(StreamState::Finished.is_terminal());
        assert!(StreamState::Failed.is_terminal());
        assert!(StreamState::Cancelled.is_terminal());
    }

    #[test]
    fn panic_message_from_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42_u8), "pipeline panicked");
    }

    #[tokio::test]
    async fn reporter_wraps_node_events() {
        let (tx, mut rx) = channel();
        let reporter = Reporter::new(tx);
        reporter.report_node(json!({"id": "n1", "answer": null})).unwrap();
        match rx.recv().await.unwrap() {
            Event::Record(value) => {
                assert_eq!(value, json!({"event": "nodeChanged", "data": {"id": "n1"}}));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

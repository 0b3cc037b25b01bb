//! Client-facing loop of one stream: drains the channel and frames items.

use futures::StreamExt as _;
use futures::stream::BoxStream;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::channel::ItemReceiver;
use crate::errors::RunFailure;
use crate::item::{Frame, StreamItem};
use crate::model::ClientId;
use crate::run::{AbortHandle, RunOutcome};

/// Lifecycle of a stream controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// Forwarding items as they arrive.
    Open,
    /// A terminal error frame was written; only `[DONE]` remains.
    Closing,
    /// `[DONE]` was written and the channel released.
    Closed,
    /// The consumer went away before the stream finished.
    Cancelled,
}

/// Owns the consumer side of one client stream.
///
/// Waits on either the next queued item or the end of the run task, so the
/// stream always ends with `[DONE]` even if the task dies without queueing the
/// sentinel.
pub struct StreamController {
    run_id: uuid::Uuid,
    client_id: ClientId,
    rx: ItemReceiver,
    run: Option<JoinHandle<RunOutcome>>,
    outcome: Option<RunOutcome>,
    abort: AbortHandle,
    cancel_on_disconnect: bool,
    state: ControllerState,
    forwarded: u64,
}

impl StreamController {
    pub(crate) fn new(
        run_id: uuid::Uuid,
        client_id: ClientId,
        rx: ItemReceiver,
        run: JoinHandle<RunOutcome>,
        abort: AbortHandle,
        cancel_on_disconnect: bool,
    ) -> Self {
        Self {
            run_id,
            client_id,
            rx,
            run: Some(run),
            outcome: None,
            abort,
            cancel_on_disconnect,
            state: ControllerState::Open,
            forwarded: 0,
        }
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Number of non-terminal frames handed to the client so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Returns the next frame, or `None` once the stream has ended.
    ///
    /// Frames come out in exactly the order their items were queued. This is
    /// the only suspension point of the consumer.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                ControllerState::Open => {}
                ControllerState::Closing => {
                    self.close();
                    return Some(Frame::done());
                }
                ControllerState::Closed | ControllerState::Cancelled => return None,
            }

            let next = tokio::select! {
                biased;
                item = self.rx.pop() => item,
                joined = join_run(&mut self.run) => {
                    self.run = None;
                    self.outcome = Some(outcome_from_join(joined));
                    continue;
                }
            };

            match next {
                Some(StreamItem::Sentinel) => {
                    self.close();
                    return Some(Frame::done());
                }
                Some(item) => {
                    self.forwarded += 1;
                    return Some(item.to_frame());
                }
                None => {
                    // Producer gone without a sentinel.
                    let message = self.missing_sentinel_reason().await;
                    warn!(
                        event = "relay.sentinel_synthesized",
                        run_id = %self.run_id,
                        client_id = %self.client_id,
                        reason = %message,
                        "run ended without terminal item"
                    );
                    self.state = ControllerState::Closing;
                    return Some(StreamItem::Error { message }.to_frame());
                }
            }
        }
    }

    /// Consumes the controller into a stream of frames.
    ///
    /// The stream is boxed so callers can poll it with `next()` directly.
    /// Dropping it before it ends cancels the controller.
    pub fn into_frames(self) -> BoxStream<'static, Frame> {
        futures::stream::unfold(self, |mut controller| async move {
            let frame = controller.next_frame().await?;
            Some((frame, controller))
        })
        .boxed()
    }

    /// Stops forwarding and releases the channel.
    ///
    /// Only takes effect while the stream is still open; calling it after the
    /// stream ended (or twice) does nothing.
    pub fn cancel(&mut self) {
        if !matches!(
            self.state,
            ControllerState::Open | ControllerState::Closing
        ) {
            return;
        }
        self.state = ControllerState::Cancelled;
        self.rx.close();
        if self.cancel_on_disconnect {
            self.abort.abort();
        }
        debug!(
            event = "relay.client_disconnected",
            run_id = %self.run_id,
            client_id = %self.client_id,
            forwarded = self.forwarded,
            abort_run = self.cancel_on_disconnect,
            "client disconnected from stream"
        );
    }

    fn close(&mut self) {
        self.state = ControllerState::Closed;
        self.rx.close();
        info!(
            event = "relay.stream_closed",
            run_id = %self.run_id,
            client_id = %self.client_id,
            forwarded = self.forwarded,
            "stream closed"
        );
    }

    async fn missing_sentinel_reason(&mut self) -> String {
        if let Some(run) = self.run.take() {
            self.outcome = Some(outcome_from_join(run.await));
        }
        match &self.outcome {
            Some(RunOutcome::Failed(failure)) => failure.to_string(),
            Some(RunOutcome::Aborted) => RunFailure::Cancelled.to_string(),
            Some(RunOutcome::Completed) | None => RunFailure::Protocol {
                message: "run ended without a terminal item".into(),
            }
            .to_string(),
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn join_run(run: &mut Option<JoinHandle<RunOutcome>>) -> Result<RunOutcome, JoinError> {
    match run {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn outcome_from_join(joined: Result<RunOutcome, JoinError>) -> RunOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => RunOutcome::Failed(RunFailure::Panicked {
            message: panic_message(err),
        }),
        Err(err) => RunOutcome::Failed(RunFailure::Protocol {
            message: format!("run task ended abnormally: {err}"),
        }),
    }
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

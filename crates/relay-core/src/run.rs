use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::EventAdapter;
use crate::engine::Engine;
use crate::errors::{ProviderError, RunFailure, run_failure_from_provider_error};
use crate::item::StreamItem;
use crate::model::AssistantId;
use crate::session::Session;

/// Handle used to request cancellation of a running engine run.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is best-effort: the engine call is dropped at its next
    /// suspension point and nothing further is queued.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tx: watch::Sender<bool>) -> Self {
        Self { tx: Arc::new(tx) }
    }
}

/// How a run task ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The engine finished the run; the sentinel was queued.
    Completed,
    /// The engine failed; an error item and the sentinel were queued.
    Failed(RunFailure),
    /// The run was aborted; nothing further was queued.
    Aborted,
}

/// Everything one run task needs, moved into the spawned task.
pub(crate) struct RunRequest {
    pub run_id: uuid::Uuid,
    pub engine: Arc<dyn Engine>,
    pub session: Session,
    pub assistant: AssistantId,
    pub prompt: String,
    pub instructions: Option<String>,
}

/// Spawns the run task for one stream.
///
/// The task runs concurrently with the consumer so the first item can be
/// forwarded as soon as it is queued.
pub(crate) fn spawn_run(
    request: RunRequest,
    adapter: EventAdapter,
) -> (JoinHandle<RunOutcome>, AbortHandle) {
    let (abort_tx, abort_rx) = watch::channel(false);
    let handle = tokio::spawn(run_task(request, adapter, abort_rx));
    (
        handle,
        AbortHandle {
            tx: Arc::new(abort_tx),
        },
    )
}

async fn run_task(
    request: RunRequest,
    adapter: EventAdapter,
    mut abort_rx: watch::Receiver<bool>,
) -> RunOutcome {
    let run_id = request.run_id;
    let client_id = request.session.handle().client_id().clone();
    let engine_id = request.engine.id();

    let result = tokio::select! {
        _ = wait_for_abort(&mut abort_rx) => {
            debug!(run_id = %run_id, client_id = %client_id, "run aborted after client disconnect");
            return RunOutcome::Aborted;
        }
        result = execute(&request, &adapter) => result,
    };
    // Release the session before the terminal item so a finished stream never
    // pins it.
    drop(request);

    match result {
        Ok(()) => {
            adapter.push(StreamItem::Sentinel);
            info!(
                event = "relay.run_completed",
                run_id = %run_id,
                client_id = %client_id,
                engine = %engine_id,
                dropped = adapter.dropped(),
                "run completed"
            );
            RunOutcome::Completed
        }
        Err(err) => {
            let failure = run_failure_from_provider_error(&err);
            warn!(
                event = "relay.run_failed",
                run_id = %run_id,
                client_id = %client_id,
                engine = %engine_id,
                error = %err,
                "run failed"
            );
            adapter.push(StreamItem::Error {
                message: failure.to_string(),
            });
            adapter.push(StreamItem::Sentinel);
            RunOutcome::Failed(failure)
        }
    }
}

async fn execute(request: &RunRequest, adapter: &EventAdapter) -> Result<(), ProviderError> {
    let _turn = request.session.lock_turn().await;
    let session = request.session.handle();
    debug!(
        run_id = %request.run_id,
        thread_id = session.thread_id(),
        prompt_len = request.prompt.len() as u64,
        "appending user turn"
    );
    request
        .engine
        .add_user_message(session, &request.prompt)
        .await?;
    request
        .engine
        .stream_run(
            session,
            &request.assistant,
            request.instructions.as_deref(),
            adapter,
        )
        .await
}

/// Resolves once an abort was requested; never resolves if the handle is
/// dropped without aborting.
async fn wait_for_abort(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapter::EventAdapter;
use crate::channel::channel;
use crate::controller::StreamController;
use crate::engine::Engine;
use crate::errors::RelayError;
use crate::model::{AssistantId, ClientId, EngineId, RelayOptions, SessionLimits};
use crate::run::{RunRequest, spawn_run};
use crate::session::{SessionHandle, SessionStore};

struct RelayInner {
    engine: Arc<dyn Engine>,
    assistant: AssistantId,
    sessions: SessionStore,
    options: RelayOptions,
}

/// Entry point for opening client streams against one engine and assistant.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    /// Starts a builder for wiring an engine and assistant into a `Relay`.
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    pub fn engine_id(&self) -> EngineId {
        self.inner.engine.id()
    }

    pub fn assistant(&self) -> &AssistantId {
        &self.inner.assistant
    }

    pub fn options(&self) -> &RelayOptions {
        &self.inner.options
    }

    /// Per-client sessions owned by this relay.
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Opens a stream for `prompt` on the client's own session.
    ///
    /// Spawns the run task and returns the controller that drains it. The
    /// returned stream always ends with `[DONE]`, on success and on failure.
    pub async fn open_stream(
        &self,
        client_id: &ClientId,
        prompt: &str,
    ) -> Result<StreamController, RelayError> {
        if prompt.trim().is_empty() {
            return Err(RelayError::Validation("prompt must not be empty".into()));
        }
        let inner = &self.inner;
        let session = inner
            .sessions
            .get_or_create(client_id, inner.engine.as_ref())
            .await?;
        let evicted = inner.sessions.evict(&inner.options.sessions);
        if !evicted.is_empty() {
            delete_sessions(inner.engine.clone(), evicted);
        }

        let (sender, receiver) = channel();
        let run_id = uuid::Uuid::new_v4();
        info!(
            event = "relay.stream_opened",
            run_id = %run_id,
            client_id = %client_id,
            thread_id = session.handle().thread_id(),
            engine = %inner.engine.id(),
            "stream opened"
        );
        let (run, abort) = spawn_run(
            RunRequest {
                run_id,
                engine: inner.engine.clone(),
                session,
                assistant: inner.assistant.clone(),
                prompt: prompt.to_string(),
                instructions: inner.options.run_instructions.clone(),
            },
            EventAdapter::new(sender),
        );

        Ok(StreamController::new(
            run_id,
            client_id.clone(),
            receiver,
            run,
            abort,
            inner.options.cancel_on_disconnect,
        ))
    }
}

/// Deletes evicted conversations engine-side without holding up the request.
fn delete_sessions(engine: Arc<dyn Engine>, handles: Vec<SessionHandle>) {
    tokio::spawn(async move {
        for handle in handles {
            match engine.delete_session(&handle).await {
                Ok(()) => debug!(
                    event = "relay.session_deleted",
                    client_id = %handle.client_id(),
                    thread_id = handle.thread_id(),
                    "evicted session deleted"
                ),
                Err(err) => warn!(
                    event = "relay.session_delete_failed",
                    client_id = %handle.client_id(),
                    thread_id = handle.thread_id(),
                    error = %err,
                    "failed to delete evicted session"
                ),
            }
        }
    });
}

/// Builder used to wire an engine and its provisioned assistant.
#[derive(Default)]
pub struct RelayBuilder {
    engine: Option<Arc<dyn Engine>>,
    assistant: Option<AssistantId>,
    options: RelayOptions,
}

impl RelayBuilder {
    pub fn engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the assistant every run starts against.
    pub fn assistant(mut self, assistant: AssistantId) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    pub fn run_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.options.run_instructions = Some(instructions.into());
        self
    }

    pub fn cancel_on_disconnect(mut self, enabled: bool) -> Self {
        self.options.cancel_on_disconnect = enabled;
        self
    }

    /// Bounds how many client sessions the relay remembers.
    pub fn session_limits(mut self, limits: SessionLimits) -> Self {
        self.options.sessions = limits;
        self
    }

    /// Builds the relay, rejecting a missing engine or assistant.
    pub fn build(self) -> Result<Relay, RelayError> {
        let engine = self
            .engine
            .ok_or_else(|| RelayError::Config("relay requires an engine".into()))?;
        let assistant = self
            .assistant
            .ok_or_else(|| RelayError::Config("relay requires an assistant id".into()))?;
        if assistant.as_str().trim().is_empty() {
            return Err(RelayError::Config("assistant id must not be empty".into()));
        }
        if self.options.sessions.max_sessions == 0 {
            return Err(RelayError::Config("max_sessions must be at least 1".into()));
        }
        let mut options = self.options;
        options.run_instructions = options
            .run_instructions
            .filter(|s| !s.trim().is_empty());
        Ok(Relay {
            inner: Arc::new(RelayInner {
                engine,
                assistant,
                sessions: SessionStore::new(),
                options,
            }),
        })
    }
}

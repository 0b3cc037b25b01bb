//! Scripted engine shared by the relay's unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt as _;

use crate::adapter::EventSink;
use crate::controller::StreamController;
use crate::engine::Engine;
use crate::errors::ProviderError;
use crate::event::EngineEvent;
use crate::item::Frame;
use crate::model::{AssistantId, AssistantSpec, ClientId, EngineId};
use crate::session::SessionHandle;

#[derive(Clone, Debug)]
pub(crate) enum ScriptStep {
    Emit(EngineEvent),
    Sleep(Duration),
    Fail(ProviderError),
    Panic,
}

pub(crate) struct ScriptedEngine {
    script: Vec<ScriptStep>,
    sessions: AtomicUsize,
    messages: Mutex<Vec<(String, String)>>,
    deleted: Mutex<Vec<String>>,
    instructions: Mutex<Option<String>>,
    completed: AtomicBool,
    fail_add_message: bool,
    fail_create_session: bool,
}

impl ScriptedEngine {
    pub(crate) fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            sessions: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            instructions: Mutex::new(None),
            completed: AtomicBool::new(false),
            fail_add_message: false,
            fail_create_session: false,
        }
    }

    pub(crate) fn fail_add_message(mut self) -> Self {
        self.fail_add_message = true;
        self
    }

    pub(crate) fn fail_create_session(mut self) -> Self {
        self.fail_create_session = true;
        self
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("messages lock")
            .iter()
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    pub(crate) fn prompts_for(&self, thread_id: &str) -> Vec<String> {
        self.messages
            .lock()
            .expect("messages lock")
            .iter()
            .filter(|(thread, _)| thread == thread_id)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    pub(crate) fn sessions_created(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Thread ids deleted after eviction.
    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted lock").clone()
    }

    pub(crate) fn last_instructions(&self) -> Option<String> {
        self.instructions.lock().expect("instructions lock").clone()
    }

    /// True once a `stream_run` call ran its whole script.
    pub(crate) fn completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_finished(&self) {
        while !self.completed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait::async_trait]
impl Engine for ScriptedEngine {
    fn id(&self) -> EngineId {
        EngineId::new("scripted")
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ProviderError> {
        Ok(AssistantId::new(format!("asst_{}", spec.name)))
    }

    async fn create_session(&self, client_id: &ClientId) -> Result<SessionHandle, ProviderError> {
        if self.fail_create_session {
            return Err(ProviderError::transport("scripted", "thread create failed"));
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle::new(client_id.clone(), format!("thread-{n}")))
    }

    async fn delete_session(&self, session: &SessionHandle) -> Result<(), ProviderError> {
        self.deleted
            .lock()
            .expect("deleted lock")
            .push(session.thread_id().to_string());
        Ok(())
    }

    async fn add_user_message(
        &self,
        session: &SessionHandle,
        prompt: &str,
    ) -> Result<(), ProviderError> {
        if self.fail_add_message {
            return Err(ProviderError::provider(
                "scripted",
                "thread is locked by an active run",
                Some(400),
            ));
        }
        self.messages
            .lock()
            .expect("messages lock")
            .push((session.thread_id().to_string(), prompt.to_string()));
        Ok(())
    }

    async fn stream_run(
        &self,
        _session: &SessionHandle,
        _assistant: &AssistantId,
        instructions: Option<&str>,
        sink: &dyn EventSink,
    ) -> Result<(), ProviderError> {
        *self.instructions.lock().expect("instructions lock") = instructions.map(str::to_string);
        for step in &self.script {
            match step {
                ScriptStep::Emit(event) => sink.emit(event.clone()),
                ScriptStep::Sleep(duration) => tokio::time::sleep(*duration).await,
                ScriptStep::Fail(err) => return Err(err.clone()),
                ScriptStep::Panic => panic!("scripted panic"),
            }
        }
        self.completed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) async fn collect_frames(controller: StreamController) -> Vec<Frame> {
    controller.into_frames().collect().await
}

use crate::adapter::EventSink;
use crate::errors::ProviderError;
use crate::model::{AssistantId, AssistantSpec, ClientId, EngineId};
use crate::session::SessionHandle;

/// Contract implemented by generation engines (for example `OpenAiEngine`).
///
/// The relay only drives runs; conversation storage and model execution stay
/// on the engine side and are addressed through handles.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// Stable engine id used in errors and logs.
    fn id(&self) -> EngineId;

    /// Provisions the assistant every run is started against.
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ProviderError>;

    /// Creates an empty conversation for a client.
    async fn create_session(&self, client_id: &ClientId) -> Result<SessionHandle, ProviderError>;

    /// Deletes a conversation the relay no longer tracks.
    ///
    /// Engines without server-side conversation storage keep the default.
    async fn delete_session(&self, _session: &SessionHandle) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Appends a user turn to the conversation.
    async fn add_user_message(
        &self,
        session: &SessionHandle,
        prompt: &str,
    ) -> Result<(), ProviderError>;

    /// Runs the assistant on the conversation, delivering events to `sink`
    /// in firing order, and returns once the run completed or failed.
    async fn stream_run(
        &self,
        session: &SessionHandle,
        assistant: &AssistantId,
        instructions: Option<&str>,
        sink: &dyn EventSink,
    ) -> Result<(), ProviderError>;
}

use std::pin::Pin;

use futures::StreamExt as _;
use serde_json::Value;
use tracing::{debug, trace};

use crate::adapter::EventSink;
use crate::engine::Engine;
use crate::errors::{ProviderError, RelayError};
use crate::model::{AssistantId, AssistantSpec, ClientId, EngineId};
use crate::session::SessionHandle;

use super::config::OpenAiClientConfig;
use super::transport::{AssistantEventMapper, RunSignal, SseDecoder};

const OPENAI_ENGINE: &str = "openai";
const ASSISTANTS_BETA: &str = "assistants=v2";

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Engine backed by the OpenAI Assistants API (threads + streamed runs).
pub struct OpenAiEngine {
    client: reqwest::Client,
    config: OpenAiClientConfig,
}

impl OpenAiEngine {
    /// Creates an engine from explicit client configuration.
    pub fn new(config: OpenAiClientConfig) -> Result<Self, RelayError> {
        if config.api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "OpenAI client config api_key must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build OpenAI client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates an engine using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, RelayError> {
        Self::new(OpenAiClientConfig::from_env()?)
    }

    async fn post_json(&self, url: String, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let request = self.client.post(&url).json(body);
        self.send(url, request).await
    }

    async fn send(
        &self,
        url: String,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA)
            .send()
            .await
            .map_err(|e| {
                ProviderError::transport(OPENAI_ENGINE, format!("OpenAI request failed: {e}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::provider(
                OPENAI_ENGINE,
                format!("OpenAI request to {url} failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }
        Ok(response)
    }

    async fn post_for_id(&self, url: String, body: &Value) -> Result<String, ProviderError> {
        let response = self.post_json(url, body).await?;
        let value: Value = response.json().await.map_err(|e| {
            ProviderError::protocol(OPENAI_ENGINE, format!("invalid OpenAI response body: {e}"))
        })?;
        read_object_id(&value)
    }
}

#[async_trait::async_trait]
impl Engine for OpenAiEngine {
    fn id(&self) -> EngineId {
        EngineId::new(OPENAI_ENGINE)
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantId, ProviderError> {
        let id = self
            .post_for_id(self.config.assistants_url(), &assistant_body(spec))
            .await?;
        debug!(assistant_id = %id, name = %spec.name, model = %spec.model, "created OpenAI assistant");
        Ok(AssistantId::new(id))
    }

    async fn create_session(&self, client_id: &ClientId) -> Result<SessionHandle, ProviderError> {
        let thread_id = self
            .post_for_id(self.config.threads_url(), &serde_json::json!({}))
            .await?;
        debug!(client_id = %client_id, thread_id = %thread_id, "created OpenAI thread");
        Ok(SessionHandle::new(client_id.clone(), thread_id))
    }

    async fn delete_session(&self, session: &SessionHandle) -> Result<(), ProviderError> {
        let url = self.config.thread_url(session.thread_id());
        let request = self.client.delete(&url);
        self.send(url, request).await?;
        debug!(client_id = %session.client_id(), thread_id = session.thread_id(), "deleted OpenAI thread");
        Ok(())
    }

    async fn add_user_message(
        &self,
        session: &SessionHandle,
        prompt: &str,
    ) -> Result<(), ProviderError> {
        self.post_json(
            self.config.messages_url(session.thread_id()),
            &message_body(prompt),
        )
        .await?;
        Ok(())
    }

    async fn stream_run(
        &self,
        session: &SessionHandle,
        assistant: &AssistantId,
        instructions: Option<&str>,
        sink: &dyn EventSink,
    ) -> Result<(), ProviderError> {
        debug!(thread_id = session.thread_id(), assistant_id = %assistant, "starting OpenAI run stream");
        let response = self
            .post_json(
                self.config.runs_url(session.thread_id()),
                &run_body(assistant, instructions),
            )
            .await?;
        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        drive_run_stream(&self.id(), bytes_stream, sink).await
    }
}

/// Feeds a run's byte stream through the decoder and mapper into `sink`.
///
/// Succeeds only if the stream reported `thread.run.completed`.
async fn drive_run_stream(
    provider: &EngineId,
    mut bytes_stream: ByteStream,
    sink: &dyn EventSink,
) -> Result<(), ProviderError> {
    let mut decoder = SseDecoder::default();
    let mut mapper = AssistantEventMapper::default();
    let mut completed = false;

    'read: while let Some(chunk) = bytes_stream.next().await {
        let chunk = chunk.map_err(|e| {
            ProviderError::transport(provider.clone(), format!("OpenAI streaming read failed: {e}"))
        })?;
        for frame in decoder.push_chunk(&chunk) {
            trace!(event = ?frame.event, "OpenAI stream frame");
            for signal in mapper.map_frame(provider, &frame)? {
                match signal {
                    RunSignal::Event(event) => sink.emit(event),
                    RunSignal::Completed => completed = true,
                    RunSignal::Done => break 'read,
                }
            }
        }
    }

    if completed {
        Ok(())
    } else {
        Err(ProviderError::protocol(
            provider.clone(),
            "run stream ended before the run completed",
        ))
    }
}

fn read_object_id(value: &Value) -> Result<String, ProviderError> {
    value
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| ProviderError::protocol(OPENAI_ENGINE, "OpenAI response is missing an id"))
}

pub(crate) fn assistant_body(spec: &AssistantSpec) -> Value {
    let tools: Vec<Value> = spec
        .tools
        .iter()
        .map(|tool| serde_json::json!({ "type": tool }))
        .collect();
    serde_json::json!({
        "name": spec.name,
        "instructions": spec.instructions,
        "tools": tools,
        "model": spec.model,
    })
}

pub(crate) fn message_body(prompt: &str) -> Value {
    serde_json::json!({
        "role": "user",
        "content": prompt,
    })
}

pub(crate) fn run_body(assistant: &AssistantId, instructions: Option<&str>) -> Value {
    let mut body = serde_json::json!({
        "assistant_id": assistant.as_str(),
        "stream": true,
    });
    if let Some(instructions) = instructions.map(str::trim).filter(|s| !s.is_empty()) {
        body["instructions"] = Value::String(instructions.to_string());
    }
    body
}

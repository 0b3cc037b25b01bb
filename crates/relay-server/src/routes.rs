use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, TRANSFER_ENCODING};
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use relay_core::{ClientId, Relay};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::error::ServerError;
use crate::{observability, sse};

pub static CLIENT_ID_HEADER: HeaderName = HeaderName::from_static("x-client-id");

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatStreamQuery {
    pub prompt: Option<String>,
    pub client_id: Option<String>,
}

/// Builds the HTTP router, mounted under `root_path` when it is non-empty.
pub fn create_router(relay: Relay, root_path: &str) -> Router {
    let api = Router::new()
        .route("/chat-stream", get(chat_stream))
        .route("/health", get(health))
        .with_state(AppState { relay });

    let router = if root_path.is_empty() {
        api
    } else {
        Router::new().nest(root_path, api)
    };

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([CLIENT_ID_HEADER.clone()]),
        )
        .layer(observability::http_trace_layer())
}

async fn chat_stream(
    State(state): State<AppState>,
    Query(query): Query<ChatStreamQuery>,
) -> Result<Response, ServerError> {
    let prompt = query.prompt.unwrap_or_default();
    if prompt.trim().is_empty() {
        return Err(ServerError::BadRequest("prompt must not be empty".into()));
    }
    let client_id = match query.client_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => ClientId::new(id),
        None => {
            let minted = ClientId::generate();
            debug!(client_id = %minted, "minted client id for anonymous request");
            minted
        }
    };

    tracing::Span::current().record("client_id", client_id.as_str());

    let controller = state.relay.open_stream(&client_id, &prompt).await?;
    let mut response = sse::stream_response(controller).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    if let Ok(value) = HeaderValue::from_str(client_id.as_str()) {
        headers.insert(CLIENT_ID_HEADER.clone(), value);
    }
    Ok(response)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use relay_core::{
        AssistantId, AssistantSpec, Engine, EngineEvent, EngineId, EventSink, ProviderError,
        SessionHandle, SessionLimits, ToolOutput,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt as _;

    struct FakeEngine {
        events: Vec<EngineEvent>,
        fail_run: bool,
    }

    #[async_trait::async_trait]
    impl Engine for FakeEngine {
        fn id(&self) -> EngineId {
            EngineId::new("fake")
        }

        async fn create_assistant(
            &self,
            _spec: &AssistantSpec,
        ) -> Result<AssistantId, ProviderError> {
            Ok(AssistantId::new("asst_fake"))
        }

        async fn create_session(
            &self,
            client_id: &ClientId,
        ) -> Result<SessionHandle, ProviderError> {
            Ok(SessionHandle::new(
                client_id.clone(),
                format!("thread-{client_id}"),
            ))
        }

        async fn add_user_message(
            &self,
            _session: &SessionHandle,
            _prompt: &str,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn stream_run(
            &self,
            _session: &SessionHandle,
            _assistant: &AssistantId,
            _instructions: Option<&str>,
            sink: &dyn EventSink,
        ) -> Result<(), ProviderError> {
            for event in &self.events {
                sink.emit(event.clone());
            }
            if self.fail_run {
                return Err(ProviderError::provider("fake", "run failed: server_error", None));
            }
            Ok(())
        }
    }

    fn math_tutor_events() -> Vec<EngineEvent> {
        vec![
            EngineEvent::ToolCallCreated {
                kind: "code_interpreter".into(),
            },
            EngineEvent::ToolCallDelta {
                kind: "code_interpreter".into(),
                outputs: vec![ToolOutput::Logs { logs: "4".into() }],
            },
            EngineEvent::TextCreated,
            EngineEvent::TextDelta {
                value: "2 + 2 = 4".into(),
            },
        ]
    }

    fn router_with(engine: FakeEngine, root_path: &str) -> Router {
        let relay = Relay::builder()
            .engine(Arc::new(engine))
            .assistant(AssistantId::new("asst_fake"))
            .build()
            .expect("relay");
        create_router(relay, root_path)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn chat_stream_emits_frames_in_order_and_ends_with_done() {
        let router = router_with(
            FakeEngine {
                events: math_tutor_events(),
                fail_run: false,
            },
            "",
        );
        let response = router
            .oneshot(get_request(
                "/chat-stream?prompt=What%20is%202%2B2%3F&client_id=jane",
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[TRANSFER_ENCODING], "chunked");
        assert_eq!(headers[&CLIENT_ID_HEADER], "jane");
        assert!(
            headers["content-type"]
                .to_str()
                .expect("content type")
                .starts_with("text/event-stream")
        );

        let body = body_text(response).await;
        let tool = body.find("[Tool Call Created: code_interpreter]").expect("tool");
        let logs = body.find("data: 4\n").expect("logs");
        let role = body.find("data: assistant > ").expect("role marker");
        let text = body.find("data: 2 + 2 = 4").expect("text");
        let done = body.find("data: [DONE]").expect("done");
        assert!(tool < logs && logs < role && role < text && text < done);
        assert!(!body.contains("event: error"));
    }

    #[tokio::test]
    async fn engine_failure_streams_error_event_then_done() {
        let router = router_with(
            FakeEngine {
                events: vec![EngineEvent::TextCreated],
                fail_run: true,
            },
            "",
        );
        let response = router
            .oneshot(get_request("/chat-stream?prompt=hi&client_id=c1"))
            .await
            .expect("response");
        let body = body_text(response).await;
        let error = body.find("event: error").expect("error event");
        let done = body.find("data: [DONE]").expect("done");
        assert!(error < done);
        assert!(body.contains("server_error"));
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected() {
        let router = router_with(
            FakeEngine {
                events: Vec::new(),
                fail_run: false,
            },
            "",
        );
        let response = router
            .oneshot(get_request("/chat-stream?prompt=%20%20"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_text(response).await;
        assert!(body.contains("prompt must not be empty"));
    }

    #[tokio::test]
    async fn missing_client_id_gets_a_minted_one() {
        let router = router_with(
            FakeEngine {
                events: Vec::new(),
                fail_run: false,
            },
            "",
        );
        let response = router
            .oneshot(get_request("/chat-stream?prompt=hello"))
            .await
            .expect("response");
        let minted = response.headers()[&CLIENT_ID_HEADER]
            .to_str()
            .expect("header")
            .to_string();
        assert!(!minted.is_empty());
        let body = body_text(response).await;
        assert!(body.contains("data: [DONE]"));
    }

    #[tokio::test]
    async fn routes_are_mounted_under_root_path() {
        let router = router_with(
            FakeEngine {
                events: Vec::new(),
                fail_run: false,
            },
            "/api",
        );
        let response = router
            .clone()
            .oneshot(get_request("/api/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, r#"{"status":"ok"}"#);

        let response = router
            .oneshot(get_request("/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let router = router_with(
            FakeEngine {
                events: Vec::new(),
                fail_run: false,
            },
            "",
        );
        let request = Request::builder()
            .uri("/health")
            .header("origin", "https://example.com")
            .body(Body::empty())
            .expect("request");
        let response = router.oneshot(request).await.expect("response");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn anonymous_requests_keep_the_session_map_bounded() {
        let relay = Relay::builder()
            .engine(Arc::new(FakeEngine {
                events: Vec::new(),
                fail_run: false,
            }))
            .assistant(AssistantId::new("asst_fake"))
            .session_limits(SessionLimits::new(Duration::from_secs(3600), 4))
            .build()
            .expect("relay");
        let router = create_router(relay.clone(), "");

        for _ in 0..100 {
            let response = router
                .clone()
                .oneshot(get_request("/chat-stream?prompt=hi"))
                .await
                .expect("response");
            assert!(body_text(response).await.contains("data: [DONE]"));
        }
        assert_eq!(relay.sessions().len(), 4);
    }
}

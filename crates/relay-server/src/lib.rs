//! HTTP front end for the relay: configuration, logging, routes and SSE framing.

use std::sync::Arc;

use relay_core::vendors::openai::OpenAiEngine;
use relay_core::{Engine, Relay, RelayError};
use tracing::info;

pub mod config;
pub mod error;
pub mod observability;
pub mod routes;
pub mod sse;

use config::RelayConfig;

/// Provisions the configured assistant and wires it into a `Relay`.
pub async fn build_relay(config: &RelayConfig) -> Result<Relay, RelayError> {
    let engine = Arc::new(OpenAiEngine::new(config.openai_config())?);
    let spec = config.assistant_spec();
    let assistant = engine.create_assistant(&spec).await?;
    info!(
        event = "relay.assistant_ready",
        assistant_id = %assistant,
        name = %spec.name,
        model = %spec.model,
        "assistant provisioned"
    );
    Relay::builder()
        .engine(engine)
        .assistant(assistant)
        .options(config.relay_options())
        .build()
}

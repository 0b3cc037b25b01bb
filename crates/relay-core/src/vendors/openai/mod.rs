//! OpenAI Assistants engine and its client configuration.
//!
//! Vendor-specific wire handling lives here so the relay core stays
//! engine-agnostic.
mod config;
mod engine;
pub(crate) mod transport;

pub use config::OpenAiClientConfig;
pub use engine::OpenAiEngine;

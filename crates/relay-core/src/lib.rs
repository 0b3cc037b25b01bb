//! Streaming bridge between assistant runs and client push streams.
//!
//! An engine run fires callbacks on its own task; each callback becomes one or
//! more [`StreamItem`]s queued on a per-request channel, and a
//! [`StreamController`] drains that channel into wire [`Frame`]s. Every stream
//! ends with `[DONE]`, whether the run completed or failed.
//!
//! Vendor-specific engines are namespaced under `vendors::*`.
//!
//! # Usage (OpenAI)
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt as _;
//! use relay_core::prelude::*;
//! use relay_core::vendors::openai::OpenAiEngine;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RelayError> {
//! let engine = Arc::new(OpenAiEngine::from_env()?);
//! let assistant = engine
//!     .create_assistant(&AssistantSpec::new(
//!         "Math Tutor",
//!         "You are a personal math tutor. Write and run code to answer math questions.",
//!         "gpt-4o",
//!     ))
//!     .await?;
//!
//! let relay = Relay::builder().engine(engine).assistant(assistant).build()?;
//! let mut frames = relay
//!     .open_stream(&ClientId::new("demo"), "What is 2 + 2?")
//!     .await?
//!     .into_frames();
//! while let Some(frame) = frames.next().await {
//!     print!("{}", frame.data);
//! }
//! # Ok(())
//! # }
//! ```

/// Event adapter turning engine callbacks into stream items.
pub mod adapter;
/// Per-request ordered item channel.
pub mod channel;
/// Consumer loop that frames items for the client.
pub mod controller;
/// Engine contract implemented by vendor integrations.
pub mod engine;
/// Public error types.
pub mod errors;
/// Engine callback events.
pub mod event;
/// Stream items and their wire frames.
pub mod item;
/// Identifiers, assistant definition and relay options.
pub mod model;
/// Common imports for typical usage.
pub mod prelude;
/// Relay entry point and builder.
pub mod relay;
/// Run task and cancellation handle.
pub mod run;
/// Per-client sessions.
pub mod session;
/// Vendor-specific engines.
pub mod vendors;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{EventAdapter, EventSink, adapt};
pub use channel::{ItemReceiver, ItemSender, channel};
pub use controller::{ControllerState, StreamController};
pub use engine::Engine;
pub use errors::{ProviderError, RelayError, RunFailure};
pub use event::{EngineEvent, ImageOutput, ToolOutput};
pub use item::{DONE_TOKEN, Frame, ROLE_MARKER, StreamItem};
pub use model::{AssistantId, AssistantSpec, ClientId, EngineId, RelayOptions, SessionLimits};
pub use relay::{Relay, RelayBuilder};
pub use run::{AbortHandle, RunOutcome};
pub use session::{Session, SessionHandle, SessionStore};

//! Common imports for typical relay usage.
pub use crate::{
    AssistantId, AssistantSpec, ClientId, Engine, Frame, Relay, RelayBuilder, RelayError,
    RelayOptions, SessionLimits, StreamController, StreamItem,
};

//! Callback events a run fires while it executes.

use serde::{Deserialize, Serialize};

/// Incremental events an engine emits while a run is in progress.
///
/// This is the closed set of callbacks a run can fire; engines deliver them
/// in firing order to an [`EventSink`](crate::adapter::EventSink).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new assistant text block started.
    TextCreated,
    /// New text for the current block (only the delta).
    TextDelta { value: String },
    /// A tool invocation started.
    ToolCallCreated { kind: String },
    /// Incremental state of a tool invocation, with any new outputs.
    ToolCallDelta {
        kind: String,
        outputs: Vec<ToolOutput>,
    },
}

/// One output entry reported by a tool invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Console output of executed code.
    Logs { logs: String },
    /// A rendered artifact stored engine-side.
    Image {
        #[serde(default)]
        image: Option<ImageOutput>,
    },
    /// Any output kind the relay does not interpret.
    #[serde(other)]
    Unknown,
}

/// Reference to an image file produced by a tool invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutput {
    pub file_id: String,
}

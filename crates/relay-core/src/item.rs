//! Stream items queued for a client and their transport framing.

/// Prefix forwarded once at the start of every assistant text block.
pub const ROLE_MARKER: &str = "assistant > ";

/// Data carried by the final frame of every stream.
pub const DONE_TOKEN: &str = "[DONE]";

/// A discrete unit of output queued for delivery to one client.
///
/// Items are immutable once created and keep their enqueue order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamItem {
    /// Start of an assistant text block.
    RoleMarker { text: String },
    /// Newly produced text; never the cumulative block.
    TextFragment { text: String },
    /// A tool invocation began.
    ToolInvocationStarted { kind: String },
    /// One log line produced by a tool invocation.
    ToolOutputFragment { text: String },
    /// The run failed; the message is shown to the client.
    Error { message: String },
    /// Terminal marker; nothing is forwarded after it.
    Sentinel,
}

impl StreamItem {
    /// Returns the role marker item.
    pub fn role_marker() -> Self {
        Self::RoleMarker {
            text: ROLE_MARKER.to_string(),
        }
    }

    /// Returns true for the terminal sentinel.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Sentinel)
    }

    /// Short variant name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoleMarker { .. } => "role_marker",
            Self::TextFragment { .. } => "text_fragment",
            Self::ToolInvocationStarted { .. } => "tool_invocation_started",
            Self::ToolOutputFragment { .. } => "tool_output_fragment",
            Self::Error { .. } => "error",
            Self::Sentinel => "sentinel",
        }
    }

    /// Maps the item to exactly one transport frame.
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::RoleMarker { text }
            | Self::TextFragment { text }
            | Self::ToolOutputFragment { text } => Frame::data(text.clone()),
            Self::ToolInvocationStarted { kind } => {
                Frame::data(format!("\n[Tool Call Created: {kind}]\n"))
            }
            Self::Error { message } => Frame {
                event: Some(Frame::ERROR_EVENT),
                data: message.clone(),
            },
            Self::Sentinel => Frame::done(),
        }
    }
}

/// One server-sent event: an optional event name and a single data field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub event: Option<&'static str>,
    pub data: String,
}

impl Frame {
    /// Event name attached to error frames.
    pub const ERROR_EVENT: &'static str = "error";

    /// Creates an unnamed data frame.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// Creates the terminal `[DONE]` frame.
    pub fn done() -> Self {
        Self::data(DONE_TOKEN)
    }

    pub fn is_done(&self) -> bool {
        self.event.is_none() && self.data == DONE_TOKEN
    }

    pub fn is_error(&self) -> bool {
        self.event == Some(Self::ERROR_EVENT)
    }
}

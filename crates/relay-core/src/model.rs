use std::fmt;
use std::time::Duration;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Creates an id from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Stable identifier for an engine implementation (for example `openai`).
    EngineId
);

string_id!(
    /// Key of the per-client session map.
    ClientId
);

string_id!(
    /// Engine-side identifier of a provisioned assistant.
    AssistantId
);

impl ClientId {
    /// Mints a fresh random client id for callers that did not supply one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Assistant definition provisioned once at startup.
///
/// Every run streams against this fixed assistant/model configuration.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
    /// Tool types enabled for the assistant (for example `code_interpreter`).
    pub tools: Vec<String>,
}

impl AssistantSpec {
    /// Creates a spec with the code interpreter tool enabled.
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: model.into(),
            tools: vec!["code_interpreter".to_string()],
        }
    }

    /// Replaces the enabled tool types.
    pub fn tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }
}

/// Behavior shared by every stream a `Relay` opens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayOptions {
    /// Per-run instructions layered on top of the assistant's own.
    pub run_instructions: Option<String>,
    /// Abort the engine run when the client disconnects.
    ///
    /// Off by default: the run is left to finish so the conversation is not
    /// left with a dangling turn.
    pub cancel_on_disconnect: bool,
    /// Bounds on how many client sessions are remembered.
    pub sessions: SessionLimits,
}

/// Bounds on the per-client session map.
///
/// Only sessions no request is using are ever forgotten.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    /// Sessions unused for longer than this are forgotten.
    pub idle_ttl: Duration,
    /// Most sessions kept at once; the least recently used go first.
    pub max_sessions: usize,
}

impl SessionLimits {
    pub fn new(idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            idle_ttl,
            max_sessions,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60), 10_000)
    }
}

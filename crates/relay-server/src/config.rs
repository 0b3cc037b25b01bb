use std::time::Duration;

use clap::Parser;
use relay_core::vendors::openai::OpenAiClientConfig;
use relay_core::{AssistantSpec, RelayOptions, SessionLimits};

const DEFAULT_ASSISTANT_INSTRUCTIONS: &str =
    "You are a personal math tutor. Write and run code to answer math questions.";

/// Server configuration, read from flags with environment fallbacks.
#[derive(Clone, Debug, Parser)]
#[command(name = "relay-server", version, about = "Streams assistant runs to clients over SSE")]
pub struct RelayConfig {
    /// Interface to bind.
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "RELAY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Path prefix every route is mounted under (for reverse proxies).
    #[arg(long, env = "RELAY_ROOT_PATH", default_value = "")]
    pub root_path: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub openai_base_url: String,

    #[arg(long, env = "RELAY_MODEL", default_value = "gpt-4o")]
    pub model: String,

    #[arg(long, env = "RELAY_ASSISTANT_NAME", default_value = "Math Tutor")]
    pub assistant_name: String,

    #[arg(
        long,
        env = "RELAY_ASSISTANT_INSTRUCTIONS",
        default_value = DEFAULT_ASSISTANT_INSTRUCTIONS
    )]
    pub assistant_instructions: String,

    /// Extra instructions applied to every run.
    #[arg(long, env = "RELAY_RUN_INSTRUCTIONS")]
    pub run_instructions: Option<String>,

    /// Timeout for engine HTTP requests, including streamed runs.
    #[arg(long, env = "RELAY_REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    pub request_timeout_secs: u64,

    /// Abort the engine run when the client disconnects mid-stream.
    #[arg(long, env = "RELAY_CANCEL_ON_DISCONNECT")]
    pub cancel_on_disconnect: bool,

    /// Forget (and delete) client sessions unused for this long.
    #[arg(long, env = "RELAY_SESSION_IDLE_TTL_SECS", default_value_t = 3600)]
    pub session_idle_ttl_secs: u64,

    /// Most client sessions remembered at once.
    #[arg(
        long,
        env = "RELAY_MAX_SESSIONS",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub max_sessions: u64,
}

impl RelayConfig {
    /// Loads `.env` (if present) and parses flags and environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Root path as a router prefix: empty, or `/segment` without a trailing slash.
    pub fn root_prefix(&self) -> String {
        let trimmed = self.root_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    pub fn assistant_spec(&self) -> AssistantSpec {
        AssistantSpec::new(
            self.assistant_name.clone(),
            self.assistant_instructions.clone(),
            self.model.clone(),
        )
    }

    pub fn openai_config(&self) -> OpenAiClientConfig {
        OpenAiClientConfig::new(self.openai_api_key.clone())
            .base_url(self.openai_base_url.clone())
            .timeout(Duration::from_secs(self.request_timeout_secs))
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            run_instructions: self
                .run_instructions
                .clone()
                .filter(|s| !s.trim().is_empty()),
            cancel_on_disconnect: self.cancel_on_disconnect,
            sessions: SessionLimits::new(
                Duration::from_secs(self.session_idle_ttl_secs),
                usize::try_from(self.max_sessions).unwrap_or(usize::MAX),
            ),
        }
    }
}

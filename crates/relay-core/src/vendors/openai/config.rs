use std::time::Duration;

use crate::errors::RelayError;

/// Configuration for the OpenAI Assistants engine client.
#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL for the OpenAI-compatible endpoint.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// HTTP timeout applied to every request, including streamed runs.
    pub timeout: Duration,
}

impl OpenAiClientConfig {
    /// Creates a config with default base URL and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Builds a config from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, RelayError> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(RelayError::Config(
                "missing OPENAI_API_KEY for OpenAI engine".into(),
            ));
        }
        Ok(Self::new(api_key))
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_root(&self) -> String {
        format!("{}/v1", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn assistants_url(&self) -> String {
        format!("{}/assistants", self.api_root())
    }

    pub(crate) fn threads_url(&self) -> String {
        format!("{}/threads", self.api_root())
    }

    pub(crate) fn thread_url(&self, thread_id: &str) -> String {
        format!("{}/threads/{thread_id}", self.api_root())
    }

    pub(crate) fn messages_url(&self, thread_id: &str) -> String {
        format!("{}/threads/{thread_id}/messages", self.api_root())
    }

    pub(crate) fn runs_url(&self, thread_id: &str) -> String {
        format!("{}/threads/{thread_id}/runs", self.api_root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_ignore_trailing_slash_on_base() {
        let config = OpenAiClientConfig::new("sk-test").base_url("http://localhost:9999/");
        assert_eq!(config.assistants_url(), "http://localhost:9999/v1/assistants");
        assert_eq!(config.threads_url(), "http://localhost:9999/v1/threads");
        assert_eq!(
            config.thread_url("thread_1"),
            "http://localhost:9999/v1/threads/thread_1"
        );
        assert_eq!(
            config.messages_url("thread_1"),
            "http://localhost:9999/v1/threads/thread_1/messages"
        );
        assert_eq!(
            config.runs_url("thread_1"),
            "http://localhost:9999/v1/threads/thread_1/runs"
        );
    }
}

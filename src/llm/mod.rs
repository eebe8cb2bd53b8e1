pub mod error;
pub mod ndjson;
pub mod ollama;
pub mod transport;

use std::time::Duration;
use url::Url;

use self::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Maximum wait for the initial response and for each streamed chunk.
    /// `None` waits forever.
    pub inactivity_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            inactivity_timeout: Some(DEFAULT_INACTIVITY_TIMEOUT),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Checks the base URL and returns it without a trailing slash.
    pub fn normalized_base_url(&self) -> Result<String, ClientError> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL '{}': {}", self.base_url, e)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported URL scheme '{}' in '{}'",
                    other, self.base_url
                )));
            }
        }
        Ok(self.base_url.trim_end_matches('/').to_string())
    }
}

/// Converts a seconds setting into an optional duration, 0 meaning "no limit".
pub fn secs_to_timeout(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

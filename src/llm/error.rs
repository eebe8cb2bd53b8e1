use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single HTTP exchange with the daemon.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: StatusCode,
        body: String,
    },
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Http(e) => e.status(),
            TransportError::Status { status, .. } => Some(*status),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to Ollama at {base_url}: {source}")]
    Connection {
        base_url: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to pull model '{model}': {source}")]
    Pull {
        model: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to get response from '{model}': {source}")]
    Chat {
        model: String,
        #[source]
        source: TransportError,
    },

    #[error("Stream read error: {0}")]
    Stream(#[source] TransportError),

    #[error("No data received from Ollama for {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Another request is already in flight on this client")]
    Busy,

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// True for failures raised before any streamed data was consumed.
    pub fn is_initiation_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Connection { .. } | ClientError::Pull { .. } | ClientError::Chat { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_reports_code_and_body() {
        let err = TransportError::Status {
            status: StatusCode::NOT_FOUND,
            body: "model 'foo' not found".into(),
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.to_string(), "HTTP 404 Not Found: model 'foo' not found");
    }

    #[test]
    fn pull_error_names_model() {
        let err = ClientError::Pull {
            model: "llama3".into(),
            source: TransportError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: String::new(),
            },
        };
        assert!(err.to_string().starts_with("Failed to pull model 'llama3'"));
        assert!(err.is_initiation_failure());
    }

    #[test]
    fn mid_stream_failures_are_not_initiation_failures() {
        assert!(!ClientError::Cancelled.is_initiation_failure());
        assert!(!ClientError::Timeout(Duration::from_secs(1)).is_initiation_failure());
        assert!(!ClientError::Busy.is_initiation_failure());
    }
}

use log::{ info, warn };
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm::error::ClientError;
use crate::llm::ollama::OllamaClient;
use crate::models::chat::{ ChatMessage, Conversation };

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No model loaded")]
    NoModelLoaded,

    #[error("Message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// The caller-owned state of one chat: the loaded model and its history.
///
/// The history records a user turn before the request goes out and the
/// assistant turn only once its reply has streamed in completely.
#[derive(Debug, Default)]
pub struct ChatSession {
    current_model: Option<String>,
    history: Conversation,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_model(&self) -> Option<&str> {
        self.current_model.as_deref()
    }

    pub fn history(&self) -> &Conversation {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Pulls `name` and makes it the current model, starting a fresh history.
    /// On failure the previous model and history are left untouched.
    pub async fn load_model<F>(
        &mut self,
        client: &OllamaClient,
        name: &str,
        cancel: &CancellationToken,
        on_progress: F
    ) -> Result<(), SessionError>
        where F: FnMut(&str)
    {
        client.pull_model(name, cancel, on_progress).await?;
        info!("Model {} loaded", name);
        self.current_model = Some(name.to_string());
        self.history.clear();
        Ok(())
    }

    /// Sends one user turn and returns the assistant's complete reply.
    pub async fn send<F>(
        &mut self,
        client: &OllamaClient,
        text: &str,
        cancel: &CancellationToken,
        on_delta: F
    ) -> Result<String, SessionError>
        where F: FnMut(&str)
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let model = self.current_model.clone().ok_or(SessionError::NoModelLoaded)?;

        self.history.push(ChatMessage::user(text));
        match client.chat(&model, self.history.messages(), cancel, on_delta).await {
            Ok(reply) => {
                self.history.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                warn!("Chat with {} failed: {}", model, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_model_issues_no_request() {
        // Nothing listens on port 9; any request would fail with a connection error.
        let client = OllamaClient::new(Some("http://127.0.0.1:9".into()));
        let mut session = ChatSession::new();
        let mut calls = 0;
        let result = session.send(&client, "hello", &CancellationToken::new(), |_| calls += 1).await;
        assert!(matches!(result, Err(SessionError::NoModelLoaded)));
        assert_eq!(calls, 0);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_model_check() {
        let client = OllamaClient::new(None);
        let mut session = ChatSession::new();
        let result = session.send(&client, "   \n", &CancellationToken::new(), |_| {}).await;
        assert!(matches!(result, Err(SessionError::EmptyMessage)));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_state() {
        let client = OllamaClient::new(Some("http://127.0.0.1:9".into()));
        let mut session = ChatSession::new();
        let result = session.load_model(&client, "llama3", &CancellationToken::new(), |_| {}).await;
        assert!(matches!(result, Err(SessionError::Client(ClientError::Pull { .. }))));
        assert_eq!(session.current_model(), None);
    }
}

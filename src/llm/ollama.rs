use bytes::Bytes;
use futures::{ Future, Stream, StreamExt };
use log::{ debug, info };
use serde_json::Value;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::ClientError;
use super::ndjson::decode_stream;
use super::transport::{ ByteStream, HttpTransport };
use super::ClientConfig;
use crate::models::chat::ChatMessage;
use crate::models::ollama::{
    resolve_model,
    ChatRequest,
    ChatStreamChunk,
    ModelInfo,
    PullProgress,
    PullRequest,
    TagsResponse,
};

const TAGS_ROUTE: &str = "/api/tags";
const PULL_ROUTE: &str = "/api/pull";
const CHAT_ROUTE: &str = "/api/chat";

/// Client for a local Ollama daemon.
///
/// One instance runs at most one request at a time; starting a second while
/// the first is still requesting or streaming fails with [`ClientError::Busy`].
/// Use separate instances for concurrent work.
#[derive(Debug)]
pub struct OllamaClient {
    transport: HttpTransport,
    inactivity_timeout: Option<Duration>,
    in_flight: Arc<AtomicBool>,
}

/// Marks the client busy until dropped.
#[derive(Debug)]
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, ClientError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::Busy)?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let url = base_url.unwrap_or_else(|| super::DEFAULT_BASE_URL.into());
        Self {
            transport: HttpTransport::new(url),
            inactivity_timeout: Some(super::DEFAULT_INACTIVITY_TIMEOUT),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            transport: HttpTransport::from_config(config)?,
            inactivity_timeout: config.inactivity_timeout,
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let tags = with_timeout(
            self.inactivity_timeout,
            self.transport.get_json::<TagsResponse>(TAGS_ROUTE)
        ).await?.map_err(|source| ClientError::Connection {
            base_url: self.base_url().to_string(),
            source,
        })?;
        info!("Connected to Ollama at {}, found {} models", self.base_url(), tags.models.len());
        Ok(tags.models)
    }

    /// Lists installed models and resolves a display name against them.
    pub async fn resolve_model(&self, display_name: &str) -> Result<Option<String>, ClientError> {
        let models = self.list_models().await?;
        Ok(resolve_model(&models, display_name).map(|m| m.name.clone()))
    }

    /// Starts a pull and returns its status lines as a lazy stream.
    pub async fn pull_stream(
        &self,
        name: &str,
        cancel: CancellationToken
    ) -> Result<impl Stream<Item = Result<PullProgress, ClientError>> + Send + 'static, ClientError> {
        let guard = InFlight::acquire(&self.in_flight)?;
        info!("Pulling model {}", name);
        let body = guarded(
            &cancel,
            self.inactivity_timeout,
            self.transport.post_stream(PULL_ROUTE, &PullRequest { name })
        ).await?.map_err(|source| ClientError::Pull {
            model: name.to_string(),
            source,
        })?;

        let values = decode_stream(guard_chunks(body, cancel, self.inactivity_timeout));
        Ok(
            async_stream::stream! {
                let _guard = guard;
                let mut values = std::pin::pin!(values);
                while let Some(item) = values.next().await {
                    match item {
                        Ok(value) => {
                            if let Some(progress) = progress_from(&value) {
                                yield Ok(progress);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        )
    }

    /// Pulls a model, calling `on_progress` with each status in arrival order.
    pub async fn pull_model<F>(
        &self,
        name: &str,
        cancel: &CancellationToken,
        mut on_progress: F
    ) -> Result<(), ClientError>
        where F: FnMut(&str)
    {
        let events = self.pull_stream(name, cancel.clone()).await?;
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            let progress = event?;
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            on_progress(&progress.status);
        }
        info!("Pull of {} finished", name);
        Ok(())
    }

    /// Starts a chat turn and returns the cumulative response text as a lazy
    /// stream: every item is the whole reply received so far.
    pub async fn chat_stream(
        &self,
        model: &str,
        history: &[ChatMessage],
        cancel: CancellationToken
    ) -> Result<impl Stream<Item = Result<String, ClientError>> + Send + 'static, ClientError> {
        let guard = InFlight::acquire(&self.in_flight)?;
        let request = ChatRequest {
            model,
            messages: history,
            stream: true,
        };
        debug!("Sending chat with {} messages to {}", history.len(), model);
        let body = guarded(
            &cancel,
            self.inactivity_timeout,
            self.transport.post_stream(CHAT_ROUTE, &request)
        ).await?.map_err(|source| ClientError::Chat {
            model: model.to_string(),
            source,
        })?;

        let values = decode_stream(guard_chunks(body, cancel, self.inactivity_timeout));
        Ok(
            async_stream::stream! {
                let _guard = guard;
                let mut values = std::pin::pin!(values);
                let mut accumulated = String::new();
                while let Some(item) = values.next().await {
                    match item {
                        Ok(value) => {
                            let chunk = match serde_json::from_value::<ChatStreamChunk>(value) {
                                Ok(chunk) => chunk,
                                Err(e) => {
                                    debug!("Skipping unexpected chat chunk: {}", e);
                                    continue;
                                }
                            };
                            if let Some(delta) = chunk.delta() {
                                accumulated.push_str(delta);
                                yield Ok(accumulated.clone());
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        )
    }

    /// Sends one chat turn. `on_delta` receives the cumulative reply after
    /// every content chunk; the full reply is returned once the stream ends.
    pub async fn chat<F>(
        &self,
        model: &str,
        history: &[ChatMessage],
        cancel: &CancellationToken,
        mut on_delta: F
    ) -> Result<String, ClientError>
        where F: FnMut(&str)
    {
        let replies = self.chat_stream(model, history, cancel.clone()).await?;
        let mut replies = std::pin::pin!(replies);
        let mut response = String::new();
        while let Some(reply) = replies.next().await {
            response = reply?;
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            on_delta(&response);
        }
        Ok(response)
    }
}

fn progress_from(value: &Value) -> Option<PullProgress> {
    let status = value.get("status")?.as_str()?;
    Some(PullProgress {
        status: status.to_string(),
        digest: value.get("digest").and_then(Value::as_str).map(str::to_string),
        total: value.get("total").and_then(Value::as_u64),
        completed: value.get("completed").and_then(Value::as_u64),
    })
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = T>
) -> Result<T, ClientError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| ClientError::Timeout(limit)),
        None => Ok(fut.await),
    }
}

/// Awaits `fut` unless the token fires or the inactivity limit passes first.
async fn guarded<T>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    fut: impl Future<Output = T>
) -> Result<T, ClientError> {
    if cancel.is_cancelled() {
        return Err(ClientError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        result = with_timeout(limit, fut) => result,
    }
}

/// Applies cancellation and the inactivity limit to every chunk read.
fn guard_chunks(
    mut body: ByteStream,
    cancel: CancellationToken,
    limit: Option<Duration>
) -> impl Stream<Item = Result<Bytes, ClientError>> + Send {
    async_stream::stream! {
        loop {
            match guarded(&cancel, limit, body.next()).await {
                Ok(Some(Ok(chunk))) => yield Ok(chunk),
                Ok(Some(Err(e))) => {
                    yield Err(ClientError::Stream(e));
                    return;
                }
                Ok(None) => return,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    }
}

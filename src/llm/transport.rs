use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::debug;
use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::pin::Pin;

use super::error::{ClientError, TransportError};
use super::ClientConfig;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Thin HTTP layer bound to one daemon base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.normalized_base_url()?;
        let mut builder = HttpClient::builder();
        if let Some(connect) = config.connect_timeout {
            builder = builder.connect_timeout(connect);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, route: &str) -> Result<T, TransportError> {
        let url = self.url(route);
        debug!("GET {}", url);
        let resp = check_status(self.http.get(&url).send().await?).await?;
        Ok(resp.json::<T>().await?)
    }

    /// POSTs a JSON body and hands back the response body as raw chunks.
    /// Non-success statuses are reported before any chunk is read.
    pub async fn post_stream<B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<ByteStream, TransportError> {
        let url = self.url(route);
        debug!("POST {} (streaming)", url);
        let resp = check_status(self.http.post(&url).json(body).send().await?).await?;
        Ok(Box::pin(resp.bytes_stream().map(|chunk| chunk.map_err(TransportError::from))))
    }
}

async fn check_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TransportError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_route_without_double_slash() {
        let transport = HttpTransport::new("http://localhost:11434/");
        assert_eq!(transport.url("/api/tags"), "http://localhost:11434/api/tags");
    }

    #[test]
    fn from_config_rejects_bad_url() {
        let config = ClientConfig::new("localhost");
        assert!(HttpTransport::from_config(&config).is_err());
    }
}

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use super::request::{GetRequest, HttpResponse};
use crate::error::{HttpError, TransportError};
use crate::settings::HttpSettings;

/// One network attempt. Retry policy lives above this, in `HttpClient`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &GetRequest) -> Result<HttpResponse, TransportError>;
}

/// Connection-pooled reqwest client shared by every worker.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self, HttpError> {
        if settings.accept_invalid_certs {
            warn!("TLS certificate validation is disabled for this run");
        }

        let client = Client::builder()
            .timeout(settings.timeout())
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &GetRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;

        Ok(HttpResponse::new(status, body))
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_builder() {
        TransportError::Fatal(err.to_string())
    } else if err.is_timeout() {
        TransportError::Retryable(format!("timed out: {}", err))
    } else if err.is_connect() {
        TransportError::Retryable(format!("connection failed: {}", err))
    } else {
        TransportError::Retryable(err.to_string())
    }
}

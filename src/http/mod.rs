//! Retrying HTTP client shared by catalog discovery and fetch workers.

mod request;
mod requester;
mod transport;
mod user_agent;

pub use request::{GetRequest, HttpResponse};
pub use requester::Requester;
pub use transport::{ReqwestTransport, Transport};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{HttpError, TransportError};
use crate::settings::HttpSettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub retry_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn retries_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before retry number `retry` (1-based):
    /// `base * multiplier^(retry - 1)`, capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        let cap = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Explicitly constructed, cloneable handle over one connection pool.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn from_settings(settings: &HttpSettings) -> Result<Self, HttpError> {
        let transport = ReqwestTransport::new(settings)?;
        Ok(Self::new(Arc::new(transport), settings.retry_policy()))
    }

    /// GET with automatic retry on transport failures and retryable statuses.
    /// Any other status comes back as an ordinary response.
    pub async fn get(&self, request: &GetRequest) -> Result<HttpResponse, HttpError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let reason = match self.transport.send(request).await {
                Ok(mut response) if !self.policy.retries_status(response.status) => {
                    response.attempts = attempt;
                    return Ok(response);
                }
                Ok(response) => format!("HTTP {}", response.status),
                Err(TransportError::Fatal(reason)) => {
                    return Err(HttpError::Fatal {
                        url: request.url.clone(),
                        reason,
                    });
                }
                Err(TransportError::Retryable(reason)) => reason,
            };

            if attempt >= max_attempts {
                debug!(url = %request.url, attempts = attempt, "retries exhausted");
                return Err(HttpError::Transient {
                    url: request.url.clone(),
                    attempts: attempt,
                    reason,
                });
            }

            let backoff = self.policy.backoff(attempt);
            warn!(
                url = %request.url,
                attempt,
                max_attempts,
                reason = %reason,
                "request failed, backing off {:.1}s",
                backoff.as_secs_f64()
            );
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{instant_policy, ok, status, MockTransport};

    #[tokio::test]
    async fn recovers_after_two_503s() {
        let mock = MockTransport::new(|_, n| if n < 2 { status(503) } else { ok("done") });
        let client = HttpClient::new(mock.clone(), instant_policy(3));

        let response = client.get(&GetRequest::new("http://carrier.test/a")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "done");
        assert_eq!(response.attempts, 3);
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_500_is_transient_error() {
        let mock = MockTransport::new(|_, _| status(500));
        let client = HttpClient::new(mock.clone(), instant_policy(3));

        let err = client.get(&GetRequest::new("http://carrier.test/b")).await.unwrap_err();
        match err {
            HttpError::Transient { attempts, reason, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(reason, "HTTP 500");
            }
            other => panic!("expected transient error, got {other:?}"),
        }
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn connection_errors_are_retried() {
        let mock = MockTransport::new(|_, n| {
            if n == 0 {
                Err(TransportError::Retryable("connection reset".into()))
            } else {
                ok("[]")
            }
        });
        let client = HttpClient::new(mock.clone(), instant_policy(2));

        let response = client.get(&GetRequest::new("http://carrier.test/c")).await.unwrap();
        assert_eq!(response.attempts, 2);
    }

    #[tokio::test]
    async fn non_retryable_status_returns_immediately() {
        let mock = MockTransport::new(|_, _| status(404));
        let client = HttpClient::new(mock.clone(), instant_policy(5));

        let response = client.get(&GetRequest::new("http://carrier.test/d")).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn fatal_transport_error_is_not_retried() {
        let mock = MockTransport::new(|_, _| Err(TransportError::Fatal("bad url".into())));
        let client = HttpClient::new(mock.clone(), instant_policy(5));

        let err = client.get(&GetRequest::new("::")).await.unwrap_err();
        assert!(matches!(err, HttpError::Fatal { .. }));
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn backoff_grows_then_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3),
            retry_statuses: vec![503],
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4), Duration::from_secs(3));
        assert_eq!(policy.backoff(60), Duration::from_secs(3));
    }
}

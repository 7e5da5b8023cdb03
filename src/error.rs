use thiserror::Error;

/// Failure of a single transport attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Timeouts, refused connections, truncated bodies.
    #[error("{0}")]
    Retryable(String),
    #[error("{0}")]
    Fatal(String),
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("gave up on {url} after {attempts} attempt(s): {reason}")]
    Transient {
        url: String,
        attempts: u32,
        reason: String,
    },
    #[error("request to {url} failed: {reason}")]
    Fatal { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field `{0}` is not an array")]
    NotArray(String),
}

/// Everything that can go wrong inside one fetch task. Never escapes the
/// task boundary: the scheduler turns it into an empty contribution.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl FetchError {
    /// Short failure category for run summaries. The full message goes to
    /// the log.
    pub fn label(&self) -> String {
        match self {
            FetchError::Http(HttpError::Transient { .. }) => "retries exhausted".into(),
            FetchError::Http(HttpError::Fatal { .. }) => "request error".into(),
            FetchError::Http(HttpError::Build(_)) => "client setup".into(),
            FetchError::Status { status, .. } => format!("HTTP {status}"),
            FetchError::Extract(_) => "malformed payload".into(),
        }
    }
}

/// Errors that abort a run before any task is scheduled.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("catalog request failed: {0}")]
    CatalogHttp(#[from] HttpError),
    #[error("catalog request to {url} returned status {status}")]
    CatalogStatus { url: String, status: u16 },
    #[error("catalog payload from {url} is malformed: {source}")]
    CatalogPayload {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no plans discovered for {0}")]
    EmptyCatalog(&'static str),
    #[error("session unavailable: {0}")]
    Session(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_group_by_cause_not_url() {
        let a = FetchError::Status { url: "https://a/1".into(), status: 403 };
        let b = FetchError::Status { url: "https://a/2".into(), status: 403 };
        assert_eq!(a.label(), "HTTP 403");
        assert_eq!(a.label(), b.label());

        let gave_up = FetchError::Http(HttpError::Transient {
            url: "https://a/1".into(),
            attempts: 4,
            reason: "connection reset".into(),
        });
        assert_eq!(gave_up.label(), "retries exhausted");
        assert!(gave_up.to_string().contains("connection reset"));

        let bad = FetchError::Extract(ExtractError::NotArray("items".into()));
        assert_eq!(bad.label(), "malformed payload");
    }
}

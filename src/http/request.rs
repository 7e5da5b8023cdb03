use std::time::Duration;

use chrono::Utc;

pub const CACHE_BUSTER_PARAM: &str = "_";

/// A GET request as handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Overrides the client-wide timeout for this call only.
    pub timeout: Option<Duration>,
}

impl GetRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add `_=<epoch millis>` so intermediaries never serve a cached page.
    pub fn cache_busted(self) -> Self {
        let now = Utc::now().timestamp_millis();
        self.query(CACHE_BUSTER_PARAM, now.to_string())
    }

    #[cfg(test)]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[cfg(test)]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Transport attempts spent, including the one that produced this response.
    pub attempts: u32,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            attempts: 1,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

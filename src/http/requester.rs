use std::sync::Arc;

use super::request::{GetRequest, HttpResponse};
use super::user_agent::pick_user_agent;
use super::HttpClient;
use crate::error::HttpError;
use crate::random::{jitter, RandomSource};
use crate::session::Session;
use crate::settings::DelayWindow;

/// `HttpClient` bound to one carrier's headers and one browser session.
///
/// Every call gets a freshly drawn User-Agent, the carrier's Referer and
/// Accept, the session cookies and a cache-busting timestamp.
#[derive(Clone)]
pub struct Requester {
    client: HttpClient,
    session: Arc<Session>,
    random: Arc<dyn RandomSource>,
    referer: String,
    accept: String,
}

impl Requester {
    pub fn new(
        client: HttpClient,
        session: Arc<Session>,
        random: Arc<dyn RandomSource>,
        referer: impl Into<String>,
        accept: impl Into<String>,
    ) -> Self {
        Self {
            client,
            session,
            random,
            referer: referer.into(),
            accept: accept.into(),
        }
    }

    pub fn decorate(&self, request: GetRequest) -> GetRequest {
        let mut request = request
            .cache_busted()
            .header("User-Agent", pick_user_agent(self.random.as_ref()))
            .header("Referer", &self.referer)
            .header("Accept", &self.accept);
        if let Some(cookie) = self.session.cookie_header() {
            request = request.header("Cookie", cookie);
        }
        request
    }

    pub async fn get(&self, request: GetRequest) -> Result<HttpResponse, HttpError> {
        let request = self.decorate(request);
        self.client.get(&request).await
    }

    /// Randomized courtesy delay drawn from `window`.
    pub async fn pause(&self, window: DelayWindow) {
        let delay = jitter(self.random.as_ref(), window);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

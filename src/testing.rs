//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::carriers::Carrier;
use crate::error::{SetupError, TransportError};
use crate::extract::Extractor;
use crate::http::{GetRequest, HttpResponse, Requester, RetryPolicy, Transport};
use crate::model::{CatalogEntry, Code, FetchTask};
use crate::normalize::{FieldMap, Normalizer, SingleTerm};
use crate::settings::{DelayWindow, PacingSettings};

type Handler = dyn Fn(&GetRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Scripted transport: the handler sees every request plus its 0-based call
/// number, and every request is recorded for later inspection.
pub struct MockTransport {
    handler: Box<Handler>,
    calls: AtomicUsize,
    seen: Mutex<Vec<GetRequest>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&GetRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GetRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &GetRequest) -> Result<HttpResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        (self.handler)(request, n)
    }
}

pub fn ok(body: impl Into<String>) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(200, body))
}

pub fn status(code: u16) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(code, ""))
}

/// Default retry statuses, no sleeping.
pub fn instant_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        multiplier: 2.0,
        max_delay: Duration::ZERO,
        retry_statuses: vec![429, 500, 502, 503, 504],
    }
}

pub fn quiet_pacing() -> PacingSettings {
    PacingSettings {
        request: DelayWindow::ZERO,
        page: DelayWindow::ZERO,
        catalog: DelayWindow::ZERO,
    }
}

pub const FAKE_BASE: &str = "http://carrier.test";

/// Paginated JSON carrier with a fixed catalog: subsidy pages are
/// `{"items": [...], "total": N}` at `/subsidy`.
pub struct FakeCarrier {
    pub plans: Vec<CatalogEntry>,
    pub subscriptions: Vec<Code>,
    pub terms: Vec<Code>,
    pub page_size: Option<u32>,
    pub needs_session: bool,
    pub extractor: Extractor,
    pub normalizer: Box<dyn Normalizer>,
}

impl Default for FakeCarrier {
    fn default() -> Self {
        Self {
            plans: vec![CatalogEntry::new("P1", "plan one", "5G")],
            subscriptions: vec![Code::new("1", "기기변경")],
            terms: vec![Code::new("24", "24개월")],
            page_size: Some(10),
            needs_session: false,
            extractor: Extractor::json("items", Some("total")),
            normalizer: Box::new(SingleTerm {
                fields: FieldMap {
                    model_name: Some("model"),
                    total_subsidy: Some("subsidy"),
                    ..Default::default()
                },
            }),
        }
    }
}

#[async_trait]
impl Carrier for FakeCarrier {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn subscription_types(&self) -> Vec<Code> {
        self.subscriptions.clone()
    }

    fn terms(&self) -> Vec<Code> {
        self.terms.clone()
    }

    fn referer(&self) -> String {
        format!("{FAKE_BASE}/")
    }

    fn requires_session(&self) -> bool {
        self.needs_session
    }

    fn subsidy_request(&self, task: &FetchTask, page: u32) -> GetRequest {
        GetRequest::new(format!("{FAKE_BASE}/subsidy"))
            .query("plan", task.entry.id.as_str())
            .query("sub", task.subscription.code.as_str())
            .query("term", task.term.code.as_str())
            .query("pageNo", page.to_string())
    }

    fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    fn normalizer(&self) -> &dyn Normalizer {
        self.normalizer.as_ref()
    }

    async fn catalog(
        &self,
        _requester: &Requester,
        _pacing: &PacingSettings,
    ) -> Result<Vec<CatalogEntry>, SetupError> {
        Ok(self.plans.clone())
    }
}

pub fn fake_task(plan: &str) -> FetchTask {
    FetchTask {
        entry: Arc::new(CatalogEntry::new(plan, format!("plan {plan}"), "5G")),
        subscription: Code::new("1", "기기변경"),
        term: Code::new("24", "24개월"),
    }
}

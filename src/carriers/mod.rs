pub mod lguplus;
pub mod skt;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::SetupError;
use crate::extract::Extractor;
use crate::http::{GetRequest, Requester};
use crate::model::{CatalogEntry, Code, FetchTask};
use crate::normalize::Normalizer;
use crate::settings::PacingSettings;

pub use lguplus::LgUplus;
pub use skt::Skt;

/// Everything the pipeline needs to know about one carrier backend: how to
/// discover its plans, how to ask for subsidies, and how to read the answer.
#[async_trait]
pub trait Carrier: Send + Sync {
    /// Short name used in logs, file names and the database.
    fn name(&self) -> &'static str;

    fn subscription_types(&self) -> Vec<Code>;

    fn terms(&self) -> Vec<Code>;

    fn referer(&self) -> String;

    fn accept(&self) -> &'static str {
        "application/json, text/plain, */*"
    }

    /// Whether requests only succeed with browser-derived cookies.
    fn requires_session(&self) -> bool {
        false
    }

    /// Request for one page (1-based) of one task, without pacing headers.
    fn subsidy_request(&self, task: &FetchTask, page: u32) -> GetRequest;

    /// Items per page when the backend paginates.
    fn page_size(&self) -> Option<u32> {
        None
    }

    fn extractor(&self) -> &Extractor;

    fn normalizer(&self) -> &dyn Normalizer;

    async fn catalog(
        &self,
        requester: &Requester,
        pacing: &PacingSettings,
    ) -> Result<Vec<CatalogEntry>, SetupError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CarrierKind {
    Skt,
    Lguplus,
}

impl CarrierKind {
    pub fn build(self) -> Arc<dyn Carrier> {
        match self {
            CarrierKind::Skt => Arc::new(Skt::default()),
            CarrierKind::Lguplus => Arc::new(LgUplus::default()),
        }
    }
}

/// First occurrence wins; a plan listed under two categories is crawled once.
pub fn dedup_entries(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}

/// Catalog calls get a shorter timeout than subsidy calls.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// GET a catalog document and decode it. Any failure is a setup error.
pub(crate) async fn fetch_catalog_json<T: DeserializeOwned>(
    requester: &Requester,
    request: GetRequest,
) -> Result<T, SetupError> {
    let url = request.url.clone();
    let response = requester.get(request.timeout(CATALOG_TIMEOUT)).await?;
    if !response.is_ok() {
        return Err(SetupError::CatalogStatus {
            url,
            status: response.status,
        });
    }
    serde_json::from_str(&response.body).map_err(|source| SetupError::CatalogPayload { url, source })
}

/// Identifiers arrive as strings or numbers depending on the endpoint.
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

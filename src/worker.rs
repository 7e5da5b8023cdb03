use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::carriers::Carrier;
use crate::error::FetchError;
use crate::extract::Page;
use crate::http::Requester;
use crate::model::{FetchTask, NormalizedRecord, RawItem, TaskOutcome};
use crate::scheduler::TaskRunner;
use crate::settings::PacingSettings;

/// Fetches, paginates and normalizes a single task against one carrier.
pub struct FetchWorker {
    requester: Requester,
    carrier: Arc<dyn Carrier>,
    pacing: PacingSettings,
    cancel: CancellationToken,
}

impl FetchWorker {
    pub fn new(
        requester: Requester,
        carrier: Arc<dyn Carrier>,
        pacing: PacingSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            requester,
            carrier,
            pacing,
            cancel,
        }
    }

    /// Raw items for one task, in page order.
    ///
    /// Page 1 must succeed. Continuation pages are fetched one after another
    /// when the carrier paginates and page 1 declares a total; a failing
    /// continuation page is skipped and the rest still count.
    pub async fn process(&self, task: &FetchTask) -> Result<Vec<RawItem>, FetchError> {
        self.requester.pause(self.pacing.request).await;

        let first = self.fetch_page(task, 1).await?;
        let pages = match (self.carrier.page_size(), first.total_count) {
            (Some(size), Some(total)) => page_count(total, size),
            _ => 1,
        };
        let mut items = first.items;

        for page in 2..=pages {
            if self.cancel.is_cancelled() {
                debug!(plan = %task.entry.id, page, "cancelled, not fetching further pages");
                break;
            }
            self.requester.pause(self.pacing.page).await;
            match self.fetch_page(task, page).await {
                Ok(next) => items.extend(next.items),
                Err(e) => warn!(plan = %task.entry.id, page, pages, error = %e, "skipping page"),
            }
        }

        Ok(items)
    }

    async fn fetch_page(&self, task: &FetchTask, page: u32) -> Result<Page, FetchError> {
        let request = self.carrier.subsidy_request(task, page);
        let url = request.url.clone();
        let response = self.requester.get(request).await?;
        if !response.is_ok() {
            return Err(FetchError::Status {
                url,
                status: response.status,
            });
        }
        Ok(self.carrier.extractor().extract(&response.body)?)
    }

    fn normalize(&self, task: &FetchTask, items: &[RawItem]) -> Vec<NormalizedRecord> {
        let ctx = task.context();
        let normalizer = self.carrier.normalizer();
        items
            .iter()
            .flat_map(|item| normalizer.normalize(item, &ctx))
            .collect()
    }
}

#[async_trait]
impl TaskRunner for FetchWorker {
    async fn run(&self, task: &FetchTask) -> TaskOutcome {
        if self.cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }
        match self.process(task).await {
            Ok(items) => {
                let records = self.normalize(task, &items);
                if records.is_empty() {
                    debug!(task = ?task.key(), "no items");
                    TaskOutcome::Empty
                } else {
                    TaskOutcome::Records(records)
                }
            }
            Err(e) => {
                warn!(task = ?task.key(), error = %e, "task failed");
                TaskOutcome::Failed(e.label())
            }
        }
    }
}

/// Number of pages needed for `total` items; at least one.
pub fn page_count(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    let pages = total.div_ceil(u64::from(page_size)).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

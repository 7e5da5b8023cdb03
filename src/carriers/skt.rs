//! SK Telecom T world shop.
//!
//! Plans are discovered per category through two JSON endpoints. Subsidies
//! come back as an HTML notice page with the device list inlined as
//! `parseObject([...]);`, one request per plan, subscription type and
//! contract length, unpaginated.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::{dedup_entries, fetch_catalog_json, lenient_string, Carrier};
use crate::error::SetupError;
use crate::extract::Extractor;
use crate::http::{GetRequest, Requester};
use crate::model::{CatalogEntry, Code, FetchTask};
use crate::normalize::{FieldMap, Normalizer, SingleTerm};
use crate::settings::PacingSettings;

pub const BASE_URL: &str = "https://shop.tworld.co.kr";
const ROOT_CATEGORY_ID: &str = "20010001";
const UP_CATEGORY_ID: &str = "300100400001";

pub struct Skt {
    base_url: String,
    extractor: Extractor,
    normalizer: SingleTerm,
}

impl Default for Skt {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl Skt {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            extractor: Extractor::embedded("parseObject"),
            normalizer: SingleTerm {
                fields: FieldMap {
                    manufacturer: Some("companyNm"),
                    model_name: Some("productNm"),
                    capacity: Some("productMem"),
                    list_price: Some("factoryPrice"),
                    carrier_subsidy: Some("telecomSaleAmt"),
                    additional_subsidy: Some("selDsnetSupmAmt"),
                    channel_subsidy: Some("dsnetSupmAmt"),
                    total_subsidy: Some("twdSumSaleAmt"),
                    purchase_price: Some("price"),
                    effective_date: Some("effStaDt"),
                },
            },
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default = "Vec::new")]
    content: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Category {
    #[serde(deserialize_with = "lenient_string")]
    category_id: String,
    #[serde(default)]
    category_nm: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subscription {
    #[serde(deserialize_with = "lenient_string")]
    subscription_id: String,
    #[serde(default)]
    subscription_nm: String,
}

#[async_trait]
impl Carrier for Skt {
    fn name(&self) -> &'static str {
        "skt"
    }

    fn subscription_types(&self) -> Vec<Code> {
        vec![
            Code::new("31", "기기변경"),
            Code::new("32", "번호이동"),
            Code::new("33", "신규가입"),
        ]
    }

    fn terms(&self) -> Vec<Code> {
        vec![Code::new("12", "12개월"), Code::new("24", "24개월")]
    }

    fn referer(&self) -> String {
        format!("{}/wireline/plan/list", self.base_url)
    }

    fn accept(&self) -> &'static str {
        "application/json, text/javascript, */*; q=0.01"
    }

    fn subsidy_request(&self, task: &FetchTask, _page: u32) -> GetRequest {
        GetRequest::new(format!("{}/notice", self.base_url))
            .query("prodId", task.entry.id.as_str())
            .query("scrbType", task.subscription.code.as_str())
            .query("saleMonth", task.term.code.as_str())
    }

    fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    fn normalizer(&self) -> &dyn Normalizer {
        &self.normalizer
    }

    async fn catalog(
        &self,
        requester: &Requester,
        pacing: &PacingSettings,
    ) -> Result<Vec<CatalogEntry>, SetupError> {
        let categories: Envelope<Category> = fetch_catalog_json(
            requester,
            GetRequest::new(format!("{}/api/wireless/subscription/category", self.base_url))
                .query("categoryId", ROOT_CATEGORY_ID),
        )
        .await?;
        info!(categories = categories.content.len(), "SKT plan categories");

        let mut entries = Vec::new();
        for category in &categories.content {
            requester.pause(pacing.catalog).await;

            let request = GetRequest::new(format!("{}/api/wireless/subscription/list", self.base_url))
                .query("type", "1")
                .query("upCategoryId", UP_CATEGORY_ID)
                .query("categoryId", category.category_id.as_str());

            match fetch_catalog_json::<Envelope<Subscription>>(requester, request).await {
                Ok(list) => {
                    info!(category = %category.category_nm, plans = list.content.len(), "plans listed");
                    entries.extend(list.content.into_iter().map(|s| {
                        CatalogEntry::new(s.subscription_id, s.subscription_nm, category.category_nm.as_str())
                    }));
                }
                Err(e) => warn!(category = %category.category_nm, error = %e, "skipping plan category"),
            }
        }

        Ok(dedup_entries(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::http::HttpClient;
    use crate::random::SeededRandom;
    use crate::session::Session;
    use crate::testing::{instant_policy, ok, quiet_pacing, status, MockTransport};

    fn requester(mock: Arc<MockTransport>, skt: &Skt) -> Requester {
        Requester::new(
            HttpClient::new(mock, instant_policy(1)),
            Arc::new(Session::anonymous()),
            Arc::new(SeededRandom::new(5)),
            skt.referer(),
            skt.accept(),
        )
    }

    #[tokio::test]
    async fn catalog_walks_categories_and_skips_failures() {
        let skt = Skt::new("http://skt.test/");
        let mock = MockTransport::new(|req, _| {
            if req.url.ends_with("/category") {
                return ok(r#"{"content": [
                    {"categoryId": "C1", "categoryNm": "5GX 플랜"},
                    {"categoryId": "C2", "categoryNm": "LTE 플랜"},
                    {"categoryId": "C3", "categoryNm": "0 청년"}
                ]}"#);
            }
            match req.query_value("categoryId") {
                Some("C1") => ok(r#"{"content": [
                    {"subscriptionId": "NA1", "subscriptionNm": "5GX 프라임"},
                    {"subscriptionId": "NA2", "subscriptionNm": "5GX 레귤러"}
                ]}"#),
                Some("C2") => status(500),
                _ => ok(r#"{"content": [{"subscriptionId": "NA1", "subscriptionNm": "5GX 프라임"}]}"#),
            }
        });

        let entries = skt
            .catalog(&requester(mock.clone(), &skt), &quiet_pacing())
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], CatalogEntry::new("NA1", "5GX 프라임", "5GX 플랜"));
        assert_eq!(entries[1].id, "NA2");
        assert_eq!(mock.calls(), 4);
        assert_eq!(mock.requests()[1].query_value("upCategoryId"), Some(UP_CATEGORY_ID));
    }

    #[tokio::test]
    async fn category_failure_is_fatal() {
        let skt = Skt::new("http://skt.test");
        let mock = MockTransport::new(|_, _| status(403));
        let err = skt
            .catalog(&requester(mock, &skt), &quiet_pacing())
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::CatalogStatus { status: 403, .. }));
    }

    #[test]
    fn notice_request_carries_task_codes() {
        let skt = Skt::new("http://skt.test");
        let task = FetchTask {
            entry: Arc::new(CatalogEntry::new("NA00007790", "5GX 프라임", "5GX")),
            subscription: Code::new("32", "번호이동"),
            term: Code::new("12", "12개월"),
        };
        let req = skt.subsidy_request(&task, 1);
        assert_eq!(req.url, "http://skt.test/notice");
        assert_eq!(req.query_value("prodId"), Some("NA00007790"));
        assert_eq!(req.query_value("scrbType"), Some("32"));
        assert_eq!(req.query_value("saleMonth"), Some("12"));
        assert!(skt.page_size().is_none());
    }

    #[test]
    fn notice_page_normalizes() {
        let skt = Skt::default();
        let html = r#"<script>
            parseObject([{"companyNm":"삼성","productNm":"갤럭시 S24","productMem":"256G",
              "factoryPrice":1155000,"telecomSaleAmt":500000,"selDsnetSupmAmt":75000,
              "twdSumSaleAmt":575000,"price":580000,"effStaDt":"2024-03-01"}]);
        </script>"#;
        let page = skt.extractor().extract(html).unwrap();
        let task = FetchTask {
            entry: Arc::new(CatalogEntry::new("NA1", "5GX 프라임", "5GX")),
            subscription: Code::new("31", "기기변경"),
            term: Code::new("24", "24개월"),
        };
        let records = skt.normalizer().normalize(&page.items[0], &task.context());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.manufacturer, "삼성");
        assert_eq!(r.capacity, "256G");
        assert_eq!(r.term, "24개월");
        assert_eq!(r.total_subsidy, 575_000);
        assert_eq!(r.channel_subsidy, 0);
    }
}

//! LG U+ online shop.
//!
//! Sits behind a bot wall, so every call carries browser-exported cookies.
//! Plans are listed per network group (5G, LTE). The subsidy endpoint is
//! paginated JSON, ten models per page, and each model carries two subsidy
//! variants (six-month plan hold and the basic contract) that become two
//! records.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::{dedup_entries, fetch_catalog_json, lenient_string, Carrier};
use crate::error::SetupError;
use crate::extract::Extractor;
use crate::http::{GetRequest, Requester};
use crate::model::{CatalogEntry, Code, FetchTask};
use crate::normalize::{FieldMap, MultiTerm, Normalizer, TermVariant};
use crate::settings::PacingSettings;

pub const BASE_URL: &str = "https://www.lguplus.com";
pub const PAGE_SIZE: u32 = 10;

const PLAN_GROUPS: [(&str, &str); 2] = [("00", "5G"), ("01", "LTE")];

pub struct LgUplus {
    base_url: String,
    extractor: Extractor,
    normalizer: MultiTerm,
}

impl Default for LgUplus {
    fn default() -> Self {
        Self::new(BASE_URL)
    }
}

impl LgUplus {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            extractor: Extractor::json("dvicMdlbSufuDtoList", Some("totalCnt")),
            normalizer: MultiTerm {
                shared: FieldMap {
                    model_name: Some("urcTrmMdlNm"),
                    list_price: Some("dlvrPrc"),
                    channel_subsidy: Some("dsnwSupportAmt"),
                    ..Default::default()
                },
                variants: vec![
                    TermVariant {
                        label: "6개월",
                        carrier_subsidy: "sixPlanPuanSuptAmt",
                        additional_subsidy: "sixPlanAddSuptAmt",
                        total_subsidy: "sixPlanSuptTamt",
                    },
                    TermVariant {
                        label: "기본",
                        carrier_subsidy: "basicPlanPuanSuptAmt",
                        additional_subsidy: "basicPlanAddSuptAmt",
                        total_subsidy: "basicPlanSuptTamt",
                    },
                ],
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanList {
    #[serde(default)]
    dvic_mdlb_sufu_pp_list: Vec<PlanGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanGroup {
    #[serde(default)]
    dvic_mdlb_sufu_pp_detl_list: Vec<Plan>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Plan {
    #[serde(deserialize_with = "lenient_string")]
    urc_mbl_pp_cd: String,
    #[serde(default)]
    urc_mbl_pp_nm: String,
}

#[async_trait]
impl Carrier for LgUplus {
    fn name(&self) -> &'static str {
        "lguplus"
    }

    fn subscription_types(&self) -> Vec<Code> {
        vec![
            Code::new("1", "기기변경"),
            Code::new("2", "번호이동"),
            Code::new("3", "신규가입"),
        ]
    }

    /// The endpoint takes no term parameter; both variants arrive in every
    /// item and the normalizer labels them.
    fn terms(&self) -> Vec<Code> {
        vec![Code::new("all", "")]
    }

    fn referer(&self) -> String {
        format!("{}/mobile/financing-model", self.base_url)
    }

    fn requires_session(&self) -> bool {
        true
    }

    fn subsidy_request(&self, task: &FetchTask, page: u32) -> GetRequest {
        GetRequest::new(format!("{}/uhdc/fo/prdv/mdlbsufu/v2/mdlb-sufu-list", self.base_url))
            .query("onlnOrdrPsblEposDivsCd", "Y")
            .query("urcHphnEntrPsblKdCd", task.subscription.code.as_str())
            .query("urcMblPpCd", task.entry.id.as_str())
            .query("shwd", "")
            .query("sortOrd", "01")
            .query("urcWlcmAplyDivsCd", "NONE")
            .query("pageNo", page.to_string())
            .query("rowSize", PAGE_SIZE.to_string())
    }

    fn page_size(&self) -> Option<u32> {
        Some(PAGE_SIZE)
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
        let url = format!("{}/uhdc/fo/prdv/mdlbsufu/v1/mdlb-pp-list", self.base_url);
        let mut entries = Vec::new();

        for (i, (group_code, group_name)) in PLAN_GROUPS.iter().enumerate() {
            if i > 0 {
                requester.pause(pacing.catalog).await;
            }
            let request = GetRequest::new(url.as_str()).query("hphnPpGrpKwrdCd", *group_code);

            match fetch_catalog_json::<PlanList>(requester, request).await {
                Ok(list) => {
                    let before = entries.len();
                    for group in list.dvic_mdlb_sufu_pp_list {
                        entries.extend(
                            group
                                .dvic_mdlb_sufu_pp_detl_list
                                .into_iter()
                                .map(|p| CatalogEntry::new(p.urc_mbl_pp_cd, p.urc_mbl_pp_nm, *group_name)),
                        );
                    }
                    info!(group = group_name, plans = entries.len() - before, "plans listed");
                }
                Err(e) => warn!(group = group_name, error = %e, "skipping plan group"),
            }
        }

        Ok(dedup_entries(entries))
    }
}

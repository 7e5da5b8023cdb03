//! One crawl of one carrier: catalog, expansion, concurrent fetch, merge.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::carriers::Carrier;
use crate::error::SetupError;
use crate::expand::expand;
use crate::http::{HttpClient, Requester};
use crate::model::{CatalogEntry, RunResult};
use crate::random::RandomSource;
use crate::scheduler::{run_all, SchedulerConfig};
use crate::session::Session;
use crate::settings::{PacingSettings, Settings};
use crate::worker::FetchWorker;

pub struct Pipeline {
    carrier: Arc<dyn Carrier>,
    requester: Requester,
    session: Arc<Session>,
    pacing: PacingSettings,
    scheduler: SchedulerConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        carrier: Arc<dyn Carrier>,
        client: HttpClient,
        session: Arc<Session>,
        random: Arc<dyn RandomSource>,
        settings: &Settings,
        cancel: CancellationToken,
    ) -> Self {
        let requester = Requester::new(
            client,
            Arc::clone(&session),
            random,
            carrier.referer(),
            carrier.accept(),
        );
        Self {
            carrier,
            requester,
            session,
            pacing: settings.pacing,
            scheduler: SchedulerConfig {
                workers: settings.workers,
                progress_every: settings.progress_every,
                show_progress: true,
            },
            cancel,
        }
    }

    pub fn show_progress(mut self, visible: bool) -> Self {
        self.scheduler.show_progress = visible;
        self
    }

    fn check_session(&self) -> Result<(), SetupError> {
        if self.carrier.requires_session() && self.session.is_empty() {
            return Err(SetupError::Session(format!(
                "{} needs browser cookies (pass --cookies FILE)",
                self.carrier.name()
            )));
        }
        Ok(())
    }

    /// Discovered plans. An empty catalog is an error: there would be
    /// nothing to crawl.
    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>, SetupError> {
        self.check_session()?;
        let entries = self.carrier.catalog(&self.requester, &self.pacing).await?;
        if entries.is_empty() {
            return Err(SetupError::EmptyCatalog(self.carrier.name()));
        }
        Ok(entries)
    }

    pub async fn run(&self) -> Result<RunResult, SetupError> {
        let started_at = Utc::now();
        let catalog = self.catalog().await?;

        let subscriptions = self.carrier.subscription_types();
        let terms = self.carrier.terms();
        let tasks = expand(&catalog, &subscriptions, &terms);
        info!(
            "{}: {} tasks ({} plans x {} subscription types x {} terms), {} workers",
            self.carrier.name(),
            tasks.len(),
            catalog.len(),
            subscriptions.len(),
            terms.len(),
            self.scheduler.workers
        );

        let worker = Arc::new(FetchWorker::new(
            self.requester.clone(),
            Arc::clone(&self.carrier),
            self.pacing,
            self.cancel.clone(),
        ));
        let collected = run_all(worker, tasks, &self.scheduler, self.cancel.clone()).await;

        Ok(RunResult::finalize(
            self.carrier.name(),
            started_at,
            collected.records,
            collected.stats,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::model::Code;
    use crate::normalize::{FieldMap, MultiTerm, TermVariant};
    use crate::random::SeededRandom;
    use crate::testing::{instant_policy, ok, quiet_pacing, status, FakeCarrier, MockTransport};

    fn settings(workers: usize) -> Settings {
        Settings {
            workers,
            pacing: quiet_pacing(),
            ..Default::default()
        }
    }

    fn two_term_carrier() -> FakeCarrier {
        FakeCarrier {
            plans: vec![
                CatalogEntry::new("P1", "plan one", "5G"),
                CatalogEntry::new("P2", "plan two", "LTE"),
            ],
            subscriptions: vec![
                Code::new("1", "기기변경"),
                Code::new("2", "번호이동"),
                Code::new("3", "신규가입"),
            ],
            terms: vec![Code::new("12", "12개월"), Code::new("24", "24개월")],
            normalizer: Box::new(MultiTerm {
                shared: FieldMap {
                    model_name: Some("model"),
                    ..Default::default()
                },
                variants: vec![
                    TermVariant {
                        label: "6개월",
                        carrier_subsidy: "six",
                        additional_subsidy: "sixAdd",
                        total_subsidy: "sixTotal",
                    },
                    TermVariant {
                        label: "기본",
                        carrier_subsidy: "basic",
                        additional_subsidy: "basicAdd",
                        total_subsidy: "basicTotal",
                    },
                ],
            }),
            ..Default::default()
        }
    }

    fn pipeline(mock: Arc<MockTransport>, carrier: FakeCarrier, session: Session) -> Pipeline {
        Pipeline::new(
            Arc::new(carrier),
            HttpClient::new(mock, instant_policy(2)),
            Arc::new(session),
            Arc::new(SeededRandom::new(1)),
            &settings(4),
            CancellationToken::new(),
        )
        .show_progress(false)
    }

    fn echo_plan(req: &crate::http::GetRequest) -> String {
        let plan = req.query_value("plan").unwrap_or_default();
        json!({
            "items": [{"model": format!("device-{plan}"), "sixTotal": 500000, "basicTotal": 450000}],
            "total": 1
        })
        .to_string()
    }

    #[tokio::test]
    async fn end_to_end_two_by_three_by_two() {
        let mock = MockTransport::new(|req, _| ok(echo_plan(req)));
        let result = pipeline(mock.clone(), two_term_carrier(), Session::anonymous())
            .run()
            .await
            .unwrap();

        assert_eq!(mock.calls(), 12);
        assert_eq!(result.carrier, "fake");
        assert_eq!(result.stats.total, 12);
        assert_eq!(result.stats.succeeded, 12);
        assert_eq!(result.records.len(), 24);

        for r in &result.records {
            assert_eq!(r.model_name, format!("device-{}", r.plan_id));
            let expected_name = if r.plan_id == "P1" { "plan one" } else { "plan two" };
            assert_eq!(r.plan_name, expected_name);
        }
        let six = result.records.iter().filter(|r| r.term == "6개월").count();
        assert_eq!(six, 12);
        assert!(result
            .records
            .iter()
            .filter(|r| r.term == "기본")
            .all(|r| r.total_subsidy == 450_000));
        assert!(result.finished_at >= result.started_at);
    }

    #[tokio::test]
    async fn failing_plan_does_not_sink_the_run() {
        let mock = MockTransport::new(|req, _| match req.query_value("plan") {
            Some("P2") => status(503),
            _ => ok(echo_plan(req)),
        });
        let result = pipeline(mock, two_term_carrier(), Session::anonymous())
            .run()
            .await
            .unwrap();

        assert_eq!(result.stats.failed, 6);
        assert_eq!(result.stats.succeeded, 6);
        assert_eq!(result.records.len(), 12);
        assert!(result.records.iter().all(|r| r.plan_id == "P1"));
    }

    #[tokio::test]
    async fn empty_catalog_aborts_before_fetching() {
        let mock = MockTransport::new(|_, _| ok("{}"));
        let carrier = FakeCarrier {
            plans: Vec::new(),
            ..Default::default()
        };
        let err = pipeline(mock.clone(), carrier, Session::anonymous())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::EmptyCatalog("fake")));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn missing_session_is_a_setup_error() {
        let mock = MockTransport::new(|_, _| ok("{}"));
        let carrier = FakeCarrier {
            needs_session: true,
            ..Default::default()
        };
        let err = pipeline(mock.clone(), carrier, Session::anonymous())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::Session(_)));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn cookies_reach_the_subsidy_requests() {
        let mock = MockTransport::new(|req, _| ok(echo_plan(req)));
        let carrier = FakeCarrier {
            needs_session: true,
            ..Default::default()
        };
        let session = Session::from_cookies(vec![("JSESSIONID".into(), "abc".into())]);
        let result = pipeline(mock.clone(), carrier, session).run().await.unwrap();

        assert_eq!(result.records.len(), 1);
        let requests = mock.requests();
        assert_eq!(requests[0].header_value("Cookie"), Some("JSESSIONID=abc"));
    }
}

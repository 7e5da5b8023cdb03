use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A discoverable plan used to seed fetch tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    /// SKT category name or LG U+ network generation.
    pub category: String,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
        }
    }
}

/// Request code paired with the label that ends up in the output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Code {
    pub code: String,
    pub label: String,
}

impl Code {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// One (plan, subscription type, term) combination to query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTask {
    pub entry: Arc<CatalogEntry>,
    pub subscription: Code,
    pub term: Code,
}

impl FetchTask {
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.entry.id, &self.subscription.code, &self.term.code)
    }

    pub fn context(&self) -> TaskContext {
        TaskContext {
            plan_id: self.entry.id.clone(),
            plan_name: self.entry.name.clone(),
            plan_type: self.entry.category.clone(),
            subscription_type: self.subscription.label.clone(),
            term: self.term.label.clone(),
        }
    }
}

/// Task-level fields copied onto every record a task produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub plan_id: String,
    pub plan_name: String,
    pub plan_type: String,
    pub subscription_type: String,
    pub term: String,
}

/// Carrier-shaped device record, field names untouched.
pub type RawItem = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    pub plan_id: String,
    pub plan_name: String,
    pub plan_type: String,
    pub subscription_type: String,
    pub term: String,
    pub manufacturer: String,
    pub model_name: String,
    pub capacity: String,
    pub list_price: i64,
    pub carrier_subsidy: i64,
    pub additional_subsidy: i64,
    pub channel_subsidy: i64,
    pub total_subsidy: i64,
    pub purchase_price: i64,
    pub effective_date: String,
}

impl NormalizedRecord {
    pub const COLUMNS: [&'static str; 15] = [
        "plan_id",
        "plan_name",
        "plan_type",
        "subscription_type",
        "term",
        "manufacturer",
        "model_name",
        "capacity",
        "list_price",
        "carrier_subsidy",
        "additional_subsidy",
        "channel_subsidy",
        "total_subsidy",
        "purchase_price",
        "effective_date",
    ];

    /// Empty record carrying the task context; monetary fields start at zero.
    pub fn for_context(ctx: &TaskContext) -> Self {
        Self {
            plan_id: ctx.plan_id.clone(),
            plan_name: ctx.plan_name.clone(),
            plan_type: ctx.plan_type.clone(),
            subscription_type: ctx.subscription_type.clone(),
            term: ctx.term.clone(),
            manufacturer: String::new(),
            model_name: String::new(),
            capacity: String::new(),
            list_price: 0,
            carrier_subsidy: 0,
            additional_subsidy: 0,
            channel_subsidy: 0,
            total_subsidy: 0,
            purchase_price: 0,
            effective_date: String::new(),
        }
    }

    /// Row in `COLUMNS` order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.plan_id.clone(),
            self.plan_name.clone(),
            self.plan_type.clone(),
            self.subscription_type.clone(),
            self.term.clone(),
            self.manufacturer.clone(),
            self.model_name.clone(),
            self.capacity.clone(),
            self.list_price.to_string(),
            self.carrier_subsidy.to_string(),
            self.additional_subsidy.to_string(),
            self.channel_subsidy.to_string(),
            self.total_subsidy.to_string(),
            self.purchase_price.to_string(),
            self.effective_date.clone(),
        ]
    }

    fn sort_key(&self) -> (&str, &str, &str, &str, &str, &str) {
        (
            &self.plan_name,
            &self.subscription_type,
            &self.term,
            &self.model_name,
            &self.manufacturer,
            &self.capacity,
        )
    }
}

/// Result of a single fetch task as seen by the scheduler.
#[derive(Debug)]
pub enum TaskOutcome {
    Records(Vec<NormalizedRecord>),
    Empty,
    /// Failure category, see `FetchError::label`.
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Failed task count per failure category.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, usize>,
}

impl RunStats {
    pub fn attempted(&self) -> usize {
        self.total - self.cancelled
    }

    /// Failure categories, most frequent first.
    pub fn top_failures(&self, n: usize) -> Vec<(&str, usize)> {
        let mut reasons: Vec<_> = self.failures.iter().map(|(r, c)| (r.as_str(), *c)).collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        reasons.truncate(n);
        reasons
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub carrier: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<NormalizedRecord>,
    pub stats: RunStats,
}

impl RunResult {
    /// Seal a run: records get a stable order so repeated runs diff cleanly.
    pub fn finalize(
        carrier: &str,
        started_at: DateTime<Utc>,
        mut records: Vec<NormalizedRecord>,
        stats: RunStats,
    ) -> Self {
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self {
            carrier: carrier.to_string(),
            started_at,
            finished_at: Utc::now(),
            records,
            stats,
        }
    }
}

//! Maps carrier-shaped raw items onto `NormalizedRecord`.
//!
//! Field names differ per carrier, so each carrier supplies a `FieldMap`.
//! Anything absent, null or unparsable becomes `0` (money) or `""` (text).

use serde_json::Value;

use crate::model::{NormalizedRecord, RawItem, TaskContext};

pub trait Normalizer: Send + Sync {
    fn normalize(&self, item: &RawItem, ctx: &TaskContext) -> Vec<NormalizedRecord>;
}

/// Carrier field names for each output column. `None` means the carrier
/// never reports that column.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    pub manufacturer: Option<&'static str>,
    pub model_name: Option<&'static str>,
    pub capacity: Option<&'static str>,
    pub list_price: Option<&'static str>,
    pub carrier_subsidy: Option<&'static str>,
    pub additional_subsidy: Option<&'static str>,
    pub channel_subsidy: Option<&'static str>,
    pub total_subsidy: Option<&'static str>,
    pub purchase_price: Option<&'static str>,
    pub effective_date: Option<&'static str>,
}

impl FieldMap {
    fn apply(&self, item: &RawItem, ctx: &TaskContext) -> NormalizedRecord {
        let mut record = NormalizedRecord::for_context(ctx);
        record.manufacturer = text(item, self.manufacturer);
        record.model_name = text(item, self.model_name);
        record.capacity = text(item, self.capacity);
        record.list_price = money(item, self.list_price);
        record.carrier_subsidy = money(item, self.carrier_subsidy);
        record.additional_subsidy = money(item, self.additional_subsidy);
        record.channel_subsidy = money(item, self.channel_subsidy);
        record.total_subsidy = money(item, self.total_subsidy);
        record.purchase_price = money(item, self.purchase_price);
        record.effective_date = text(item, self.effective_date);
        record
    }
}

/// One record per item; the term label comes from the task.
#[derive(Debug, Clone)]
pub struct SingleTerm {
    pub fields: FieldMap,
}

impl Normalizer for SingleTerm {
    fn normalize(&self, item: &RawItem, ctx: &TaskContext) -> Vec<NormalizedRecord> {
        vec![self.fields.apply(item, ctx)]
    }
}

/// Subsidy columns that vary per contract variant within one item.
#[derive(Debug, Clone)]
pub struct TermVariant {
    pub label: &'static str,
    pub carrier_subsidy: &'static str,
    pub additional_subsidy: &'static str,
    pub total_subsidy: &'static str,
}

/// One record per variant: shared device columns, per-variant subsidies and
/// term label.
#[derive(Debug, Clone)]
pub struct MultiTerm {
    pub shared: FieldMap,
    pub variants: Vec<TermVariant>,
}

impl Normalizer for MultiTerm {
    fn normalize(&self, item: &RawItem, ctx: &TaskContext) -> Vec<NormalizedRecord> {
        let base = self.shared.apply(item, ctx);
        self.variants
            .iter()
            .map(|variant| {
                let mut record = base.clone();
                record.term = variant.label.to_string();
                record.carrier_subsidy = money(item, Some(variant.carrier_subsidy));
                record.additional_subsidy = money(item, Some(variant.additional_subsidy));
                record.total_subsidy = money(item, Some(variant.total_subsidy));
                record
            })
            .collect()
    }
}

/// Won amount. Accepts numbers and strings like `"1,155,000"` or `"33000원"`.
pub fn money(item: &RawItem, key: Option<&str>) -> i64 {
    let Some(value) = key.and_then(|k| item.get(k)) else {
        return 0;
    };
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole_won))
            .unwrap_or(0),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_end_matches('원')
                .chars()
                .filter(|c| !matches!(c, ',' | ' '))
                .collect();
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| cleaned.parse::<f64>().ok().and_then(whole_won))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Rounded amount, or `None` for NaN, infinities and values outside `i64`.
fn whole_won(f: f64) -> Option<i64> {
    let rounded = f.round();
    let in_range = rounded >= i64::MIN as f64 && rounded < i64::MAX as f64;
    (rounded.is_finite() && in_range).then_some(rounded as i64)
}

pub fn text(item: &RawItem, key: Option<&str>) -> String {
    match key.and_then(|k| item.get(k)) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

//! Rows returned by the aggregate procedures and the metrics derived from them.
//!
//! Numeric fields arrive loosely typed (numbers, numeric strings, nulls or
//! missing), so every numeric field goes through [`coerce_number`]. Anything
//! that is not a finite number becomes 0.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Lenient numeric coercion: numbers and numeric strings pass, everything
/// else (null, bool, garbage, NaN, infinities) is 0.
pub fn coerce_number(v: &Value) -> f64 {
    let n = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(0.0)
            }
        }
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(v.as_ref().map(coerce_number).unwrap_or(0.0))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

fn finite_or_zero(n: f64) -> f64 {
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// `(value - target) / target * 100`, or 0 when the target is 0 or the ratio
/// overflows.
pub fn growth_pct(value: f64, target: f64) -> f64 {
    if target != 0.0 {
        finite_or_zero((value - target) / target * 100.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesRow {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value_sales: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target_sales: f64,
}

impl SalesRow {
    pub fn new(value_sales: f64, target_sales: f64) -> Self {
        Self {
            value_sales,
            target_sales,
        }
    }
}

/// One row of a grouped value/target aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    #[serde(default, deserialize_with = "lenient_string")]
    pub group_value: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value_sales: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target_sales: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandValueTarget {
    #[serde(default, deserialize_with = "lenient_string")]
    pub brand: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value_measure: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target_measure: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    #[serde(default, deserialize_with = "lenient_string")]
    pub period: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value_sales: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target_sales: f64,
}

/// A KPI value against its target.
///
/// All fields `None` means "no data"; a row of zeros is a real 0% result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metric {
    pub value: Option<f64>,
    pub target: Option<f64>,
    pub growth: Option<f64>,
}

impl Metric {
    pub const EMPTY: Metric = Metric {
        value: None,
        target: None,
        growth: None,
    };

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub fn variance(&self) -> Option<f64> {
        Some(self.value? - self.target?)
    }

    pub fn variance_pct(&self) -> Option<f64> {
        self.growth
    }
}

pub fn to_metric(row: Option<&SalesRow>) -> Metric {
    match row {
        None => Metric::EMPTY,
        Some(row) => Metric {
            value: Some(row.value_sales),
            target: Some(row.target_sales),
            growth: Some(growth_pct(row.value_sales, row.target_sales)),
        },
    }
}

/// The four headline cards: value, target, variance $ and variance %.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HeadlineKpi {
    pub value: Option<f64>,
    pub target: Option<f64>,
    pub variance: Option<f64>,
    pub variance_pct: Option<f64>,
}

impl From<Metric> for HeadlineKpi {
    fn from(m: Metric) -> Self {
        Self {
            value: m.value,
            target: m.target,
            variance: m.variance(),
            variance_pct: m.variance_pct(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceDriverRow {
    pub group_value: String,
    pub value_sales: f64,
    pub target_sales: f64,
    pub variance_sales: f64,
    pub variance_pct: f64,
}

impl VarianceDriverRow {
    pub fn new(group_value: impl Into<String>, value_sales: f64, target_sales: f64) -> Self {
        Self {
            group_value: group_value.into(),
            value_sales,
            target_sales,
            variance_sales: finite_or_zero(value_sales - target_sales),
            variance_pct: growth_pct(value_sales, target_sales),
        }
    }
}

impl From<&GroupRow> for VarianceDriverRow {
    fn from(row: &GroupRow) -> Self {
        VarianceDriverRow::new(row.group_value.clone(), row.value_sales, row.target_sales)
    }
}

//! Filter tuple sent with every aggregate query.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// Zero-based position in the calendar year.
    pub fn index(self) -> usize {
        self as usize
    }

    /// 1-based calendar month, as returned by `chrono::Datelike::month`.
    pub fn from_number(n: u32) -> Option<Month> {
        Month::ALL.get((n as usize).checked_sub(1)?).copied()
    }

    pub fn token(self) -> &'static str {
        match self {
            Month::Jan => "JAN",
            Month::Feb => "FEB",
            Month::Mar => "MAR",
            Month::Apr => "APR",
            Month::May => "MAY",
            Month::Jun => "JUN",
            Month::Jul => "JUL",
            Month::Aug => "AUG",
            Month::Sep => "SEP",
            Month::Oct => "OCT",
            Month::Nov => "NOV",
            Month::Dec => "DEC",
        }
    }

    pub fn current() -> Month {
        use chrono::Datelike;
        Month::from_number(chrono::Utc::now().month()).unwrap_or(Month::Jan)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Month {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Month::ALL
            .iter()
            .copied()
            .find(|m| m.token() == upper)
            .ok_or_else(|| format!("unknown month token: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeView {
    Monthly,
    Qtd,
    Ytd,
    #[default]
    Total,
}

impl TimeView {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeView::Monthly => "monthly",
            TimeView::Qtd => "qtd",
            TimeView::Ytd => "ytd",
            TimeView::Total => "total",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeView::Monthly => "Monthly",
            TimeView::Qtd => "QTD",
            TimeView::Ytd => "YTD",
            TimeView::Total => "Total",
        }
    }
}

/// Value and target measure names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Measures {
    pub value: String,
    pub target: String,
}

impl Measures {
    pub fn new(value: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            target: target.into(),
        }
    }

    pub(crate) fn write_params(&self, params: &mut Map<String, Value>) {
        params.insert("p_value_measure".to_string(), Value::String(self.value.clone()));
        params.insert("p_target_measure".to_string(), Value::String(self.target.clone()));
    }
}

/// Dimension columns a query can be restricted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Measure,
    Division,
    Brand,
    Category,
    SubBrand,
    Location,
    Month,
}

impl Dimension {
    pub fn param(self) -> &'static str {
        match self {
            Dimension::Measure => "p_measure",
            Dimension::Division => "p_division",
            Dimension::Brand => "p_brand",
            Dimension::Category => "p_category",
            Dimension::SubBrand => "p_sub_brand",
            Dimension::Location => "p_location",
            Dimension::Month => "p_month",
        }
    }
}

/// Optional restrictions on each dimension. `None` means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SalesFilters {
    pub measure: Option<String>,
    pub division: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub sub_brand: Option<String>,
    pub location: Option<String>,
    pub month: Option<Month>,
    pub qtd_start: Option<Month>,
    pub qtd_end: Option<Month>,
}

impl SalesFilters {
    /// Set a string dimension; blank values clear it.
    pub fn set(&mut self, dim: Dimension, value: Option<&str>) {
        let value = value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        match dim {
            Dimension::Measure => self.measure = value,
            Dimension::Division => self.division = value,
            Dimension::Brand => self.brand = value,
            Dimension::Category => self.category = value,
            Dimension::SubBrand => self.sub_brand = value,
            Dimension::Location => self.location = value,
            Dimension::Month => self.month = value.and_then(|v| v.parse().ok()),
        }
    }

    pub fn with(mut self, dim: Dimension, value: &str) -> Self {
        self.set(dim, Some(value));
        self
    }

    pub fn get(&self, dim: Dimension) -> Option<String> {
        match dim {
            Dimension::Measure => self.measure.clone(),
            Dimension::Division => self.division.clone(),
            Dimension::Brand => self.brand.clone(),
            Dimension::Category => self.category.clone(),
            Dimension::SubBrand => self.sub_brand.clone(),
            Dimension::Location => self.location.clone(),
            Dimension::Month => self.month.map(|m| m.token().to_string()),
        }
    }

    /// Write the given dimensions as named params, skipping absent ones.
    pub(crate) fn write_params(&self, dims: &[Dimension], params: &mut Map<String, Value>) {
        for dim in dims {
            if let Some(v) = self.get(*dim).filter(|v| !v.is_empty()) {
                params.insert(dim.param().to_string(), Value::String(v));
            }
        }
    }
}

/// Dimension params accepted by the value/target procedures (month is sent
/// separately, driven by the period plan).
pub(crate) const VALUE_TARGET_DIMS: [Dimension; 5] = [
    Dimension::Division,
    Dimension::Brand,
    Dimension::Category,
    Dimension::SubBrand,
    Dimension::Location,
];

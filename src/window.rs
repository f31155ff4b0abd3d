//! QTD/YTD windows.
//!
//! The backend only answers single-month or whole-period queries, so a window
//! is resolved into its month list, fetched one month at a time and summed
//! here. Ratios are always derived from the summed dollars, never averaged.

use std::collections::BTreeMap;

use crate::filters::{Month, SalesFilters, TimeView};
use crate::metrics::{GroupRow, SalesRow, VarianceDriverRow};

/// How a time view maps onto remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodPlan {
    /// One remote call with `p_time_view` and an optional `p_month`.
    Single {
        time_view: TimeView,
        month: Option<Month>,
    },
    /// One `monthly` call per month, merged client-side. May be empty.
    Window(Vec<Month>),
}

impl PeriodPlan {
    pub fn for_view(time_view: TimeView, filters: &SalesFilters, current: Month) -> Self {
        match time_view {
            TimeView::Monthly => PeriodPlan::Single {
                time_view,
                month: filters.month,
            },
            // the month slicer only applies to the monthly tab
            TimeView::Total => PeriodPlan::Single {
                time_view,
                month: None,
            },
            TimeView::Qtd | TimeView::Ytd => {
                PeriodPlan::Window(resolve_window_months(time_view, filters, current))
            }
        }
    }
}

/// Months covered by a window, in calendar order.
///
/// YTD runs from January to the selected end month (QTD end, then month
/// slicer, then `current`). QTD runs from `qtd_start` to `qtd_end` inclusive
/// and is empty if either bound is missing or the start is after the end.
pub fn resolve_window_months(time_view: TimeView, filters: &SalesFilters, current: Month) -> Vec<Month> {
    match time_view {
        TimeView::Ytd => {
            let end = filters.qtd_end.or(filters.month).unwrap_or(current);
            Month::ALL[..=end.index()].to_vec()
        }
        TimeView::Qtd => match (filters.qtd_start, filters.qtd_end) {
            (Some(start), Some(end)) if start <= end => Month::ALL[start.index()..=end.index()].to_vec(),
            _ => Vec::new(),
        },
        TimeView::Monthly | TimeView::Total => Vec::new(),
    }
}

/// Sum per-month rows into a window row. A month with no row contributes
/// zero; an empty month list has no data at all.
pub fn merge_rows(months: &[Option<SalesRow>]) -> Option<SalesRow> {
    if months.is_empty() {
        return None;
    }
    let mut total = SalesRow::default();
    for row in months.iter().flatten() {
        total.value_sales += row.value_sales;
        total.target_sales += row.target_sales;
    }
    Some(total)
}

/// Running `{value, target}` sums per grouping key across months.
#[derive(Debug, Default, Clone)]
pub struct GroupAccumulator {
    sums: BTreeMap<String, (f64, f64)>,
}

impl GroupAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: f64, target: f64) {
        let entry = self.sums.entry(key.to_string()).or_insert((0.0, 0.0));
        entry.0 += value;
        entry.1 += target;
    }

    pub fn add_rows(&mut self, rows: &[GroupRow]) {
        for row in rows {
            self.add(&row.group_value, row.value_sales, row.target_sales);
        }
    }

    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    /// Variance rows in key order.
    pub fn into_rows(self) -> Vec<VarianceDriverRow> {
        self.sums
            .into_iter()
            .map(|(key, (value, target))| VarianceDriverRow::new(key, value, target))
            .collect()
    }

    pub fn into_sums(self) -> Vec<(String, f64, f64)> {
        self.sums.into_iter().map(|(k, (v, t))| (k, v, t)).collect()
    }
}

/// Merge grouped rows from every month of a window.
pub fn merge_grouped(months: &[Vec<GroupRow>]) -> Vec<VarianceDriverRow> {
    let mut acc = GroupAccumulator::new();
    for rows in months {
        acc.add_rows(rows);
    }
    acc.into_rows()
}

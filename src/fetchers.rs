//! Typed operations over the remote procedures.
//!
//! Every operation takes the filter tuple and a time view. `monthly` and
//! `total` map to one remote call; `qtd` and `ytd` fan out one `monthly` call
//! per month, await them all, and merge. A failed month fails the whole
//! window.

use futures_util::future::{try_join_all, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::cache::{QueryCache, RequestKey};
use crate::config::Config;
use crate::drill::DrillLevel;
use crate::error::FetchError;
use crate::filters::{Dimension, Measures, Month, SalesFilters, TimeView, VALUE_TARGET_DIMS};
use crate::logging::{log_window_merge, Domain, ProfileScope};
use crate::metrics::{to_metric, BrandValueTarget, GroupRow, Metric, SalesRow, TrendPoint, VarianceDriverRow};
use crate::options::OptionDimension;
use crate::ranking::{rank, sort_by_magnitude, Direction};
use crate::rpc::{procedures, SalesBackend};
use crate::window::{merge_grouped, merge_rows, GroupAccumulator, PeriodPlan};

/// Grouping key the top-N table ranks on.
pub const DIV_SUB_GROUP: &str = "div_sub";

const BRAND_CHART_DIMS: [Dimension; 3] = [Dimension::Division, Dimension::Category, Dimension::Location];

fn decode_rows<T: DeserializeOwned>(procedure: &str, value: Value) -> Result<Vec<T>, FetchError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => serde_json::from_value(value).map_err(|e| FetchError::decode(procedure, e)),
        // some procedures return a single composite instead of a set
        Value::Object(_) => Ok(vec![serde_json::from_value(value).map_err(|e| FetchError::decode(procedure, e))?]),
        other => Err(FetchError::decode(procedure, format!("expected rows, got {}", other))),
    }
}

/// Distinct option strings, either bare or as `{column: value}` rows.
fn decode_options(procedure: &str, value: Value, column: Option<&str>) -> Result<Vec<String>, FetchError> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => return Err(FetchError::decode(procedure, format!("expected a list, got {}", other))),
    };
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let text = match (&item, column) {
            (Value::String(s), _) => Some(s.clone()),
            (Value::Object(row), Some(col)) => row.get(col).and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            if !out.contains(&text) {
                out.push(text);
            }
        }
    }
    Ok(out)
}

fn period_params(params: &mut Map<String, Value>, time_view: TimeView, month: Option<Month>) {
    if let Some(m) = month {
        params.insert(Dimension::Month.param().to_string(), Value::String(m.token().to_string()));
    }
    params.insert("p_time_view".to_string(), Value::String(time_view.as_str().to_string()));
}

fn month_tokens(months: &[Month]) -> Vec<&'static str> {
    months.iter().map(|m| m.token()).collect()
}

pub struct DataClient {
    backend: Arc<dyn SalesBackend>,
    cache: QueryCache,
    current_month: Option<Month>,
}

impl DataClient {
    pub fn new(backend: Arc<dyn SalesBackend>, cfg: &Config) -> Self {
        Self {
            backend,
            cache: QueryCache::new(cfg.cache_ttl()),
            current_month: None,
        }
    }

    /// Pin "today" for open-ended YTD windows.
    pub fn with_current_month(mut self, month: Month) -> Self {
        self.current_month = Some(month);
        self
    }

    pub fn current_month(&self) -> Month {
        self.current_month.unwrap_or_else(Month::current)
    }

    pub fn plan(&self, time_view: TimeView, filters: &SalesFilters) -> PeriodPlan {
        PeriodPlan::for_view(time_view, filters, self.current_month())
    }

    async fn call(&self, procedure: &'static str, params: Map<String, Value>) -> Result<Value, FetchError> {
        let key = RequestKey::new(procedure, &params);
        let backend = Arc::clone(&self.backend);
        self.cache
            .get_or_fetch(key, move || {
                async move {
                    let _scope = ProfileScope::with_context(Domain::Fetch, "rpc", &[("procedure", Value::from(procedure))]);
                    backend.call(procedure, &params).await
                }
                .boxed()
            })
            .await
    }

    /// Run `per_month` for every month concurrently; all or nothing.
    async fn fan_out<T, F, Fut>(&self, months: &[Month], per_month: F) -> Result<Vec<T>, FetchError>
    where
        F: Fn(Month) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let _scope = ProfileScope::new(Domain::Window, "fan_out");
        try_join_all(months.iter().copied().map(per_month)).await
    }

    // =========================================================================
    // Filter options
    // =========================================================================

    /// Distinct values of a raw column.
    pub async fn filter_options(&self, column: &str) -> Result<Vec<String>, FetchError> {
        let mut params = Map::new();
        params.insert("column_name".to_string(), Value::String(column.to_string()));
        let value = self.call(procedures::FILTER_OPTIONS, params).await?;
        decode_options(procedures::FILTER_OPTIONS, value, Some(column))
    }

    /// Options for `dim`, scoped by every other selected filter.
    pub async fn available_options(&self, dim: OptionDimension, filters: &SalesFilters) -> Result<Vec<String>, FetchError> {
        let value = self.call(dim.procedure(), dim.params(filters)).await?;
        decode_options(dim.procedure(), value, Some(dim.column()))
    }

    // =========================================================================
    // Single value/target aggregate
    // =========================================================================

    async fn value_target_once(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        time_view: TimeView,
        month: Option<Month>,
    ) -> Result<Option<SalesRow>, FetchError> {
        let mut params = Map::new();
        measures.write_params(&mut params);
        filters.write_params(&VALUE_TARGET_DIMS, &mut params);
        period_params(&mut params, time_view, month);
        let value = self.call(procedures::SALES_VALUE_TARGET, params).await?;
        let rows: Vec<SalesRow> = decode_rows(procedures::SALES_VALUE_TARGET, value)?;
        Ok(rows.into_iter().next())
    }

    async fn value_target_by_month(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        months: &[Month],
    ) -> Result<Vec<Option<SalesRow>>, FetchError> {
        self.fan_out(months, |m| self.value_target_once(measures, filters, TimeView::Monthly, Some(m)))
            .await
    }

    /// Value and target for the filter tuple over the time view. `None` when
    /// there is no data, including an empty window.
    pub async fn sales_value_target(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        time_view: TimeView,
    ) -> Result<Option<SalesRow>, FetchError> {
        match self.plan(time_view, filters) {
            PeriodPlan::Single { time_view, month } => self.value_target_once(measures, filters, time_view, month).await,
            PeriodPlan::Window(months) => {
                let per_month = self.value_target_by_month(measures, filters, &months).await?;
                log_window_merge("sales_value_target", &month_tokens(&months), 1);
                Ok(merge_rows(&per_month))
            }
        }
    }

    pub async fn metric(&self, measures: &Measures, filters: &SalesFilters, time_view: TimeView) -> Result<Metric, FetchError> {
        let row = self.sales_value_target(measures, filters, time_view).await?;
        Ok(to_metric(row.as_ref()))
    }

    // =========================================================================
    // Grouped aggregates
    // =========================================================================

    async fn brand_rows_once(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        time_view: TimeView,
        month: Option<Month>,
    ) -> Result<Vec<BrandValueTarget>, FetchError> {
        let mut params = Map::new();
        measures.write_params(&mut params);
        filters.write_params(&BRAND_CHART_DIMS, &mut params);
        period_params(&mut params, time_view, month);
        let value = self.call(procedures::SALES_BY_BRAND, params).await?;
        decode_rows(procedures::SALES_BY_BRAND, value)
    }

    /// Value and target per brand. A selected brand narrows the result to
    /// that brand rather than scoping the remote call.
    pub async fn sales_by_brand(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        time_view: TimeView,
    ) -> Result<Vec<BrandValueTarget>, FetchError> {
        let rows = match self.plan(time_view, filters) {
            PeriodPlan::Single { time_view, month } => self.brand_rows_once(measures, filters, time_view, month).await?,
            PeriodPlan::Window(months) => {
                let per_month = self
                    .fan_out(&months, |m| self.brand_rows_once(measures, filters, TimeView::Monthly, Some(m)))
                    .await?;
                let mut acc = GroupAccumulator::new();
                for rows in &per_month {
                    for row in rows {
                        acc.add(&row.brand, row.value_measure, row.target_measure);
                    }
                }
                log_window_merge("sales_by_brand", &month_tokens(&months), acc.len());
                acc.into_sums()
                    .into_iter()
                    .map(|(brand, value_measure, target_measure)| BrandValueTarget {
                        brand,
                        value_measure,
                        target_measure,
                    })
                    .collect()
            }
        };
        Ok(match &filters.brand {
            Some(brand) => rows.into_iter().filter(|r| &r.brand == brand).collect(),
            None => rows,
        })
    }

    async fn grouped_once(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        group_by: &str,
        time_view: TimeView,
        month: Option<Month>,
    ) -> Result<Vec<GroupRow>, FetchError> {
        let mut params = Map::new();
        measures.write_params(&mut params);
        filters.write_params(&VALUE_TARGET_DIMS, &mut params);
        params.insert("p_group_by".to_string(), Value::String(group_by.to_string()));
        period_params(&mut params, time_view, month);
        let value = self.call(procedures::VARIANCE_DRIVERS, params).await?;
        decode_rows(procedures::VARIANCE_DRIVERS, value)
    }

    /// Variance rows grouped by `group_by`, merged across a window's months.
    async fn grouped_variance(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        group_by: &str,
        time_view: TimeView,
    ) -> Result<Vec<VarianceDriverRow>, FetchError> {
        match self.plan(time_view, filters) {
            PeriodPlan::Single { time_view, month } => {
                let rows = self.grouped_once(measures, filters, group_by, time_view, month).await?;
                Ok(merge_grouped(&[rows]))
            }
            PeriodPlan::Window(months) => {
                let per_month = self
                    .fan_out(&months, |m| self.grouped_once(measures, filters, group_by, TimeView::Monthly, Some(m)))
                    .await?;
                let merged = merge_grouped(&per_month);
                log_window_merge(group_by, &month_tokens(&months), merged.len());
                Ok(merged)
            }
        }
    }

    /// Variance drivers at a drill level, largest absolute variance first.
    pub async fn variance_drivers(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        time_view: TimeView,
        level: DrillLevel,
    ) -> Result<Vec<VarianceDriverRow>, FetchError> {
        let mut rows = self.grouped_variance(measures, filters, level.group_by(), time_view).await?;
        sort_by_magnitude(&mut rows);
        Ok(rows)
    }

    /// Top `limit` div/sub groups by signed variance. Windows are merged
    /// before ranking so no month is ranked on its own.
    pub async fn top_div_sub(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        time_view: TimeView,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<VarianceDriverRow>, FetchError> {
        match self.plan(time_view, filters) {
            PeriodPlan::Single { time_view, month } => {
                let mut params = Map::new();
                measures.write_params(&mut params);
                filters.write_params(&VALUE_TARGET_DIMS, &mut params);
                period_params(&mut params, time_view, month);
                params.insert("p_direction".to_string(), Value::String(direction.as_str().to_string()));
                params.insert("p_limit".to_string(), Value::from(limit as u64));
                let value = self.call(procedures::TOP_DIV_SUB_VARIANCE, params).await?;
                let rows: Vec<GroupRow> = decode_rows(procedures::TOP_DIV_SUB_VARIANCE, value)?;
                // re-rank locally so ties come back in a stable order
                Ok(rank(rows.iter().map(VarianceDriverRow::from).collect(), direction, limit))
            }
            PeriodPlan::Window(_) => {
                let merged = self.grouped_variance(measures, filters, DIV_SUB_GROUP, time_view).await?;
                Ok(rank(merged, direction, limit))
            }
        }
    }

    // =========================================================================
    // Trend
    // =========================================================================

    /// Actual vs target series. Windows yield one point per month; the total
    /// view has no series.
    pub async fn sales_trend(
        &self,
        measures: &Measures,
        filters: &SalesFilters,
        time_view: TimeView,
    ) -> Result<Vec<TrendPoint>, FetchError> {
        match time_view {
            TimeView::Total => Ok(Vec::new()),
            TimeView::Monthly => {
                let mut params = Map::new();
                measures.write_params(&mut params);
                filters.write_params(&VALUE_TARGET_DIMS, &mut params);
                period_params(&mut params, TimeView::Monthly, filters.month);
                let value = self.call(procedures::SALES_TREND, params).await?;
                decode_rows(procedures::SALES_TREND, value)
            }
            TimeView::Qtd | TimeView::Ytd => {
                let months = match self.plan(time_view, filters) {
                    PeriodPlan::Window(months) => months,
                    PeriodPlan::Single { .. } => Vec::new(),
                };
                let per_month = self.value_target_by_month(measures, filters, &months).await?;
                Ok(months
                    .iter()
                    .zip(per_month)
                    .map(|(m, row)| {
                        let row = row.unwrap_or_default();
                        TrendPoint {
                            period: m.token().to_string(),
                            value_sales: row.value_sales,
                            target_sales: row.target_sales,
                        }
                    })
                    .collect())
            }
        }
    }
}

//! End-to-end scenarios: the dashboard and data client driven against an
//! in-memory backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use salesdash::config::Config;
use salesdash::error::FetchError;
use salesdash::fetchers::DataClient;
use salesdash::filters::{Measures, Month, SalesFilters, TimeView};
use salesdash::metrics::{HeadlineKpi, Metric};
use salesdash::ranking::Direction;
use salesdash::rpc::{procedures, FixtureBackend};
use salesdash::url_state::FilterConfig;
use salesdash::view::{Dashboard, LoadState};

fn measures() -> Measures {
    Measures::new("Actuals", "Plan")
}

fn client(backend: &Arc<FixtureBackend>) -> DataClient {
    DataClient::new(backend.clone(), &Config::default()).with_current_month(Month::Dec)
}

fn month_of(params: &Map<String, Value>) -> Option<&str> {
    params.get("p_month").and_then(Value::as_str)
}

// =============================================================================
// Headline metric
// =============================================================================

#[tokio::test]
async fn test_total_view_single_call() {
    let backend = Arc::new(FixtureBackend::new(|_, _| {
        Ok(json!([{"value_sales": 1000, "target_sales": 800}]))
    }));
    let metric = client(&backend)
        .metric(&measures(), &SalesFilters::default(), TimeView::Total)
        .await
        .unwrap();

    assert_eq!(metric.value, Some(1000.0));
    assert_eq!(metric.target, Some(800.0));
    assert_eq!(metric.growth, Some(25.0));
    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].procedure, procedures::SALES_VALUE_TARGET);
    assert_eq!(calls[0].param("p_time_view"), Some("total"));
}

#[tokio::test]
async fn test_ytd_merges_months_regardless_of_completion_order() {
    let backend = Arc::new(
        FixtureBackend::new(|_, params| {
            Ok(match month_of(params) {
                Some("JAN") => json!([{"value_sales": 100, "target_sales": 90}]),
                Some("FEB") => json!([{"value_sales": 110, "target_sales": 90}]),
                Some("MAR") => json!([{"value_sales": 120, "target_sales": 90}]),
                _ => json!([]),
            })
        })
        // January answers last
        .with_delay(|_, params| match month_of(params) {
            Some("JAN") => Duration::from_millis(60),
            Some("FEB") => Duration::from_millis(10),
            _ => Duration::from_millis(30),
        }),
    );
    let filters = SalesFilters {
        month: Some(Month::Mar),
        ..Default::default()
    };
    let started = Instant::now();
    let metric = client(&backend)
        .metric(&measures(), &filters, TimeView::Ytd)
        .await
        .unwrap();
    // one after another this would take 60 + 10 + 30 ms
    assert!(started.elapsed() < Duration::from_millis(95), "took {:?}", started.elapsed());

    assert_eq!(metric.value, Some(330.0));
    assert_eq!(metric.target, Some(270.0));
    let growth = metric.growth.unwrap();
    assert!((growth - 22.222).abs() < 0.01, "growth {}", growth);

    let mut months: Vec<String> = backend
        .calls()
        .iter()
        .map(|c| c.param("p_month").unwrap_or_default().to_string())
        .collect();
    months.sort();
    assert_eq!(months, vec!["FEB", "JAN", "MAR"]);
    assert!(backend.calls().iter().all(|c| c.param("p_time_view") == Some("monthly")));
}

#[tokio::test]
async fn test_reversed_qtd_is_null_metric() {
    let backend = Arc::new(FixtureBackend::empty());
    let filters = SalesFilters {
        qtd_start: Some(Month::Jun),
        qtd_end: Some(Month::Apr),
        ..Default::default()
    };
    let metric = client(&backend)
        .metric(&measures(), &filters, TimeView::Qtd)
        .await
        .unwrap();
    assert_eq!(metric, Metric::EMPTY);
    assert!(metric.is_empty());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_identical_requests_share_one_call() {
    let backend = Arc::new(
        FixtureBackend::new(|_, _| Ok(json!([{"value_sales": 5, "target_sales": 5}])))
            .with_delay(|_, _| Duration::from_millis(10)),
    );
    let client = client(&backend);
    let filters = SalesFilters::default();
    let m = measures();
    let (a, b) = tokio::join!(
        client.metric(&m, &filters, TimeView::Total),
        client.metric(&m, &filters, TimeView::Total),
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(backend.calls().len(), 1);

    // a different filter tuple is a different request
    let other = filters.clone().with(salesdash::filters::Dimension::Brand, "Acme");
    client.metric(&m, &other, TimeView::Total).await.unwrap();
    assert_eq!(backend.calls().len(), 2);
}

// =============================================================================
// Top-N
// =============================================================================

#[tokio::test]
async fn test_top_n_keeps_limit_in_order() {
    let backend = Arc::new(FixtureBackend::new(|_, _| {
        let rows: Vec<Value> = [("a", 5), ("b", -3), ("c", 12), ("d", 0), ("e", 7), ("f", -9), ("g", 1), ("h", 9)]
            .iter()
            .map(|(k, v)| json!({"group_value": k, "value_sales": 100 + v, "target_sales": 100}))
            .collect();
        Ok(Value::Array(rows))
    }));
    let top = client(&backend)
        .top_div_sub(&measures(), &SalesFilters::default(), TimeView::Total, Direction::Winners, 5)
        .await
        .unwrap();
    let keys: Vec<&str> = top.iter().map(|r| r.group_value.as_str()).collect();
    assert_eq!(keys, vec!["c", "h", "e", "a", "g"]);
}

// =============================================================================
// Dashboard
// =============================================================================

fn configured(time_view: TimeView) -> FilterConfig {
    FilterConfig {
        value_measure: "Actuals".to_string(),
        target_measure: "Plan".to_string(),
        time_view,
        ..Default::default()
    }
}

fn healthy_except_trend(procedure: &str, _: &Map<String, Value>) -> Result<Value, FetchError> {
    match procedure {
        procedures::SALES_TREND => Err(FetchError::Remote {
            procedure: procedure.to_string(),
            status: 503,
            message: "unavailable".to_string(),
        }),
        procedures::SALES_VALUE_TARGET => Ok(json!([{"value_sales": 120, "target_sales": 100}])),
        procedures::SALES_BY_BRAND => Ok(json!([{"brand": "Acme", "value_measure": 120, "target_measure": 100}])),
        procedures::FILTERED_BRANDS => Ok(json!([{"brand": "Acme"}])),
        _ => Ok(json!([])),
    }
}

#[tokio::test]
async fn test_failing_panel_does_not_block_others() {
    let backend = Arc::new(FixtureBackend::new(healthy_except_trend));
    let client = client(&backend);
    let mut dash = Dashboard::new(configured(TimeView::Monthly), 5);
    dash.refresh(&client).await;

    assert!(matches!(dash.trend.state(), LoadState::Failed(msg) if msg.contains("unavailable")));
    let kpi = dash.headline.state().ready().copied().unwrap();
    assert_eq!(kpi.variance, Some(20.0));
    assert_eq!(kpi.variance_pct, Some(20.0));
    assert_eq!(dash.brand_chart.state().ready().map(Vec::len), Some(1));
    assert_eq!(*dash.variance.state(), LoadState::Empty);
    let options = &dash.options;
    assert_eq!(options.brands.state().ready().unwrap(), &vec!["All", "Acme"]);
    assert_eq!(options.categories.state().ready().unwrap(), &vec!["All"]);
    assert!(!options.value_measures.state().ready().unwrap().contains(&"Plan".to_string()));
    assert!(options.target_measures.state().ready().unwrap().contains(&"Plan".to_string()));
}

#[tokio::test]
async fn test_failing_option_list_leaves_other_lists_ready() {
    let backend = Arc::new(FixtureBackend::new(|procedure, params| match procedure {
        procedures::FILTERED_SUBBRANDS => Err(FetchError::Remote {
            procedure: procedure.to_string(),
            status: 500,
            message: "relation missing".to_string(),
        }),
        procedures::FILTER_OPTIONS if params.get("column_name").and_then(Value::as_str) == Some("measures") => {
            Ok(json!(["Actuals", "Plan", "Forecast"]))
        }
        procedures::FILTERED_BRANDS => Ok(json!([{"brand": "Acme"}, {"brand": "Zen"}])),
        _ => Ok(json!([])),
    }));
    let client = client(&backend);
    let mut dash = Dashboard::new(configured(TimeView::Total), 5);
    dash.refresh(&client).await;

    let options = &dash.options;
    assert!(matches!(options.sub_brands.state(), LoadState::Failed(msg) if msg.contains("relation missing")));
    assert_eq!(options.brands.state().ready().unwrap(), &vec!["All", "Acme", "Zen"]);
    assert_eq!(options.divisions.state().ready().unwrap(), &vec!["All"]);
    assert_eq!(options.value_measures.state().ready().unwrap(), &vec!["Actuals", "Forecast"]);
    assert_eq!(options.target_measures.state().ready().unwrap(), &vec!["Plan", "Forecast"]);
    assert_eq!(*dash.headline.state(), LoadState::Empty);
}

#[tokio::test]
async fn test_missing_measures_leave_panels_idle() {
    let backend = Arc::new(FixtureBackend::empty());
    let client = client(&backend);
    let mut dash = Dashboard::new(FilterConfig::default(), 5);
    dash.refresh(&client).await;

    assert_eq!(*dash.headline.state(), LoadState::Idle);
    assert_eq!(*dash.top.state(), LoadState::Idle);
    // option lists do not need measures
    assert!(backend
        .calls()
        .iter()
        .all(|c| c.procedure.starts_with("get_filter")));
    assert!(backend.calls_to(procedures::SALES_VALUE_TARGET).is_empty());
}

#[tokio::test]
async fn test_total_view_has_no_trend() {
    let backend = Arc::new(FixtureBackend::new(healthy_except_trend));
    let client = client(&backend);
    let mut dash = Dashboard::new(configured(TimeView::Total), 5);
    dash.refresh(&client).await;
    assert_eq!(*dash.trend.state(), LoadState::Idle);
    assert!(backend.calls_to(procedures::SALES_TREND).is_empty());
}

#[tokio::test]
async fn test_drill_scopes_variance_request() {
    let backend = Arc::new(FixtureBackend::empty());
    let client = client(&backend);
    let mut dash = Dashboard::new(configured(TimeView::Total), 5);
    dash.click("Acme");
    dash.refresh(&client).await;

    let calls = backend.calls_to(procedures::VARIANCE_DRIVERS);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].param("p_brand"), Some("Acme"));
    assert_eq!(calls[0].param("p_group_by"), Some("category"));
}

#[tokio::test]
async fn test_late_response_for_old_filters_is_discarded() {
    let backend = Arc::new(FixtureBackend::new(|_, params| {
        Ok(match params.get("p_brand").and_then(Value::as_str) {
            Some("Old") => json!([{"value_sales": 1, "target_sales": 1}]),
            _ => json!([{"value_sales": 9, "target_sales": 3}]),
        })
    }));
    let client = client(&backend);
    let mut dash = Dashboard::new(configured(TimeView::Total), 5);

    let old_filters = SalesFilters::default().with(salesdash::filters::Dimension::Brand, "Old");
    let old = dash.headline.begin("brand=Old".to_string());
    let new = dash.headline.begin("brand=New".to_string());

    let fresh = client.metric(&measures(), &SalesFilters::default(), TimeView::Total).await;
    assert!(dash.headline.resolve(new, fresh.map(HeadlineKpi::from)));
    let late = client.metric(&measures(), &old_filters, TimeView::Total).await;
    assert!(!dash.headline.resolve(old, late.map(HeadlineKpi::from)));

    assert_eq!(dash.headline.state().ready().and_then(|k| k.value), Some(9.0));
}

#[tokio::test]
async fn test_setters_change_the_next_refresh() {
    let backend = Arc::new(FixtureBackend::new(|_, params| {
        Ok(match params.get("p_brand").and_then(Value::as_str) {
            Some("Acme") => json!([{"value_sales": 50, "target_sales": 40}]),
            _ => json!([{"value_sales": 10, "target_sales": 10}]),
        })
    }));
    let client = client(&backend);
    let mut dash = Dashboard::new(configured(TimeView::Total), 5);
    dash.refresh(&client).await;
    assert_eq!(dash.headline.state().ready().and_then(|k| k.value), Some(10.0));

    dash.set_direction(Direction::Losers);
    dash.set_top_n_limit(3);
    dash.set_config(FilterConfig {
        brand: "Acme".to_string(),
        ..configured(TimeView::Total)
    });
    dash.refresh(&client).await;

    let top_calls = backend.calls_to(procedures::TOP_DIV_SUB_VARIANCE);
    let last_top = top_calls.last().unwrap();
    assert_eq!(last_top.param("p_direction"), Some("losers"));
    assert_eq!(last_top.params["p_limit"], 3);
    let headline_calls = backend.calls_to(procedures::SALES_VALUE_TARGET);
    assert_eq!(headline_calls.last().unwrap().param("p_brand"), Some("Acme"));
    assert_eq!(dash.headline.state().ready().and_then(|k| k.value), Some(50.0));
    assert_eq!(dash.snapshot().direction, Direction::Losers);
}

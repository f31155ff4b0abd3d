//! Dashboard view state: filter config, drill state and one slot per panel.
//!
//! Each panel tracks the request it is waiting for. A response is applied
//! only if its ticket is still the panel's current one, so a slow answer to
//! an old filter tuple can never overwrite a newer result.

use serde::{Serialize, Serializer};
use serde_json::json;

use crate::drill::{action_for_click, reduce, DrillAction, DrillLevel, DrillState};
use crate::error::FetchError;
use crate::fetchers::DataClient;
use crate::filters::{Measures, SalesFilters, TimeView};
use crate::logging::{log_drill, log_panel};
use crate::metrics::{BrandValueTarget, HeadlineKpi, TrendPoint, VarianceDriverRow};
use crate::options::{measure_options, scope_for, with_all_option, OptionDimension};
use crate::ranking::Direction;
use crate::url_state::FilterConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum LoadState<T> {
    /// Nothing to fetch yet, e.g. measures not selected.
    Idle,
    Loading,
    Ready(T),
    Empty,
    Failed(String),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            LoadState::Ready(v) => Some(v),
            _ => None,
        }
    }
}

/// Whether a successful response has anything to show.
pub trait PanelData {
    fn has_data(&self) -> bool;
}

impl<T> PanelData for Vec<T> {
    fn has_data(&self) -> bool {
        !self.is_empty()
    }
}

impl PanelData for HeadlineKpi {
    fn has_data(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    key: String,
}

#[derive(Debug, Clone)]
pub struct Panel<T> {
    name: &'static str,
    generation: u64,
    key: Option<String>,
    state: LoadState<T>,
}

impl<T: PanelData> Panel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            key: None,
            state: LoadState::Idle,
        }
    }

    pub fn state(&self) -> &LoadState<T> {
        &self.state
    }

    /// Start waiting for the request identified by `key`.
    pub fn begin(&mut self, key: String) -> Ticket {
        self.generation += 1;
        self.key = Some(key.clone());
        self.state = LoadState::Loading;
        log_panel(self.name, "loading", self.generation);
        Ticket {
            generation: self.generation,
            key,
        }
    }

    /// Nothing to request. Any outstanding ticket is invalidated.
    pub fn idle(&mut self) {
        self.generation += 1;
        self.key = None;
        self.state = LoadState::Idle;
    }

    /// Apply a response. Returns `false` when the ticket is stale.
    pub fn resolve(&mut self, ticket: Ticket, result: Result<T, FetchError>) -> bool {
        if ticket.generation != self.generation || self.key.as_deref() != Some(ticket.key.as_str()) {
            log_panel(self.name, "stale", ticket.generation);
            return false;
        }
        self.state = match result {
            Ok(v) if v.has_data() => LoadState::Ready(v),
            Ok(_) => LoadState::Empty,
            Err(e) => LoadState::Failed(e.to_string()),
        };
        let outcome = match &self.state {
            LoadState::Ready(_) => "ready",
            LoadState::Empty => "empty",
            _ => "failed",
        };
        log_panel(self.name, outcome, self.generation);
        true
    }
}

impl<T: Serialize> Serialize for Panel<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.state.serialize(serializer)
    }
}

fn request_key(panel: &str, filters: &SalesFilters, measures: Option<&Measures>, extra: serde_json::Value) -> String {
    json!({
        "panel": panel,
        "filters": filters,
        "measures": measures,
        "extra": extra,
    })
    .to_string()
}

pub struct Dashboard {
    config: FilterConfig,
    drill: DrillState,
    direction: Direction,
    top_n_limit: usize,
    pub headline: Panel<HeadlineKpi>,
    pub variance: Panel<Vec<VarianceDriverRow>>,
    pub top: Panel<Vec<VarianceDriverRow>>,
    pub brand_chart: Panel<Vec<BrandValueTarget>>,
    pub trend: Panel<Vec<TrendPoint>>,
    pub options: OptionPanels,
}

impl Dashboard {
    pub fn new(config: FilterConfig, top_n_limit: usize) -> Self {
        Self {
            config,
            drill: DrillState::default(),
            direction: Direction::default(),
            top_n_limit,
            headline: Panel::new("headline"),
            variance: Panel::new("variance_drivers"),
            top: Panel::new("top_div_sub"),
            brand_chart: Panel::new("brand_chart"),
            trend: Panel::new("trend"),
            options: OptionPanels::new(),
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: FilterConfig) {
        self.config = config;
    }

    pub fn drill(&self) -> &DrillState {
        &self.drill
    }

    pub fn dispatch(&mut self, action: DrillAction) {
        let name = action.name();
        self.drill = reduce(&self.drill, action);
        log_drill(name, self.drill.level().group_by());
    }

    /// Drill into a bar clicked on the variance chart at the current level.
    pub fn click(&mut self, name: &str) {
        if let Some(action) = action_for_click(self.drill.level(), name) {
            self.dispatch(action);
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn set_top_n_limit(&mut self, limit: usize) {
        self.top_n_limit = limit;
    }

    /// Refetch every panel for the current config and drill state. Panels
    /// are fetched concurrently and resolved one by one, so a failing panel
    /// leaves the others intact.
    pub async fn refresh(&mut self, client: &DataClient) {
        let base = self.config.to_filters();
        let measures = self.config.measures();
        let time_view = self.config.time_view;
        let level = self.drill.level();
        let drill_filters = self.drill.scope(&base);
        let top_filters = self.drill.scope_all(&base);
        let direction = self.direction;
        let limit = self.top_n_limit;
        let ready = measures.is_some();
        let tv = json!(time_view);

        let headline_t = begin_or_idle(
            &mut self.headline,
            ready,
            request_key("headline", &base, measures.as_ref(), tv.clone()),
        );
        let variance_t = begin_or_idle(
            &mut self.variance,
            ready,
            request_key("variance", &drill_filters, measures.as_ref(), json!([time_view, level])),
        );
        let top_t = begin_or_idle(
            &mut self.top,
            ready,
            request_key("top", &top_filters, measures.as_ref(), json!([time_view, direction, limit])),
        );
        let brand_t = begin_or_idle(
            &mut self.brand_chart,
            ready,
            request_key("brand_chart", &base, measures.as_ref(), tv.clone()),
        );
        // no series for the whole-period view
        let trend_t = begin_or_idle(
            &mut self.trend,
            ready && time_view != TimeView::Total,
            request_key("trend", &base, measures.as_ref(), tv),
        );

        let m = measures.as_ref();
        let (headline, variance, top, brand, trend, ()) = tokio::join!(
            async {
                match (m, &headline_t) {
                    (Some(m), Some(_)) => Some(client.metric(m, &base, time_view).await.map(HeadlineKpi::from)),
                    _ => None,
                }
            },
            async {
                match (m, &variance_t) {
                    (Some(m), Some(_)) => Some(client.variance_drivers(m, &drill_filters, time_view, level).await),
                    _ => None,
                }
            },
            async {
                match (m, &top_t) {
                    (Some(m), Some(_)) => Some(client.top_div_sub(m, &top_filters, time_view, direction, limit).await),
                    _ => None,
                }
            },
            async {
                match (m, &brand_t) {
                    (Some(m), Some(_)) => Some(client.sales_by_brand(m, &base, time_view).await),
                    _ => None,
                }
            },
            async {
                match (m, &trend_t) {
                    (Some(m), Some(_)) => Some(client.sales_trend(m, &base, time_view).await),
                    _ => None,
                }
            },
            self.options.refresh(client, &self.config, &base),
        );

        if let (Some(t), Some(r)) = (headline_t, headline) {
            self.headline.resolve(t, r);
        }
        if let (Some(t), Some(r)) = (variance_t, variance) {
            self.variance.resolve(t, r);
        }
        if let (Some(t), Some(r)) = (top_t, top) {
            self.top.resolve(t, r);
        }
        if let (Some(t), Some(r)) = (brand_t, brand) {
            self.brand_chart.resolve(t, r);
        }
        if let (Some(t), Some(r)) = (trend_t, trend) {
            self.trend.resolve(t, r);
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot<'_> {
        DashboardSnapshot {
            config: &self.config,
            time_view_label: self.config.time_view.label(),
            drill_level: self.drill.level(),
            variance_title: self.drill.level().title(),
            drill_chips: self.drill.chips(),
            direction: self.direction,
            headline: self.headline.state(),
            variance_drivers: self.variance.state(),
            top_div_sub: self.top.state(),
            brand_chart: self.brand_chart.state(),
            trend: self.trend.state(),
            options: &self.options,
        }
    }
}

/// Measure-dependent panels go idle until both measures are picked.
fn begin_or_idle<T: PanelData>(panel: &mut Panel<T>, ready: bool, key: String) -> Option<Ticket> {
    if ready {
        Some(panel.begin(key))
    } else {
        panel.idle();
        None
    }
}

/// Slicer option lists. Each list is its own panel, so one failing option
/// procedure leaves the other slicers usable.
#[derive(Debug, Serialize)]
pub struct OptionPanels {
    pub value_measures: Panel<Vec<String>>,
    pub target_measures: Panel<Vec<String>>,
    pub divisions: Panel<Vec<String>>,
    pub brands: Panel<Vec<String>>,
    pub categories: Panel<Vec<String>>,
    pub locations: Panel<Vec<String>>,
    pub sub_brands: Panel<Vec<String>>,
}

impl OptionPanels {
    fn new() -> Self {
        Self {
            value_measures: Panel::new("value_measures"),
            target_measures: Panel::new("target_measures"),
            divisions: Panel::new("divisions"),
            brands: Panel::new("brands"),
            categories: Panel::new("categories"),
            locations: Panel::new("locations"),
            sub_brands: Panel::new("sub_brands"),
        }
    }

    async fn refresh(&mut self, client: &DataClient, config: &FilterConfig, filters: &SalesFilters) {
        let scoped = |dim: OptionDimension| {
            request_key(dim.column(), &scope_for(dim, filters), None, json!(null))
        };
        let value_t = self.value_measures.begin(format!("measures:{}", config.target_measure));
        let target_t = self.target_measures.begin(format!("measures:{}", config.value_measure));
        let division_t = self.divisions.begin("division".to_string());
        let brand_t = self.brands.begin(scoped(OptionDimension::Brand));
        let category_t = self.categories.begin(scoped(OptionDimension::Category));
        let location_t = self.locations.begin(scoped(OptionDimension::Location));
        let sub_brand_t = self.sub_brands.begin(scoped(OptionDimension::SubBrand));

        let (measures, divisions, brands, categories, locations, sub_brands) = tokio::join!(
            client.filter_options("measures"),
            client.filter_options("division"),
            client.available_options(OptionDimension::Brand, filters),
            client.available_options(OptionDimension::Category, filters),
            client.available_options(OptionDimension::Location, filters),
            client.available_options(OptionDimension::SubBrand, filters),
        );

        let with_all = |r: Result<Vec<String>, FetchError>| r.map(|opts| with_all_option(&opts));
        self.value_measures.resolve(
            value_t,
            measures.clone().map(|m| measure_options(&m, Some(config.target_measure.as_str()))),
        );
        self.target_measures.resolve(
            target_t,
            measures.map(|m| measure_options(&m, Some(config.value_measure.as_str()))),
        );
        self.divisions.resolve(division_t, with_all(divisions));
        self.brands.resolve(brand_t, with_all(brands));
        self.categories.resolve(category_t, with_all(categories));
        self.locations.resolve(location_t, with_all(locations));
        self.sub_brands.resolve(sub_brand_t, with_all(sub_brands));
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardSnapshot<'a> {
    pub config: &'a FilterConfig,
    pub time_view_label: &'static str,
    pub drill_level: DrillLevel,
    pub variance_title: &'static str,
    pub drill_chips: Vec<(&'static str, &'a str)>,
    pub direction: Direction,
    pub headline: &'a LoadState<HeadlineKpi>,
    pub variance_drivers: &'a LoadState<Vec<VarianceDriverRow>>,
    pub top_div_sub: &'a LoadState<Vec<VarianceDriverRow>>,
    pub brand_chart: &'a LoadState<Vec<BrandValueTarget>>,
    pub trend: &'a LoadState<Vec<TrendPoint>>,
    pub options: &'a OptionPanels,
}

//! Filter configuration carried in the `filters` query parameter.
//!
//! The config is JSON encoded, then percent-encoded. Anything that fails to
//! decode yields the default config. Writing the default config removes the
//! parameter so a clean dashboard has a clean URL.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::filters::{Dimension, Measures, Month, SalesFilters, TimeView};
use crate::options::ALL_OPTION;

pub const FILTERS_PARAM: &str = "filters";

/// Unselected measure.
pub const BLANK: &str = "blank";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    pub month: String,
    pub division: String,
    pub brand: String,
    pub category: String,
    pub location: String,
    pub value_measure: String,
    pub target_measure: String,
    pub time_view: TimeView,
    #[serde(rename = "qtdStartMonth", skip_serializing_if = "Option::is_none")]
    pub qtd_start: Option<Month>,
    #[serde(rename = "qtdEndMonth", skip_serializing_if = "Option::is_none")]
    pub qtd_end: Option<Month>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            month: ALL_OPTION.to_string(),
            division: ALL_OPTION.to_string(),
            brand: ALL_OPTION.to_string(),
            category: ALL_OPTION.to_string(),
            location: ALL_OPTION.to_string(),
            value_measure: BLANK.to_string(),
            target_measure: BLANK.to_string(),
            time_view: TimeView::Total,
            qtd_start: None,
            qtd_end: None,
        }
    }
}

fn selected(value: &str, sentinel: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == sentinel {
        None
    } else {
        Some(value.to_string())
    }
}

impl FilterConfig {
    /// Remote filter tuple for the value side. Sentinels become `None`.
    pub fn to_filters(&self) -> SalesFilters {
        let mut f = SalesFilters {
            measure: selected(&self.value_measure, BLANK),
            qtd_start: self.qtd_start,
            qtd_end: self.qtd_end,
            ..Default::default()
        };
        f.set(Dimension::Division, selected(&self.division, ALL_OPTION).as_deref());
        f.set(Dimension::Brand, selected(&self.brand, ALL_OPTION).as_deref());
        f.set(Dimension::Category, selected(&self.category, ALL_OPTION).as_deref());
        f.set(Dimension::Location, selected(&self.location, ALL_OPTION).as_deref());
        f.set(Dimension::Month, selected(&self.month, ALL_OPTION).as_deref());
        f
    }

    /// Both measures, or `None` while either is unselected.
    pub fn measures(&self) -> Option<Measures> {
        let value = selected(&self.value_measure, BLANK)?;
        let target = selected(&self.target_measure, BLANK)?;
        Some(Measures::new(value, target))
    }

    pub fn set_qtd_start(&mut self, month: Month) {
        self.qtd_start = Some(month);
        if self.qtd_end.is_some_and(|end| end < month) {
            self.qtd_end = Some(month);
        }
    }

    pub fn set_qtd_end(&mut self, month: Month) {
        // an end before the start is pulled up to the start
        self.qtd_end = Some(match self.qtd_start {
            Some(start) if month < start => start,
            _ => month,
        });
    }

    pub fn is_default(&self) -> bool {
        *self == FilterConfig::default()
    }
}

/// Percent-encoded JSON for the `filters` parameter value.
pub fn encode(config: &FilterConfig) -> String {
    let json = serde_json::to_string(config).unwrap_or_default();
    form_urlencoded::byte_serialize(json.as_bytes()).collect()
}

/// Decode a raw (still percent-encoded) parameter value.
pub fn decode(raw: &str) -> FilterConfig {
    percent_decode(raw)
        .and_then(|json| parse_config(&json))
        .unwrap_or_default()
}

fn percent_decode(raw: &str) -> Option<String> {
    let pair = format!("{}={}", FILTERS_PARAM, raw);
    form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
}

/// Links built by encoding the param twice still parse after one more
/// decode pass.
fn parse_config(json: &str) -> Option<FilterConfig> {
    serde_json::from_str(json)
        .ok()
        .or_else(|| percent_decode(json).and_then(|again| serde_json::from_str(&again).ok()))
}

/// Read the config from a query string, with or without the leading `?`.
pub fn from_query(query: &str) -> FilterConfig {
    let query = query.trim_start_matches('?');
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == FILTERS_PARAM)
        .and_then(|(_, json)| parse_config(&json))
        .unwrap_or_default()
}

/// Rewrite `query` with `config`, keeping unrelated parameters. The default
/// config removes the `filters` parameter.
pub fn to_query(query: &str, config: &FilterConfig) -> String {
    let query = query.trim_start_matches('?');
    let mut out = form_urlencoded::Serializer::new(String::new());
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        if k != FILTERS_PARAM {
            out.append_pair(&k, &v);
        }
    }
    if !config.is_default() {
        if let Ok(json) = serde_json::to_string(config) {
            out.append_pair(FILTERS_PARAM, &json);
        }
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FilterConfig {
        FilterConfig {
            brand: "Acme & Co".to_string(),
            value_measure: "2025 Plan".to_string(),
            target_measure: "2024 Actuals".to_string(),
            time_view: TimeView::Qtd,
            qtd_start: Some(Month::Jan),
            qtd_end: Some(Month::Mar),
            ..Default::default()
        }
    }

    #[test]
    fn test_sentinels_map_to_none() {
        let f = FilterConfig::default().to_filters();
        assert_eq!(f, SalesFilters::default());
        assert!(FilterConfig::default().measures().is_none());

        let f = sample().to_filters();
        assert_eq!(f.brand.as_deref(), Some("Acme & Co"));
        assert_eq!(f.measure.as_deref(), Some("2025 Plan"));
        assert_eq!(f.division, None);
        assert_eq!(sample().measures(), Some(Measures::new("2025 Plan", "2024 Actuals")));
    }

    #[test]
    fn test_query_round_trip() {
        let q = to_query("tab=sales", &sample());
        assert!(q.starts_with("tab=sales&filters="));
        assert_eq!(from_query(&q), sample());

        let raw = encode(&sample());
        assert_eq!(decode(&raw), sample());
    }

    #[test]
    fn test_default_removes_param() {
        let q = to_query("?tab=sales&filters=%7B%7D", &FilterConfig::default());
        assert_eq!(q, "tab=sales");
    }

    #[test]
    fn test_bad_input_falls_back_to_default() {
        assert_eq!(decode("%7Bnot-json"), FilterConfig::default());
        assert_eq!(from_query("filters=garbage"), FilterConfig::default());
        assert_eq!(from_query(""), FilterConfig::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let cfg = from_query("filters=%7B%22brand%22%3A%22Zen%22%7D");
        assert_eq!(cfg.brand, "Zen");
        assert_eq!(cfg.division, ALL_OPTION);
        assert_eq!(cfg.time_view, TimeView::Total);
    }

    #[test]
    fn test_double_encoded_param_still_parses() {
        let cfg = from_query("filters=%257B%2522brand%2522%253A%2522Zen%2522%257D");
        assert_eq!(cfg.brand, "Zen");
        assert_eq!(decode("%257B%2522brand%2522%253A%2522Zen%2522%257D").brand, "Zen");
        // a third layer is not unwrapped
        assert_eq!(from_query("filters=%25257B%25257D"), FilterConfig::default());
    }

    #[test]
    fn test_qtd_bounds_stay_ordered() {
        let mut cfg = FilterConfig::default();
        cfg.set_qtd_end(Month::Feb);
        cfg.set_qtd_start(Month::Apr);
        assert_eq!(cfg.qtd_end, Some(Month::Apr));
        cfg.set_qtd_end(Month::Jan);
        assert_eq!(cfg.qtd_end, Some(Month::Apr));
        cfg.set_qtd_end(Month::Jun);
        assert_eq!((cfg.qtd_start, cfg.qtd_end), (Some(Month::Apr), Some(Month::Jun)));
    }
}

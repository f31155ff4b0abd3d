//! Slicer option lists.
//!
//! Each dimension's options are scoped by the *other* selected filters and
//! never by its own selection, so choosing a brand narrows the category list
//! but leaves the brand list intact.

use serde_json::{Map, Value};

use crate::filters::{Dimension, SalesFilters};
use crate::rpc::procedures;

pub const ALL_OPTION: &str = "All";

/// Used when the backend has no measures to offer.
pub const DEFAULT_MEASURES: [&str; 4] = ["Actuals", "Plan", "Forecast", "Prior Year Actuals"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionDimension {
    Brand,
    Category,
    Location,
    SubBrand,
}

impl OptionDimension {
    pub fn procedure(self) -> &'static str {
        match self {
            OptionDimension::Brand => procedures::FILTERED_BRANDS,
            OptionDimension::Category => procedures::FILTERED_CATEGORIES,
            OptionDimension::Location => procedures::FILTERED_LOCATIONS,
            OptionDimension::SubBrand => procedures::FILTERED_SUBBRANDS,
        }
    }

    /// Column holding the option value in each result row.
    pub fn column(self) -> &'static str {
        match self {
            OptionDimension::Brand => "brand",
            OptionDimension::Category => "category",
            OptionDimension::Location => "location",
            OptionDimension::SubBrand => "sub_brand",
        }
    }

    pub fn dimension(self) -> Dimension {
        match self {
            OptionDimension::Brand => Dimension::Brand,
            OptionDimension::Category => Dimension::Category,
            OptionDimension::Location => Dimension::Location,
            OptionDimension::SubBrand => Dimension::SubBrand,
        }
    }

    /// Dimensions the option procedure is scoped by.
    pub fn scoped_by(self) -> &'static [Dimension] {
        match self {
            OptionDimension::Brand => &[
                Dimension::Measure,
                Dimension::Division,
                Dimension::Category,
                Dimension::Location,
                Dimension::Month,
            ],
            OptionDimension::Category => &[
                Dimension::Measure,
                Dimension::Division,
                Dimension::Brand,
                Dimension::Location,
                Dimension::Month,
            ],
            OptionDimension::Location => &[
                Dimension::Measure,
                Dimension::Division,
                Dimension::Brand,
                Dimension::Category,
                Dimension::Month,
            ],
            OptionDimension::SubBrand => &[
                Dimension::Measure,
                Dimension::Division,
                Dimension::Brand,
                Dimension::Category,
                Dimension::Location,
                Dimension::Month,
            ],
        }
    }

    /// Remote params for this option list. These double as the cache key, so
    /// any change to a scoping filter yields a new request.
    pub fn params(self, filters: &SalesFilters) -> Map<String, Value> {
        let mut params = Map::new();
        scope_for(self, filters).write_params(self.scoped_by(), &mut params);
        params
    }
}

/// The subset of `filters` that scopes `dim`'s option list.
pub fn scope_for(dim: OptionDimension, filters: &SalesFilters) -> SalesFilters {
    let mut scoped = SalesFilters::default();
    for d in dim.scoped_by() {
        scoped.set(*d, filters.get(*d).as_deref());
    }
    scoped
}

/// Prepend the "All" sentinel and drop blanks.
pub fn with_all_option(options: &[String]) -> Vec<String> {
    let mut out = vec![ALL_OPTION.to_string()];
    out.extend(
        options
            .iter()
            .filter(|o| !o.trim().is_empty() && o.as_str() != ALL_OPTION)
            .cloned(),
    );
    out
}

/// Measures selectable on one side, excluding the one picked on the other
/// side. Falls back to [`DEFAULT_MEASURES`] when the backend returned none.
pub fn measure_options(available: &[String], other_selected: Option<&str>) -> Vec<String> {
    let base: Vec<String> = if available.iter().all(|m| m.trim().is_empty()) {
        DEFAULT_MEASURES.iter().map(|m| m.to_string()).collect()
    } else {
        available.iter().filter(|m| !m.trim().is_empty()).cloned().collect()
    };
    base.into_iter()
        .filter(|m| Some(m.as_str()) != other_selected)
        .collect()
}

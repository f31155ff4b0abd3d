//! Remote aggregate procedures.
//!
//! Every read goes through [`SalesBackend::call`]: a named procedure, named
//! params, a JSON result. The procedures themselves live in the database.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::FetchError;

mod fixture;
mod supabase;

pub use fixture::{FixtureBackend, RecordedCall};
pub use supabase::SupabaseBackend;

pub mod procedures {
    pub const FILTER_OPTIONS: &str = "get_filter_options";
    pub const FILTERED_BRANDS: &str = "get_filtered_brands";
    pub const FILTERED_CATEGORIES: &str = "get_filtered_categories";
    pub const FILTERED_LOCATIONS: &str = "get_filtered_locations";
    pub const FILTERED_SUBBRANDS: &str = "get_filtered_subbrands";
    pub const SALES_VALUE_TARGET: &str = "get_sales_value_target";
    pub const SALES_BY_BRAND: &str = "get_sales_by_brand";
    pub const VARIANCE_DRIVERS: &str = "get_variance_drivers";
    pub const TOP_DIV_SUB_VARIANCE: &str = "get_top_div_sub_variance";
    pub const SALES_TREND: &str = "get_sales_trend";
}

#[async_trait]
pub trait SalesBackend: Send + Sync {
    /// Invoke a read-only procedure. Absent optional params must already be
    /// left out of `params`.
    async fn call(&self, procedure: &str, params: &Map<String, Value>) -> Result<Value, FetchError>;
}

//! Drill-down selection: brand ⊇ category ⊇ sub-brand.
//!
//! Pure reducer `(state, action) -> state`. Selecting or clearing a level
//! always clears every level below it, so a deeper selection can never
//! outlive the scope it was made in. Every action is valid in every state.

use serde::{Deserialize, Serialize};

use crate::filters::{Dimension, SalesFilters};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrillState {
    pub brand: Option<String>,
    pub category: Option<String>,
    pub sub_brand: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrillAction {
    SelectBrand(String),
    SelectCategory(String),
    SelectSubBrand(String),
    ClearBrand,
    ClearCategory,
    ClearSubBrand,
    ClearAll,
}

impl DrillAction {
    pub fn name(&self) -> &'static str {
        match self {
            DrillAction::SelectBrand(_) => "select_brand",
            DrillAction::SelectCategory(_) => "select_category",
            DrillAction::SelectSubBrand(_) => "select_sub_brand",
            DrillAction::ClearBrand => "clear_brand",
            DrillAction::ClearCategory => "clear_category",
            DrillAction::ClearSubBrand => "clear_sub_brand",
            DrillAction::ClearAll => "clear_all",
        }
    }
}

/// Grouping dimension shown at the current drill depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrillLevel {
    Brand,
    Category,
    SubBrand,
}

impl DrillLevel {
    /// `p_group_by` value for grouped variance queries.
    pub fn group_by(self) -> &'static str {
        match self {
            DrillLevel::Brand => "brand",
            DrillLevel::Category => "category",
            DrillLevel::SubBrand => "sub_brand",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DrillLevel::Brand => "Variance Drivers by Brand",
            DrillLevel::Category => "Variance Drivers by Category",
            DrillLevel::SubBrand => "Variance Drivers by Sub-brand",
        }
    }
}

pub fn reduce(state: &DrillState, action: DrillAction) -> DrillState {
    match action {
        DrillAction::SelectBrand(brand) => DrillState {
            brand: Some(brand),
            category: None,
            sub_brand: None,
        },
        DrillAction::SelectCategory(category) => DrillState {
            brand: state.brand.clone(),
            category: Some(category),
            sub_brand: None,
        },
        DrillAction::SelectSubBrand(sub_brand) => DrillState {
            brand: state.brand.clone(),
            category: state.category.clone(),
            sub_brand: Some(sub_brand),
        },
        DrillAction::ClearBrand | DrillAction::ClearAll => DrillState::default(),
        DrillAction::ClearCategory => DrillState {
            brand: state.brand.clone(),
            category: None,
            sub_brand: None,
        },
        DrillAction::ClearSubBrand => DrillState {
            brand: state.brand.clone(),
            category: state.category.clone(),
            sub_brand: None,
        },
    }
}

/// Map a clicked bar at `level` to the selection it drills into.
pub fn action_for_click(level: DrillLevel, name: &str) -> Option<DrillAction> {
    if name.is_empty() {
        return None;
    }
    let name = name.to_string();
    Some(match level {
        DrillLevel::Brand => DrillAction::SelectBrand(name),
        DrillLevel::Category => DrillAction::SelectCategory(name),
        DrillLevel::SubBrand => DrillAction::SelectSubBrand(name),
    })
}

impl DrillState {
    pub fn level(&self) -> DrillLevel {
        match (&self.brand, &self.category) {
            (Some(_), Some(_)) => DrillLevel::SubBrand,
            (Some(_), None) => DrillLevel::Category,
            _ => DrillLevel::Brand,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.brand.is_none() && self.category.is_none() && self.sub_brand.is_none()
    }

    /// Base filters narrowed to brand and category. Used by the variance
    /// driver chart, which groups by the next level down.
    pub fn scope(&self, base: &SalesFilters) -> SalesFilters {
        let mut scoped = base.clone();
        scoped.set(Dimension::Brand, self.brand.as_deref());
        scoped.set(Dimension::Category, self.category.as_deref());
        scoped
    }

    /// Base filters narrowed to every drill level, sub-brand included.
    pub fn scope_all(&self, base: &SalesFilters) -> SalesFilters {
        let mut scoped = self.scope(base);
        scoped.set(Dimension::SubBrand, self.sub_brand.as_deref());
        scoped
    }

    /// Active chips as (label, value), shallowest first.
    pub fn chips(&self) -> Vec<(&'static str, &str)> {
        let mut chips = Vec::new();
        if let Some(b) = &self.brand {
            chips.push(("Brand", b.as_str()));
        }
        if let Some(c) = &self.category {
            chips.push(("Category", c.as_str()));
        }
        if let Some(s) = &self.sub_brand {
            chips.push(("Sub-brand", s.as_str()));
        }
        chips
    }
}

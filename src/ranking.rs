use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::metrics::VarianceDriverRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Winners,
    Losers,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Winners => "winners",
            Direction::Losers => "losers",
        }
    }
}

fn by_key(a: &VarianceDriverRow, b: &VarianceDriverRow) -> Ordering {
    a.group_value.cmp(&b.group_value)
}

/// Order by signed variance (descending for winners, ascending for losers)
/// and keep at most `limit` rows. No sign filter: a "winner" list may contain
/// rows below target when fewer than `limit` groups beat it.
pub fn rank(mut rows: Vec<VarianceDriverRow>, direction: Direction, limit: usize) -> Vec<VarianceDriverRow> {
    rows.sort_by(|a, b| {
        let primary = match direction {
            Direction::Winners => b.variance_sales.total_cmp(&a.variance_sales),
            Direction::Losers => a.variance_sales.total_cmp(&b.variance_sales),
        };
        primary.then_with(|| by_key(a, b))
    });
    rows.truncate(limit);
    rows
}

/// Largest absolute variance first, for the variance driver chart.
pub fn sort_by_magnitude(rows: &mut [VarianceDriverRow]) {
    rows.sort_by(|a, b| {
        b.variance_sales
            .abs()
            .total_cmp(&a.variance_sales.abs())
            .then_with(|| by_key(a, b))
    });
}

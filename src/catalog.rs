use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::{Category, FilterCriteria, SortOrder, Taste};

/// Result size used when neither the caller nor the model asked for one.
pub const DEFAULT_QUERY_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dish {
    pub id: u64,
    pub name: String,
    pub price: f64,
    pub category: Category,
    pub taste: Taste,
    pub spice_level: u8,
    pub rating: f64,
    pub hall_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prep_minutes: Option<u32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Read-only dish source. Implementations filter; ordering and truncation
/// are applied by the caller through [`arrange`].
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn query_dishes(&self, criteria: &FilterCriteria) -> Result<Vec<Dish>>;
}

/// Returns true if `dish` satisfies every filter in `criteria`. The crowd
/// level and sort/limit fields do not filter.
pub fn admits(criteria: &FilterCriteria, dish: &Dish) -> bool {
    if let Some(name) = &criteria.name {
        if !dish.name.to_lowercase().contains(&name.to_lowercase()) {
            return false;
        }
    }
    if criteria.category.is_some_and(|c| c != dish.category) {
        return false;
    }
    if criteria.taste.is_some_and(|t| t != dish.taste) {
        return false;
    }
    if criteria.spice_level.is_some_and(|s| dish.spice_level > s) {
        return false;
    }
    if criteria.min_price.is_some_and(|p| dish.price < p) {
        return false;
    }
    if criteria.max_price.is_some_and(|p| dish.price > p) {
        return false;
    }
    if criteria.min_rating.is_some_and(|r| dish.rating < r) {
        return false;
    }
    if let Some(hall) = &criteria.hall {
        if !dish.hall_name.eq_ignore_ascii_case(hall) {
            return false;
        }
    }
    if let (Some(max_wait), Some(prep)) = (criteria.max_wait_minutes, dish.prep_minutes) {
        if prep > max_wait {
            return false;
        }
    }
    true
}

/// Default catalog order: rating descending, then newest id first.
pub fn by_rating(a: &Dish, b: &Dish) -> Ordering {
    b.rating.total_cmp(&a.rating).then_with(|| b.id.cmp(&a.id))
}

/// Applies `sort_by` and `result_limit` to a filtered dish list.
pub fn arrange(mut dishes: Vec<Dish>, criteria: &FilterCriteria) -> Vec<Dish> {
    match criteria.sort_by {
        Some(SortOrder::Rating) => dishes.sort_by(by_rating),
        Some(SortOrder::PriceAsc) => dishes.sort_by(|a, b| a.price.total_cmp(&b.price)),
        Some(SortOrder::PriceDesc) => dishes.sort_by(|a, b| b.price.total_cmp(&a.price)),
        Some(SortOrder::Recency) => dishes.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        None => {}
    }
    let limit = criteria.result_limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    dishes.truncate(limit as usize);
    dishes
}

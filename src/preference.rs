use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::criteria::{Category, CrowdLevel, SortOrder, Taste};

pub const DEFAULT_PRICE_RANGE: PriceRange = PriceRange {
    min: 0.0,
    max: 100.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl Default for PriceRange {
    fn default() -> Self {
        DEFAULT_PRICE_RANGE
    }
}

impl PriceRange {
    /// True when the range is tighter than the default on either side.
    pub fn narrows_default(&self) -> bool {
        self.min > DEFAULT_PRICE_RANGE.min || self.max < DEFAULT_PRICE_RANGE.max
    }

    /// Overlap of two ranges, `None` when they are disjoint.
    pub fn intersect(&self, other: &PriceRange) -> Option<PriceRange> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(PriceRange { min, max })
    }
}

/// What a user saved about their tastes. Stored in sled with bincode, so no
/// field may be skipped on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredPreference {
    pub preferred_categories: Vec<Category>,
    pub preferred_tastes: Vec<Taste>,
    pub price_range: PriceRange,
    pub spice_level: u8,
    pub preferred_halls: Vec<String>,
    pub sort_preference: Option<SortOrder>,
    pub dietary_restrictions: Vec<String>,
    pub crowd_preference: Option<CrowdLevel>,
}

impl StoredPreference {
    /// True when nothing in the preference would change a query.
    pub fn is_empty(&self) -> bool {
        self.preferred_categories.is_empty()
            && self.preferred_tastes.is_empty()
            && self.preferred_halls.is_empty()
            && self.dietary_restrictions.is_empty()
            && !self.price_range.narrows_default()
            && self.spice_level == 0
            && self.sort_preference.is_none()
            && self.crowd_preference.is_none()
    }
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// `Ok(None)` means the user has nothing stored.
    async fn get_preference(&self, user_id: u64) -> Result<Option<StoredPreference>>;
}

use tracing::debug;

use crate::{
    criteria::FilterCriteria,
    preference::{PriceRange, StoredPreference},
};

/// Lays a stored preference under the extracted criteria. Extracted fields
/// win; the preference only fills gaps. Prices are intersected, and when the
/// two ranges are disjoint the stored range is used as is.
pub fn merge_preference(extracted: &FilterCriteria, stored: &StoredPreference) -> FilterCriteria {
    let mut merged = extracted.clone();
    merged.category = merged
        .category
        .or_else(|| stored.preferred_categories.first().copied());
    merged.taste = merged.taste.or_else(|| stored.preferred_tastes.first().copied());
    merged.hall = merged
        .hall
        .or_else(|| stored.preferred_halls.first().cloned());
    if merged.spice_level.is_none() && stored.spice_level != 0 {
        merged.spice_level = Some(stored.spice_level);
    }
    merged.sort_by = merged.sort_by.or(stored.sort_preference);
    merged.crowd_level = merged.crowd_level.or(stored.crowd_preference);

    if stored.price_range.narrows_default() {
        let wanted = PriceRange {
            min: extracted.min_price.unwrap_or(f64::NEG_INFINITY),
            max: extracted.max_price.unwrap_or(f64::INFINITY),
        };
        let range = wanted.intersect(&stored.price_range).unwrap_or_else(|| {
            debug!(?wanted, stored = ?stored.price_range, "Disjoint price ranges, using stored");
            stored.price_range
        });
        merged.min_price = Some(range.min);
        merged.max_price = Some(range.max);
    }
    merged
}

use tracing::debug;

use crate::{
    context::ContextSnapshot,
    criteria::{CrowdLevel, FilterCriteria, Taste},
};

const COLD_BELOW_C: f64 = 15.0;
const HOT_ABOVE_C: f64 = 25.0;
const COLD_SPICE_LEVEL: u8 = 3;
const RUSH_MAX_WAIT_MINUTES: u32 = 15;

/// Deterministic situational defaults used when the model does not advise.
/// Only unset fields are touched.
pub fn keyword_fallback(criteria: &FilterCriteria, context: &ContextSnapshot) -> FilterCriteria {
    let mut adjusted = criteria.clone();
    let temperature = context.weather.temperature_c;
    if temperature < COLD_BELOW_C {
        adjusted.taste = adjusted.taste.or(Some(Taste::Spicy));
        adjusted.spice_level = adjusted.spice_level.or(Some(COLD_SPICE_LEVEL));
    } else if temperature > HOT_ABOVE_C {
        adjusted.taste = adjusted.taste.or(Some(Taste::Mild));
    }
    if context.crowd.level == CrowdLevel::High {
        adjusted.max_wait_minutes = adjusted.max_wait_minutes.or(Some(RUSH_MAX_WAIT_MINUTES));
    }
    debug!(?adjusted, "Keyword fallback applied");
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::snapshot;

    #[test]
    fn cold_and_crowded() {
        let adjusted = keyword_fallback(&FilterCriteria::default(), &snapshot(8.0, CrowdLevel::High));
        assert_eq!(adjusted.taste, Some(Taste::Spicy));
        assert_eq!(adjusted.spice_level, Some(3));
        assert_eq!(adjusted.max_wait_minutes, Some(15));
    }

    #[test]
    fn hot_prefers_mild_but_keeps_request() {
        let adjusted = keyword_fallback(&FilterCriteria::default(), &snapshot(30.0, CrowdLevel::Low));
        assert_eq!(adjusted.taste, Some(Taste::Mild));
        assert_eq!(adjusted.max_wait_minutes, None);

        let salty = FilterCriteria {
            taste: Some(Taste::Salty),
            ..FilterCriteria::default()
        };
        assert_eq!(
            keyword_fallback(&salty, &snapshot(30.0, CrowdLevel::Low)).taste,
            Some(Taste::Salty)
        );
    }

    #[test]
    fn mild_weather_changes_nothing() {
        let criteria = FilterCriteria {
            max_price: Some(20.0),
            ..FilterCriteria::default()
        };
        assert_eq!(keyword_fallback(&criteria, &snapshot(20.0, CrowdLevel::Medium)), criteria);
    }
}

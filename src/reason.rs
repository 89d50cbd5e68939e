//! Short justifications for each recommended dish.

use crate::{
    catalog::Dish,
    context::{calendar, ContextSnapshot, Season},
    criteria::{Category, CrowdLevel, FilterCriteria, Taste},
    extractor::extract,
};

const MAX_FACTS: usize = 3;
const NEUTRAL: &str = "matches your search";
const COLD_BELOW_C: f64 = 15.0;
const HOT_ABOVE_C: f64 = 25.0;
const WEEKEND_TREAT_ABOVE: f64 = 25.0;

/// Festival tags that single out a kind of dish.
const FESTIVAL_FACTS: &[(&str, fn(&Dish) -> bool, &str)] = &[
    ("spring_festival", is_dumpling, "dumplings for the Spring Festival"),
    (calendar::NOURISHING, is_hearty, "nourishing for the solstice"),
    (calendar::LIGHT_EATING, is_mild, "light eating for midsummer"),
    (calendar::ROMANCE, is_sweet, "a sweet pick for the day"),
];

fn is_dumpling(dish: &Dish) -> bool {
    dish.category == Category::Dumpling
}

fn is_hearty(dish: &Dish) -> bool {
    dish.taste == Taste::Salty || dish.category == Category::Other
}

fn is_mild(dish: &Dish) -> bool {
    dish.taste == Taste::Mild
}

fn is_sweet(dish: &Dish) -> bool {
    dish.taste == Taste::SweetSour
}

/// Up to three facts about `dish`, most specific first: what the query
/// asked for, then the situation, then rating and price.
pub fn compose(
    dish: &Dish,
    query: &str,
    context: &ContextSnapshot,
    applied: &FilterCriteria,
) -> String {
    let asked = extract(query).criteria;
    let facts: Vec<String> = query_facts(dish, &asked, applied)
        .into_iter()
        .chain(situational_facts(dish, context, applied))
        .chain(rating_fact(dish))
        .chain(price_fact(dish))
        .take(MAX_FACTS)
        .collect();
    if facts.is_empty() {
        NEUTRAL.to_string()
    } else {
        facts.join("; ")
    }
}

/// `asked` is what the query text alone asked for; a fact needs both the
/// query and the enforced criteria behind it.
fn query_facts(dish: &Dish, asked: &FilterCriteria, applied: &FilterCriteria) -> Vec<String> {
    let mut facts = Vec::new();
    if let Some(name) = &applied.name {
        if dish.name.to_lowercase().contains(&name.to_lowercase()) {
            facts.push(format!("the {name} you asked for"));
        }
    }
    if applied.taste == Some(dish.taste) && asked.taste == Some(dish.taste) {
        facts.push(match dish.taste {
            Taste::Spicy => "spicy, as you asked".to_string(),
            other => format!("{} flavour, as you asked", taste_label(other)),
        });
    }
    if applied.category == Some(dish.category) && asked.category == Some(dish.category) {
        facts.push(format!("a {} dish, as requested", dish.category.as_str()));
    }
    if let Some(max) = applied.max_price {
        if dish.price <= max && asked.max_price.is_some() {
            facts.push(format!("within your {} budget", yuan(max)));
        }
    }
    facts
}

fn situational_facts(dish: &Dish, context: &ContextSnapshot, applied: &FilterCriteria) -> Vec<String> {
    let mut facts = Vec::new();
    let temperature = context.weather.temperature_c;
    if temperature < COLD_BELOW_C && dish.taste == Taste::Spicy {
        facts.push(format!("warms you up at {temperature:.0}°C"));
    } else if temperature > HOT_ABOVE_C && dish.taste == Taste::Mild {
        facts.push(format!("light and refreshing at {temperature:.0}°C"));
    }

    let seasonal = match (context.date_info.season, dish.taste) {
        (Season::Winter, Taste::Spicy) => Some("a winter warmer"),
        (Season::Summer, Taste::SweetSour) => Some("a summer favourite"),
        (Season::Spring, Taste::Mild) => Some("fresh for spring"),
        (Season::Autumn, Taste::Salty) => Some("hearty autumn fare"),
        _ => None,
    };
    facts.extend(seasonal.map(str::to_string));

    if context.crowd.level == CrowdLevel::High {
        if let (Some(max_wait), Some(prep)) = (applied.max_wait_minutes, dish.prep_minutes) {
            if prep <= max_wait {
                facts.push(format!("ready in about {prep} minutes during the rush"));
            }
        }
    }
    if context.date_info.is_weekend && dish.price > WEEKEND_TREAT_ABOVE {
        facts.push("a weekend treat".to_string());
    }
    for (tag, fits, text) in FESTIVAL_FACTS {
        if context.date_info.festival_tags.contains(*tag) && fits(dish) {
            facts.push((*text).to_string());
        }
    }

    if let Some(preference) = &context.stored_preference {
        if preference.preferred_categories.contains(&dish.category) {
            facts.push("one of your favourite kinds of dish".to_string());
        }
        if preference.preferred_tastes.contains(&dish.taste) {
            facts.push("suits your usual taste".to_string());
        }
        if preference
            .preferred_halls
            .iter()
            .any(|hall| hall.eq_ignore_ascii_case(&dish.hall_name))
        {
            facts.push("served at your usual hall".to_string());
        }
    }
    facts
}

fn rating_fact(dish: &Dish) -> Option<String> {
    if dish.rating >= 4.5 {
        Some(format!("highly rated ({:.1})", dish.rating))
    } else if dish.rating >= 4.0 {
        Some("well rated".to_string())
    } else {
        None
    }
}

fn price_fact(dish: &Dish) -> Option<String> {
    if dish.price < 15.0 {
        Some(format!("great value at {}", yuan(dish.price)))
    } else if dish.price < 25.0 {
        Some("reasonably priced".to_string())
    } else if dish.price > 35.0 {
        Some("a premium pick".to_string())
    } else {
        None
    }
}

fn taste_label(taste: Taste) -> &'static str {
    match taste {
        Taste::SweetSour => "sweet and sour",
        other => other.as_str(),
    }
}

/// Formats a price, dropping the decimals for whole amounts.
pub fn yuan(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("¥{amount:.0}")
    } else {
        format!("¥{amount:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::tests::dish,
        context::tests::snapshot,
        preference::StoredPreference,
    };

    #[test]
    fn query_facts_come_first() {
        let mut noodles = dish(1, "Chongqing Noodles", 18.0, Category::Noodle, Taste::Spicy);
        noodles.rating = 4.8;
        let applied = FilterCriteria {
            taste: Some(Taste::Spicy),
            spice_level: Some(5),
            max_price: Some(20.0),
            result_limit: Some(5),
            ..FilterCriteria::default()
        };
        let reason = compose(
            &noodles,
            "something spicy around 20 yuan",
            &snapshot(20.0, CrowdLevel::Medium),
            &applied,
        );
        assert_eq!(reason, "spicy, as you asked; within your ¥20 budget; highly rated (4.8)");
    }

    #[test]
    fn unenforced_keywords_are_not_claimed() {
        // The query says spicy but the applied criteria dropped the taste.
        let noodles = dish(1, "Plain Noodles", 30.0, Category::Noodle, Taste::Spicy);
        let reason = compose(
            &noodles,
            "spicy",
            &snapshot(20.0, CrowdLevel::Low),
            &FilterCriteria::default(),
        );
        assert!(!reason.contains("as you asked"));
    }

    #[test]
    fn situation_beats_rating() {
        let mut hotpot = dish(2, "Mala Tang", 22.0, Category::Other, Taste::Spicy);
        hotpot.rating = 4.9;
        hotpot.prep_minutes = Some(8);
        let applied = FilterCriteria {
            taste: Some(Taste::Spicy),
            spice_level: Some(3),
            max_wait_minutes: Some(15),
            ..FilterCriteria::default()
        };
        let reason = compose(&hotpot, "lunch", &snapshot(8.0, CrowdLevel::High), &applied);
        assert_eq!(
            reason,
            "warms you up at 8°C; ready in about 8 minutes during the rush; highly rated (4.9)"
        );
    }

    #[test]
    fn stored_preference_is_mentioned() {
        let rice = dish(3, "Braised Pork Rice", 30.0, Category::Staple, Taste::Salty);
        let mut context = snapshot(20.0, CrowdLevel::Low);
        context.stored_preference = Some(StoredPreference {
            preferred_halls: vec!["north hall".to_string()],
            ..StoredPreference::default()
        });
        let reason = compose(&rice, "", &context, &FilterCriteria::default());
        assert_eq!(reason, "served at your usual hall; well rated");
    }

    #[test]
    fn negated_spice_counts_as_asked_mild() {
        let mut dumplings = dish(3, "Pork Dumplings", 14.0, Category::Dumpling, Taste::Mild);
        dumplings.spice_level = 0;
        dumplings.rating = 3.5;
        let applied = FilterCriteria {
            category: Some(Category::Dumpling),
            taste: Some(Taste::Mild),
            spice_level: Some(0),
            result_limit: Some(5),
            ..FilterCriteria::default()
        };
        let reason = compose(
            &dumplings,
            "dumplings, not spicy",
            &snapshot(20.0, CrowdLevel::Low),
            &applied,
        );
        assert_eq!(
            reason,
            "mild flavour, as you asked; a dumpling dish, as requested; fresh for spring"
        );
    }

    #[test]
    fn falls_back_to_neutral() {
        let mut plain = dish(4, "Tofu", 30.0, Category::Other, Taste::Salty);
        plain.rating = 3.2;
        let reason = compose(
            &plain,
            "anything",
            &snapshot(20.0, CrowdLevel::Low),
            &FilterCriteria::default(),
        );
        assert_eq!(reason, NEUTRAL);
    }

    #[test]
    fn price_tiers() {
        let mut cheap = dish(5, "Steamed Bun", 6.5, Category::Other, Taste::Salty);
        cheap.rating = 3.0;
        let reason = compose(
            &cheap,
            "",
            &snapshot(20.0, CrowdLevel::Low),
            &FilterCriteria::default(),
        );
        assert_eq!(reason, "great value at ¥6.50");
    }
}

//! Festival tags for a calendar date: solar terms, Gregorian festivals, a
//! lunar table, public holidays and a handful of canteen events.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

pub const WEEKEND: &str = "weekend";
pub const REGULAR_WEEKDAY: &str = "regular_weekday";
pub const PUBLIC_HOLIDAY: &str = "public_holiday";
pub const ROMANCE: &str = "romance";
pub const NOURISHING: &str = "nourishing";
pub const FRESH_START: &str = "fresh_start";
pub const LIGHT_EATING: &str = "light_eating";

const TERM_YEARS: std::ops::RangeInclusive<i32> = 2001..=2099;
const TERM_FACTOR: f64 = 0.2422;

/// Per month: (first term, its C constant), (second term, its C constant).
const SOLAR_TERMS: [[(&str, f64); 2]; 12] = [
    [("minor_cold", 5.4055), ("major_cold", 20.12)],
    [("start_of_spring", 3.87), ("rain_water", 18.73)],
    [("awakening_of_insects", 5.63), ("spring_equinox", 20.646)],
    [("pure_brightness", 4.81), ("grain_rain", 20.1)],
    [("start_of_summer", 5.52), ("grain_buds", 21.04)],
    [("grain_in_ear", 5.678), ("summer_solstice", 21.37)],
    [("minor_heat", 7.108), ("major_heat", 22.83)],
    [("start_of_autumn", 7.5), ("end_of_heat", 23.13)],
    [("white_dew", 7.646), ("autumn_equinox", 23.042)],
    [("cold_dew", 8.318), ("frosts_descent", 23.438)],
    [("start_of_winter", 7.438), ("minor_snow", 22.36)],
    [("major_snow", 7.18), ("winter_solstice", 21.94)],
];

/// Years where the formula is off by one day.
const TERM_CORRECTIONS: &[(i32, &str, i64)] = &[
    (2019, "minor_cold", -1),
    (2082, "major_cold", 1),
    (2084, "spring_equinox", 1),
    (2008, "grain_buds", 1),
    (2016, "minor_heat", 1),
    (2002, "start_of_autumn", 1),
    (2089, "frosts_descent", 1),
    (2089, "start_of_winter", 1),
];

const SOLAR_FESTIVALS: &[(u32, u32, &str)] = &[
    (1, 1, "new_years_day"),
    (2, 14, "valentines_day"),
    (3, 8, "womens_day"),
    (3, 12, "arbor_day"),
    (4, 1, "april_fools_day"),
    (5, 1, "labour_day"),
    (5, 4, "youth_day"),
    (6, 1, "childrens_day"),
    (9, 10, "teachers_day"),
    (10, 1, "national_day"),
    (12, 24, "christmas_eve"),
    (12, 25, "christmas"),
];

const CUSTOM_FESTIVALS: &[(u32, u32, &str)] = &[
    (3, 15, "consumer_rights_day"),
    (8, 8, "national_fitness_day"),
    (11, 11, "singles_day"),
    (12, 31, "new_years_eve_countdown"),
];

/// Gregorian dates of (Spring Festival, Dragon Boat, Qixi, Mid-Autumn) as
/// (month, day) pairs.
const LUNAR_TABLE: &[(i32, [(u32, u32); 4])] = &[
    (2020, [(1, 25), (6, 25), (8, 25), (10, 1)]),
    (2021, [(2, 12), (6, 14), (8, 14), (9, 21)]),
    (2022, [(2, 1), (6, 3), (8, 4), (9, 10)]),
    (2023, [(1, 22), (6, 22), (8, 22), (9, 29)]),
    (2024, [(2, 10), (6, 10), (8, 10), (9, 17)]),
    (2025, [(1, 29), (5, 31), (8, 29), (10, 6)]),
    (2026, [(2, 17), (6, 19), (8, 19), (9, 25)]),
    (2027, [(2, 6), (6, 9), (8, 8), (9, 15)]),
    (2028, [(1, 26), (5, 28), (8, 26), (10, 3)]),
    (2029, [(2, 13), (6, 16), (8, 16), (9, 22)]),
    (2030, [(2, 3), (6, 5), (8, 5), (9, 12)]),
];

const STATUTORY_SOLAR: &[&str] = &["new_years_day", "labour_day", "national_day"];
const STATUTORY_LUNAR: &[&str] = &["spring_festival", "dragon_boat_festival", "mid_autumn_festival"];

const DERIVED: &[(&[&str], &str)] = &[
    (&["valentines_day", "qixi"], ROMANCE),
    (&["winter_solstice"], NOURISHING),
    (&["start_of_spring"], FRESH_START),
    (&["summer_solstice"], LIGHT_EATING),
];

/// An extra holiday from configuration, e.g. a bridging day off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct FestivalCalendar {
    holidays: Vec<Holiday>,
}

impl FestivalCalendar {
    pub fn new(holidays: Vec<Holiday>) -> Self {
        Self { holidays }
    }

    /// All tags for `date`. Never empty: a date without any festival is
    /// tagged `weekend` or `regular_weekday`.
    pub fn tags(&self, date: NaiveDate) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        tags.extend(solar_term(date).map(str::to_string));
        tags.extend(table_hits(SOLAR_FESTIVALS, date));
        tags.extend(table_hits(CUSTOM_FESTIVALS, date));
        tags.extend(lunar_festivals(date).into_iter().map(str::to_string));

        let statutory = STATUTORY_SOLAR
            .iter()
            .chain(STATUTORY_LUNAR)
            .any(|name| tags.contains(*name));
        let configured: Vec<&Holiday> = self.holidays.iter().filter(|h| h.date == date).collect();
        if statutory || !configured.is_empty() {
            tags.insert(PUBLIC_HOLIDAY.to_string());
        }
        tags.extend(configured.into_iter().map(|h| h.name.clone()));

        for (sources, derived) in DERIVED {
            if sources.iter().any(|s| tags.contains(*s)) {
                tags.insert((*derived).to_string());
            }
        }

        if tags.is_empty() {
            let fallback = if is_weekend(date) {
                WEEKEND
            } else {
                REGULAR_WEEKDAY
            };
            tags.insert(fallback.to_string());
        }
        tags
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn table_hits(table: &[(u32, u32, &'static str)], date: NaiveDate) -> Vec<String> {
    table
        .iter()
        .filter(|(month, day, _)| *month == date.month() && *day == date.day())
        .map(|(_, _, name)| (*name).to_string())
        .collect()
}

/// Day of month on which `term` (0 or 1 within the month) falls, using the
/// 21st century approximation.
fn term_day(year: i32, month: u32, term: usize) -> Option<u32> {
    if !TERM_YEARS.contains(&year) {
        return None;
    }
    let (name, c) = SOLAR_TERMS[month as usize - 1][term];
    let y = year % 100;
    let leap_offset = if month <= 2 { (y - 1) / 4 } else { y / 4 };
    #[allow(clippy::cast_possible_truncation)]
    let base = (f64::from(y) * TERM_FACTOR + c).floor() as i64 - i64::from(leap_offset);
    let correction = TERM_CORRECTIONS
        .iter()
        .find(|(when, term_name, _)| *when == year && *term_name == name)
        .map_or(0, |(_, _, delta)| *delta);
    u32::try_from(base + correction).ok()
}

fn solar_term(date: NaiveDate) -> Option<&'static str> {
    (0..2)
        .find(|term| term_day(date.year(), date.month(), *term) == Some(date.day()))
        .map(|term| SOLAR_TERMS[date.month() as usize - 1][term].0)
}

fn lunar_festivals(date: NaiveDate) -> Vec<&'static str> {
    let mut hits = Vec::new();
    for year in [date.year(), date.year() + 1] {
        let Some((_, row)) = LUNAR_TABLE.iter().find(|(y, _)| *y == year) else {
            continue;
        };
        let Some(spring) = NaiveDate::from_ymd_opt(year, row[0].0, row[0].1) else {
            continue;
        };
        if date == spring - Duration::days(1) {
            hits.push("lunar_new_years_eve");
        }
        if year != date.year() {
            continue;
        }
        if date == spring {
            hits.push("spring_festival");
        }
        if date == spring + Duration::days(14) {
            hits.push("lantern_festival");
        }
        for ((month, day), name) in row[1..]
            .iter()
            .zip(["dragon_boat_festival", "qixi", "mid_autumn_festival"])
        {
            if date.month() == *month && date.day() == *day {
                hits.push(name);
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tags(d: NaiveDate) -> BTreeSet<String> {
        FestivalCalendar::default().tags(d)
    }

    #[test]
    fn solar_terms_land_on_known_dates() {
        assert_eq!(solar_term(date(2025, 12, 21)), Some("winter_solstice"));
        assert_eq!(solar_term(date(2026, 2, 4)), Some("start_of_spring"));
        assert_eq!(solar_term(date(2024, 6, 21)), Some("summer_solstice"));
        assert_eq!(solar_term(date(2024, 6, 20)), None);
    }

    #[test]
    fn corrections_shift_the_formula() {
        // Minor Cold 2019 fell on Jan 5, one day before the formula's date.
        assert_eq!(solar_term(date(2019, 1, 5)), Some("minor_cold"));
        assert_eq!(solar_term(date(2019, 1, 6)), None);
    }

    #[test]
    fn terms_outside_supported_years_are_skipped() {
        assert_eq!(term_day(1999, 12, 1), None);
        assert_eq!(term_day(2100, 6, 1), None);
    }

    #[test]
    fn derived_tags_follow_their_sources() {
        let solstice = tags(date(2025, 12, 21));
        assert!(solstice.contains("winter_solstice"));
        assert!(solstice.contains(NOURISHING));

        let valentines = tags(date(2025, 2, 14));
        assert!(valentines.contains(ROMANCE));

        let qixi = tags(date(2025, 8, 29));
        assert!(qixi.contains("qixi"));
        assert!(qixi.contains(ROMANCE));

        assert!(tags(date(2026, 2, 4)).contains(FRESH_START));
    }

    #[test]
    fn lunar_festivals_come_from_the_table() {
        let spring = tags(date(2026, 2, 17));
        assert!(spring.contains("spring_festival"));
        assert!(spring.contains(PUBLIC_HOLIDAY));
        assert!(tags(date(2026, 2, 16)).contains("lunar_new_years_eve"));
        assert!(tags(date(2026, 3, 3)).contains("lantern_festival"));
        assert!(tags(date(2025, 10, 6)).contains("mid_autumn_festival"));
        assert!(tags(date(2020, 1, 24)).contains("lunar_new_years_eve"));
    }

    #[test]
    fn statutory_and_configured_holidays() {
        assert!(tags(date(2025, 10, 1)).contains(PUBLIC_HOLIDAY));

        let calendar = FestivalCalendar::new(vec![Holiday {
            date: date(2025, 10, 8),
            name: "national_day_break".to_string(),
        }]);
        let tags = calendar.tags(date(2025, 10, 8));
        assert!(tags.contains(PUBLIC_HOLIDAY));
        assert!(tags.contains("national_day_break"));
    }

    #[test]
    fn custom_festivals_are_tagged() {
        assert!(tags(date(2025, 11, 11)).contains("singles_day"));
        assert!(tags(date(2025, 12, 31)).contains("new_years_eve_countdown"));
    }

    #[test]
    fn plain_days_fall_back_to_weekday_kind() {
        // 2025-03-19 is a Wednesday, 2025-03-22 a Saturday.
        assert_eq!(
            tags(date(2025, 3, 19)),
            BTreeSet::from([REGULAR_WEEKDAY.to_string()])
        );
        assert_eq!(tags(date(2025, 3, 22)), BTreeSet::from([WEEKEND.to_string()]));
    }
}

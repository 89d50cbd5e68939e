//! Fixed-table keyword extraction from a free-text dish request.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::criteria::{Category, FilterCriteria, Taste};

pub const DEFAULT_RESULT_LIMIT: u32 = 5;
const FIELDS_FOR_FULL_CONFIDENCE: f64 = 5.0;
const NAME_MATCH_BONUS: f64 = 0.2;
const FULL_RANGE_BONUS: f64 = 0.1;
const SPICY_DEFAULT: u8 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub criteria: FilterCriteria,
    pub confidence: f64,
}

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Noodle,
        &["noodle", "noodles", "ramen", "lamian", "面条", "面", "粉"],
    ),
    (
        Category::Staple,
        &["rice", "staple", "bowl", "饭", "米饭", "主食"],
    ),
    (
        Category::Dumpling,
        &["dumpling", "dumplings", "jiaozi", "wonton", "饺子", "饺", "馄饨"],
    ),
    (Category::Other, &["snack", "soup", "other", "小吃", "汤", "其他"]),
];

const TASTE_KEYWORDS: &[(Taste, &[&str])] = &[
    (
        Taste::Spicy,
        &[
            "spicy",
            "hot pot",
            "hot sauce",
            "chili",
            "chilli",
            "numbing",
            "辣",
            "麻辣",
            "香辣",
        ],
    ),
    (Taste::Salty, &["salty", "savory", "savoury", "咸", "咸鲜"]),
    (Taste::Mild, &["mild", "bland", "light", "清淡", "淡"]),
    (
        Taste::SweetSour,
        &["sweet and sour", "sweet-sour", "sweet", "sour", "酸甜", "糖醋"],
    ),
];

const NOT_SPICY: &[&str] = &[
    "not spicy",
    "non-spicy",
    "no chili",
    "no chilli",
    "without chili",
    "不辣",
    "不要辣",
    "免辣",
];

/// Spice adjectives, most specific first.
const SPICE_ADJECTIVES: &[(u8, &[&str])] = &[
    (
        5,
        &[
            "very spicy",
            "extra spicy",
            "super spicy",
            "really spicy",
            "特辣",
            "很辣",
            "重辣",
            "超辣",
        ],
    ),
    (3, &["medium spicy", "moderately spicy", "中辣"]),
    (
        1,
        &[
            "mildly spicy",
            "mild spicy",
            "slightly spicy",
            "a little spicy",
            "a bit spicy",
            "微辣",
        ],
    ),
];

/// Negated price words; a hit means the cheap band.
const NOT_PRICEY: &[&str] = &[
    "not expensive",
    "not too expensive",
    "not pricey",
    "不贵",
    "不太贵",
    "不要太贵",
];

const CHEAP_BAND: (f64, f64) = (0.0, 20.0);

const BUDGET_BANDS: &[((f64, f64), &[&str])] = &[
    (
        CHEAP_BAND,
        &[
            "cheap",
            "affordable",
            "budget",
            "inexpensive",
            "economical",
            "便宜",
            "实惠",
            "经济",
            "低价",
            "省钱",
        ],
    ),
    (
        (15.0, 35.0),
        &[
            "moderately priced",
            "moderate",
            "mid-range",
            "reasonable",
            "中等",
            "适中",
        ],
    ),
    (
        (30.0, 100.0),
        &[
            "pricey",
            "expensive",
            "premium",
            "fancy",
            "upscale",
            "高档",
            "豪华",
            "奢侈",
            "贵",
        ],
    ),
];

/// Known dishes; a hit sets `name` and overrides the keyword category.
const DISH_GAZETTEER: &[(&str, Category)] = &[
    ("beef noodles", Category::Noodle),
    ("knife-cut noodles", Category::Noodle),
    ("hand-pulled noodles", Category::Noodle),
    ("牛肉面", Category::Noodle),
    ("拉面", Category::Noodle),
    ("刀削面", Category::Noodle),
    ("fried rice", Category::Staple),
    ("rice bowl", Category::Staple),
    ("炒饭", Category::Staple),
    ("盖饭", Category::Staple),
    ("boiled dumplings", Category::Dumpling),
    ("steamed dumplings", Category::Dumpling),
    ("水饺", Category::Dumpling),
    ("蒸饺", Category::Dumpling),
];

static PRICE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d+(?:\.\d+)?)\s*(?:-|~|to|到|至)\s*[¥￥]?\s*(\d+(?:\.\d+)?)\s*(?:(?:yuan|rmb|kuai)\b|元|块)",
    )
    .expect("valid regex")
});

static SIGNED_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[¥￥]\s*(\d+(?:\.\d+)?)\s*(?:-|~|to|到|至)\s*[¥￥]?\s*(\d+(?:\.\d+)?)")
        .expect("valid regex")
});

static PRICE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[¥￥]\s*(\d+(?:\.\d+)?)|(\d+(?:\.\d+)?)\s*(?:(?:yuan|rmb|kuai)\b|元|块)")
        .expect("valid regex")
});

/// Extracts partial filter criteria from `text`. Fields without a trigger in
/// the text stay unset.
pub fn extract(text: &str) -> ExtractionResult {
    let lowered = text.to_lowercase();
    let mut criteria = FilterCriteria::default();

    let dish = DISH_GAZETTEER
        .iter()
        .find(|(name, _)| contains_keyword(&lowered, name));
    criteria.category = dish.map(|(_, category)| *category).or_else(|| detect_category(&lowered));
    criteria.name = dish.map(|(name, _)| (*name).to_string());

    if NOT_SPICY.iter().any(|k| contains_keyword(&lowered, k)) {
        criteria.taste = Some(Taste::Mild);
        criteria.spice_level = Some(0);
    } else {
        criteria.taste = detect_taste(&lowered);
        criteria.spice_level = spice_level(&lowered, criteria.taste);
    }

    let prices = price_tokens(&lowered);
    match prices.as_slice() {
        [] => {
            if let Some((lo, hi)) = budget_band(&lowered) {
                criteria.min_price = Some(lo);
                criteria.max_price = Some(hi);
            }
        }
        [max] => criteria.max_price = Some(*max),
        [a, b, ..] => {
            criteria.min_price = Some(a.min(*b));
            criteria.max_price = Some(a.max(*b));
        }
    }

    let recognized = criteria.constraint_count();
    if recognized == 0 {
        debug!("No keywords recognized");
        return ExtractionResult::default();
    }
    criteria.result_limit = Some(DEFAULT_RESULT_LIMIT);

    #[allow(clippy::cast_precision_loss)]
    let mut confidence = recognized as f64 / FIELDS_FOR_FULL_CONFIDENCE;
    if dish.is_some() {
        confidence += NAME_MATCH_BONUS;
    }
    if criteria.min_price.is_some() && criteria.max_price.is_some() {
        confidence += FULL_RANGE_BONUS;
    }
    let confidence = confidence.min(1.0);

    debug!(?criteria, confidence, "Extracted criteria");
    ExtractionResult {
        criteria,
        confidence,
    }
}

fn detect_category(lowered: &str) -> Option<Category> {
    first_match(CATEGORY_KEYWORDS, lowered)
}

fn detect_taste(lowered: &str) -> Option<Taste> {
    first_match(TASTE_KEYWORDS, lowered)
}

fn spice_level(lowered: &str, taste: Option<Taste>) -> Option<u8> {
    SPICE_ADJECTIVES
        .iter()
        .find(|(_, words)| words.iter().any(|w| contains_keyword(lowered, w)))
        .map(|(level, _)| *level)
        .or_else(|| (taste == Some(Taste::Spicy)).then_some(SPICY_DEFAULT))
}

fn budget_band(lowered: &str) -> Option<(f64, f64)> {
    if NOT_PRICEY.iter().any(|k| contains_keyword(lowered, k)) {
        return Some(CHEAP_BAND);
    }
    BUDGET_BANDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| contains_keyword(lowered, w)))
        .map(|(band, _)| *band)
}

fn price_tokens(lowered: &str) -> Vec<f64> {
    for range in [&PRICE_RANGE, &SIGNED_RANGE] {
        let Some(caps) = range.captures(lowered) else {
            continue;
        };
        let bounds: Vec<f64> = [caps.get(1), caps.get(2)]
            .into_iter()
            .flatten()
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        if bounds.len() == 2 {
            return bounds;
        }
    }
    PRICE_TOKEN
        .captures_iter(lowered)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse().ok())
        .take(2)
        .collect()
}

fn first_match<T: Copy>(table: &[(T, &[&str])], lowered: &str) -> Option<T> {
    table
        .iter()
        .find(|(_, words)| words.iter().any(|w| contains_keyword(lowered, w)))
        .map(|(value, _)| *value)
}

/// ASCII keywords must sit on word boundaries; anything else matches as a
/// substring.
pub(crate) fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return haystack.contains(keyword);
    }
    haystack.match_indices(keyword).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

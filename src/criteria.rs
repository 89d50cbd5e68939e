//! Filter criteria and the validator every criteria-shaped value passes
//! through before it reaches the catalog.

use std::{fmt, str::FromStr};

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

pub const PRICE_CEILING: f64 = 1000.0;
pub const MAX_SPICE_LEVEL: u8 = 5;
pub const MAX_RATING: f64 = 5.0;
pub const MIN_RESULT_LIMIT: u32 = 1;
pub const MAX_RESULT_LIMIT: u32 = 50;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Staple,
    Noodle,
    Dumpling,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Staple => "staple",
            Category::Noodle => "noodle",
            Category::Dumpling => "dumpling",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "staple" | "rice" | "饭" => Ok(Category::Staple),
            "noodle" | "noodles" | "面" => Ok(Category::Noodle),
            "dumpling" | "dumplings" | "饺子" => Ok(Category::Dumpling),
            "other" | "其他" => Ok(Category::Other),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Taste {
    Spicy,
    Salty,
    Mild,
    SweetSour,
}

impl Taste {
    pub fn as_str(&self) -> &'static str {
        match self {
            Taste::Spicy => "spicy",
            Taste::Salty => "salty",
            Taste::Mild => "mild",
            Taste::SweetSour => "sweet_sour",
        }
    }
}

impl FromStr for Taste {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spicy" | "辣" => Ok(Taste::Spicy),
            "salty" | "咸" => Ok(Taste::Salty),
            "mild" | "淡" => Ok(Taste::Mild),
            "sweet_sour" | "sweet-sour" | "sweet and sour" | "酸甜" => Ok(Taste::SweetSour),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Rating,
    PriceAsc,
    PriceDesc,
    #[serde(alias = "created_at")]
    Recency,
}

impl FromStr for SortOrder {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rating" => Ok(SortOrder::Rating),
            "price_asc" => Ok(SortOrder::PriceAsc),
            "price_desc" => Ok(SortOrder::PriceDesc),
            "recency" | "created_at" => Ok(SortOrder::Recency),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CrowdLevel {
    Low,
    Medium,
    High,
}

impl CrowdLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdLevel::Low => "low",
            CrowdLevel::Medium => "medium",
            CrowdLevel::High => "high",
        }
    }
}

impl FromStr for CrowdLevel {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "低" => Ok(CrowdLevel::Low),
            "medium" | "中等" => Ok(CrowdLevel::Medium),
            "high" | "高" => Ok(CrowdLevel::High),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue(pub String);

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value `{}`", self.0)
    }
}

impl std::error::Error for UnknownValue {}

/// A validated, partial set of dish constraints. An absent field is
/// unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taste: Option<Taste>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spice_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crowd_level: Option<CrowdLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hall: Option<String>,
}

impl FilterCriteria {
    /// Number of constraining fields, not counting `result_limit`.
    pub fn constraint_count(&self) -> usize {
        [
            self.name.is_some(),
            self.category.is_some(),
            self.taste.is_some(),
            self.spice_level.is_some(),
            self.min_price.is_some(),
            self.max_price.is_some(),
            self.min_rating.is_some(),
            self.sort_by.is_some(),
            self.max_wait_minutes.is_some(),
            self.crowd_level.is_some(),
            self.hall.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    pub fn has_constraints(&self) -> bool {
        self.constraint_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        !self.has_constraints() && self.result_limit.is_none()
    }
}

/// Untrusted criteria as they arrive from the model or a caller. Values that
/// cannot be coerced deserialize as `None` rather than failing the parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCriteria {
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub taste: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub spice_level: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub min_price: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub max_price: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub min_rating: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub sort_by: Option<String>,
    #[serde(alias = "limit", deserialize_with = "lenient_number")]
    pub result_limit: Option<f64>,
    #[serde(alias = "max_wait_time", deserialize_with = "lenient_number")]
    pub max_wait_minutes: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub crowd_level: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub hall: Option<String>,
}

impl RawCriteria {
    /// Field-wise overlay: values present in `self` win, gaps are filled
    /// from `base`.
    #[must_use]
    pub fn over(self, base: RawCriteria) -> RawCriteria {
        RawCriteria {
            name: self.name.or(base.name),
            category: self.category.or(base.category),
            taste: self.taste.or(base.taste),
            spice_level: self.spice_level.or(base.spice_level),
            min_price: self.min_price.or(base.min_price),
            max_price: self.max_price.or(base.max_price),
            min_rating: self.min_rating.or(base.min_rating),
            sort_by: self.sort_by.or(base.sort_by),
            result_limit: self.result_limit.or(base.result_limit),
            max_wait_minutes: self.max_wait_minutes.or(base.max_wait_minutes),
            crowd_level: self.crowd_level.or(base.crowd_level),
            hall: self.hall.or(base.hall),
        }
    }
}

impl From<&FilterCriteria> for RawCriteria {
    fn from(criteria: &FilterCriteria) -> Self {
        RawCriteria {
            name: criteria.name.clone(),
            category: criteria.category.map(|c| c.as_str().to_string()),
            taste: criteria.taste.map(|t| t.as_str().to_string()),
            spice_level: criteria.spice_level.map(f64::from),
            min_price: criteria.min_price,
            max_price: criteria.max_price,
            min_rating: criteria.min_rating,
            sort_by: criteria.sort_by.map(|s| sort_order_str(s).to_string()),
            result_limit: criteria.result_limit.map(f64::from),
            max_wait_minutes: criteria.max_wait_minutes.map(f64::from),
            crowd_level: criteria.crowd_level.map(|c| c.as_str().to_string()),
            hall: criteria.hall.clone(),
        }
    }
}

fn sort_order_str(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Rating => "rating",
        SortOrder::PriceAsc => "price_asc",
        SortOrder::PriceDesc => "price_desc",
        SortOrder::Recency => "recency",
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_number))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// Sanitizes raw criteria against the domain constraints. Never fails:
/// anything that cannot be made valid is dropped, which leaves that field
/// unconstrained.
pub fn validate(raw: &RawCriteria) -> FilterCriteria {
    let (mut min_price, mut max_price) = (raw.min_price, raw.max_price);
    if let (Some(lo), Some(hi)) = (min_price, max_price) {
        if lo > hi {
            warn!(min_price = lo, max_price = hi, "Swapping inverted price range");
            min_price = Some(hi);
            max_price = Some(lo);
        }
    }
    let min_price = min_price.map(|p| p.clamp(0.0, PRICE_CEILING));
    let max_price = max_price.map(|p| p.clamp(0.0, PRICE_CEILING));

    let category = parse_enum::<Category>("category", raw.category.as_deref());
    let taste = parse_enum::<Taste>("taste", raw.taste.as_deref());
    let sort_by = parse_enum::<SortOrder>("sort_by", raw.sort_by.as_deref());
    let crowd_level = parse_enum::<CrowdLevel>("crowd_level", raw.crowd_level.as_deref());

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let spice_level = raw
        .spice_level
        .map(|s| s.round().clamp(0.0, f64::from(MAX_SPICE_LEVEL)) as u8);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let result_limit = raw.result_limit.map(|l| {
        l.round()
            .clamp(f64::from(MIN_RESULT_LIMIT), f64::from(MAX_RESULT_LIMIT)) as u32
    });
    let min_rating = raw.min_rating.map(|r| r.clamp(0.0, MAX_RATING));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let max_wait_minutes = raw
        .max_wait_minutes
        .map(f64::round)
        .filter(|m| *m >= 1.0)
        .map(|m| m.min(f64::from(u32::MAX)) as u32);

    FilterCriteria {
        name: non_blank(raw.name.as_deref()),
        category,
        taste,
        spice_level,
        min_price,
        max_price,
        min_rating,
        sort_by,
        result_limit,
        max_wait_minutes,
        crowd_level,
        hall: non_blank(raw.hall.as_deref()),
    }
}

fn parse_enum<T: FromStr>(field: &str, value: Option<&str>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(field, value, "Dropping value outside the allowed set");
            None
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

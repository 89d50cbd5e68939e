use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use super::{Season, WeatherInfo, WeatherSource};
use crate::settings::WeatherSettings;

const FALLBACK_HUMIDITY: f64 = 65.0;
const FALLBACK_WIND_LEVEL: u8 = 2;
const CALM_WIND_LEVEL: u8 = 1;

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Current conditions as reported by the provider, before the wind
/// descriptor is turned into a level.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub condition: String,
    pub temperature_c: f64,
    pub humidity: f64,
    pub wind_descriptor: String,
}

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("no weather API key configured")]
    MissingCredentials,
    #[error("weather service answered with HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("weather service rejected the request: {0}")]
    Rejected(String),
    #[error("malformed weather payload: {0}")]
    Malformed(String),
    #[error("weather request failed")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, city: &str) -> Result<WeatherReport, WeatherError>;
}

/// Live weather from the Amap (Gaode) REST API.
pub struct AmapWeather {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AmapResponse {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    lives: Vec<AmapLive>,
}

#[derive(Debug, Deserialize)]
struct AmapLive {
    weather: String,
    temperature: String,
    #[serde(default)]
    humidity: String,
    #[serde(default)]
    windpower: String,
}

impl AmapWeather {
    pub fn new(settings: &WeatherSettings) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }
}

#[async_trait]
impl WeatherProvider for AmapWeather {
    #[instrument(name = "amap_weather", skip(self))]
    async fn current_weather(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        let key = self.api_key.as_deref().ok_or(WeatherError::MissingCredentials)?;
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", key),
                ("city", city),
                ("extensions", "base"),
                ("output", "JSON"),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status));
        }
        let body: AmapResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Malformed(e.to_string()))?;
        parse_live(body)
    }
}

fn parse_live(body: AmapResponse) -> Result<WeatherReport, WeatherError> {
    if body.status != "1" {
        return Err(WeatherError::Rejected(body.info));
    }
    let live = body
        .lives
        .into_iter()
        .next()
        .ok_or_else(|| WeatherError::Malformed("empty `lives` array".to_string()))?;
    let temperature_c = live
        .temperature
        .trim()
        .parse()
        .map_err(|_| WeatherError::Malformed(format!("temperature `{}`", live.temperature)))?;
    let humidity = live.humidity.trim().parse().unwrap_or(0.0);
    debug!(condition = %live.weather, temperature_c, "Parsed live weather");
    Ok(WeatherReport {
        condition: live.weather,
        temperature_c,
        humidity,
        wind_descriptor: live.windpower,
    })
}

/// Turns descriptors like "3-4级", "≤3" or "calm" into a Beaufort level.
pub fn wind_level(descriptor: &str) -> u8 {
    FIRST_NUMBER
        .find(descriptor)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(CALM_WIND_LEVEL)
}

impl From<WeatherReport> for WeatherInfo {
    fn from(report: WeatherReport) -> Self {
        WeatherInfo {
            wind_level: wind_level(&report.wind_descriptor),
            condition: report.condition,
            temperature_c: report.temperature_c,
            humidity: report.humidity,
            source: WeatherSource::Live,
        }
    }
}

/// Plausible weather for the season, used when the live lookup fails.
pub fn fallback(season: Season) -> WeatherInfo {
    let (temperature_c, condition) = match season {
        Season::Spring => (15.0, "cloudy"),
        Season::Summer => (28.0, "clear"),
        Season::Autumn => (18.0, "clear"),
        Season::Winter => (5.0, "overcast"),
    };
    WeatherInfo {
        condition: condition.to_string(),
        temperature_c,
        humidity: FALLBACK_HUMIDITY,
        wind_level: FALLBACK_WIND_LEVEL,
        source: WeatherSource::Fallback,
    }
}

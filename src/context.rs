//! Situational facts gathered once per request: calendar, weather, crowd and
//! the caller's stored preference.

pub mod calendar;
pub mod crowd;
pub mod weather;

use std::{collections::BTreeSet, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use self::{
    calendar::FestivalCalendar,
    crowd::CrowdProvider,
    weather::{WeatherError, WeatherProvider},
};
use crate::{criteria::CrowdLevel, preference::PreferenceStore, preference::StoredPreference};

const DEFAULT_CITY: &str = "北京";
const DEFAULT_WEATHER_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub fn of(date: NaiveDate) -> Self {
        match date.month() {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateInfo {
    pub calendar_date: NaiveDate,
    pub hour: u32,
    pub festival_tags: BTreeSet<String>,
    pub is_weekend: bool,
    pub season: Season,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInfo {
    pub condition: String,
    pub temperature_c: f64,
    pub humidity: f64,
    pub wind_level: u8,
    pub source: WeatherSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdSource {
    Recorded,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowdInfo {
    pub level: CrowdLevel,
    pub avg_wait_minutes: u32,
    pub peak_hours: Vec<u32>,
    pub source: CrowdSource,
}

/// Everything known about the request's situation. `stored_preference` is
/// `None` when the lookup failed, and an empty preference for anonymous
/// callers or users with nothing saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub date_info: DateInfo,
    pub weather: WeatherInfo,
    pub crowd: CrowdInfo,
    pub stored_preference: Option<StoredPreference>,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Source of per-request snapshots. Must not fail.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn snapshot(&self, user_id: Option<u64>) -> ContextSnapshot;
}

pub struct SituationalContextProvider {
    calendar: FestivalCalendar,
    weather: Arc<dyn WeatherProvider>,
    crowd: Arc<dyn CrowdProvider>,
    preferences: Arc<dyn PreferenceStore>,
    clock: Arc<dyn Clock>,
    city: String,
    weather_timeout: Duration,
    store_timeout: Duration,
}

impl SituationalContextProvider {
    pub fn new(
        calendar: FestivalCalendar,
        weather: Arc<dyn WeatherProvider>,
        crowd: Arc<dyn CrowdProvider>,
        preferences: Arc<dyn PreferenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            calendar,
            weather,
            crowd,
            preferences,
            clock,
            city: DEFAULT_CITY.to_string(),
            weather_timeout: DEFAULT_WEATHER_TIMEOUT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = city.into();
        self
    }

    #[must_use]
    pub fn with_deadlines(mut self, weather: Duration, store: Duration) -> Self {
        self.weather_timeout = weather;
        self.store_timeout = store;
        self
    }

    fn date_info(&self, now: NaiveDateTime) -> DateInfo {
        let date = now.date();
        DateInfo {
            calendar_date: date,
            hour: now.hour(),
            festival_tags: self.calendar.tags(date),
            is_weekend: calendar::is_weekend(date),
            season: Season::of(date),
        }
    }

    async fn weather(&self, season: Season) -> WeatherInfo {
        match timeout(self.weather_timeout, self.weather.current_weather(&self.city)).await {
            Ok(Ok(report)) => report.into(),
            Ok(Err(WeatherError::MissingCredentials)) => {
                info!("No weather API key, using seasonal weather");
                weather::fallback(season)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Weather lookup failed, using seasonal weather");
                weather::fallback(season)
            }
            Err(_) => {
                warn!(deadline = ?self.weather_timeout, "Weather lookup timed out");
                weather::fallback(season)
            }
        }
    }

    async fn crowd(&self, date: NaiveDate, hour: u32) -> CrowdInfo {
        let recorded = match timeout(self.store_timeout, self.crowd.traffic_stats(date, hour)).await
        {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                warn!(error = ?e, "Traffic lookup failed");
                None
            }
            Err(_) => {
                warn!(deadline = ?self.store_timeout, "Traffic lookup timed out");
                None
            }
        };
        match recorded {
            Some(stats) => CrowdInfo::from_stats(stats, CrowdSource::Recorded),
            None => {
                debug!(hour, "No recorded traffic, estimating from the hour");
                CrowdInfo::from_stats(crowd::estimate(hour), CrowdSource::Estimated)
            }
        }
    }

    async fn stored_preference(&self, user_id: Option<u64>) -> Option<StoredPreference> {
        let Some(user_id) = user_id else {
            return Some(StoredPreference::default());
        };
        match timeout(self.store_timeout, self.preferences.get_preference(user_id)).await {
            Ok(Ok(preference)) => Some(preference.unwrap_or_default()),
            Ok(Err(e)) => {
                warn!(user_id, error = ?e, "Preference lookup failed");
                None
            }
            Err(_) => {
                warn!(user_id, "Preference lookup timed out");
                None
            }
        }
    }
}

#[async_trait]
impl ContextSource for SituationalContextProvider {
    #[instrument(name = "context_snapshot", skip(self))]
    async fn snapshot(&self, user_id: Option<u64>) -> ContextSnapshot {
        let date_info = self.date_info(self.clock.now());
        let (weather, crowd, stored_preference) = tokio::join!(
            self.weather(date_info.season),
            self.crowd(date_info.calendar_date, date_info.hour),
            self.stored_preference(user_id),
        );
        info!(
            tags = ?date_info.festival_tags,
            temperature_c = weather.temperature_c,
            crowd = crowd.level.as_str(),
            "Context snapshot ready"
        );
        ContextSnapshot {
            date_info,
            weather,
            crowd,
            stored_preference,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use anyhow::{anyhow, Result};

    use super::{
        crowd::CrowdStats,
        weather::{WeatherError, WeatherReport},
        *,
    };

    pub(crate) fn snapshot(temperature_c: f64, crowd: CrowdLevel) -> ContextSnapshot {
        let date = NaiveDate::from_ymd_opt(2025, 3, 19).unwrap();
        ContextSnapshot {
            date_info: DateInfo {
                calendar_date: date,
                hour: 15,
                festival_tags: BTreeSet::from([calendar::REGULAR_WEEKDAY.to_string()]),
                is_weekend: false,
                season: Season::of(date),
            },
            weather: WeatherInfo {
                condition: "cloudy".to_string(),
                temperature_c,
                humidity: 50.0,
                wind_level: 2,
                source: WeatherSource::Live,
            },
            crowd: CrowdInfo::from_stats(
                CrowdStats {
                    level: crowd,
                    avg_wait_minutes: 15,
                },
                CrowdSource::Recorded,
            ),
            stored_preference: Some(StoredPreference::default()),
        }
    }

    enum WeatherStub {
        Report(f64),
        Fail,
        Slow,
    }

    #[async_trait]
    impl WeatherProvider for WeatherStub {
        async fn current_weather(&self, _city: &str) -> Result<WeatherReport, WeatherError> {
            match self {
                WeatherStub::Report(t) => Ok(WeatherReport {
                    condition: "晴".to_string(),
                    temperature_c: *t,
                    humidity: 30.0,
                    wind_descriptor: "3-4级".to_string(),
                }),
                WeatherStub::Fail => Err(WeatherError::Rejected("INVALID_USER_KEY".to_string())),
                WeatherStub::Slow => {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Err(WeatherError::MissingCredentials)
                }
            }
        }
    }

    struct CrowdStub(Option<CrowdStats>);

    #[async_trait]
    impl CrowdProvider for CrowdStub {
        async fn traffic_stats(&self, _date: NaiveDate, _hour: u32) -> Result<Option<CrowdStats>> {
            Ok(self.0)
        }
    }

    struct PreferenceStub(Result<Option<StoredPreference>, &'static str>);

    #[async_trait]
    impl PreferenceStore for PreferenceStub {
        async fn get_preference(&self, _user_id: u64) -> Result<Option<StoredPreference>> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    fn provider(
        weather: WeatherStub,
        crowd: Option<CrowdStats>,
        preference: Result<Option<StoredPreference>, &'static str>,
        now: NaiveDateTime,
    ) -> SituationalContextProvider {
        SituationalContextProvider::new(
            FestivalCalendar::default(),
            Arc::new(weather),
            Arc::new(CrowdStub(crowd)),
            Arc::new(PreferenceStub(preference)),
            Arc::new(FixedClock(now)),
        )
        .with_deadlines(Duration::from_millis(50), Duration::from_millis(50))
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn live_weather_and_recorded_crowd() {
        let recorded = CrowdStats {
            level: CrowdLevel::Low,
            avg_wait_minutes: 5,
        };
        let context = provider(
            WeatherStub::Report(8.0),
            Some(recorded),
            Ok(None),
            at(2025, 12, 21, 12),
        );
        let snapshot = context.snapshot(None).await;
        assert_eq!(snapshot.weather.temperature_c, 8.0);
        assert_eq!(snapshot.weather.wind_level, 3);
        assert_eq!(snapshot.weather.source, WeatherSource::Live);
        assert_eq!(snapshot.crowd.level, CrowdLevel::Low);
        assert_eq!(snapshot.crowd.source, CrowdSource::Recorded);
        assert_eq!(snapshot.date_info.season, Season::Winter);
        assert!(snapshot.date_info.festival_tags.contains(calendar::NOURISHING));
    }

    #[tokio::test]
    async fn failures_fall_back() {
        let context = provider(WeatherStub::Fail, None, Err("store down"), at(2025, 7, 2, 12));
        let snapshot = context.snapshot(Some(7)).await;
        assert_eq!(snapshot.weather.source, WeatherSource::Fallback);
        assert_eq!(snapshot.weather.temperature_c, 28.0);
        assert_eq!(snapshot.crowd.level, CrowdLevel::High);
        assert_eq!(snapshot.crowd.source, CrowdSource::Estimated);
        assert_eq!(snapshot.stored_preference, None);
    }

    #[tokio::test]
    async fn slow_weather_times_out() {
        let context = provider(WeatherStub::Slow, None, Ok(None), at(2025, 4, 9, 21));
        let snapshot = context.snapshot(None).await;
        assert_eq!(snapshot.weather.source, WeatherSource::Fallback);
        assert_eq!(snapshot.weather.condition, "cloudy");
        assert_eq!(snapshot.crowd.level, CrowdLevel::Low);
    }

    #[tokio::test]
    async fn anonymous_and_unknown_preferences_differ() {
        let context = provider(WeatherStub::Report(20.0), None, Ok(None), at(2025, 4, 9, 9));
        assert_eq!(
            context.snapshot(None).await.stored_preference,
            Some(StoredPreference::default())
        );
        assert_eq!(
            context.snapshot(Some(1)).await.stored_preference,
            Some(StoredPreference::default())
        );

        let failing = provider(WeatherStub::Report(20.0), None, Err("boom"), at(2025, 4, 9, 9));
        assert_eq!(failing.snapshot(None).await.stored_preference, Some(StoredPreference::default()));
        assert_eq!(failing.snapshot(Some(1)).await.stored_preference, None);
    }
}

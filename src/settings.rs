use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use clap::{Args as ClapArgs, Parser, Subcommand};
use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{context::calendar::Holiday, llm::transport::Provider};

const DEFAULT_MODEL_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "llama3.1:8b";
const DEFAULT_MODEL_TEMPERATURE: f64 = 0.3;
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 20;
const DEFAULT_WEATHER_ENDPOINT: &str = "https://restapi.amap.com/v3/weather/weatherInfo";
const DEFAULT_CITY: &str = "北京";
const DEFAULT_WEATHER_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;
const FALLBACK_DB_PATH: &str = "canteen-db";
const ENV_PREFIX: &str = "CANTEEN";

#[derive(Parser, Debug)]
#[command(version, about = "Canteen dish recommendations")]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recommend dishes for a free-text request.
    Recommend(RecommendArgs),
    /// Load dishes, preferences and traffic records from a TOML file.
    Seed {
        #[arg(value_name = "SEED_PATH")]
        file: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
pub struct RecommendArgs {
    /// What the diner asked for.
    pub query: String,

    /// Diner's user id, used for the stored preference.
    #[arg(long = "user", value_name = "USER_ID")]
    pub user_id: Option<u64>,

    /// Merge the diner's stored preference into the request.
    #[arg(long)]
    pub merge_preference: bool,

    /// Pretend the request happens at this local time, e.g. 2025-12-21T12:00:00.
    #[arg(long, value_name = "DATETIME")]
    pub at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub enabled: bool,
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: Provider::Ollama,
            base_url: DEFAULT_MODEL_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: DEFAULT_MODEL_TEMPERATURE,
            timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub city: String,
    pub timeout_secs: u64,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WEATHER_ENDPOINT.to_string(),
            api_key: None,
            city: DEFAULT_CITY.to_string(),
            timeout_secs: DEFAULT_WEATHER_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Deadline for preference and traffic lookups.
    pub store_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarSettings {
    #[serde(default)]
    pub holidays: Vec<Holiday>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub model: ModelSettings,
    pub weather: WeatherSettings,
    pub context: ContextSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub calendar: CalendarSettings,
}

impl Settings {
    /// Load settings from the given TOML file, if any, on top of defaults.
    /// `CANTEEN__SECTION__KEY` environment variables override both.
    pub fn from_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::<DefaultState>::default()
            .set_default("model.enabled", true)?
            .set_default("model.provider", "ollama")?
            .set_default("model.base_url", DEFAULT_MODEL_URL)?
            .set_default("model.model", DEFAULT_MODEL)?
            .set_default("model.temperature", DEFAULT_MODEL_TEMPERATURE)?
            .set_default("model.timeout_secs", DEFAULT_MODEL_TIMEOUT_SECS)?
            .set_default("weather.endpoint", DEFAULT_WEATHER_ENDPOINT)?
            .set_default("weather.city", DEFAULT_CITY)?
            .set_default("weather.timeout_secs", DEFAULT_WEATHER_TIMEOUT_SECS)?
            .set_default("context.store_timeout_ms", DEFAULT_STORE_TIMEOUT_MS)?
            .set_default("database.path", default_db_path().to_string_lossy().into_owned())?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

fn default_db_path() -> PathBuf {
    ProjectDirs::from("", "", "canteen-advisor").map_or_else(
        || PathBuf::from(FALLBACK_DB_PATH),
        |dirs| dirs.data_dir().join("db"),
    )
}

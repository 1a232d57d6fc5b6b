use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use encoding_rs::Encoding;
use kma_client::api::{DEFAULT_FCST_TIME, DEFAULT_FORECAST_URL};
use time::{macros::format_description, Time, UtcOffset};

use crate::sinks::event_hub::EventHubConnection;

pub const CONFIG_PATH_ENV: &str = "FORECAST_COLLECTOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "forecast-collector.toml";

pub const EVENT_HUB_NAME_ENV: &str = "SolarEventHubName";
pub const EVENT_HUB_CONNECTION_ENV: &str = "SolarEventHubConnectionString";
pub const WEBHOOK_URL_ENV: &str = "AzureWebHookUrl";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub path: PathBuf,
    /// WHATWG encoding label of the table file.
    pub encoding: String,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/solar_city.csv"),
            encoding: "euc-kr".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastApiConfig {
    pub url: String,
    pub fcst_time: String,
    /// Offset of the local calendar the base date is taken from (KST by default).
    pub utc_offset_hours: i8,
    pub timeout_secs: Option<u64>,
}

impl Default for ForecastApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FORECAST_URL.to_string(),
            fcst_time: DEFAULT_FCST_TIME.to_string(),
            utc_offset_hours: 9,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    EventHub,
    Stdout,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub max_event_bytes: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::EventHub,
            max_event_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventHubConfig {
    pub name: Option<String>,
    pub connection_string: Option<String>,
    /// REST base URL override (emulators, tests); defaults to `https://<Endpoint host>`.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Daily firing time, `HH:MM:SS` in UTC.
    pub time_utc: String,
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time_utc: "00:00:00".to_string(),
            run_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reference: ReferenceConfig,
    pub forecast_api: ForecastApiConfig,
    pub sink: SinkConfig,
    pub event_hub: EventHubConfig,
    pub webhook: WebhookConfig,
    pub schedule: ScheduleConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load the TOML file (if any), overlay the environment, then validate.
    ///
    /// An explicitly named config file must exist; the default one is optional.
    pub fn load_with<E>(env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let mut cfg = match env(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        cfg.apply_env(&env);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env<E>(&mut self, env: &E)
    where
        E: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = non_empty(EVENT_HUB_NAME_ENV) {
            self.event_hub.name = Some(name);
        }
        if let Some(conn) = non_empty(EVENT_HUB_CONNECTION_ENV) {
            self.event_hub.connection_string = Some(conn);
        }
        if let Some(url) = non_empty(WEBHOOK_URL_ENV) {
            self.webhook.url = Some(url);
        }
    }

    /// Fail fast on anything that would otherwise only break mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("forecast_api.url", &self.forecast_api.url)?;
        if let Some(url) = &self.webhook.url {
            validate_http_url(WEBHOOK_URL_ENV, url)?;
        }
        if let Some(url) = &self.event_hub.base_url {
            validate_http_url("event_hub.base_url", url)?;
        }

        let fcst_time = &self.forecast_api.fcst_time;
        if fcst_time.len() != 4 || !fcst_time.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                name: "forecast_api.fcst_time",
                reason: format!("expected 4 digits (HHMM), got '{fcst_time}'"),
            });
        }

        self.utc_offset()?;
        self.schedule_time()?;
        self.reference_encoding()?;

        if self.sink.max_event_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: "sink.max_event_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.sink.kind == SinkKind::EventHub {
            self.event_hub_target()?;
        }

        Ok(())
    }

    pub fn utc_offset(&self) -> Result<UtcOffset, ConfigError> {
        let hours = self.forecast_api.utc_offset_hours;
        if !(-12..=14).contains(&hours) {
            return Err(ConfigError::Invalid {
                name: "forecast_api.utc_offset_hours",
                reason: format!("{hours} is outside -12..=14"),
            });
        }
        UtcOffset::from_hms(hours, 0, 0).map_err(|e| ConfigError::Invalid {
            name: "forecast_api.utc_offset_hours",
            reason: e.to_string(),
        })
    }

    pub fn schedule_time(&self) -> Result<Time, ConfigError> {
        let raw = self.schedule.time_utc.trim();
        Time::parse(raw, format_description!("[hour]:[minute]:[second]")).map_err(|e| {
            ConfigError::Invalid {
                name: "schedule.time_utc",
                reason: format!("'{raw}': {e}"),
            }
        })
    }

    pub fn reference_encoding(&self) -> Result<&'static Encoding, ConfigError> {
        let label = self.reference.encoding.trim();
        Encoding::for_label(label.as_bytes()).ok_or_else(|| ConfigError::Invalid {
            name: "reference.encoding",
            reason: format!("unknown encoding '{label}'"),
        })
    }

    /// Event hub name and parsed connection string.
    pub fn event_hub_target(&self) -> Result<(String, EventHubConnection), ConfigError> {
        let name = self
            .event_hub
            .name
            .clone()
            .ok_or(ConfigError::Missing(EVENT_HUB_NAME_ENV))?;
        let conn = self
            .event_hub
            .connection_string
            .as_deref()
            .ok_or(ConfigError::Missing(EVENT_HUB_CONNECTION_ENV))?
            .parse::<EventHubConnection>()?;
        Ok((name, conn))
    }

    pub fn forecast_timeout(&self) -> Option<Duration> {
        self.forecast_api.timeout_secs.map(Duration::from_secs)
    }

    pub fn webhook_timeout(&self) -> Option<Duration> {
        self.webhook.timeout_secs.map(Duration::from_secs)
    }
}

fn validate_http_url(name: &'static str, raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: format!("'{raw}': {e}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

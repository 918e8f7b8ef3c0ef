use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_WINDOW_MINUTES: i64 = 5;
pub const DEFAULT_TIMEZONE: &str = "Australia/Sydney";
pub const DEFAULT_ROUTE_PREFIX: &str = "T";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub database: Option<DatabaseSection>,
    #[serde(default)]
    pub feed: Option<FeedSection>,
    #[serde(default)]
    pub monitor: Option<MonitorSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSection {
    /// Connection string; falls back to the DATABASE_URL environment variable.
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSection {
    /// Path to a JSON file of decoded vehicle-position records to replay.
    pub replay_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorSection {
    /// Seconds between classify/reconcile cycles (default: 60)
    pub cycle_interval_secs: Option<u64>,
    /// Trailing window length in minutes used for metrics (default: 5)
    pub window_minutes: Option<i64>,
    /// IANA timezone of the transit region (default: Australia/Sydney)
    pub timezone: Option<String>,
    /// Only route short names with this prefix are evaluated (default: "T")
    pub route_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no database url in config or DATABASE_URL environment")]
    MissingDatabaseUrl,
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Connection string for the shared store. Missing entirely is fatal at
    /// startup; the scheduler never runs without a store.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = self.database.as_ref().and_then(|d| d.url.clone()) {
            if !url.is_empty() {
                return Ok(url);
            }
        }
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Ok(url),
            _ => Err(ConfigError::MissingDatabaseUrl),
        }
    }

    pub fn max_connections(&self) -> u32 {
        self.database
            .as_ref()
            .and_then(|d| d.max_connections)
            .unwrap_or(5)
    }

    pub fn replay_path(&self) -> Option<&str> {
        let path = self.feed.as_ref()?.replay_path.as_deref()?;
        if path.is_empty() { None } else { Some(path) }
    }

    pub fn cycle_interval(&self) -> Duration {
        let secs = self
            .monitor
            .as_ref()
            .and_then(|m| m.cycle_interval_secs)
            .unwrap_or(DEFAULT_CYCLE_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn window_minutes(&self) -> i64 {
        self.monitor
            .as_ref()
            .and_then(|m| m.window_minutes)
            .unwrap_or(DEFAULT_WINDOW_MINUTES)
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        let name = self
            .monitor
            .as_ref()
            .and_then(|m| m.timezone.as_deref())
            .unwrap_or(DEFAULT_TIMEZONE);
        name.parse()
            .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
    }

    pub fn route_prefix(&self) -> &str {
        self.monitor
            .as_ref()
            .and_then(|m| m.route_prefix.as_deref())
            .unwrap_or(DEFAULT_ROUTE_PREFIX)
    }

    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(tag: &str, contents: &str) -> std::path::PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("railwatch-config-{tag}-{unique}.toml"));
        fs::write(&path, contents).expect("write temp config");
        path
    }

    #[test]
    fn default_config_is_valid_toml() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        assert_eq!(config.app.name, "railwatch");
        Ok(())
    }

    #[test]
    fn minimal_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "minimal",
            r#"
[app]
name = "railwatch"

[logging]
level = "info"
"#,
        );
        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.cycle_interval(), Duration::from_secs(60));
        assert_eq!(config.window_minutes(), 5);
        assert_eq!(config.route_prefix(), "T");
        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.timezone()?, chrono_tz::Australia::Sydney);
        assert!(config.replay_path().is_none());
        Ok(())
    }

    #[test]
    fn empty_replay_path_is_treated_as_missing() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "replay",
            r#"
[app]
name = "railwatch"

[logging]
level = "info"

[feed]
replay_path = ""
"#,
        );
        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert!(config.replay_path().is_none());
        Ok(())
    }

    #[test]
    fn unknown_timezone_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "tz",
            r#"
[app]
name = "railwatch"

[logging]
level = "info"

[monitor]
timezone = "Mars/Olympus_Mons"
"#,
        );
        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert!(matches!(
            config.timezone(),
            Err(ConfigError::UnknownTimezone(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("railwatch-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let path = write_temp_config("invalid", "not = [valid");
        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

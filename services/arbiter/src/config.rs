use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub robot_id: String,
    /// Sleep between cycles when every queue was empty.
    pub poll_interval: Duration,
    /// Bound of each producer queue.
    pub queue_capacity: usize,
    pub min_speech_confidence: f32,
    pub inactivity_timeout: Duration,
    pub sweep_interval: Duration,
    pub sync_interval: Duration,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            robot_id: "robot_001".to_string(),
            poll_interval: Duration::from_millis(10),
            queue_capacity: 64,
            min_speech_confidence: 0.7,
            inactivity_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
            sync_interval: Duration::from_secs(60),
            log_level: Level::INFO,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        let robot_id = std::env::var("ROBOT_ID").unwrap_or(defaults.robot_id);

        let poll_interval = Duration::from_millis(positive_var("POLL_INTERVAL_MS", 10)?);
        let queue_capacity = positive_var("QUEUE_CAPACITY", 64)? as usize;
        let inactivity_timeout = Duration::from_secs(positive_var("INACTIVITY_TIMEOUT_SECS", 300)?);
        let sweep_interval = Duration::from_secs(positive_var("SWEEP_INTERVAL_SECS", 30)?);
        let sync_interval = Duration::from_secs(positive_var("SYNC_INTERVAL_SECS", 60)?);

        let min_speech_confidence = match std::env::var("MIN_SPEECH_CONFIDENCE") {
            Ok(raw) => {
                let value = raw.parse::<f32>().map_err(|e| {
                    ConfigError::InvalidValue("MIN_SPEECH_CONFIDENCE".to_string(), e.to_string())
                })?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::InvalidValue(
                        "MIN_SPEECH_CONFIDENCE".to_string(),
                        format!("{} is outside [0, 1]", value),
                    ));
                }
                value
            }
            Err(_) => defaults.min_speech_confidence,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            robot_id,
            poll_interval,
            queue_capacity,
            min_speech_confidence,
            inactivity_timeout,
            sweep_interval,
            sync_interval,
            log_level,
        })
    }
}

/// Reads an optional strictly positive integer variable.
fn positive_var(name: &str, default: u64) -> Result<u64, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(default);
    };
    let value = raw
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

use std::path::PathBuf;

/// Process level failures. Protocol failures are plain [`tokio_modbus::ExceptionCode`]s.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("weather request failed: {0}")]
    Weather(#[from] reqwest::Error),

    #[error("weather service answered {status}")]
    WeatherStatus { status: reqwest::StatusCode },
}

pub type Result<T> = std::result::Result<T, Error>;

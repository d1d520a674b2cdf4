//! Static settings read once at startup from a TOML file.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio_modbus::SlaveId;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,
    /// Seconds a client may stay silent before it is disconnected, 0 to never evict.
    pub idle_timeout: u64,
    pub log_level: Option<String>,

    pub openweathermap: OpenWeatherMap,
    pub hvac: Hvac,
    pub pulse_counter: PulseCounter,
    pub water_tank: WaterTank,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 502,
            max_clients: 5,
            idle_timeout: 30,
            log_level: None,
            openweathermap: OpenWeatherMap::default(),
            hvac: Hvac::default(),
            pulse_counter: PulseCounter::default(),
            water_tank: WaterTank::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenWeatherMap {
    pub enabled: bool,
    pub api_key: String,
    pub city: String,
    pub base_url: String,
    /// Ticks between two ambient refreshes.
    pub refresh_interval: u64,
    /// HTTP timeout in seconds.
    pub timeout: u64,
}

impl Default for OpenWeatherMap {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            city: "London".to_string(),
            base_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            refresh_interval: 60,
            timeout: 5,
        }
    }
}

impl OpenWeatherMap {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Hvac {
    pub enabled: bool,
    pub unit_id: SlaveId,
    pub idle_current: f32,
    pub max_fan_speed: u16,
    /// Reject fan speed writes above `max_fan_speed` with `IllegalDataValue`.
    pub enforce_max_fan_speed: bool,
}

impl Default for Hvac {
    fn default() -> Self {
        Self {
            enabled: true,
            unit_id: 1,
            idle_current: 0.5,
            max_fan_speed: 500,
            enforce_max_fan_speed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PulseCounter {
    pub enabled: bool,
    pub unit_id: SlaveId,
}

impl Default for PulseCounter {
    fn default() -> Self {
        Self {
            enabled: true,
            unit_id: 2,
        }
    }
}

/// Tank settings. Water level thresholds are percentages of `max_tank_capacity`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaterTank {
    pub enabled: bool,
    pub unit_id: SlaveId,
    pub max_tank_capacity: u16,
    pub max_water_level: u16,
    pub min_water_level: u16,
    pub max_water_level_alarm: u16,
    pub drain_rate: u16,
    pub fill_rate: u16,
}

impl Default for WaterTank {
    fn default() -> Self {
        Self {
            enabled: true,
            unit_id: 3,
            max_tank_capacity: 1000,
            max_water_level: 80,
            min_water_level: 20,
            max_water_level_alarm: 90,
            drain_rate: 10,
            fill_rate: 15,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| Error::InvalidConfig(format!("bad listen address: {err}")))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout))
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_clients == 0 {
            return Err(Error::InvalidConfig("max_clients must be at least 1".into()));
        }

        let mut units: HashMap<SlaveId, &str> = HashMap::new();
        let enabled = [
            (self.hvac.enabled, self.hvac.unit_id, "hvac"),
            (
                self.pulse_counter.enabled,
                self.pulse_counter.unit_id,
                "pulse_counter",
            ),
            (self.water_tank.enabled, self.water_tank.unit_id, "water_tank"),
        ];
        for (_, unit_id, name) in enabled.into_iter().filter(|(on, _, _)| *on) {
            if unit_id == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{name}: unit_id 0 is the broadcast address"
                )));
            }
            if let Some(other) = units.insert(unit_id, name) {
                return Err(Error::InvalidConfig(format!(
                    "{name} and {other} share unit_id {unit_id}"
                )));
            }
        }

        let tank = &self.water_tank;
        if tank.enabled {
            if tank.max_tank_capacity == 0 {
                return Err(Error::InvalidConfig(
                    "water_tank: max_tank_capacity must be positive".into(),
                ));
            }
            if tank.min_water_level >= tank.max_water_level {
                return Err(Error::InvalidConfig(format!(
                    "water_tank: min_water_level ({}) must be below max_water_level ({})",
                    tank.min_water_level, tank.max_water_level
                )));
            }
        }

        let weather = &self.openweathermap;
        if self.hvac.enabled && weather.enabled {
            if weather.api_key.is_empty() {
                return Err(Error::InvalidConfig(
                    "openweathermap: api_key is required when enabled".into(),
                ));
            }
            if weather.refresh_interval == 0 {
                return Err(Error::InvalidConfig(
                    "openweathermap: refresh_interval must be at least 1 tick".into(),
                ));
            }
        }

        Ok(())
    }
}

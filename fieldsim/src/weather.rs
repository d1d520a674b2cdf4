//! Outside conditions fed to the HVAC.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config;
use crate::{Error, Result};

/// Outside temperature (°C) and relative humidity (%).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ambient {
    pub temperature: f32,
    pub humidity: f32,
}

#[async_trait]
pub trait AmbientProvider: Send + Sync {
    async fn current(&self) -> Result<Ambient>;
}

/// Current weather from the OpenWeatherMap HTTP API.
pub struct OpenWeatherMap {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    city: String,
}

impl OpenWeatherMap {
    pub fn new(config: &config::OpenWeatherMap) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            city: config.city.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainReadings,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f32,
    humidity: f32,
}

impl From<CurrentWeather> for Ambient {
    fn from(weather: CurrentWeather) -> Self {
        Self {
            temperature: weather.main.temp,
            humidity: weather.main.humidity,
        }
    }
}

#[async_trait]
impl AmbientProvider for OpenWeatherMap {
    async fn current(&self) -> Result<Ambient> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", self.city.as_str()),
                ("units", "metric"),
                ("appid", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::WeatherStatus { status });
        }

        let ambient = Ambient::from(response.json::<CurrentWeather>().await?);
        log::info!(
            "Weather in {}: temperature={} humidity={}",
            self.city,
            ambient.temperature,
            ambient.humidity
        );
        Ok(ambient)
    }
}

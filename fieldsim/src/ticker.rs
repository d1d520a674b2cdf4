//! Periodic simulation step.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::core::Device;
use crate::devices::ClimateControl;
use crate::weather::AmbientProvider;

struct AmbientRefresh {
    climate: Arc<ClimateControl>,
    provider: Arc<dyn AmbientProvider>,
    every: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl AmbientRefresh {
    /// Start a fetch in the background unless the previous one is still running.
    fn start(&mut self) {
        if self.in_flight.as_ref().is_some_and(|fetch| !fetch.is_finished()) {
            log::debug!("Ambient refresh still in flight, skipping this one");
            return;
        }
        let climate = Arc::clone(&self.climate);
        let provider = Arc::clone(&self.provider);
        self.in_flight = Some(tokio::spawn(async move {
            match provider.current().await {
                Ok(values) => climate.set_ambient(values),
                Err(err) => {
                    log::error!("Ambient refresh failed, keeping previous values: {err}")
                }
            }
        }));
    }
}

/// Advances every enabled device once per tick, in registration order.
pub struct Ticker {
    devices: Vec<Arc<dyn Device>>,
    ambient: Option<AmbientRefresh>,
    ticks: u64,
}

impl Ticker {
    pub fn new(devices: Vec<Arc<dyn Device>>) -> Self {
        Self {
            devices,
            ambient: None,
            ticks: 0,
        }
    }

    /// Refresh the HVAC outside conditions on the first tick, then every `every` ticks.
    ///
    /// Fetches run beside the tick loop, so a slow provider never delays device updates.
    pub fn with_ambient(
        mut self,
        climate: Arc<ClimateControl>,
        provider: Box<dyn AmbientProvider>,
        every: u64,
    ) -> Self {
        self.ambient = Some(AmbientRefresh {
            climate,
            provider: Arc::from(provider),
            every: every.max(1),
            in_flight: None,
        });
        self
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Update all devices, then start an ambient refresh if one is due.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick(&mut self) {
        for device in &self.devices {
            if let Err(err) = device.update() {
                log::error!("{}: update failed: {err}", device.name());
            }
        }

        if let Some(ambient) = &mut self.ambient {
            if self.ticks % ambient.every == 0 {
                ambient.start();
            }
        }

        self.ticks += 1;
    }

    /// Tick every `period` forever. A late tick delays the following ones.
    pub async fn run(mut self, period: Duration) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick();
        }
    }

    /// Wait for the ambient fetch started by the last refresh, if any.
    #[cfg(test)]
    async fn settle(&mut self) {
        let in_flight = self.ambient.as_mut().and_then(|ambient| ambient.in_flight.take());
        if let Some(fetch) = in_flight {
            fetch.await.unwrap();
        }
    }
}

//! Simulated field devices and their wiring.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::Config;
use crate::core::Device;
use crate::simulator::Dispatcher;
use crate::ticker::Ticker;
use crate::weather::AmbientProvider;
use crate::Result;

pub mod climate;
pub mod pulse_counter;
pub mod water_tank;

pub use climate::ClimateControl;
pub use pulse_counter::PulseCounter;
pub use water_tank::WaterTank;

/// Coils per device, whatever the device actually uses.
pub const COIL_COUNT: usize = 10;

/// Random number source owned by a single device.
pub type BoxRng = Box<dyn RngCore + Send>;

pub fn default_rng() -> BoxRng {
    Box::new(ChaCha8Rng::from_entropy())
}

/// Lock a device state, ignoring poisoning left by a panicking handler.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One instance of every device kind, built from configuration.
pub struct Devices {
    pub climate: Arc<ClimateControl>,
    pub pulse_counter: Arc<PulseCounter>,
    pub water_tank: Arc<WaterTank>,
    config: Config,
}

impl Devices {
    pub fn new(config: &Config) -> Self {
        Self {
            climate: Arc::new(ClimateControl::new(&config.hvac)),
            pulse_counter: Arc::new(PulseCounter::new(&config.pulse_counter)),
            water_tank: Arc::new(WaterTank::new(&config.water_tank)),
            config: config.clone(),
        }
    }

    /// Devices in tick order, paired with their unit id and enabled flag.
    fn all(&self) -> [(u8, Arc<dyn Device>, bool); 3] {
        [
            (
                self.config.hvac.unit_id,
                self.climate.clone() as Arc<dyn Device>,
                self.config.hvac.enabled,
            ),
            (
                self.config.pulse_counter.unit_id,
                self.pulse_counter.clone() as Arc<dyn Device>,
                self.config.pulse_counter.enabled,
            ),
            (
                self.config.water_tank.unit_id,
                self.water_tank.clone() as Arc<dyn Device>,
                self.config.water_tank.enabled,
            ),
        ]
    }

    /// Set the starting state of every enabled device.
    pub fn init(&self) -> Result<()> {
        for (unit_id, device, enabled) in self.all() {
            if enabled {
                log::info!("Booting {} (unit {unit_id})", device.name());
                device.init()?;
            }
        }
        Ok(())
    }

    /// Dispatcher routing requests to the devices by unit id.
    ///
    /// Disabled devices are registered too; the dispatcher refuses to serve them.
    pub fn dispatcher(&self) -> Result<Dispatcher> {
        let mut dispatcher = Dispatcher::default();
        for (unit_id, device, enabled) in self.all() {
            dispatcher.register(unit_id, device, enabled)?;
        }
        Ok(dispatcher)
    }

    /// Ticker updating the enabled devices, with optional ambient refresh for the HVAC.
    pub fn ticker(&self, ambient: Option<Box<dyn AmbientProvider>>) -> Ticker {
        let devices = self
            .all()
            .into_iter()
            .filter(|(_, _, enabled)| *enabled)
            .map(|(_, device, _)| device)
            .collect();
        let ticker = Ticker::new(devices);
        match ambient {
            Some(provider) if self.config.hvac.enabled => ticker.with_ambient(
                self.climate.clone(),
                provider,
                self.config.openweathermap.refresh_interval,
            ),
            _ => ticker,
        }
    }
}

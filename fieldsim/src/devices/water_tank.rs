//! Water tank filled by a pump and drained through a valve.
//!
//! In automatic mode the pump is switched by level thresholds with hysteresis;
//! above the alarm threshold the pump is always stopped. The valve is only ever
//! operated by clients.

use std::sync::Mutex;

use rand_distr::{Distribution, Uniform};

use super::{default_rng, lock, BoxRng, COIL_COUNT};
use crate::codec::{Address, Coil, Coils, ExceptionCode, InputRegisterModel, Quantity, Word};
use crate::config;
use crate::core::{Access, CoilsRequest, Device};
use crate::derive::{modbus_doc, InputRegisterModel};
use crate::Result;

/// `true` for automatic, `false` for manual.
pub const MODE_COIL: usize = 0;
/// `true` opens the valve and drains the tank.
pub const VALVE_COIL: usize = 1;
/// `true` runs the pump and fills the tank.
pub const PUMP_COIL: usize = 2;

/// Tank level and settings. Thresholds are percentages of the capacity.
#[modbus_doc]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, InputRegisterModel)]
pub struct TankReadings {
    #[modbus(addr = 100, ty = "u16")]
    pub level: u16,
    #[modbus(addr = 101, ty = "u16")]
    pub capacity: u16,
    #[modbus(addr = 102, ty = "u16", unit = "%")]
    pub max_level: u16,
    #[modbus(addr = 103, ty = "u16", unit = "%")]
    pub min_level: u16,
    #[modbus(addr = 104, ty = "u16", unit = "%")]
    pub alarm_level: u16,
    /// Drain rate applied on the last tick, zero while the valve is closed.
    #[modbus(addr = 105, ty = "u16")]
    pub drain_rate: u16,
    #[modbus(addr = 106, ty = "u16")]
    pub fill_rate: u16,
}

impl TankReadings {
    pub fn level_percent(&self) -> f32 {
        f32::from(self.level) / f32::from(self.capacity) * 100.0
    }
}

struct State {
    readings: TankReadings,
    coils: Coils<COIL_COUNT>,
    rng: BoxRng,
}

pub struct WaterTank {
    drain_rate: u16,
    drain_factor: Uniform<f64>,
    state: Mutex<State>,
}

impl WaterTank {
    pub fn new(config: &config::WaterTank) -> Self {
        Self::with_rng(config, default_rng())
    }

    pub fn with_rng(config: &config::WaterTank, rng: BoxRng) -> Self {
        let readings = TankReadings {
            level: 0,
            capacity: config.max_tank_capacity,
            max_level: config.max_water_level,
            min_level: config.min_water_level,
            alarm_level: config.max_water_level_alarm,
            drain_rate: 0,
            fill_rate: config.fill_rate,
        };
        Self {
            drain_rate: config.drain_rate,
            drain_factor: Uniform::new(0.9, 1.1),
            state: Mutex::new(State {
                readings,
                coils: Coils::default(),
                rng,
            }),
        }
    }

    pub fn readings(&self) -> TankReadings {
        lock(&self.state).readings
    }

    /// Coil values for mode, valve and pump.
    pub fn switches(&self) -> (bool, bool, bool) {
        let state = lock(&self.state);
        (
            state.coils.get(MODE_COIL),
            state.coils.get(VALVE_COIL),
            state.coils.get(PUMP_COIL),
        )
    }
}

impl Device for WaterTank {
    fn name(&self) -> &'static str {
        "Water Tank"
    }

    fn init(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.readings.level = 0;
        state.readings.drain_rate = 0;
        state.coils.set(MODE_COIL, true);
        state.coils.set(VALVE_COIL, false);
        state.coils.set(PUMP_COIL, false);
        log::debug!("Water tank input registers: {:?}", TankReadings::INPUT_REGISTERS);
        Ok(())
    }

    fn update(&self) -> Result<()> {
        let mut guard = lock(&self.state);
        let State {
            readings,
            coils,
            rng,
        } = &mut *guard;

        let percent = readings.level_percent();
        log::debug!("Water level: {} ({percent}%)", readings.level);

        // Safety override, whatever the mode.
        if percent >= f32::from(readings.alarm_level) {
            log::debug!("Water level alarm reached: {}%", readings.alarm_level);
            coils.set(PUMP_COIL, false);
        }

        if coils.get(MODE_COIL) {
            if percent >= f32::from(readings.max_level) {
                coils.set(PUMP_COIL, false);
            }
            if percent <= f32::from(readings.min_level) {
                coils.set(PUMP_COIL, true);
            }
        }

        log::debug!("Valve open: {}", coils.get(VALVE_COIL));
        if coils.get(VALVE_COIL) {
            let factor = self.drain_factor.sample(&mut *rng);
            readings.drain_rate = (f64::from(self.drain_rate) * factor) as u16;
            log::debug!("Calculated drain rate: {}", readings.drain_rate);
            readings.level = readings.level.wrapping_sub(readings.drain_rate);
        } else {
            readings.drain_rate = 0;
        }

        log::debug!("Pump on: {}", coils.get(PUMP_COIL));
        if coils.get(PUMP_COIL) {
            readings.level = readings.level.wrapping_add(readings.fill_rate);
        }

        Ok(())
    }

    fn handle_coils(&self, req: &CoilsRequest) -> std::result::Result<Vec<Coil>, ExceptionCode> {
        let mut state = lock(&self.state);
        let res = match &req.access {
            Access::Read(cnt) => state.coils.read(req.addr, *cnt),
            Access::Write(values) => state.coils.write(req.addr, values),
        }?;
        log::trace!("Water tank coils: {res:?}");
        Ok(res)
    }

    fn handle_input_registers(
        &self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Word>, ExceptionCode> {
        let res = lock(&self.state).readings.read_input_registers(addr, cnt)?;
        log::trace!("Water tank input registers: {res:?}");
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HoldingRegistersRequest;
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn tank_config() -> config::WaterTank {
        config::WaterTank {
            enabled: true,
            unit_id: 3,
            max_tank_capacity: 1000,
            max_water_level: 80,
            min_water_level: 20,
            max_water_level_alarm: 90,
            drain_rate: 100,
            fill_rate: 15,
        }
    }

    fn tank(rng: BoxRng) -> WaterTank {
        let device = WaterTank::with_rng(&tank_config(), rng);
        device.init().unwrap();
        device
    }

    fn set_level(device: &WaterTank, level: u16) {
        lock(&device.state).readings.level = level;
    }

    fn write_coil(device: &WaterTank, coil: usize, value: bool) {
        device
            .handle_coils(&CoilsRequest::write(coil as Address, vec![value]))
            .unwrap();
    }

    #[test]
    fn test_init() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        assert_eq!(device.switches(), (true, false, false));
        assert_eq!(device.readings().level, 0);
        assert_eq!(device.readings().drain_rate, 0);
    }

    #[test]
    fn test_automatic_mode_starts_pump_below_min() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        set_level(&device, 150);
        device.update().unwrap();
        assert_eq!(device.switches(), (true, false, true));
        assert_eq!(device.readings().level, 165);
    }

    #[test]
    fn test_automatic_mode_hysteresis() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        // Inside the band with the pump running: keeps running.
        set_level(&device, 500);
        write_coil(&device, PUMP_COIL, true);
        device.update().unwrap();
        assert!(device.switches().2);
        assert_eq!(device.readings().level, 515);

        // Inside the band with the pump stopped: stays stopped.
        set_level(&device, 500);
        write_coil(&device, PUMP_COIL, false);
        device.update().unwrap();
        assert!(!device.switches().2);
        assert_eq!(device.readings().level, 500);

        // At the max threshold the pump stops.
        set_level(&device, 800);
        write_coil(&device, PUMP_COIL, true);
        device.update().unwrap();
        assert!(!device.switches().2);
        assert_eq!(device.readings().level, 800);
    }

    #[test]
    fn test_alarm_stops_pump_in_manual_mode() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        write_coil(&device, MODE_COIL, false);
        set_level(&device, 900);
        write_coil(&device, PUMP_COIL, true);
        device.update().unwrap();
        assert_eq!(device.switches(), (false, false, false));
        assert_eq!(device.readings().level, 900);
    }

    #[test]
    fn test_manual_mode_leaves_pump_alone() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        write_coil(&device, MODE_COIL, false);
        set_level(&device, 100);
        device.update().unwrap();
        assert!(!device.switches().2);
        assert_eq!(device.readings().level, 100);
    }

    #[test]
    fn test_valve_drains_with_jitter() {
        let device = tank(Box::new(ChaCha8Rng::seed_from_u64(5)));
        write_coil(&device, MODE_COIL, false);
        write_coil(&device, VALVE_COIL, true);
        set_level(&device, 60_000);
        let mut level = 60_000;
        for _ in 0..100 {
            device.update().unwrap();
            let readings = device.readings();
            assert!((90..=110).contains(&readings.drain_rate));
            assert_eq!(readings.level, level - readings.drain_rate);
            level = readings.level;
        }

        write_coil(&device, VALVE_COIL, false);
        device.update().unwrap();
        assert_eq!(device.readings().drain_rate, 0);
        assert_eq!(device.readings().level, level);
    }

    #[test]
    fn test_lowest_drain_factor() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        write_coil(&device, MODE_COIL, false);
        write_coil(&device, VALVE_COIL, true);
        set_level(&device, 500);
        device.update().unwrap();
        assert_eq!(device.readings().drain_rate, 90);
        assert_eq!(device.readings().level, 410);
    }

    #[test]
    fn test_level_wraps_on_underflow() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        write_coil(&device, MODE_COIL, false);
        write_coil(&device, VALVE_COIL, true);
        set_level(&device, 50);
        device.update().unwrap();
        assert_eq!(device.readings().level, 50u16.wrapping_sub(90));
    }

    #[test]
    fn test_input_registers() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        set_level(&device, 321);
        assert_eq!(
            device.handle_input_registers(100, 7),
            Ok(vec![321, 1000, 80, 20, 90, 0, 15])
        );
        assert_eq!(device.handle_input_registers(104, 1), Ok(vec![90]));
        assert_eq!(
            device.handle_input_registers(107, 1),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            device.handle_input_registers(106, 2),
            Err(ExceptionCode::IllegalDataAddress)
        );
    }

    #[test]
    fn test_unsupported_operations() {
        let device = tank(Box::new(StepRng::new(0, 0)));
        assert_eq!(
            device.handle_holding_registers(&HoldingRegistersRequest::write(100, vec![1])),
            Err(ExceptionCode::IllegalFunction)
        );
        assert_eq!(
            device.handle_discrete_inputs(0, 3),
            Err(ExceptionCode::IllegalFunction)
        );
    }
}

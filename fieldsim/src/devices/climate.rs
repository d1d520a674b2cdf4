//! HVAC unit: a fan cooling a room below the outside temperature.
//!
//! ## Register map
//!
//! - Coil 1: fan on/off
//! - Holding register 100: fan speed in RPM, `0..=max_fan_speed`
//! - Input registers 100..=111: outside temperature, humidity, room temperature,
//!   voltage, current and power as `f32` (high word first)
//! - Input registers 200..=201: uptime in ticks as `u32`

use std::sync::Mutex;

use rand_distr::{Distribution, Uniform};

use super::{default_rng, lock, BoxRng, COIL_COUNT};
use crate::codec::{Address, Coil, Coils, ExceptionCode, InputRegisterModel, Quantity, Word};
use crate::config;
use crate::core::{Access, CoilsRequest, Device, HoldingRegistersRequest};
use crate::derive::{modbus_doc, InputRegisterModel};
use crate::weather::Ambient;
use crate::Result;

pub const FAN_STATE_COIL: usize = 1;
pub const FAN_SPEED_REG: Address = 100;

const START_TEMPERATURE: f32 = 25.0;
const START_HUMIDITY: f32 = 50.0;
const START_FAN_SPEED: u16 = 400;
const NOMINAL_VOLTAGE: f32 = 220.0;
/// Cooling per RPM, in °C.
const COOLING_PER_RPM: f32 = 0.02;
/// Room temperature change per tick, in °C.
const ROOM_TEMPERATURE_STEP: f32 = 0.1;

/// Everything the HVAC exposes, as last computed.
#[modbus_doc]
#[derive(Debug, Clone, Copy, PartialEq, Default, InputRegisterModel)]
pub struct ClimateReadings {
    #[modbus(addr = 100, ty = "f32", unit = "°C")]
    pub temperature: f32,
    #[modbus(addr = 102, ty = "f32", unit = "%")]
    pub humidity: f32,
    #[modbus(addr = 104, ty = "f32", unit = "°C")]
    pub room_temperature: f32,
    #[modbus(addr = 106, ty = "f32", unit = "V")]
    pub voltage: f32,
    #[modbus(addr = 108, ty = "f32", unit = "A")]
    pub current: f32,
    #[modbus(addr = 110, ty = "f32", unit = "W")]
    pub power: f32,
    #[modbus(addr = 200, ty = "u32", unit = "s")]
    pub uptime: u32,
    pub fan_on: bool,
    pub fan_speed: u16,
}

struct State {
    readings: ClimateReadings,
    coils: Coils<COIL_COUNT>,
    rng: BoxRng,
}

pub struct ClimateControl {
    idle_current: f32,
    max_fan_speed: u16,
    enforce_max_fan_speed: bool,
    voltage_jitter: Uniform<i32>,
    state: Mutex<State>,
}

impl ClimateControl {
    pub fn new(config: &config::Hvac) -> Self {
        Self::with_rng(config, default_rng())
    }

    pub fn with_rng(config: &config::Hvac, rng: BoxRng) -> Self {
        Self {
            idle_current: config.idle_current,
            max_fan_speed: config.max_fan_speed,
            enforce_max_fan_speed: config.enforce_max_fan_speed,
            voltage_jitter: Uniform::new(-5, 5),
            state: Mutex::new(State {
                readings: ClimateReadings::default(),
                coils: Coils::default(),
                rng,
            }),
        }
    }

    pub fn set_temperature(&self, temperature: f32) {
        lock(&self.state).readings.temperature = temperature;
    }

    pub fn set_humidity(&self, humidity: f32) {
        lock(&self.state).readings.humidity = humidity;
    }

    pub fn set_ambient(&self, ambient: Ambient) {
        let mut state = lock(&self.state);
        state.readings.temperature = ambient.temperature;
        state.readings.humidity = ambient.humidity;
    }

    pub fn readings(&self) -> ClimateReadings {
        lock(&self.state).readings
    }

    fn check_fan_speed(&self, value: Word) -> std::result::Result<(), ExceptionCode> {
        if self.enforce_max_fan_speed && value > self.max_fan_speed {
            log::warn!(
                "HVAC: illegal data value: fan speed {value} above {}",
                self.max_fan_speed
            );
            return Err(ExceptionCode::IllegalDataValue);
        }
        Ok(())
    }
}

impl Device for ClimateControl {
    fn name(&self) -> &'static str {
        "HVAC"
    }

    fn init(&self) -> Result<()> {
        let mut state = lock(&self.state);
        let voltage = NOMINAL_VOLTAGE;
        state.readings = ClimateReadings {
            temperature: START_TEMPERATURE,
            humidity: START_HUMIDITY,
            room_temperature: START_TEMPERATURE,
            voltage,
            current: self.idle_current,
            power: voltage * self.idle_current,
            uptime: 0,
            fan_on: false,
            fan_speed: START_FAN_SPEED,
        };
        state.coils.set(FAN_STATE_COIL, false);
        log::debug!("HVAC input registers: {:?}", ClimateReadings::INPUT_REGISTERS);
        Ok(())
    }

    fn update(&self) -> Result<()> {
        let mut guard = lock(&self.state);
        let State {
            readings,
            coils,
            rng,
        } = &mut *guard;

        readings.uptime = readings.uptime.wrapping_add(1);

        readings.fan_on = coils.get(FAN_STATE_COIL);
        if !readings.fan_on {
            readings.fan_speed = 0;
        }
        log::debug!(
            "HVAC fan: on={} speed={}",
            readings.fan_on,
            readings.fan_speed
        );

        let target = readings.temperature - f32::from(readings.fan_speed) * COOLING_PER_RPM;
        if readings.room_temperature < target {
            readings.room_temperature += ROOM_TEMPERATURE_STEP;
        } else if readings.room_temperature > target {
            readings.room_temperature -= ROOM_TEMPERATURE_STEP;
        }
        log::debug!(
            "HVAC temperature: outside={} target={target} room={}",
            readings.temperature,
            readings.room_temperature
        );

        readings.voltage = NOMINAL_VOLTAGE + self.voltage_jitter.sample(&mut *rng) as f32;
        readings.current = f32::from(readings.fan_speed) / 1000.0 + self.idle_current;
        readings.power = readings.voltage * readings.current;
        log::debug!(
            "HVAC power: {}V {}A {}W",
            readings.voltage,
            readings.current,
            readings.power
        );

        Ok(())
    }

    fn handle_coils(&self, req: &CoilsRequest) -> std::result::Result<Vec<Coil>, ExceptionCode> {
        let mut state = lock(&self.state);
        let res = match &req.access {
            Access::Read(cnt) => state.coils.read(req.addr, *cnt),
            Access::Write(values) => state.coils.write(req.addr, values),
        }?;
        log::trace!("HVAC coils: {res:?}");
        Ok(res)
    }

    fn handle_holding_registers(
        &self,
        req: &HoldingRegistersRequest,
    ) -> std::result::Result<Vec<Word>, ExceptionCode> {
        let cnt = req.quantity();
        // Validate the whole request before touching the state.
        for i in 0..cnt {
            if req.addr.checked_add(i) != Some(FAN_SPEED_REG) {
                log::warn!(
                    "HVAC: illegal data address: {}",
                    u32::from(req.addr) + u32::from(i)
                );
                return Err(ExceptionCode::IllegalDataAddress);
            }
        }
        if let Access::Write(values) = &req.access {
            values
                .iter()
                .try_for_each(|value| self.check_fan_speed(*value))?;
        }

        let mut state = lock(&self.state);
        if let Access::Write(values) = &req.access {
            if let Some(value) = values.last() {
                state.readings.fan_speed = *value;
            }
        }
        let res = vec![state.readings.fan_speed; cnt.into()];
        log::trace!("HVAC holding registers: {res:?}");
        Ok(res)
    }

    fn handle_input_registers(
        &self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Word>, ExceptionCode> {
        let res = lock(&self.state).readings.read_input_registers(addr, cnt)?;
        log::trace!("HVAC input registers: {res:?}");
        Ok(res)
    }
}

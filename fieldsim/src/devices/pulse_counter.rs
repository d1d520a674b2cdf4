//! Three channel pulse counter, e.g. flow or energy meter outputs.
//!
//! Coils 0, 1 and 2 enable channels 1, 2 and 3. The counts are exposed as `u32`
//! input registers at 100, 102 and 104.

use std::sync::Mutex;

use rand_distr::{Distribution, Uniform};

use super::{default_rng, lock, BoxRng, COIL_COUNT};
use crate::codec::{Address, Coil, Coils, ExceptionCode, InputRegisterModel, Quantity, Word};
use crate::config;
use crate::core::{Access, CoilsRequest, Device};
use crate::derive::InputRegisterModel;
use crate::Result;

pub const CHANNEL_COILS: [usize; 3] = [0, 1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, InputRegisterModel)]
pub struct PulseCounts {
    #[modbus(addr = 100, ty = "u32")]
    pub channel1: u32,
    #[modbus(addr = 102, ty = "u32")]
    pub channel2: u32,
    #[modbus(addr = 104, ty = "u32")]
    pub channel3: u32,
}

impl PulseCounts {
    fn channels_mut(&mut self) -> [&mut u32; 3] {
        [&mut self.channel1, &mut self.channel2, &mut self.channel3]
    }
}

struct State {
    counts: PulseCounts,
    coils: Coils<COIL_COUNT>,
    rng: BoxRng,
}

pub struct PulseCounter {
    increments: [Uniform<u32>; 3],
    state: Mutex<State>,
}

impl PulseCounter {
    pub fn new(config: &config::PulseCounter) -> Self {
        Self::with_rng(config, default_rng())
    }

    pub fn with_rng(_config: &config::PulseCounter, rng: BoxRng) -> Self {
        Self {
            increments: [
                Uniform::new(0, 10),
                Uniform::new(40, 70),
                Uniform::new(100, 150),
            ],
            state: Mutex::new(State {
                counts: PulseCounts::default(),
                coils: Coils::default(),
                rng,
            }),
        }
    }

    pub fn counts(&self) -> PulseCounts {
        lock(&self.state).counts
    }
}

impl Device for PulseCounter {
    fn name(&self) -> &'static str {
        "Pulse Counter"
    }

    fn init(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.counts = PulseCounts::default();
        for coil in CHANNEL_COILS {
            state.coils.set(coil, true);
        }
        Ok(())
    }

    fn update(&self) -> Result<()> {
        let mut guard = lock(&self.state);
        let State { counts, coils, rng } = &mut *guard;

        for ((count, coil), increment) in counts
            .channels_mut()
            .into_iter()
            .zip(CHANNEL_COILS)
            .zip(&self.increments)
        {
            let enabled = coils.get(coil);
            if enabled {
                *count = count.wrapping_add(increment.sample(&mut *rng));
            }
            log::debug!("Pulse {}: enabled={enabled} count={count}", coil + 1);
        }

        Ok(())
    }

    fn handle_coils(&self, req: &CoilsRequest) -> std::result::Result<Vec<Coil>, ExceptionCode> {
        let mut state = lock(&self.state);
        let res = match &req.access {
            Access::Read(cnt) => state.coils.read(req.addr, *cnt),
            Access::Write(values) => state.coils.write(req.addr, values),
        }?;
        log::trace!("Pulse counter coils: {res:?}");
        Ok(res)
    }

    fn handle_input_registers(
        &self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Word>, ExceptionCode> {
        let res = lock(&self.state).counts.read_input_registers(addr, cnt)?;
        log::trace!("Pulse counter input registers: {res:?}");
        Ok(res)
    }
}

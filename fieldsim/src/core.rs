use crate::codec::{Address, Coil, ExceptionCode, Quantity, Word};
use crate::Result;

/// Direction of a coil or holding register request.
#[derive(Debug, Clone, PartialEq)]
pub enum Access<T> {
    Read(Quantity),
    Write(Vec<T>),
}

/// Read or write request addressed to one device's coils or holding registers.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteableRequest<T> {
    pub addr: Address,
    pub access: Access<T>,
}

impl<T> WriteableRequest<T> {
    pub fn read(addr: Address, cnt: Quantity) -> Self {
        Self {
            addr,
            access: Access::Read(cnt),
        }
    }

    pub fn write(addr: Address, values: Vec<T>) -> Self {
        Self {
            addr,
            access: Access::Write(values),
        }
    }

    /// Number of points the request touches.
    pub fn quantity(&self) -> Quantity {
        match &self.access {
            Access::Read(cnt) => *cnt,
            Access::Write(values) => values.len() as Quantity,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self.access, Access::Write(_))
    }
}

pub type CoilsRequest = WriteableRequest<Coil>;
pub type HoldingRegistersRequest = WriteableRequest<Word>;

/// Simulated field device.
///
/// Implementations guard their whole state with a single lock: handlers are called
/// concurrently from connection tasks while the ticker calls [`Device::update`].
/// Operations a device does not offer keep the default `IllegalFunction` answer.
pub trait Device: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Reset the physical state to its starting values.
    fn init(&self) -> Result<()>;

    /// Advance the simulation by one tick.
    fn update(&self) -> Result<()>;

    fn handle_coils(&self, req: &CoilsRequest) -> std::result::Result<Vec<Coil>, ExceptionCode> {
        let _ = req;
        log::warn!("{}: illegal function: Coils", self.name());
        Err(ExceptionCode::IllegalFunction)
    }

    fn handle_discrete_inputs(
        &self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Coil>, ExceptionCode> {
        let _ = (addr, cnt);
        log::warn!("{}: illegal function: DiscreteInputs", self.name());
        Err(ExceptionCode::IllegalFunction)
    }

    fn handle_holding_registers(
        &self,
        req: &HoldingRegistersRequest,
    ) -> std::result::Result<Vec<Word>, ExceptionCode> {
        let _ = req;
        log::warn!("{}: illegal function: HoldingRegisters", self.name());
        Err(ExceptionCode::IllegalFunction)
    }

    fn handle_input_registers(
        &self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Word>, ExceptionCode> {
        let _ = (addr, cnt);
        log::warn!("{}: illegal function: InputRegisters", self.name());
        Err(ExceptionCode::IllegalFunction)
    }
}

//! Modbus TCP front end: routes requests to devices by unit id.

use std::{io, net::SocketAddr, pin::Pin, sync::Arc, time::Duration};

use futures::future;
use tokio::net::{TcpListener, TcpStream};
use tokio_io_timeout::TimeoutStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_modbus::prelude::{Request, Response, SlaveRequest};
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tokio_modbus::SlaveId;

use crate::codec::{ExceptionCode, Quantity};
use crate::core::{CoilsRequest, Device, HoldingRegistersRequest};
use crate::{Error, Result};

struct Unit {
    id: SlaveId,
    device: Arc<dyn Device>,
    enabled: bool,
}

/// Unit id to device routing table, fixed once the server is running.
#[derive(Default)]
pub struct Dispatcher {
    units: Vec<Unit>,
}

impl Dispatcher {
    /// Add a device under `unit_id`.
    ///
    /// A disabled device is kept in the table but never served. Two enabled
    /// devices cannot share a unit id.
    pub fn register(
        &mut self,
        unit_id: SlaveId,
        device: Arc<dyn Device>,
        enabled: bool,
    ) -> Result<()> {
        if enabled && self.device(unit_id).is_some() {
            return Err(Error::InvalidConfig(format!(
                "unit id {unit_id} is used by more than one enabled device"
            )));
        }
        log::debug!(
            "Registered {} as unit {unit_id} (enabled={enabled})",
            device.name()
        );
        self.units.push(Unit {
            id: unit_id,
            device,
            enabled,
        });
        Ok(())
    }

    /// Enabled device answering to `unit_id`.
    pub fn device(&self, unit_id: SlaveId) -> Option<&Arc<dyn Device>> {
        self.units
            .iter()
            .find(|unit| unit.enabled && unit.id == unit_id)
            .map(|unit| &unit.device)
    }

    /// Like [`Dispatcher::device`], with the exception to answer when there is none.
    pub fn route(&self, unit_id: SlaveId) -> std::result::Result<&dyn Device, ExceptionCode> {
        if let Some(device) = self.device(unit_id) {
            return Ok(device.as_ref());
        }
        match self.units.iter().find(|unit| unit.id == unit_id) {
            Some(unit) => log::debug!("Unit {unit_id} ({}) is disabled", unit.device.name()),
            None => log::debug!("Illegal unit id: {unit_id}"),
        }
        Err(ExceptionCode::IllegalFunction)
    }

    /// Serve one request.
    pub fn call(&self, req: SlaveRequest<'_>) -> std::result::Result<Response, ExceptionCode> {
        let SlaveRequest { slave, request } = req;
        let res = self
            .route(slave)
            .and_then(|device| dispatch(device, request));
        if let Err(exception) = &res {
            log::warn!("Unit {slave}: request rejected with {exception:?}");
        }
        res
    }
}

fn dispatch(
    device: &dyn Device,
    request: Request<'_>,
) -> std::result::Result<Response, ExceptionCode> {
    match request {
        Request::ReadCoils(addr, cnt) => device
            .handle_coils(&CoilsRequest::read(addr, cnt))
            .map(Response::ReadCoils),
        Request::WriteSingleCoil(addr, value) => device
            .handle_coils(&CoilsRequest::write(addr, vec![value]))
            .map(|_| Response::WriteSingleCoil(addr, value)),
        Request::WriteMultipleCoils(addr, values) => {
            let cnt = values.len() as Quantity;
            device
                .handle_coils(&CoilsRequest::write(addr, values.into_owned()))
                .map(|_| Response::WriteMultipleCoils(addr, cnt))
        }
        Request::ReadDiscreteInputs(addr, cnt) => device
            .handle_discrete_inputs(addr, cnt)
            .map(Response::ReadDiscreteInputs),
        Request::ReadHoldingRegisters(addr, cnt) => device
            .handle_holding_registers(&HoldingRegistersRequest::read(addr, cnt))
            .map(Response::ReadHoldingRegisters),
        Request::WriteSingleRegister(addr, value) => device
            .handle_holding_registers(&HoldingRegistersRequest::write(addr, vec![value]))
            .map(|_| Response::WriteSingleRegister(addr, value)),
        Request::WriteMultipleRegisters(addr, values) => {
            let cnt = values.len() as Quantity;
            device
                .handle_holding_registers(&HoldingRegistersRequest::write(
                    addr,
                    values.into_owned(),
                ))
                .map(|_| Response::WriteMultipleRegisters(addr, cnt))
        }
        Request::ReadInputRegisters(addr, cnt) => device
            .handle_input_registers(addr, cnt)
            .map(Response::ReadInputRegisters),
        _ => {
            log::warn!("{}: unsupported request {request:?}", device.name());
            Err(ExceptionCode::IllegalFunction)
        }
    }
}

/// [`tokio_modbus::server::Service`] for one client connection.
///
/// Holds a client slot until the connection is closed.
pub struct ConnectionService {
    dispatcher: Arc<Dispatcher>,
    peer: SocketAddr,
    _permit: OwnedSemaphorePermit,
}

impl tokio_modbus::server::Service for ConnectionService {
    type Request = SlaveRequest<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<std::result::Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        log::trace!("{}: {req:?}", self.peer);
        future::ready(self.dispatcher.call(req))
    }
}

impl Drop for ConnectionService {
    fn drop(&mut self) {
        log::info!("Client {} disconnected", self.peer);
    }
}

/// Client stream that fails with `TimedOut` once nothing was received for `idle_timeout`.
fn idle_stream(
    stream: TcpStream,
    idle_timeout: Option<Duration>,
) -> Pin<Box<TimeoutStream<TcpStream>>> {
    let mut stream = TimeoutStream::new(stream);
    stream.set_read_timeout(idle_timeout);
    Box::pin(stream)
}

/// Serve Modbus TCP on `listener` until it fails.
///
/// Connections beyond `max_clients` are closed right after being accepted.
/// A client that sends nothing for `idle_timeout` is disconnected and frees its slot.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_clients: usize,
    idle_timeout: Option<Duration>,
) -> io::Result<()> {
    let clients = Arc::new(Semaphore::new(max_clients));
    let new_service = move |peer: SocketAddr| -> io::Result<Option<ConnectionService>> {
        match Arc::clone(&clients).try_acquire_owned() {
            Ok(permit) => {
                log::info!("Client {peer} connected");
                Ok(Some(ConnectionService {
                    dispatcher: Arc::clone(&dispatcher),
                    peer,
                    _permit: permit,
                }))
            }
            Err(_) => {
                log::warn!("Client {peer} refused: {max_clients} clients already connected");
                Ok(None)
            }
        }
    };
    let on_connected = |stream, peer| {
        let accepted = accept_tcp_connection(stream, peer, &new_service).map(|accepted| {
            accepted.map(|(service, stream)| (service, idle_stream(stream, idle_timeout)))
        });
        future::ready(accepted)
    };
    let on_process_error = |err: io::Error| {
        if err.kind() == io::ErrorKind::TimedOut {
            log::info!("Closing idle client connection");
        } else {
            log::error!("Modbus connection error: {err}");
        }
    };

    let server = Server::new(listener);
    server.serve(&on_connected, on_process_error).await
}

/// Spawn [`serve`] on the tokio runtime.
pub fn spawn_tcp_simulator(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_clients: usize,
    idle_timeout: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = serve(listener, dispatcher, max_clients, idle_timeout).await {
            log::error!("Modbus server stopped: {err}");
        }
    })
}

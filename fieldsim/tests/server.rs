//! Drives the simulator through a real Modbus TCP client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_modbus::prelude::*;

use fieldsim::codec::{decode_f32, decode_u32};
use fieldsim::config::Config;
use fieldsim::core::Device;
use fieldsim::devices::Devices;
use fieldsim::simulator::spawn_tcp_simulator;

async fn start(config: Config) -> anyhow::Result<(SocketAddr, Devices)> {
    let devices = Devices::new(&config);
    devices.init()?;
    let dispatcher = Arc::new(devices.dispatcher()?);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let socket_addr = listener.local_addr()?;
    spawn_tcp_simulator(
        listener,
        dispatcher,
        config.max_clients,
        config.idle_timeout(),
    );

    Ok((socket_addr, devices))
}

#[tokio::test]
async fn test_hvac_over_tcp() -> anyhow::Result<()> {
    let (socket_addr, devices) = start(Config::default()).await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    ctx.write_single_coil(1, true).await??;
    for _ in 0..3 {
        devices.climate.update()?;
    }

    let uptime = ctx.read_input_registers(200, 2).await??;
    assert_eq!(decode_u32(uptime[0], uptime[1]), 3);
    assert_eq!(ctx.read_holding_registers(100, 1).await??, vec![400]);

    let words = ctx.read_input_registers(100, 12).await??;
    let current = decode_f32(words[8], words[9]);
    assert!((current - 0.9).abs() < 1e-6);
    assert_eq!(decode_f32(words[0], words[1]), 25.0);

    ctx.write_single_register(100, 500).await??;
    assert_eq!(
        ctx.write_single_register(100, 10000).await?,
        Err(ExceptionCode::IllegalDataValue)
    );
    ctx.write_multiple_registers(100, &[450]).await??;
    assert_eq!(ctx.read_holding_registers(100, 1).await??, vec![450]);

    assert_eq!(
        ctx.read_holding_registers(101, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.read_input_registers(112, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.read_discrete_inputs(0, 1).await?,
        Err(ExceptionCode::IllegalFunction)
    );

    ctx.write_single_coil(1, false).await??;
    devices.climate.update()?;
    assert_eq!(ctx.read_holding_registers(100, 1).await??, vec![0]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_pulse_counter_over_tcp() -> anyhow::Result<()> {
    let (socket_addr, devices) = start(Config::default()).await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(2)).await?;

    assert_eq!(ctx.read_coils(0, 3).await??, vec![true, true, true]);
    ctx.write_multiple_coils(0, &[true, false, true]).await??;
    for _ in 0..10 {
        devices.pulse_counter.update()?;
    }

    let words = ctx.read_input_registers(100, 6).await??;
    let counts: Vec<u32> = words
        .chunks_exact(2)
        .map(|pair| decode_u32(pair[0], pair[1]))
        .collect();
    assert_eq!(counts[1], 0);
    assert!(counts[0] < 100);
    assert!((1000..1500).contains(&counts[2]));
    let expected = devices.pulse_counter.counts();
    assert_eq!(counts, vec![expected.channel1, 0, expected.channel3]);

    assert_eq!(
        ctx.write_single_register(100, 1).await?,
        Err(ExceptionCode::IllegalFunction)
    );
    assert_eq!(
        ctx.read_input_registers(106, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_water_tank_over_tcp() -> anyhow::Result<()> {
    let (socket_addr, devices) = start(Config::default()).await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(3)).await?;

    assert_eq!(ctx.read_coils(0, 3).await??, vec![true, false, false]);
    assert_eq!(
        ctx.read_input_registers(100, 7).await??,
        vec![0, 1000, 80, 20, 90, 0, 15]
    );

    // Empty tank in automatic mode: the pump starts.
    devices.water_tank.update()?;
    assert_eq!(ctx.read_coils(2, 1).await??, vec![true]);
    assert_eq!(ctx.read_input_registers(100, 1).await??, vec![15]);

    // Manual mode, pump off: nothing moves.
    ctx.write_multiple_coils(0, &[false, false, false]).await??;
    devices.water_tank.update()?;
    assert_eq!(ctx.read_input_registers(100, 1).await??, vec![15]);

    assert_eq!(
        ctx.read_coils(10, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.read_input_registers(107, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.read_holding_registers(100, 1).await?,
        Err(ExceptionCode::IllegalFunction)
    );

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_unknown_and_disabled_units() -> anyhow::Result<()> {
    let mut config = Config::default();
    config.pulse_counter.enabled = false;
    let (socket_addr, _devices) = start(config).await?;
    let mut ctx = tcp::connect_slave(socket_addr, Slave(9)).await?;

    assert_eq!(
        ctx.read_input_registers(100, 1).await?,
        Err(ExceptionCode::IllegalFunction)
    );

    ctx.set_slave(Slave(2));
    assert_eq!(
        ctx.read_coils(0, 1).await?,
        Err(ExceptionCode::IllegalFunction)
    );

    // The connection stays usable after exceptions.
    ctx.set_slave(Slave(3));
    assert_eq!(ctx.read_input_registers(101, 1).await??, vec![1000]);

    ctx.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_max_clients() -> anyhow::Result<()> {
    let mut config = Config::default();
    config.max_clients = 1;
    let (socket_addr, _devices) = start(config).await?;

    let mut first = tcp::connect_slave(socket_addr, Slave(3)).await?;
    assert_eq!(first.read_input_registers(101, 1).await??, vec![1000]);

    // Accepted by the OS, then closed by the server.
    if let Ok(mut second) = tcp::connect_slave(socket_addr, Slave(3)).await {
        assert!(second.read_input_registers(101, 1).await.is_err());
    }

    first.disconnect().await?;
    drop(first);
    time::sleep(Duration::from_millis(200)).await;

    let mut third = tcp::connect_slave(socket_addr, Slave(3)).await?;
    assert_eq!(third.read_input_registers(101, 1).await??, vec![1000]);
    third.disconnect().await?;
    Ok(())
}

#[tokio::test]
async fn test_silent_client_is_evicted() -> anyhow::Result<()> {
    let mut config = Config::default();
    config.max_clients = 1;
    config.idle_timeout = 1;
    let (socket_addr, _devices) = start(config).await?;

    // Takes the only slot and never sends a request.
    let _silent = TcpStream::connect(socket_addr).await?;
    time::sleep(Duration::from_millis(1500)).await;

    let mut ctx = tcp::connect_slave(socket_addr, Slave(3)).await?;
    assert_eq!(ctx.read_input_registers(101, 1).await??, vec![1000]);
    ctx.disconnect().await?;
    Ok(())
}

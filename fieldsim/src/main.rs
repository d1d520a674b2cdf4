use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;

use fieldsim::config::Config;
use fieldsim::devices::Devices;
use fieldsim::simulator::spawn_tcp_simulator;
use fieldsim::weather::{AmbientProvider, OpenWeatherMap};

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Modbus TCP field device simulator
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    config: PathBuf,

    /// Log filter, e.g. `debug` or `fieldsim::simulator=trace`.
    /// Overrides `log_level` from the configuration and `RUST_LOG`.
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("cannot load {}", args.config.display()))?;

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filters) = args.log_level.as_deref().or(config.log_level.as_deref()) {
        logger.parse_filters(filters);
    }
    logger.init();

    let devices = Devices::new(&config);
    devices.init().context("device initialisation failed")?;
    let dispatcher = Arc::new(devices.dispatcher()?);

    let socket_addr = config.socket_addr()?;
    let listener = TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("cannot listen on {socket_addr}"))?;
    log::info!("Modbus TCP server listening on {socket_addr}");
    let server = spawn_tcp_simulator(
        listener,
        dispatcher,
        config.max_clients,
        config.idle_timeout(),
    );

    let provider = if config.openweathermap.enabled {
        let provider = OpenWeatherMap::new(&config.openweathermap)?;
        Some(Box::new(provider) as Box<dyn AmbientProvider>)
    } else {
        log::info!("OpenWeatherMap disabled, HVAC keeps its default outside conditions");
        None
    };
    let ticker = devices.ticker(provider);

    tokio::select! {
        _ = ticker.run(TICK_PERIOD) => {}
        _ = server => log::error!("Modbus server task ended"),
        res = signal::ctrl_c() => {
            res.context("cannot listen for shutdown signal")?;
            log::info!("Received shutdown signal, terminating");
        }
    }

    Ok(())
}

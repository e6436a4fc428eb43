mod collectors;
mod config;
mod cycle;
mod display;
mod http;
mod metrics;
mod render;
mod state;

use axum::serve;
use clap::Parser;
use collectors::ina219::Ina219;
use collectors::system::SysinfoHost;
use collectors::{SamplerSettings, TelemetrySampler};
use config::{Config, DisplayBackend, MonitorConfig};
use cycle::{CycleError, CycleScheduler, StopFlag, ThreadSleeper};
use display::{Display, DisplayError, LogDisplay, Ssd1306Display};
use linux_embedded_hal::I2cdev;
use metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "upsdisplay")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long)]
    display: Option<DisplayBackend>,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to open I2C device {path}: {detail}")]
    Bus { path: String, detail: String },
    #[error("failed to configure {rail} power monitor: {detail}")]
    Monitor { rail: &'static str, detail: String },
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) if err.is_not_found() => {
            warn!(path = %cli.config, "config file not found, using built-in defaults");
            Config::default()
        }
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    if let Some(backend) = cli.display {
        cfg.display.backend = backend;
        if let Err(err) = cfg.validate() {
            error!(error = %err, "invalid configuration after CLI overrides");
            std::process::exit(1);
        }
    }

    info!(
        i2c_device = %cfg.i2c_device,
        display = ?cfg.display.backend,
        tick_interval = %humantime::format_duration(cfg.cycle.tick_interval),
        "starting upsdisplay"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = if cfg.http.enabled {
        let listen = cfg.http.listen.clone();
        let metrics = metrics.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let app = http::build_router(metrics);
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "invalid http.listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start HTTP server");
                    return;
                }
            };
            info!(listen = %addr, "metrics endpoint listening");

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        }))
    } else {
        None
    };

    let stop = StopFlag::new();
    let mut cycle_task = {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        let stop = stop.clone();
        tokio::task::spawn_blocking(move || run_cycle(&cfg, metrics, stop))
    };

    let result = tokio::select! {
        res = &mut cycle_task => res,
        _ = wait_for_shutdown_signal() => {
            info!("stop signal received, finishing current tick");
            stop.request_stop();
            cycle_task.await
        }
    };

    let _ = shutdown_tx.send(true);
    if let Some(task) = http_task {
        let _ = task.await;
    }

    match result {
        Ok(Ok(())) => info!("upsdisplay stopped"),
        Ok(Err(err)) => {
            error!(error = %err, "display cycle failed");
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "display cycle task aborted");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn open_bus(path: &str) -> Result<I2cdev, AppError> {
    I2cdev::new(path).map_err(|err| AppError::Bus {
        path: path.to_string(),
        detail: err.to_string(),
    })
}

fn open_monitor(
    path: &str,
    rail: &'static str,
    cfg: &MonitorConfig,
) -> Result<Ina219<I2cdev>, AppError> {
    let gain = cfg.gain().ok_or_else(|| AppError::Monitor {
        rail,
        detail: format!("unsupported gain {} mV", cfg.gain_mv),
    })?;
    let calibration = cfg.calibration().ok_or_else(|| AppError::Monitor {
        rail,
        detail: "max_expected_amps does not fit the calibration register".to_string(),
    })?;
    let mut monitor = Ina219::new(open_bus(path)?, cfg.address, gain, calibration);
    monitor.configure().map_err(|err| AppError::Monitor {
        rail,
        detail: format!("{err:?}"),
    })?;
    info!(
        rail,
        address = cfg.address,
        calibration = monitor.calibration().register,
        "power monitor configured"
    );
    Ok(monitor)
}

fn run_cycle(cfg: &Config, metrics: Arc<Metrics>, stop: StopFlag) -> Result<(), AppError> {
    let bus = cfg.i2c_device.as_str();

    let host_rail = open_monitor(bus, "host", &cfg.power_monitors.host)?;
    let battery_rail = open_monitor(bus, "battery", &cfg.power_monitors.battery)?;
    let sampler = TelemetrySampler::new(
        SamplerSettings {
            interface: cfg.host.interface.clone(),
            temperature_sensor: cfg.host.temperature_sensor.clone(),
            ups_address: cfg.ups.address,
        },
        SysinfoHost::new(),
        host_rail,
        battery_rail,
        open_bus(bus)?,
    );

    let display: Box<dyn Display> = match cfg.display.backend {
        DisplayBackend::Ssd1306 => Box::new(Ssd1306Display::new(open_bus(bus)?, cfg.display.address)?),
        DisplayBackend::Log => Box::new(LogDisplay::new()),
    };

    let mut scheduler = CycleScheduler::new(
        cfg.cycle_settings(),
        sampler,
        display,
        ThreadSleeper,
        metrics,
        stop,
    );
    scheduler.run()?;
    Ok(())
}

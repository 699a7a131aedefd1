//! Joybridge - joystick state bridge
//!
//! Registers the configured joysticks, keeps their state slots up to date
//! from a background dispatch thread and logs state changes until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use joybridge::config::{AppConfig, Backend};
use joybridge::input::joystick::diagnostics::{
    describe_capabilities, gilrs_listing, print_device_list, virtual_listing,
};
use joybridge::input::joystick::{
    DispatchManager, GilrsProvider, JoystickDevice, ManagerCell, NativeSubsystem, VirtualProvider,
};
use joybridge::paths::AppPaths;
use joybridge::reporter::Reporter;

/// Period of the virtual backend's synthetic input
const FEED_PERIOD: Duration = Duration::from_millis(40);

/// Joybridge - bridge joysticks and gamepads into observable state slots
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the detected config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Register this device id at startup (repeatable, replaces the config's devices)
    #[arg(short, long = "device")]
    devices: Vec<u32>,

    /// Device backend (overrides the config)
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// List enumerated devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let paths = AppPaths::detect();
    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());

    // Config is read before logging starts since it decides the file output
    let mut config = AppConfig::load_or_default(&config_path).await?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if !args.devices.is_empty() {
        config.override_devices(&args.devices);
    }
    config.validate().context("Invalid configuration")?;

    let log_dir = if config.logging.file_output {
        paths.ensure_logs_dir()?;
        Some(paths.logs_dir.as_path())
    } else {
        None
    };
    let _log_guard = init_logging(&args.log_level, log_dir)?;

    info!("Starting Joybridge v{}...", env!("CARGO_PKG_VERSION"));
    if config_path.exists() {
        info!("Configuration file: {}", config_path.display());
    } else {
        warn!("⚠️  Config file {} not found, using defaults", config_path.display());
    }
    info!("Backend: {}", config.backend);

    match config.backend {
        Backend::Gilrs => {
            let settings = config.gilrs_settings();
            let manager = open_manager(move || GilrsProvider::start(settings)).await?;
            if args.list_devices {
                print_device_list("gilrs", &gilrs_listing(manager.subsystem()));
                return Ok(());
            }
            run(manager, &config).await?;
        }
        Backend::Virtual => {
            let devices = config.virtual_devices.clone();
            if devices.is_empty() {
                warn!("⚠️  No virtual_devices configured");
            }
            let manager = open_manager(move || Ok(VirtualProvider::new(devices.clone()))).await?;
            if args.list_devices {
                print_device_list("virtual", &virtual_listing(manager.subsystem()));
                return Ok(());
            }
            let feeder = manager.subsystem().spawn_feeder(FEED_PERIOD)?;
            run(manager, &config).await?;
            drop(feeder);
        }
    }

    info!("Joybridge shutdown complete");
    Ok(())
}

/// Initialize the device subsystem off the async runtime (gilrs scans for a while)
async fn open_manager<S: NativeSubsystem>(
    factory: impl Fn() -> joybridge::input::joystick::Result<S> + Send + Sync + 'static,
) -> Result<DispatchManager<S>> {
    let cell = ManagerCell::new(factory);
    let manager = tokio::task::spawn_blocking(move || cell.get())
        .await
        .context("Device subsystem startup task failed")?
        .context("Failed to initialize device subsystem")?;
    Ok(manager)
}

/// Bind the configured joysticks and report their state until Ctrl-C
async fn run<S: NativeSubsystem>(manager: DispatchManager<S>, config: &AppConfig) -> Result<()> {
    let mut reporter = Reporter::new();
    let mut devices = Vec::new();

    for device_config in &config.devices {
        let mut device = JoystickDevice::new(&manager, device_config.name.clone());
        match device.init(device_config.id) {
            Ok(caps) => info!(
                "✅ '{}' bound to {} \"{}\" ({})",
                device_config.name,
                device_config.id,
                caps.name,
                describe_capabilities(&caps)
            ),
            Err(e) => {
                warn!("⚠️  '{}' not bound: {}", device_config.name, e);
                continue;
            }
        }
        reporter.track(device_config.name.clone(), device.id(), device.slots().clone());
        devices.push(device);
    }

    if devices.is_empty() {
        warn!("No joystick bound, nothing to report (try --list-devices)");
        return Ok(());
    }

    let mut interval = tokio::time::interval(config.report_interval());
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => reporter.tick(),
            _ = &mut shutdown => break,
        }
    }

    reporter.summary();

    // Unregistering the last device joins the dispatch thread
    tokio::task::spawn_blocking(move || drop(devices))
        .await
        .context("Joystick teardown task failed")?;

    let stats = manager.stats();
    info!(
        "Dispatch totals: {} event(s) delivered, {} dropped, {} stale",
        stats.delivered, stats.dropped, stats.stale
    );
    Ok(())
}

/// Console logging, plus a daily rolling file when `log_dir` is set
fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "joybridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

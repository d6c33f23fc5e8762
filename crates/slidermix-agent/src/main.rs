//! SliderMix agent entry point.
//!
//! Wires the serial link, the routing engine and the host backend together
//! and runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config.toml + settings.json
//!  └─ RoutingEngine::from_snapshot()   -- assignments and cached volumes
//!  └─ start services
//!       ├─ LinkManager reader   (blocking pool, one per connection)
//!       ├─ DrainLoop            (Tokio task, 20 ms tick)
//!       └─ SettingsStore writer (Tokio task)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use slidermix_agent::application::drain::DrainLoop;
use slidermix_agent::application::resolvers::ResolverSet;
use slidermix_agent::application::route_slider::{RoutingEngine, SettingsObserver};
use slidermix_agent::infrastructure::audio::host_backend;
use slidermix_agent::infrastructure::autostart::Autostart;
use slidermix_agent::infrastructure::serial::transport::SerialPortOpener;
use slidermix_agent::infrastructure::serial::{LinkManager, LinkSettings, PortOpener};
use slidermix_agent::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig,
};
use slidermix_agent::infrastructure::storage::settings_store::{
    settings_file_path, SettingsError, SettingsStore,
};
use slidermix_agent::infrastructure::ui_bridge::{self, AppState};
use slidermix_core::SettingsSnapshot;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Routes hardware slider positions to volume and brightness targets.
///
/// Values given here override `config.toml`.
#[derive(Debug, Parser)]
#[command(
    name = "slidermix",
    about = "Serial slider controller to volume and brightness router",
    version
)]
struct Cli {
    /// Path to `config.toml`.  `settings.json` is kept next to it.
    #[arg(long, env = "SLIDERMIX_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port to connect to at startup (e.g. `COM3`, `/dev/ttyUSB0`).
    #[arg(long, env = "SLIDERMIX_PORT")]
    port: Option<String>,

    /// Baud rate of the controller.
    #[arg(long, env = "SLIDERMIX_BAUD")]
    baud: Option<u32>,

    /// Route to an in-memory backend instead of the real audio system.
    #[arg(long, env = "SLIDERMIX_DRY_RUN")]
    dry_run: bool,

    /// Print the available serial ports as JSON and exit.
    #[arg(long)]
    list_ports: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "SLIDERMIX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write the effective configuration (file plus the flags above) to the
    /// config path and exit.
    #[arg(long)]
    write_config: bool,

    /// Register or remove the agent as a login item and exit.
    #[arg(long, value_enum)]
    autostart: Option<AutostartMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AutostartMode {
    Enable,
    Disable,
}

impl Cli {
    /// Overlays the command-line values onto `config`.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if self.dry_run {
            config.agent.dry_run = true;
        }
        if let Some(level) = &self.log_level {
            config.agent.log_level = level.clone();
        }
    }

    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(config_file_path()?),
        }
    }

    fn settings_path(&self) -> anyhow::Result<PathBuf> {
        match self.config.as_ref().and_then(|p| p.parent()) {
            Some(dir) => Ok(dir.join("settings.json")),
            None => Ok(settings_file_path()?),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path()?;
    let mut config = load_config_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    cli.apply_to(&mut config);

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.agent.log_level)),
        )
        .init();

    let opener: Arc<dyn PortOpener> = Arc::new(SerialPortOpener::new());

    if cli.write_config {
        save_config_to(&config_path, &config)
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("{}", config_path.display());
        return Ok(());
    }

    if let Some(mode) = cli.autostart {
        let entry = Autostart::for_platform()?;
        match mode {
            AutostartMode::Enable => {
                let exe = std::env::current_exe().context("locating the agent executable")?;
                let path = entry.enable(&exe)?;
                println!("{}", path.display());
            }
            AutostartMode::Disable => {
                if !entry.disable()? {
                    info!("autostart was not enabled");
                }
            }
        }
        return Ok(());
    }

    if cli.list_ports {
        let ports = opener.available_ports()?;
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    info!(config = %config_path.display(), "SliderMix agent starting");

    // ── Settings snapshot ─────────────────────────────────────────────────────
    let settings_path = cli.settings_path()?;
    let settings = match SettingsStore::open(&settings_path) {
        Ok(store) => store,
        Err(e @ SettingsError::Parse { .. }) => {
            warn!(error = %e, "settings file unreadable, starting from defaults");
            SettingsStore::new(&settings_path, SettingsSnapshot::default())
        }
        Err(e) => return Err(e.into()),
    };
    let settings = Arc::new(settings);
    let writer = settings.spawn_writer();

    // ── Routing engine ────────────────────────────────────────────────────────
    let host = host_backend(config.agent.dry_run);
    let mut engine = RoutingEngine::from_snapshot(
        &settings.snapshot(),
        config.routing.slider_count,
        ResolverSet::for_host(host),
        Arc::clone(&settings) as Arc<dyn SettingsObserver>,
    )
    .with_resolver_timeout(config.routing.resolver_timeout());
    engine.refresh_levels().await;
    let engine = engine.into_shared();

    // ── Serial link ───────────────────────────────────────────────────────────
    let (link, lines) = LinkManager::new(opener, LinkSettings::from(&config.serial));
    let generation = link.generation();
    let state = AppState::new(
        Arc::clone(&engine),
        link,
        Arc::clone(&settings),
        config.serial.baud_rate,
    );

    match ui_bridge::auto_connect(Arc::clone(&state), config.serial.port.as_deref()).await {
        Some(port) => info!(port = %port, "connected at startup"),
        None => info!("no known controller present; waiting for a connect command"),
    }

    // Shutdown flag shared across background services.
    let running = Arc::new(AtomicBool::new(true));

    let drain = DrainLoop::new(lines, engine, generation)
        .with_interval(config.routing.drain_interval());
    let drain_task = tokio::spawn(drain.run(Arc::clone(&running)));

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl-C: {e}"),
        }
    });

    info!("SliderMix agent ready.  Press Ctrl-C to exit.");

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let result = ui_bridge::disconnect(Arc::clone(&state)).await;
    if let Some(e) = result.error {
        warn!(error = %e, "error while closing serial link");
    }
    if let Err(e) = drain_task.await {
        warn!(error = %e, "drain loop ended abnormally");
    }
    writer.abort();
    if let Err(e) = settings.flush() {
        warn!(error = %e, "failed to save settings on exit");
    }

    info!("SliderMix agent stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Southbound gateway daemon
//!
//! Loads a TOML gateway configuration, starts every configured device and
//! runs until SIGINT or SIGTERM. SIGHUP reloads the configuration file and
//! restarts the orchestrator with it.
//!
//! Usage: southboundd [-c FILE] [-v]... [--check]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use southbound::modbus::{ModbusAdapter, ADAPTER_TYPE};
use southbound::{logging, GatewayConfig, Orchestrator, PluginRegistry};

const DEFAULT_CONFIG_PATH: &str = "/etc/southbound/southbound.toml";

#[derive(Parser, Debug)]
#[command(name = "southboundd", version, about = "Southbound device gateway daemon")]
struct Cli {
    /// Gateway configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Raise the configured log level by one step per occurrence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Shutdown,
    Reload,
}

/// Signal streams, polled on a private single-threaded runtime.
///
/// The orchestrator is only driven between `block_on` calls, outside any
/// runtime context, because adapters may run their own runtimes.
struct Signals {
    runtime: Runtime,
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hup: tokio::signal::unix::Signal,
}

fn signal_runtime() -> anyhow::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")
}

#[cfg(unix)]
impl Signals {
    fn install() -> anyhow::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let runtime = signal_runtime()?;
        let (term, hup) = runtime.block_on(async {
            anyhow::Ok((
                signal(SignalKind::terminate()).context("installing SIGTERM handler")?,
                signal(SignalKind::hangup()).context("installing SIGHUP handler")?,
            ))
        })?;
        Ok(Self { runtime, term, hup })
    }

    fn wait(&mut self) -> Event {
        let Self { runtime, term, hup } = self;
        runtime.block_on(async {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!(?err, "failed to listen for Ctrl+C");
                    }
                    Event::Shutdown
                }
                _ = term.recv() => Event::Shutdown,
                _ = hup.recv() => Event::Reload,
            }
        })
    }
}

#[cfg(not(unix))]
impl Signals {
    fn install() -> anyhow::Result<Self> {
        Ok(Self {
            runtime: signal_runtime()?,
        })
    }

    fn wait(&mut self) -> Event {
        self.runtime.block_on(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(?err, "failed to listen for Ctrl+C");
            }
            Event::Shutdown
        })
    }
}

fn registry() -> anyhow::Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry
        .register_builtin_type::<ModbusAdapter>(ADAPTER_TYPE)
        .context("registering builtin modbus adapter")?;
    Ok(registry)
}

fn launch(config: &GatewayConfig) -> anyhow::Result<Orchestrator> {
    if config.daemon_mode {
        info!("daemon_mode is set; staying in the foreground, use the service manager to detach");
    }

    let orchestrator = Orchestrator::with_registry(registry()?);
    orchestrator
        .initialize(config)
        .context("initializing orchestrator")?;
    orchestrator.start().context("starting orchestrator")?;
    info!(
        devices = orchestrator.device_names().len(),
        plugins = orchestrator.loaded_plugins().len(),
        "gateway running"
    );
    Ok(orchestrator)
}

fn load(path: &Path) -> anyhow::Result<GatewayConfig> {
    GatewayConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load(&cli.config)?;

    if cli.check {
        println!(
            "{}: ok ({} devices, plugin_dir {})",
            cli.config.display(),
            config.devices.len(),
            config.plugin_dir.display()
        );
        return Ok(());
    }

    logging::init(config.log_level.saturating_add(cli.verbose));
    info!(config = %cli.config.display(), version = southbound::VERSION, "southboundd starting");

    let mut signals = Signals::install()?;
    let mut orchestrator = launch(&config)?;

    loop {
        match signals.wait() {
            Event::Shutdown => {
                info!("shutdown requested");
                orchestrator.stop();
                break;
            }
            Event::Reload => {
                info!("reload requested");
                match load(&cli.config) {
                    Ok(fresh) => {
                        // Old connections close before the new ones open.
                        orchestrator.stop();
                        drop(orchestrator);
                        orchestrator = launch(&fresh)?;
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "reload failed, keeping current configuration")
                    }
                }
            }
        }
    }

    print!("{}", orchestrator.service_status());
    info!("southboundd exited");
    Ok(())
}

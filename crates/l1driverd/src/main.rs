//! L1 switch driver daemon entry point.
//!
//! The launcher starts the process with the TCP port and log directory;
//! everything else comes from the configuration file.

use clap::Parser;
use l1_mapping::{MappingEngine, TopologySource};
use l1driverd::{
    init_logging, CommandDispatcher, ConfigOverrides, DaemonConfig, FileTopologySource, Result,
    Server, DEFAULT_CONFIG_PATH,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// L1 switch driver daemon
#[derive(Parser, Debug)]
#[command(name = "l1driverd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// TCP port to listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Directory for l1driverd.log (stderr when unset)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Topology file served by AutoLoad
    #[arg(short = 't', long)]
    topology: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            log_dir: self.log_dir.clone(),
            log_level: self.log_level.clone(),
            topology: self.topology.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match DaemonConfig::load_or_default(&args.config)
        .map(|c| c.with_overrides(args.overrides()))
        .and_then(|c| c.validate().map(|()| c))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("l1driverd: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match init_logging(&config.logging) {
        Ok(Some(path)) => info!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("l1driverd: {}", e);
            return ExitCode::FAILURE;
        }
    }

    info!("Starting l1driverd");
    match run(config).await {
        Ok(()) => {
            info!("l1driverd exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("l1driverd failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: DaemonConfig) -> Result<()> {
    let policy = config.mapping_policy();
    info!(
        fan_out = policy.fan_out,
        bidi_remap = policy.bidi_remap,
        lock_timeout_ms = config.mapping.lock_timeout_ms,
        "Mapping policy"
    );
    let engine = Arc::new(MappingEngine::new(policy));

    let topology: Option<Arc<dyn TopologySource>> = match &config.topology.file {
        Some(path) => {
            info!("AutoLoad reads {}", path.display());
            Some(Arc::new(FileTopologySource::new(path)))
        }
        None => {
            warn!("No topology file configured, AutoLoad will fail");
            None
        }
    };

    let dispatcher = Arc::new(CommandDispatcher::new(engine, topology));
    let server = Server::bind(
        config.socket_addr()?,
        dispatcher,
        config.server.max_line_bytes,
    )
    .await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, shutting down");
            shutdown.cancel();
        }
    });

    server.run().await
}

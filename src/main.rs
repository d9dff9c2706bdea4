//! Filer Provisioner
//!
//! Runs the provisioning controller behind its REST API. In this binary the
//! remote file API is the in-process [`InMemoryFileService`], which makes it
//! usable for local development and end-to-end testing of orchestrator
//! integrations.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use filer_provisioner::{
    ApiServer, ApiServerConfig, ControllerServer, DriverConfig, Error, InMemoryFileService,
    IpRangeAllocator, Result, StaticMetadata,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Filer Provisioner - idempotent control plane for network file shares
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Driver configuration file (YAML)
    #[arg(long, env = "DRIVER_CONFIG")]
    config: Option<PathBuf>,

    /// Project to provision into (overrides the configuration file)
    #[arg(long, env = "PROJECT")]
    project: Option<String>,

    /// Default zone (overrides the configuration file)
    #[arg(long, env = "ZONE")]
    zone: Option<String>,

    /// Deadline for each controller call, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30")]
    request_timeout_secs: u64,

    /// Allow cross-origin API requests
    #[arg(long, env = "ENABLE_CORS")]
    enable_cors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;

    info!("Starting Filer Provisioner");
    info!("  Version: {}", filer_provisioner::VERSION);
    info!("  Driver: {}", config.driver_name);
    info!("  Project: {}", config.project);
    info!("  Zone: {}", config.zone);
    info!("  REST API: {}", args.api_addr);

    let allocator = IpRangeAllocator::with_block_prefix_len(config.reserved_block_prefix_len);
    let metadata = Arc::new(StaticMetadata::from_config(&config));
    let controller = ControllerServer::new(
        config,
        Arc::new(InMemoryFileService::new()),
        metadata,
        allocator,
    )?;
    info!("Controller initialized");

    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
        request_timeout_secs: args.request_timeout_secs,
        enable_cors: args.enable_cors,
    };

    let api_server = Arc::new(ApiServer::new(api_config, controller));

    let signal_server = api_server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                signal_server.shutdown();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    api_server.run().await?;

    info!("Provisioner shutdown complete");
    Ok(())
}

/// Defaults, then the YAML file, then CLI/env overrides
fn load_config(args: &Args) -> Result<DriverConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            DriverConfig::from_yaml_file(path)?
        }
        None => DriverConfig::default(),
    };

    if let Some(project) = &args.project {
        config.project = project.clone();
    }
    if let Some(zone) = &args.zone {
        config.zone = zone.clone();
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower=warn", "tower_http=info", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

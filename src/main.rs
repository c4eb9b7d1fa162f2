//! CSI Array Plane
//!
//! Runs the multi-array control plane with its status API: loads the
//! mounted credentials, watches them for rotation and, in node mode,
//! registers this host with every array.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use csi_array_plane::{
    ApiServer, ApiServerConfig, DriverArgs, DriverOptions, LinuxConnectorFactory,
    RestClientFactory, Service,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// CSI Array Plane - multi-array control plane for a CSI storage driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    driver: DriverArgs,

    /// Status API bind address
    #[arg(long, env = "API_ADDR", default_value = csi_array_plane::controlplane::DEFAULT_API_ADDR)]
    api_addr: String,

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
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let options = DriverOptions::from_args(args.driver.clone()).context("invalid driver options")?;

    init_logging(&args, options.debug);

    info!("Starting CSI Array Plane");
    info!("  Version: {}", csi_array_plane::VERSION);
    info!("  Driver config: {}", options.driver_config.display());
    info!("  Mode: {}", options.mode);
    info!("  Status API: {}", args.api_addr);

    let api_config = ApiServerConfig::new(
        args.api_addr
            .parse()
            .with_context(|| format!("invalid status API address '{}'", args.api_addr))?,
    );

    let service = Service::new(
        options,
        Arc::new(RestClientFactory),
        Arc::new(LinuxConnectorFactory::default()),
    )?;
    service.start().await.context("startup failed")?;

    let server = ApiServer::new(api_config, service.clone());
    let mut server_handle = tokio::spawn(async move { server.run().await });

    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Shutdown signal received");
            service.shutdown().await;
            server_handle.await
        }
        finished = &mut server_handle => {
            service.shutdown().await;
            finished
        }
    };

    match server_result {
        Ok(Ok(())) => {
            info!("Shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "status API failed");
            Err(e).context("status API failed")
        }
        Err(e) => {
            error!(error = %e, "status API task panicked");
            Err(e).context("status API task panicked")
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args, debug: bool) {
    let level = if debug {
        Level::DEBUG
    } else {
        match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "tower=warn", "axum=info"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
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

//! netlabeld: network traffic labeling policy daemon
//!
//! Loads the labeling configuration, seeds the policy tables and serves the
//! administrative control plane over a Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! sudo ./netlabeld
//!
//! # Run with custom configuration
//! sudo ./netlabeld -c /path/to/config.json
//!
//! # Run with environment overrides
//! NETLABELD_LOG_LEVEL=debug sudo ./netlabeld
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use netlabel::config::{build_netlabel, load_config_with_env, Config};
use netlabel::ipc::{IpcHandler, IpcServer};

/// Command-line arguments
struct Args {
    /// Configuration file path
    config_path: PathBuf,
    /// Generate default configuration
    generate_config: bool,
    /// Check configuration only
    check_config: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config_path = PathBuf::from("/etc/netlabeld/config.json");
        let mut generate_config = false;
        let mut check_config = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    if let Some(path) = args.next() {
                        config_path = PathBuf::from(path);
                    }
                }
                "-g" | "--generate-config" => {
                    generate_config = true;
                }
                "--check" => {
                    check_config = true;
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("netlabeld v{}", netlabel::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {arg}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Self {
            config_path,
            generate_config,
            check_config,
        }
    }
}

fn print_help() {
    println!(
        r#"netlabeld v{}

Network traffic labeling policy daemon.

USAGE:
    netlabeld [OPTIONS]

OPTIONS:
    -c, --config <PATH>     Configuration file path [default: /etc/netlabeld/config.json]
    -g, --generate-config   Generate default configuration and exit
    --check                 Check configuration and exit
    -h, --help              Print help information
    -v, --version           Print version information

ENVIRONMENT:
    NETLABELD_LOG_LEVEL         Override log level (trace, debug, info, warn, error)
    NETLABELD_IPC_SOCKET        Override IPC socket path
    NETLABELD_ACCEPT_UNLABELED  Override the accept-unlabeled flag (true/false)

EXAMPLE:
    netlabeld -c /etc/netlabeld/config.json
    netlabelctl map list
"#,
        netlabel::VERSION
    );
}

/// Initialize logging
fn init_logging(config: &Config) {
    let level = match config.log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.log.target);

    match (config.log.format.as_str(), config.log.timestamps) {
        ("json", true) => subscriber.json().init(),
        ("json", false) => subscriber.json().without_time().init(),
        (_, true) => subscriber.init(),
        (_, false) => subscriber.without_time().init(),
    }
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();

    let args = Args::parse();

    if args.generate_config {
        netlabel::config::create_default_config(&args.config_path)?;
        println!("Generated default configuration at {:?}", args.config_path);
        return Ok(());
    }

    let config = load_config_with_env(&args.config_path).with_context(|| {
        format!("Failed to load configuration from {:?}", args.config_path)
    })?;

    if args.check_config {
        build_netlabel(&config).context("Configuration cannot be applied")?;
        println!("Configuration is valid");
        return Ok(());
    }

    init_logging(&config);

    info!("netlabeld v{}", netlabel::VERSION);
    info!("Configuration loaded from {:?}", args.config_path);

    let netlabel = build_netlabel(&config).context("Failed to seed labeling tables")?;
    let netlabel = Arc::new(netlabel);

    let status = netlabel.status();
    info!(
        "Labeling tables ready: {} domains, {} static mappings, accept_unlabeled={}, enabled={}",
        status.domains, status.static_mappings, status.accept_unlabeled, status.enabled
    );

    let ipc_handler = Arc::new(IpcHandler::new(Arc::clone(&netlabel)));
    let ipc_server = IpcServer::new(config.ipc.clone(), ipc_handler);
    let ipc_shutdown = ipc_server.shutdown_sender();
    let mut ipc_stopped = ipc_server.shutdown_sender().subscribe();

    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server.run().await {
            error!("IPC server error: {}", e);
        }
    });

    info!(
        "Startup complete in {:.2}ms",
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, initiating shutdown...");
        }
        () = wait_for_sigterm() => {
            info!("Received SIGTERM, initiating shutdown...");
        }
        _ = ipc_stopped.recv() => {
            info!("Shutdown requested over IPC");
        }
    }

    info!("Shutting down...");

    let _ = ipc_shutdown.send(());
    if tokio::time::timeout(std::time::Duration::from_secs(5), ipc_handle)
        .await
        .is_err()
    {
        warn!("IPC server did not stop within 5s");
    }

    netlabel.shutdown();

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGTERM signal
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

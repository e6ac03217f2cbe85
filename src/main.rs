// src/main.rs
use anyhow::{bail, Result};
use tokio::signal;
use tracing::info;

use flowgate::agent::Agent;
use flowgate::config::{self, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flowgate=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config = load_from_cli().await?;

    let agent = Agent::new(config)?;

    tokio::select! {
        result = agent.run() => result,
        _ = shutdown_signal() => {
            info!("shutting down");
            Ok(())
        }
    }
}

/// Assemble the config from `--config`, `--backends`, `--listen` and the
/// `FLOWGATE_BACKENDS` environment variable. Flags override file values.
async fn load_from_cli() -> Result<Config> {
    let mut config_path: Option<String> = None;
    let mut backends: Option<String> = None;
    let mut listen: Option<String> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next(),
            "--backends" => backends = args.next(),
            "--listen" => listen = args.next(),
            "--help" | "-h" => {
                println!(
                    "flowgate: an L7 round-robin load balancer\n\n\
                     USAGE: flowgate [--config FILE] [--backends a,b,c] [--listen ADDR]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let mut config = match config_path {
        Some(path) => {
            info!("loading configuration from {path}");
            config::load_config(&path).await?
        }
        None => Config::default(),
    };

    let backends = backends.or_else(|| std::env::var("FLOWGATE_BACKENDS").ok());
    if let Some(list) = backends {
        config.backends = config::parse_backend_list(&list);
    }
    if let Some(addr) = listen {
        config.listen_addr = addr.parse()?;
    }

    Ok(config)
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// src/main.rs

//! The main entry point for the tcp-bridge component.

use anyhow::{Result, anyhow};
use clap::Parser;
use tcp_bridge::config::Config;
use tcp_bridge::core::component::ComponentDoc;
use tcp_bridge::server::{self, Endpoints};
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

/// Bridges TCP client connections onto message ports.
#[derive(Parser, Debug)]
#[command(name = "tcp-bridge", version, about, long_about = None)]
struct Cli {
    /// Component's options port endpoint
    #[arg(long = "port.options", value_name = "ENDPOINT", required_unless_present = "json")]
    options: Option<String>,

    /// Component's input port endpoint
    #[arg(long = "port.in", value_name = "ENDPOINT", required_unless_present = "json")]
    input: Option<String>,

    /// Component's output port endpoint
    #[arg(long = "port.out", value_name = "ENDPOINT", required_unless_present = "json")]
    output: Option<String>,

    /// Print component documentation in JSON
    #[arg(long)]
    json: bool,

    /// Enable debug mode
    #[arg(long)]
    debug: bool,

    /// Optional TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json {
        println!("{}", ComponentDoc::tcp_bridge().to_json()?);
        return Ok(());
    }

    // Load the configuration if one was given; every setting has a default.
    let config = match cli.config.as_deref() {
        Some(path) => match Config::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e:#}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    // RUST_LOG wins, then --debug, then the configured level.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.debug {
            "debug".to_string()
        } else {
            config.log_level.clone()
        }
    });
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true),
        )
        .init();

    let endpoints = Endpoints {
        options: cli
            .options
            .ok_or_else(|| anyhow!("--port.options is required"))?,
        input: cli.input.ok_or_else(|| anyhow!("--port.in is required"))?,
        output: cli.output.ok_or_else(|| anyhow!("--port.out is required"))?,
    };

    info!("tcp-bridge {} starting", env!("CARGO_PKG_VERSION"));
    if let Err(e) = server::run(endpoints, config).await {
        error!("Bridge runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

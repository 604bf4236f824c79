//! nats-probe - check that a NATS configuration connects
//!
//! Loads `.env`, an optional YAML config file and environment overrides, runs
//! the NATS module constructors and reports what it connected to.

use clap::Parser;
use std::path::PathBuf;
use std::process;

use natsmod::nats::{flush, shutdown};
use natsmod::{ConfigSource, NatsModule, Settings};

#[derive(Parser)]
#[command(name = "nats-probe")]
#[command(version, about = "Connect to NATS using a natsmod configuration and report the result", long_about = None)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration namespace holding the NATS keys
    #[arg(short, long, default_value = "nats")]
    prefix: String,

    /// Prefix for environment overrides (e.g. APP reads APP_NATS_URL)
    #[arg(short, long, default_value = "")]
    env_prefix: String,

    /// Server URL, overriding every other source
    #[arg(short, long)]
    url: Option<String>,

    /// Also query JetStream account information
    #[arg(short, long)]
    jetstream: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_yaml_file(path)?,
        None => Settings::new(),
    };
    settings.automatic_env(cli.env_prefix.as_str());

    if let Some(url) = &cli.url {
        settings.set(&format!("{}.url", cli.prefix), url.as_str());
    }
    if cli.jetstream && !settings.is_set(&format!("{}.jetstream", cli.prefix)) {
        settings.set(&format!("{}.jetstream.enable", cli.prefix), true);
    }

    let module = NatsModule::with_prefix(cli.prefix.as_str());
    let components = module.provide(&settings).await?;

    let info = components.client.server_info();
    println!("✅ Connected to {} ({})", info.server_name, info.server_id);
    println!("   version:     {}", info.version);
    println!("   max payload: {} bytes", info.max_payload);
    println!("   jetstream:   {} option(s)", components.streamer_config.len());

    if cli.jetstream {
        let account = components.streamer.context().query_account().await?;
        println!("   account:     {:?}", account);
    }

    flush(&components.client, &components.options).await?;
    shutdown(components.client, &components.options).await?;

    Ok(())
}

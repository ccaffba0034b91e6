use anonkv::config::Config;
use anonkv::response::server_info;
use anonkv::server::Server;
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::{ChronoLocal, ChronoUtc};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

#[derive(Debug, Parser)]
#[command(name = "anonkv", about = "Persistent key-value store with value anonymization")]
struct Cli {
    /// Server config file
    #[arg(long, default_value = "config.json")]
    config: String,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", server_info());
        return Ok(());
    }

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Unable to parse config file {}", cli.config))?;

    init_tracing(&config)?;

    tracing::info!("Configuration: {}", config.to_json());

    let server = Server::new(config).context("Failed to create server")?;
    server.run().await.context("Server error")?;

    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    let level = if config.is_verbose() { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("anonkv={}", level).into());

    let (writer, ansi) = if config.log_file.is_empty() {
        (BoxMakeWriter::new(std::io::stdout), true)
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .with_context(|| format!("Unable to open log file {}", config.log_file))?;
        (BoxMakeWriter::new(Mutex::new(file)), false)
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.utc {
        fmt_layer.with_timer(ChronoUtc::rfc_3339()).boxed()
    } else {
        fmt_layer.with_timer(ChronoLocal::rfc_3339()).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    Ok(())
}

//! rekrut - authentication backend for the recruiting platform

use clap::{Parser, Subcommand};
use rekrut_api::ApiServer;
use rekrut_core::RekrutConfig;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rekrut")]
#[command(version = rekrut_core::VERSION)]
#[command(about = "Dual-mode (LDAP + local) authentication backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "REKRUT_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "REKRUT_PORT")]
    port: Option<u16>,

    /// Database URL
    #[arg(long, env = "REKRUT_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REKRUT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the authentication API server
    Server,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    // Load config, then apply env and CLI overrides
    let mut config = if let Some(config_path) = &cli.config {
        RekrutConfig::from_file(config_path)?
    } else {
        RekrutConfig::default()
    };
    config.apply_env();

    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("rekrut {}", rekrut_core::VERSION);
        }
        Some(Commands::Server) | None => {
            run_server(config).await?;
        }
    }

    Ok(())
}

async fn run_server(config: RekrutConfig) -> anyhow::Result<()> {
    info!("Starting rekrut auth server...");
    info!("Database: {}", config.database.url);
    info!(
        "Directory path: {}",
        if config.ldap.enabled {
            config.ldap.server_url.as_str()
        } else {
            "disabled"
        }
    );

    let server = ApiServer::new(config);
    server.run().await?;

    Ok(())
}

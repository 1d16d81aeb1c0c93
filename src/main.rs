//! FlockFS - Coordination Substrate for a Replicated Shared Document
//!
//! Peer discovery, lease-based mutual exclusion and snapshot replication
//! for a shared filesystem document.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flockfs::api::HttpServer;
use flockfs::config::FlockConfig;
use flockfs::error::Result;
use flockfs::node::Node;

/// FlockFS - Coordination substrate for a replicated shared document
#[derive(Parser)]
#[command(name = "flockfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "flockfs.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the FlockFS peer
    Start,

    /// Check peer status
    Status {
        /// HTTP API address to query
        #[arg(short, long, default_value = "localhost:8080")]
        address: String,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "flockfs.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value = "peer-1")]
        node_id: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information from the configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Status { address } => run_status(address).await,
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the FlockFS peer
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting FlockFS peer...");

    let config = match FlockConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    tracing::info!("Loaded configuration for node: {}", config.node.id);

    let node = Node::new(config.clone())?;
    node.start().await?;

    let http_server = HttpServer::new(config.api.clone(), Arc::clone(&node));
    tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    Ok(())
}

/// Check peer status via the HTTP API
async fn run_status(address: String) -> Result<()> {
    let url = format!("http://{}/status", address);

    match reqwest::get(&url).await {
        Ok(response) => {
            let status: serde_json::Value = response
                .json()
                .await
                .map_err(|e| flockfs::Error::Network(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&status).unwrap());
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to get status: {}", e);
            Err(flockfs::Error::Network(e.to_string()))
        }
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    let config_content = format!(
        r#"# FlockFS Configuration
# Generated configuration file

[node]
id = "{node_id}"
bind_address = "0.0.0.0:6000"
# Other peers connect to this address; set it to a routable IP
advertise_address = "127.0.0.1:6000"
data_dir = "/var/lib/flockfs/{node_id}"

[discovery]
enabled = true
port = 5000
announce_interval_secs = 5
stale_factor = 3
startup_grace_secs = 3
seed_peers = []
# seed_peers = ["10.0.0.6:6000", "10.0.0.7:6000"]

[lease]
cleanup_interval_secs = 60
expiration_secs = 300

[network]
connect_timeout_secs = 3
request_timeout_secs = 10

[api]
enabled = true
bind_address = "0.0.0.0:8080"
cors_enabled = false

[logging]
level = "info"
format = "pretty"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit advertise_address to this machine's routable IP.");
    println!("Then start with: flockfs start --config {}", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match FlockConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Bind Address: {}", config.node.bind_address);
            println!("  Advertise Address: {}", config.advertise_address());
            println!("  Discovery: {}", if config.discovery.enabled { "enabled" } else { "disabled" });
            println!("  Seed Peers: {}", config.discovery.seed_peers.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = FlockConfig::from_file(&config_path)?;

    println!("FlockFS Node Information");
    println!("  Node ID:           {}", config.node.id);
    println!("  Control Endpoint:  {}", config.advertise_address());
    println!("  Data Directory:    {}", config.data_dir().display());
    println!("  Discovery Port:    {}", config.discovery.port);
    println!("  Announce Interval: {:?}", config.announce_interval());
    println!("  Lease Expiration:  {:?}", config.lease_expiration());
    println!("  HTTP API:          {}", config.api.bind_address);

    Ok(())
}

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use callbridge::{
    ServerConfig,
    handlers::calls::{PlaceCallRequest, place_and_await},
    routes,
    state::AppState,
};

/// Callbridge - Realtime telephony to AI voice bridge
#[derive(Parser, Debug)]
#[command(name = "callbridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge server
    Serve,

    /// Start the server, place one call and print its transcript as JSON
    Call {
        /// Number to dial
        #[arg(long = "to")]
        to: String,

        /// Context for the AI describing the purpose of the call
        #[arg(long = "context", default_value = "")]
        context: String,

        /// How long to wait for the call to finish
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
            shutdown.cancel();
        }
    });

    let app_state = AppState::new(config, shutdown.clone());

    let listener = TcpListener::bind(&socket_addr).await?;
    println!("Server listening on http://{}", socket_addr);

    let server = routes::serve(listener, app_state.clone());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            server.await?;
        }
        Commands::Call {
            to,
            context,
            timeout_ms,
        } => {
            let server_task = tokio::spawn(server);

            let request = PlaceCallRequest {
                to_number: to,
                call_context: context,
                timeout_ms,
            };
            let (status, result) = place_and_await(&app_state, request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            shutdown.cancel();
            server_task.await??;

            if !status.is_success() {
                anyhow::bail!("Call did not complete ({})", status);
            }
        }
    }

    Ok(())
}

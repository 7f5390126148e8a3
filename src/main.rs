use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use gemini_live_relay::config::{Cli, Config};
use gemini_live_relay::server::openai_api::{build_router, AppState};
use gemini_live_relay::upstream::GeminiLiveConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "gemini_live_relay=debug,tower_http=debug"
    } else {
        "gemini_live_relay=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("gemini-live-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    info!(
        endpoint = %config.upstream.endpoint,
        api_version = %config.upstream.api_version,
        default_model = %config.models.default_model,
        max_history_turns = config.conversation.max_history_turns,
        "Configuration loaded"
    );

    // Build application state.
    let connector = Arc::new(GeminiLiveConnector::new(config.upstream.clone()));
    let state = Arc::new(AppState::new(config.clone(), connector)?);

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

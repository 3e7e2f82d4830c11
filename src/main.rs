use gameroom::config;
use gameroom::registry::Registry;
use gameroom::server::{self, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config::init()?;

    let port = config::port()?;
    let game_config = config::load_game_config()?;

    let registry = Registry::new(game_config);
    let app = server::router(AppState { registry });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;

    tracing::info!("Game room server running on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

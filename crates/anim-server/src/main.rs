use std::net::SocketAddr;
use std::sync::Arc;

use anim_ai::{ConfigGenerator, OpenAiModel};
use anim_server::ServerConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; generation requests will fail");
    }

    let mut model = OpenAiModel::new(api_key)?;
    if let Ok(base_url) = std::env::var("OPENAI_API_BASE") {
        model = model.with_base_url(base_url);
    }
    if let Ok(model_id) = std::env::var("ANIM_MODEL") {
        model = model.with_model(model_id);
    }
    let generator = Arc::new(ConfigGenerator::new(Box::new(model)));

    let config = ServerConfig {
        allowed_origin: std::env::var("ANIM_ALLOWED_ORIGIN").ok(),
        static_dir: Some(
            std::env::var("ANIM_STATIC_DIR")
                .unwrap_or_else(|_| "public".to_string())
                .into(),
        ),
    };

    let port = std::env::var("ANIM_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000);
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "animation config server listening");
    axum::serve(listener, anim_server::app(generator, config)).await?;
    Ok(())
}

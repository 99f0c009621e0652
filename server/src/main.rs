use std::{net::SocketAddr, sync::Arc};

use server::{build_router, config::ServerConfig, handler::InferenceHandler, AppState};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tts_core::{ArtifactSource, ModelLoader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

#[cfg(feature = "piper")]
fn model_loader() -> Arc<dyn ModelLoader> {
    Arc::new(tts_core::piper::PiperLoader::from_env())
}

#[cfg(not(feature = "piper"))]
fn model_loader() -> Arc<dyn ModelLoader> {
    struct NoBackend;

    impl ModelLoader for NoBackend {
        fn load(
            &self,
            _files: &tts_core::ModelFiles,
            _accelerated: bool,
        ) -> anyhow::Result<Arc<dyn tts_core::StreamingModel>> {
            anyhow::bail!("No speech backend compiled in; rebuild the server with `--features piper`")
        }
    }

    Arc::new(NoBackend)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::OPTIONS,
    ];

    let origins: Vec<axum::http::HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<axum::http::HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::list(origins))
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    }
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting streaming TTS server...");

    let config = ServerConfig::from_env();
    let source = ArtifactSource::parse(&config.model_path)?;
    info!(
        "Serving model '{}' from {} (artifacts: {})",
        config.model_name,
        config.model_dir.display(),
        source
    );

    let handler = Arc::new(InferenceHandler::new(
        config.model_dir.clone(),
        source.fetcher(),
        model_loader(),
    ));

    if config.preload_model {
        info!("Preloading model...");
        handler.initialize().await?;
    }

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let app = build_router(AppState::new(handler, config)).layer(middleware_stack);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

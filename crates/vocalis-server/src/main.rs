//! Vocalis Server - OpenAI-compatible speech-to-text and text-to-speech API

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use state::AppState;
use vocalis_core::bridge::{BridgeSttLoader, BridgeTtsLoader, WorkerBridge};
use vocalis_core::{
    ServiceConfig, SpeechSynthesizer, SttIdentity, SttModelState, Transcriber, TtsIdentity,
    TtsModelState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vocalis_server=debug,vocalis_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Vocalis Server");

    let config = ServiceConfig::from_env();
    for warning in config.validate() {
        warn!("{}", warning);
    }
    info!(
        "TTS model: {} (lang {}), STT model: {} ({})",
        config.tts_model, config.tts_lang_code, config.stt_model, config.stt_compute_type
    );

    let bridge = Arc::new(WorkerBridge::from_config(&config));
    let tts_model = Arc::new(TtsModelState::new(
        "tts",
        Arc::new(BridgeTtsLoader::new(
            bridge.clone(),
            config.device_override.clone(),
            config.sample_rate,
        )),
        config.model_load_timeout(),
    ));
    let stt_model = Arc::new(SttModelState::new(
        "stt",
        Arc::new(BridgeSttLoader::new(
            bridge.clone(),
            config.device_override.clone(),
        )),
        config.model_load_timeout(),
    ));

    load_startup_models(&config, &tts_model, &stt_model).await;

    let synthesizer = SpeechSynthesizer::from_config(tts_model.clone(), &config);
    let transcriber = Transcriber::from_config(stt_model.clone(), &config);
    let addr = config.bind_address();
    let state = AppState::new(config, synthesizer, transcriber);

    // Build router
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready. Press Ctrl+C to stop.");
    server.await?;

    info!("Unloading models");
    stt_model.unload().await;
    tts_model.unload().await;
    if let Err(e) = tokio::task::spawn_blocking(move || bridge.stop()).await {
        error!("Failed to stop speech worker: {}", e);
    }
    info!("Shutdown complete");

    Ok(())
}

/// Load both configured models. Failures leave the service degraded, not down.
async fn load_startup_models(
    config: &ServiceConfig,
    tts_model: &TtsModelState,
    stt_model: &SttModelState,
) {
    let stt = SttIdentity::new(&config.stt_model, &config.stt_compute_type);
    match stt_model.load(stt).await {
        Ok(()) => info!("STT model loaded."),
        Err(e) => error!("Failed to load STT model on startup: {}", e),
    }

    let tts = TtsIdentity::new(&config.tts_model, &config.tts_lang_code);
    match tts_model.load(tts).await {
        Ok(()) => info!("TTS model loaded."),
        Err(e) => error!("Failed to load TTS model on startup: {}", e),
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}

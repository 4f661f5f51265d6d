mod config;
mod session;

use crate::config::Config;
use crate::session::SessionFactory;
use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{State, ws::WebSocketUpgrade},
    response::Response,
    routing::get,
};
use clap::Parser;
use essence_core::{ChatGenerator, GenerationSettings, LlmClient, TurnSettings, WhisperTranscriber};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Essence evaluation agent API")]
struct Cli {
    /// Address to listen on; overrides BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,
}

async fn health() -> Json<Value> {
    Json(json!({ "message": "Essence API is running" }))
}

/// Upgrades the request and hands the socket to a fresh session.
async fn ws_handler(ws: WebSocketUpgrade, State(factory): State<SessionFactory>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| session::run(socket, factory))
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    info!("Configuration loaded successfully. Starting Essence API...");

    // --- 3. Parse Command-Line Arguments ---
    let cli = Cli::parse();
    let addr = cli.bind.unwrap_or(config.bind_address);

    // --- 4. Initialize API Clients ---
    let client = LlmClient::new(&config.llm_base_url, config.api_key);
    info!(
        thinking = %config.thinking_model,
        whisper = %config.whisper_model,
        memory = config.memory_model.as_deref().unwrap_or("disabled"),
        policy = ?config.dialogue_policy,
        audio = ?config.audio_transcription,
        "Model setup"
    );

    let factory = SessionFactory {
        generator: Arc::new(ChatGenerator::new(client.clone(), config.thinking_model)),
        transcriber: Arc::new(WhisperTranscriber::new(client.clone(), config.whisper_model)),
        memory: config.memory_model.map(|model| (client, model)),
        policy: config.dialogue_policy,
        turn: TurnSettings {
            audio_transcription: config.audio_transcription,
            language_hint: config.transcription_language,
            screenshot_commands: config.screenshot_voice_commands,
            transcription_timeout: config.transcription_timeout,
        },
        generation: GenerationSettings {
            idle_timeout: config.generation_timeout,
        },
    };

    // Configure a permissive CORS policy so a separately served frontend can connect.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(health))
        .route("/chatbot/ws", get(ws_handler))
        .layer(cors)
        .with_state(factory);

    info!("Starting WebSocket server, listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

mod bridge;
mod config;
mod protocol;

use crate::bridge::BrowserBridge;
use crate::config::Config;
use crate::protocol::{ClientMessage, ServerMessage};
use anyhow::Context;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use interview_core::finalizer::JsonFileFinalizer;
use interview_core::{Capabilities, Controller, InterviewError, InterviewRuntime};
use interview_service::questions::default_questions;
use interview_service::{Reviewers, prompt_loader, reviewers_from_config};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

struct AppState {
    config: Config,
    reviewers: Reviewers,
}

/// Handles WebSocket upgrade requests.
///
/// Each connection runs one interview. The browser provides speech capture
/// and synthesis; answer review and persistence happen on the server.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn health() -> &'static str {
    "ok"
}

fn parse(message: Message) -> Option<ClientMessage> {
    match message {
        Message::Text(text) => match serde_json::from_str(text.as_str()) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("Invalid WebSocket message: {}", e);
                None
            }
        },
        _ => None,
    }
}

/// Manages an individual WebSocket connection.
///
/// Waits for `start`, then runs the interview while a writer task forwards
/// every [`ServerMessage`] to the socket. Closing the socket stops the
/// interview; the transcript is still finalized.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket connection established");
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to encode {:?}: {}", message, e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // --- 1. Wait for the client to start an interview ---
    let mut start = None;
    while let Some(Ok(message)) = ws_receiver.next().await {
        if let Message::Close(_) = message {
            break;
        }
        match parse(message) {
            Some(ClientMessage::Start {
                candidate_name,
                questions,
                speech_supported,
            }) => {
                start = Some((candidate_name, questions, speech_supported));
                break;
            }
            Some(other) => tracing::debug!("Ignoring {:?} before start", other),
            None => {}
        }
    }
    let Some((candidate_name, questions, speech_supported)) = start else {
        info!("WebSocket closed before an interview started");
        writer.abort();
        return;
    };

    // --- 2. Assemble the runtime ---
    let questions = if questions.is_empty() {
        default_questions()
    } else {
        questions
    };
    let bridge = Arc::new(BrowserBridge::new(outbound.clone(), speech_supported));
    let caps = Capabilities {
        capture: bridge.clone(),
        synthesizer: bridge.clone(),
        evaluator: state.reviewers.evaluator.clone(),
        follow_up: state.reviewers.follow_up.clone(),
        finalizer: Arc::new(JsonFileFinalizer::new(
            state.config.interview.feedback_dir.clone(),
        )),
    };
    let controller = Controller::new(questions, state.config.interview.controller_config())
        .with_candidate_name(candidate_name);
    let runtime = InterviewRuntime::new(controller, caps);
    let handle = runtime.handle();

    let mut snapshots = handle.subscribe();
    let snapshot_outbound = outbound.clone();
    let forwarder = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot_outbound.send(ServerMessage::Snapshot(snapshot)).is_err() {
                break;
            }
        }
    });

    // --- 3. Run until finished, relaying browser reports ---
    let mut run = tokio::spawn(runtime.run());
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            message = ws_receiver.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    info!("WebSocket closed mid-interview; stopping");
                    handle.stop();
                    break (&mut run).await;
                }
                Some(Ok(message)) => match parse(message) {
                    Some(ClientMessage::Stop) => {
                        handle.stop();
                    }
                    Some(message) => bridge.on_client(message),
                    None => {}
                },
            },
        }
    };
    forwarder.abort();

    let reply = match result {
        Ok(Ok(summary)) => {
            info!("Interview finished after {}s", summary.elapsed_seconds);
            ServerMessage::Ended {
                location: summary.location,
            }
        }
        Ok(Err(e)) => {
            let fallback_location = match &e {
                InterviewError::FinalizationFailed {
                    fallback_location, ..
                } => Some(fallback_location.clone()),
                _ => None,
            };
            let message = if e.is_user_visible() {
                e.to_string()
            } else {
                "the interview ended unexpectedly".to_string()
            };
            ServerMessage::Error {
                message,
                fallback_location,
            }
        }
        Err(e) => {
            tracing::error!("Interview task failed: {}", e);
            ServerMessage::Error {
                message: "interview aborted".to_string(),
                fallback_location: Some(interview_core::error::FALLBACK_LOCATION.to_string()),
            }
        }
    };
    let _ = outbound.send(reply);
    drop(outbound);
    drop(bridge);
    let _ = writer.await;

    info!("WebSocket connection closed");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.interview.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let prompts = match prompt_loader::load_prompts(Path::new("prompts")) {
        Ok(prompts) => prompts,
        Err(e) => {
            tracing::warn!("{:#}; using built-in prompts.", e);
            HashMap::new()
        }
    };
    let reviewers = reviewers_from_config(&config.interview, prompts)?;
    let bind_address = config.bind_address;
    let state = Arc::new(AppState { config, reviewers });

    // Configure a permissive CORS policy to allow connections from any origin.
    // This is necessary for a separate frontend to connect to the WebSocket API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state);

    info!("Starting WebSocket server, listening on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

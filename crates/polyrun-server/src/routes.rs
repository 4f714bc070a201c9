//! HTTP and WebSocket routes for the polyrun server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        rejection::JsonRejection,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use futures::stream::SplitSink;
use polyrun_core::{ExecutionRequest, FailureKind, Language, Orchestrator};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{INTERNAL_ERROR_MESSAGE, ServerError, ServerResult};
use crate::protocol::{
    ClientMessage, ExecuteRequest, ExecuteResponse, LanguageInfo, ServerMessage, ShareRequest,
    ShareResponse, Snippet,
};
use crate::share::{SnippetStore, is_valid_share_id};

const MISSING_FIELDS: &str = "Language and code are required";

/// Application state shared across handlers.
pub struct AppState {
    /// Execution engine.
    pub orchestrator: Arc<Orchestrator>,
    /// Shared snippet storage.
    pub snippets: Arc<dyn SnippetStore>,
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/execute", post(execute_handler))
        .route("/api/languages", get(languages_handler))
        .route("/api/templates/{language}", get(template_handler))
        .route("/api/share", post(share_handler))
        .route("/api/share/{id}", get(shared_snippet_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn parse_language(name: &str) -> ServerResult<Language> {
    name.parse()
        .map_err(|_| ServerError::BadRequest(format!("Unsupported language: {name}")))
}

/// Extract non-empty `language` and `code`, or fail with the fixed message.
fn required_fields(
    language: Option<String>,
    code: Option<String>,
) -> ServerResult<(String, String)> {
    match (language, code) {
        (Some(language), Some(code)) if !language.is_empty() && !code.is_empty() => {
            Ok((language, code))
        }
        _ => Err(ServerError::BadRequest(MISSING_FIELDS.to_string())),
    }
}

/// Buffered execution.
async fn execute_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ServerResult<Response> {
    let Json(body) = body.map_err(|e| {
        tracing::debug!("Rejected execute body: {}", e);
        ServerError::BadRequest(MISSING_FIELDS.to_string())
    })?;
    let (language, code) = required_fields(body.language, body.code)?;
    let language = parse_language(&language)?;

    let outcome = state
        .orchestrator
        .execute(&ExecutionRequest::new(language, code))
        .await;

    let status = match outcome.failure {
        Some(FailureKind::InternalError) => {
            return Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExecuteResponse {
                    success: false,
                    output: None,
                    error: Some(INTERNAL_ERROR_MESSAGE.to_string()),
                    execution_time: None,
                }),
            )
                .into_response());
        }
        Some(kind) if kind.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };

    Ok((status, Json(ExecuteResponse::from(&outcome))).into_response())
}

/// Per-language toolchain information.
async fn languages_handler(State(state): State<Arc<AppState>>) -> Json<Vec<LanguageInfo>> {
    let languages = state
        .orchestrator
        .toolchains()
        .descriptors()
        .into_iter()
        .map(LanguageInfo::from)
        .collect();
    Json(languages)
}

/// Hello-world template for a language.
async fn template_handler(Path(language): Path<String>) -> ServerResult<Json<Snippet>> {
    let language = parse_language(&language)?;
    Ok(Json(Snippet {
        language,
        code: polyrun_core::templates::template(language).to_string(),
    }))
}

/// Store a snippet and return its share id.
async fn share_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ShareRequest>, JsonRejection>,
) -> ServerResult<Json<ShareResponse>> {
    let Json(body) = body.map_err(|_| ServerError::BadRequest(MISSING_FIELDS.to_string()))?;
    let (language, code) = required_fields(body.language, body.code)?;
    let language = parse_language(&language)?;

    let max = state.orchestrator.config().max_source_bytes;
    if code.len() > max {
        return Err(ServerError::BadRequest(format!(
            "Code is {} bytes, exceeding the maximum of {} bytes",
            code.len(),
            max
        )));
    }

    let share_id = state.snippets.save(Snippet { language, code })?;
    tracing::debug!("Shared {} snippet as {}", language, share_id);
    Ok(Json(ShareResponse { share_id }))
}

/// Fetch a shared snippet.
async fn shared_snippet_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ServerResult<Json<Snippet>> {
    let not_found = || ServerError::NotFound("Snippet not found".to_string());
    if !is_valid_share_id(&id) {
        return Err(not_found());
    }
    state.snippets.load(&id)?.map(Json).ok_or_else(not_found)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection. Requests run one at a time, in order.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(result) = receiver.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
        };

        let connected = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Execute { language, code }) => {
                stream_execution(&mut sender, &state, &language, code).await
            }
            Err(e) => {
                tracing::warn!("Failed to parse client message: {}", e);
                let message = ServerMessage::Error {
                    message: format!("Invalid message format: {e}"),
                };
                send_message(&mut sender, &message).await
            }
        };

        if !connected {
            break;
        }
    }
}

/// Run one request and forward its events. Returns `false` once the client
/// is gone; the run itself still completes and cleans up.
async fn stream_execution(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &Arc<AppState>,
    language: &str,
    code: String,
) -> bool {
    let language = match language.parse::<Language>() {
        Ok(language) => language,
        Err(_) => {
            let replies = [
                ServerMessage::Start,
                ServerMessage::Error {
                    message: format!("Unsupported language: {language}"),
                },
                ServerMessage::Complete {
                    execution_time: 0,
                    success: false,
                    exit_code: None,
                },
            ];
            for reply in &replies {
                if !send_message(sender, reply).await {
                    return false;
                }
            }
            return true;
        }
    };

    let mut events = state.orchestrator.stream(ExecutionRequest::new(language, code));
    while let Some(event) = events.recv().await {
        if !send_message(sender, &ServerMessage::from(event)).await {
            tracing::debug!("Client disconnected mid-stream");
            return false;
        }
    }
    true
}

/// Send a server message through the WebSocket.
async fn send_message(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

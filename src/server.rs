//! HTTP chat server.
//!
//! Wires one [`Retriever`] and two [`Bot`]s (plain and context-augmented)
//! behind a small JSON API. All of them are built once at startup and
//! injected through [`AppState`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/`, `/index.html` | Informational HTML page |
//! | `GET`  | `/favicon.ico` | `204 No Content` |
//! | `POST` | `/api/chat` | `{query, useRag, k?}` → `{reply, usedRag, context, degraded}` |
//! | `POST` | `/api/reset` | Clear both conversation memories |
//! | `GET`  | `/health` | Status, version and indexed chunk count |
//! | `OPTIONS` | any | `200` with CORS headers (answered by the CORS layer) |
//!
//! Anything else is `404` with a plain-text `Not Found` body.
//!
//! # Error Contract
//!
//! Malformed requests get `400` and a handler panic gets `500`, both with a
//! JSON body `{ "error": "<message>" }`. Retrieval and generation failures
//! are not errors: they degrade to an empty context or a fallback reply
//! inside a normal `200`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted on every response.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::generator::Bot;
use crate::llm;
use crate::models::RetrievedDocument;
use crate::retriever::Retriever;

const INDEX_HTML: &str = r#"<html><body><h2>RAG Demo server</h2><p>POST to /api/chat with JSON {"query":"...","useRag": true|false}</p></body></html>"#;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    retriever: Arc<Retriever>,
    /// Answers without retrieval.
    bot: Arc<Mutex<Bot>>,
    /// Answers with retrieved context; keeps its own history.
    rag_bot: Arc<Mutex<Bot>>,
}

impl AppState {
    pub fn new(retriever: Retriever, bot: Bot, rag_bot: Bot) -> Self {
        Self {
            retriever: Arc::new(retriever),
            bot: Arc::new(Mutex::new(bot)),
            rag_bot: Arc::new(Mutex::new(rag_bot)),
        }
    }

    /// Load the index and construct both API clients.
    ///
    /// Fails on missing credentials or an unreadable index; callers should
    /// treat that as fatal.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let retriever = Retriever::open(config).await?;
        let model = llm::create_chat_model(&config.llm)?;
        Ok(Self::new(
            retriever,
            Bot::from_config(&config.llm, model.clone()),
            Bot::from_config(&config.llm, model),
        ))
    }
}

/// Build the router with all routes and layers applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    Router::new()
        .route("/", get(handle_index).fallback(handle_fallback))
        .route("/index.html", get(handle_index).fallback(handle_fallback))
        .route("/favicon.ico", get(handle_favicon).fallback(handle_fallback))
        .route("/api/chat", post(handle_chat).fallback(handle_fallback))
        .route("/api/reset", post(handle_reset).fallback(handle_fallback))
        .route("/health", get(handle_health).fallback(handle_fallback))
        .fallback(handle_fallback)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve on an already-bound listener until the process ends.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Start the server on `[server].bind`.
pub async fn run_server(config: &Config) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let listener = TcpListener::bind(&config.server.bind).await?;

    println!(
        "Starting server at http://{} - POST /api/chat",
        listener.local_addr()?
    );

    serve(listener, state).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

/// Turn a handler panic into `500 {"error": ...}`.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "internal server error".to_string()
    };
    tracing::error!("handler panicked: {}", message);

    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message,
    }
    .into_response()
}

// ============ Static routes ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn handle_favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Unknown paths and unsupported methods. `OPTIONS` never gets here: the
/// CORS layer answers it on every path.
async fn handle_fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// Number of chunks in the loaded index.
    chunks: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks: state.retriever.len(),
    })
}

// ============ POST /api/chat ============

/// A validated chat request.
#[derive(Debug, PartialEq)]
struct ChatRequest {
    query: String,
    use_rag: bool,
    k: Option<i64>,
}

impl ChatRequest {
    /// Parse a raw body. An empty body counts as `{}`.
    fn parse(body: &[u8]) -> Result<Self, AppError> {
        let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(body).map_err(|_| bad_request("Invalid JSON"))?
        };
        let payload = payload
            .as_object()
            .ok_or_else(|| bad_request("Invalid JSON: expected an object"))?;

        let query = match payload.get("query") {
            Some(Value::String(q)) if !q.trim().is_empty() => q.clone(),
            _ => return Err(bad_request("Missing query")),
        };

        let use_rag = payload.get("useRag").map(is_truthy).unwrap_or(false);
        let k = payload.get("k").and_then(Value::as_i64);

        Ok(Self { query, use_rag, k })
    }
}

/// Loose truthiness for the `useRag` flag: `false`, `null`, `0`, `""`, `[]`
/// and `{}` are false, everything else is true.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    #[serde(rename = "usedRag")]
    used_rag: bool,
    context: Vec<RetrievedDocument>,
    /// True when `reply` is a fallback text after a model failure.
    degraded: bool,
}

async fn handle_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatResponse>, AppError> {
    let request = ChatRequest::parse(&body)?;

    let (reply, context) = if request.use_rag {
        let docs = state.retriever.search(&request.query, request.k).await;
        let reply = state
            .rag_bot
            .lock()
            .await
            .ask_with_docs(&request.query, &docs)
            .await;
        (reply, docs)
    } else {
        let reply = state.bot.lock().await.ask(&request.query).await;
        (reply, Vec::new())
    };

    let degraded = reply.is_degraded();
    Ok(Json(ChatResponse {
        reply: reply.into_text(),
        used_rag: request.use_rag,
        context,
        degraded,
    }))
}

// ============ POST /api/reset ============

async fn handle_reset(State(state): State<AppState>) -> StatusCode {
    state.bot.lock().await.reset();
    state.rag_bot.lock().await.reset();
    tracing::info!("conversation memories cleared");
    StatusCode::NO_CONTENT
}

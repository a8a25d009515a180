//! LogDeck Web API Server
//!
//! REST pagination over log sources, WebSocket live tail, and the dashboard's static files.

mod params;

pub use params::LogQueryParams;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header::HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use logdeck_core::{Error, ResultPage, ServerConfig};
use logdeck_query::{LogQueryEngine, Subscription};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error rendered as an `ApiResponse` with a matching status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("Request failed: {}", message);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

/// HTTP status for an engine error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::BadRequest(_) | Error::InvalidCursor(_) => StatusCode::BAD_REQUEST,
        Error::SourceNotFound(_) | Error::FileNotFound(_) => StatusCode::NOT_FOUND,
        Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_client_error() {
            debug!("Rejected request: {}", err);
        } else {
            error!("Request failed: {}", err);
        }
        Self {
            status: status_for(&err),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    engine: Arc<LogQueryEngine>,
}

impl AppState {
    pub fn new(engine: Arc<LogQueryEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &LogQueryEngine {
        &self.engine
    }
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let origin = match origin {
        Some(origin) => origin.parse::<HeaderValue>().unwrap_or_else(|_| {
            warn!("Invalid CORS origin '{}', using {}", origin, DEFAULT_CORS_ORIGIN);
            HeaderValue::from_static(DEFAULT_CORS_ORIGIN)
        }),
        None => HeaderValue::from_static(DEFAULT_CORS_ORIGIN),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

/// Create the API router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/logs", get(query_logs))
        .route("/logs/stream", get(stream_logs))
        .route("/logs/sources", get(list_sources))
        .route("/api/health", get(health_check))
        .with_state(state);

    let static_files = ServeDir::new(&config.static_dir);
    let prefix = config.static_prefix.trim_end_matches('/');
    let router = if prefix.is_empty() {
        api.fallback_service(static_files)
    } else {
        api.nest_service(prefix, static_files)
    };

    router
        .layer(cors_layer(config.cors_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
}

/// Start the web server and run until Ctrl-C
pub async fn start_server(config: &ServerConfig, engine: Arc<LogQueryEngine>) -> std::io::Result<()> {
    if !config.static_dir.is_dir() {
        warn!(
            "Static directory {} does not exist; {} will return 404",
            config.static_dir.display(),
            config.static_prefix
        );
    }

    let app = create_router(AppState::new(engine), config);
    let bind_addr = config.bind_addr();

    info!("Starting LogDeck Web API on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

// === API Handlers ===

async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn list_sources(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.engine.sources()))
}

async fn query_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<ResultPage>, ApiError> {
    let spec = params.into_spec(state.engine.config().default_page_size)?;

    // Reads are blocking file I/O
    let engine = Arc::clone(&state.engine);
    let page = tokio::task::spawn_blocking(move || engine.execute(&spec))
        .await
        .map_err(|e| ApiError::internal(format!("Query task failed: {}", e)))??;

    if page.is_partial() {
        warn!("Returning partial page: {} sources failed", page.errors.len());
    }
    Ok(Json(page))
}

async fn stream_logs(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Response, ApiError> {
    let spec = params.into_spec(state.engine.config().default_page_size)?;
    let subscription = state.engine.subscribe(spec)?;
    Ok(ws.on_upgrade(move |socket| handle_websocket(socket, subscription)))
}

async fn handle_websocket(socket: WebSocket, mut subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();
    debug!("Live stream client connected");

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else {
                    debug!("Subscription ended");
                    break;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize stream event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json)).await.is_err() {
                    debug!("Live stream client went away");
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Live stream client closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Live stream socket error: {}", e);
                    break;
                }
            }
        }
    }

    subscription.cancel();
}

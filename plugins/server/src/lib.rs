//! HTTP front for an editor session
//!
//! Serves the rendered preview and exposes the conversation, viewport and
//! export operations of one [`EditorSession`] as a small JSON API.

pub mod handlers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use pagesmith_core::{
    Config, EventBus, GenerationClient, GenerationError, InMemoryEventBus, PagesmithError,
    RecordingHandler, Result, ServerConfig,
};
use pagesmith_editor::{EditorError, EditorSession};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// HTTP response wrapper
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// JSON body with status 200
    pub fn json<T: Serialize>(data: &T) -> Result<Self> {
        let body = serde_json::to_vec(data)
            .map_err(|e| PagesmithError::Server(format!("JSON serialization failed: {}", e)))?;

        Ok(Self::new(StatusCode::OK)
            .with_content_type("application/json")
            .with_body(body))
    }

    pub fn html(content: &str) -> Self {
        Self::new(StatusCode::OK)
            .with_content_type("text/html; charset=utf-8")
            .with_body(content.as_bytes())
    }

    pub fn text(content: &str) -> Self {
        Self::new(StatusCode::OK).with_body(content.as_bytes())
    }

    /// `{"success": false, "error": ...}` with the given status
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "success": false, "error": message });
        Self::new(status)
            .with_content_type("application/json")
            .with_body(body.to_string())
    }

    pub fn from_editor_error(err: &EditorError) -> Self {
        Self::error(status_for(err), &err.to_string())
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        let headers = response.headers_mut();
        let pairs = std::iter::once(("content-type".to_string(), self.content_type))
            .chain(self.headers);
        for (name, value) in pairs {
            if let (Ok(name), Ok(value)) = (
                axum::http::HeaderName::from_bytes(name.as_bytes()),
                axum::http::HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}

impl From<Result<HttpResponse>> for HttpResponse {
    fn from(result: Result<HttpResponse>) -> Self {
        result.unwrap_or_else(|e| {
            error!("Failed to build response: {}", e);
            HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })
    }
}

/// HTTP status for an editor failure
pub fn status_for(err: &EditorError) -> StatusCode {
    match err {
        EditorError::Core(PagesmithError::Generation(GenerationError::Busy)) => StatusCode::CONFLICT,
        EditorError::TurnNotFound(_) | EditorError::ImageNotFound(_) => StatusCode::NOT_FOUND,
        EditorError::Core(PagesmithError::Attachment(_))
        | EditorError::Core(PagesmithError::Conversation(_)) => StatusCode::BAD_REQUEST,
        other if other.is_user_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Events kept for `GET /api/events`
pub const ACTIVITY_LIMIT: usize = 200;

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<EditorSession>>,
    pub client: Arc<dyn GenerationClient>,
    /// The last [`ACTIVITY_LIMIT`] editor events, in order
    pub activity: Arc<RecordingHandler>,
}

impl AppState {
    pub async fn new(config: &Config, client: Arc<dyn GenerationClient>) -> Result<Self> {
        let bus = Arc::new(InMemoryEventBus::new());
        let activity = Arc::new(RecordingHandler::bounded(ACTIVITY_LIMIT));
        bus.subscribe(activity.clone(), None).await?;

        let session = EditorSession::new(config, bus);
        info!(
            "Editor session {} created (generation client: {})",
            session.id(),
            client.client_name()
        );
        Ok(Self {
            session: Arc::new(RwLock::new(session)),
            client,
            activity,
        })
    }
}

/// All routes of the HTTP front
pub fn build_router(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        .route("/", get(handlers::preview))
        .route("/api/status", get(handlers::status))
        .route("/api/document", get(handlers::document))
        .route("/api/download", get(handlers::download))
        .route("/api/events", get(handlers::events))
        .route(
            "/api/turns",
            get(handlers::list_turns).post(handlers::submit_turn),
        )
        .route(
            "/api/turns/:index",
            put(handlers::edit_turn).delete(handlers::delete_turn),
        )
        .route("/api/viewport", post(handlers::set_viewport))
        .route(
            "/api/fullscreen",
            post(handlers::enter_fullscreen).delete(handlers::exit_fullscreen),
        )
        .with_state(state);

    if cors_enabled {
        router.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
    } else {
        router
    }
}

/// Running HTTP front for one session
pub struct PreviewServer {
    config: ServerConfig,
    state: AppState,
    server_handle: Option<tokio::task::JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl PreviewServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            server_handle: None,
            local_addr: None,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.server_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Bind and serve in the background. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let router = build_router(self.state.clone(), self.config.cors_enabled);
        let addr = format!("{}:{}", self.config.hostname, self.config.port);

        info!("Starting HTTP server on {}", addr);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| PagesmithError::Server(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        let server_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("Server error: {}", e);
            }
        });

        self.server_handle = Some(server_handle);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    pub async fn shutdown(&mut self) {
        info!("Shutting down HTTP server");
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        self.local_addr = None;
    }
}

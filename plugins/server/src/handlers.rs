//! Route handlers
//!
//! Generation runs outside the session lock: the request is registered under
//! a short write lock, the remote call happens unlocked, and the answer is
//! applied under a second write lock. A submission arriving in between sees
//! the session busy and gets 409. The three steps run in their own task, so
//! a client that disconnects midway cannot leave the session busy.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use pagesmith_core::{Attachment, CredentialStatus};
use pagesmith_editor::{EditorError, GenerationOutcome, GenerationStart, ViewportMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::{AppState, HttpResponse};

const EMPTY_PREVIEW: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Pagesmith</title></head>\
<body><p>Nothing generated yet. Describe the page you want to start.</p></body></html>";

/// Body of `POST /api/turns` and `PUT /api/turns/:index`
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub instruction: String,
    /// Image as a data URL
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_name: Option<String>,
}

impl TurnRequest {
    fn attachments(&self) -> Result<Vec<Attachment>, HttpResponse> {
        match &self.image {
            None => Ok(Vec::new()),
            Some(data_url) => {
                let name = self.image_name.clone().unwrap_or_else(|| "image".to_string());
                Attachment::from_data_url(data_url, name)
                    .map(|a| vec![a])
                    .map_err(|e| {
                        warn!("Rejected image upload: {}", e);
                        HttpResponse::error(StatusCode::BAD_REQUEST, &e.to_string())
                    })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewportRequest {
    pub mode: String,
    #[serde(default)]
    pub available_width: Option<u32>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    session_id: String,
    credential: CredentialStatus,
    banner: Option<&'static str>,
    is_generating: bool,
    surface: String,
    turns: usize,
    snapshots: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct DocumentResponse {
    document: String,
    has_pending_edits: bool,
    snapshots: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    success: bool,
    removed: usize,
    document: String,
    snapshots: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct ActivityEntry {
    #[serde(rename = "type")]
    event_type: &'static str,
    description: String,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct SurfaceResponse {
    success: bool,
    surface: String,
    width: Option<u32>,
    height: Option<u32>,
}

const DEFAULT_AVAILABLE_WIDTH: u32 = 1280;

/// `GET /`: the preview as currently rendered
pub async fn preview(State(state): State<AppState>) -> HttpResponse {
    let session = state.session.read().await;
    if session.surface().is_open() {
        return HttpResponse::html(&session.surface().rendered_html());
    }
    let document = session.store().effective();
    if document.trim().is_empty() {
        HttpResponse::html(EMPTY_PREVIEW)
    } else {
        HttpResponse::html(document)
    }
}

pub async fn status(State(state): State<AppState>) -> HttpResponse {
    let session = state.session.read().await;
    let response = StatusResponse {
        session_id: session.id().to_string(),
        credential: session.credential_status(),
        banner: session.banner(),
        is_generating: session.is_generating(),
        surface: session.surface().state().label(),
        turns: session.log().len(),
        snapshots: session.store().snapshot_indices(),
    };
    HttpResponse::json(&response).into()
}

pub async fn document(State(state): State<AppState>) -> HttpResponse {
    let session = state.session.read().await;
    let response = DocumentResponse {
        document: session.document().to_string(),
        has_pending_edits: session.store().working().is_some(),
        snapshots: session.store().snapshot_indices(),
    };
    HttpResponse::json(&response).into()
}

/// `GET /api/download`: the Document as an `.html` attachment
pub async fn download(State(state): State<AppState>) -> HttpResponse {
    let download = state.session.read().await.export_download();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        html_escape::encode_double_quoted_attribute(&download.filename)
    );
    HttpResponse::new(StatusCode::OK)
        .with_content_type(&download.content_type)
        .with_header("content-disposition", &disposition)
        .with_body(download.body)
}

/// `GET /api/events`: the most recent editor events, oldest first
pub async fn events(State(state): State<AppState>) -> HttpResponse {
    let entries: Vec<ActivityEntry> = state
        .activity
        .events()
        .iter()
        .map(|e| ActivityEntry {
            event_type: e.event_type(),
            description: e.description(),
            metadata: e.metadata(),
        })
        .collect();
    HttpResponse::json(&entries).into()
}

pub async fn list_turns(State(state): State<AppState>) -> HttpResponse {
    let session = state.session.read().await;
    HttpResponse::json(&session.log().turns()).into()
}

/// Register the request, call the client without the lock, and apply the
/// answer. Runs in a spawned task that finishes even if the caller is gone.
async fn run_generation(state: &AppState, start: GenerationStart) -> HttpResponse {
    let task_state = state.clone();
    let task = tokio::spawn(async move {
        let begun = task_state.session.write().await.begin(start).await;
        let pending = match begun {
            Ok(pending) => pending,
            Err(e) => return Err(e),
        };
        info!("Generation registered for exchange {}", pending.exchange_index);
        let result = task_state.client.generate(&pending.request).await;
        task_state
            .session
            .write()
            .await
            .complete_submission(pending, result)
            .await
    });

    let outcome: Result<GenerationOutcome, EditorError> = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Generation task failed: {}", e);
            return HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Generation failed");
        }
    };
    match outcome {
        Ok(outcome) => HttpResponse::json(&outcome).into(),
        Err(e) => HttpResponse::from_editor_error(&e),
    }
}

/// `POST /api/turns`: submit a new instruction
pub async fn submit_turn(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> HttpResponse {
    let attachments = match request.attachments() {
        Ok(a) => a,
        Err(response) => return response,
    };
    let start = GenerationStart::Submit {
        instruction: request.instruction,
        attachments,
    };
    run_generation(&state, start).await
}

/// `PUT /api/turns/:index`: edit a user turn and regenerate from it
pub async fn edit_turn(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(request): Json<TurnRequest>,
) -> HttpResponse {
    let attachments = match request.attachments() {
        Ok(a) => a,
        Err(response) => return response,
    };
    let start = GenerationStart::EditTurn {
        position: index,
        instruction: request.instruction,
        attachments,
    };
    run_generation(&state, start).await
}

/// `DELETE /api/turns/:index`
pub async fn delete_turn(State(state): State<AppState>, Path(index): Path<usize>) -> HttpResponse {
    let mut session = state.session.write().await;
    match session.delete_turn(index).await {
        Ok(deletion) => {
            let response = DeleteResponse {
                success: true,
                removed: deletion.removed,
                document: session.document().to_string(),
                snapshots: session.store().snapshot_indices(),
            };
            HttpResponse::json(&response).into()
        }
        Err(e) => HttpResponse::from_editor_error(&e),
    }
}

fn surface_response(session: &pagesmith_editor::EditorSession, available: u32) -> HttpResponse {
    let frame = session.frame_size(available);
    let response = SurfaceResponse {
        success: true,
        surface: session.surface().state().label(),
        width: frame.map(|f| f.width),
        height: frame.and_then(|f| f.height),
    };
    HttpResponse::json(&response).into()
}

/// `POST /api/viewport`: open the preview or switch its viewport
pub async fn set_viewport(
    State(state): State<AppState>,
    Json(request): Json<ViewportRequest>,
) -> HttpResponse {
    let mode: ViewportMode = match request.mode.parse() {
        Ok(mode) => mode,
        Err(e) => return HttpResponse::error(StatusCode::BAD_REQUEST, &e),
    };
    let available = request.available_width.unwrap_or(DEFAULT_AVAILABLE_WIDTH);

    let mut session = state.session.write().await;
    let result = if session.surface().is_open() {
        session.set_viewport(mode).await
    } else {
        session.open_preview(mode).await.map(|_| ())
    };
    match result {
        Ok(()) => {
            debug!("Viewport now {}", mode);
            surface_response(&session, available)
        }
        Err(e) => HttpResponse::from_editor_error(&e),
    }
}

pub async fn enter_fullscreen(State(state): State<AppState>) -> HttpResponse {
    let mut session = state.session.write().await;
    match session.enter_fullscreen().await {
        Ok(()) => surface_response(&session, DEFAULT_AVAILABLE_WIDTH),
        Err(e) => HttpResponse::from_editor_error(&e),
    }
}

pub async fn exit_fullscreen(State(state): State<AppState>) -> HttpResponse {
    let mut session = state.session.write().await;
    match session.exit_fullscreen().await {
        Ok(()) => surface_response(&session, DEFAULT_AVAILABLE_WIDTH),
        Err(e) => HttpResponse::from_editor_error(&e),
    }
}

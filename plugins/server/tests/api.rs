use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_test::TestServer;
use pagesmith_core::{Config, GenerationError, ScriptedClient};
use pagesmith_server::handlers::{self, TurnRequest};
use pagesmith_server::{build_router, AppState};
use serde_json::{json, Value};

const BLUE_PAGE: &str = "<html><head><title>Blue Demo</title></head><body><h1 style=\"color: blue;\">Hi</h1></body></html>";
const RED_PAGE: &str = "<html><head><title>Blue Demo</title></head><body><h1 style=\"color: red;\">Hi</h1></body></html>";

async fn server_with(client: ScriptedClient, configured: bool) -> (TestServer, AppState) {
    let mut config = Config::default();
    if configured {
        config.generation.api_key = Some("test-key".to_string());
    }
    let state = AppState::new(&config, Arc::new(client)).await.unwrap();
    let server = TestServer::new(build_router(state.clone(), true)).unwrap();
    (server, state)
}

#[tokio::test]
async fn test_status_reports_missing_credential() {
    let (server, _) = server_with(ScriptedClient::new(), false).await;

    let body: Value = server.get("/api/status").await.json();
    assert_eq!(body["credential"], "Missing");
    assert!(body["banner"].is_string());
    assert_eq!(body["is_generating"], false);
    assert_eq!(body["surface"], "closed");

    let preview = server.get("/").await;
    preview.assert_status_ok();
    assert!(preview.text().contains("Nothing generated yet"));
}

#[tokio::test]
async fn test_submit_edit_and_delete_turns() {
    let client = ScriptedClient::with_responses([
        Ok(BLUE_PAGE.to_string()),
        Ok(RED_PAGE.to_string()),
        Ok(BLUE_PAGE.to_string()),
    ]);
    let (server, _) = server_with(client, true).await;

    let first: Value = server
        .post("/api/turns")
        .json(&json!({ "instruction": "Create a page with a blue title" }))
        .await
        .json();
    assert_eq!(first["success"], true);
    assert_eq!(first["message"], "code_generated");
    assert_eq!(first["snapshot_turn_index"], 0);

    let second: Value = server
        .post("/api/turns")
        .json(&json!({ "instruction": "change the title color to red" }))
        .await
        .json();
    assert_eq!(second["presentation"]["kind"], "typewriter");

    let turns: Value = server.get("/api/turns").await.json();
    assert_eq!(turns.as_array().unwrap().len(), 4);

    let edited: Value = server
        .put("/api/turns/2")
        .json(&json!({ "instruction": "make the title blue again" }))
        .await
        .json();
    assert_eq!(edited["turn_position"], 3);

    let document: Value = server.get("/api/document").await.json();
    assert_eq!(document["document"], BLUE_PAGE);
    assert_eq!(document["snapshots"], json!([0, 1]));

    let deleted: Value = server.delete("/api/turns/2").await.json();
    assert_eq!(deleted["removed"], 2);
    assert_eq!(deleted["snapshots"], json!([0]));

    server
        .delete("/api/turns/7")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .put("/api/turns/1")
        .json(&json!({ "instruction": "nope" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_overlapping_submission_is_rejected() {
    let client = ScriptedClient::with_responses([Ok(BLUE_PAGE.to_string())])
        .with_delay(Duration::from_millis(300));
    let (server, _) = server_with(client, true).await;

    let slow = async {
        server
            .post("/api/turns")
            .json(&json!({ "instruction": "Create a page" }))
            .await
    };
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        server
            .post("/api/turns")
            .json(&json!({ "instruction": "Create another page" }))
            .await
    };
    let (first, second) = tokio::join!(slow, second);

    first.assert_status_ok();
    second.assert_status(StatusCode::CONFLICT);
    let turns: Value = server.get("/api/turns").await.json();
    assert_eq!(turns.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_disconnected_submission_still_completes() {
    let client = ScriptedClient::with_responses([
        Ok(BLUE_PAGE.to_string()),
        Ok(RED_PAGE.to_string()),
    ])
    .with_delay(Duration::from_millis(150));
    let (server, state) = server_with(client, true).await;

    let request = TurnRequest {
        instruction: "Create a page".to_string(),
        image: None,
        image_name: None,
    };
    let dropped = tokio::time::timeout(
        Duration::from_millis(20),
        handlers::submit_turn(State(state.clone()), Json(request)),
    )
    .await;
    assert!(dropped.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    {
        let session = state.session.read().await;
        assert!(!session.is_generating());
        assert!(session.log().pending_index().is_none());
        assert_eq!(session.document(), BLUE_PAGE);
    }

    server
        .post("/api/turns")
        .json(&json!({ "instruction": "change the title color to red" }))
        .await
        .assert_status_ok();
    server.delete("/api/turns/2").await.assert_status_ok();
    assert_eq!(state.session.read().await.document(), BLUE_PAGE);
}

#[tokio::test]
async fn test_generation_failure_keeps_document() {
    let client = ScriptedClient::with_responses([
        Ok(BLUE_PAGE.to_string()),
        Err(GenerationError::RequestTooLarge),
    ]);
    let (server, _) = server_with(client, true).await;
    server
        .post("/api/turns")
        .json(&json!({ "instruction": "Create a page" }))
        .await;

    let failed: Value = server
        .post("/api/turns")
        .json(&json!({ "instruction": "Add a huge gallery" }))
        .await
        .json();
    assert_eq!(failed["success"], false);
    assert_eq!(failed["message"], "too_large");

    let document: Value = server.get("/api/document").await.json();
    assert_eq!(document["document"], BLUE_PAGE);
}

#[tokio::test]
async fn test_non_image_upload_is_rejected() {
    let (server, state) = server_with(ScriptedClient::new(), true).await;
    let response = server
        .post("/api/turns")
        .json(&json!({
            "instruction": "Use this",
            "image": "data:text/plain;base64,aGVsbG8=",
            "image_name": "notes.txt"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(state.session.read().await.log().is_empty());
}

#[tokio::test]
async fn test_viewport_fullscreen_and_download() {
    let client = ScriptedClient::with_responses([Ok(BLUE_PAGE.to_string())]);
    let (server, state) = server_with(client, true).await;
    server
        .post("/api/turns")
        .json(&json!({ "instruction": "Create a page" }))
        .await;

    let opened: Value = server
        .post("/api/viewport")
        .json(&json!({ "mode": "mobile" }))
        .await
        .json();
    assert_eq!(opened["surface"], "open-mobile");
    assert_eq!(opened["width"], 375);
    assert_eq!(opened["height"], 667);

    server
        .post("/api/viewport")
        .json(&json!({ "mode": "watch" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let full: Value = server.post("/api/fullscreen").await.json();
    assert_eq!(full["surface"], "fullscreen");
    server
        .post("/api/viewport")
        .json(&json!({ "mode": "tablet" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    let back: Value = server.delete("/api/fullscreen").await.json();
    assert_eq!(back["surface"], "open-desktop");

    let preview = server.get("/").await.text();
    assert!(preview.contains("data-pagesmith-baseline"));

    let download = server.get("/api/download").await;
    download.assert_status_ok();
    assert_eq!(
        download.header("content-disposition").to_str().unwrap(),
        "attachment; filename=\"blue-demo.html\""
    );
    assert_eq!(download.text(), BLUE_PAGE);

    let events: Value = server.get("/api/events").await.json();
    let events = events.as_array().unwrap();
    assert!(events.iter().any(|e| {
        e["type"] == "snapshot_recorded" && e["metadata"]["turn_index"] == "0"
    }));
    assert!(events.iter().all(|e| e["description"].is_string()));
    assert!(state.session.read().await.surface().is_open());
}

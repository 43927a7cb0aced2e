//! Integration tests for the HTTP API surface
//!
//! Routes requests through the full router with `tower::ServiceExt`,
//! covering command idempotency, error body shape, and the room protocol
//! endpoints.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{connect_session, op_id, setup_ctx};
use serde_json::{json, Value};
use tagbox_server::api::create_router;
use tagbox_server::db;
use tower::ServiceExt;

async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(json_body.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (ctx, _dir) = setup_ctx().await;
    let app = create_router(ctx);

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "tagbox-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_retried_create_does_not_duplicate_playlist() {
    let (ctx, _dir) = setup_ctx().await;
    let app = create_router(ctx.clone());
    let token = op_id("playlist_create");

    let (status, first) = make_request(
        &app,
        Method::POST,
        "/api/v1/playlists",
        Some(json!({ "client_op_id": token, "name": "Morning" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "ok");
    let playlist_id = first["result"]["playlist_id"].as_str().unwrap().to_string();

    // Network retry with the identical token replays the stored outcome
    let (status, second) = make_request(
        &app,
        Method::POST,
        "/api/v1/playlists",
        Some(json!({ "client_op_id": token, "name": "Morning" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["result"]["playlist_id"], playlist_id.as_str());

    let playlists = db::playlists::list_playlists(&ctx.db).await.unwrap();
    assert_eq!(playlists.len(), 1, "retry created a duplicate playlist");
}

#[tokio::test]
async fn test_malformed_op_token_is_rejected() {
    let (ctx, _dir) = setup_ctx().await;
    let app = create_router(ctx);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/playlists",
        Some(json!({ "client_op_id": "nounderscores", "name": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn test_failed_command_replays_failure_on_retry() {
    let (ctx, _dir) = setup_ctx().await;
    let app = create_router(ctx);
    let token = op_id("playback_seek");

    // No track loaded: invalid state, mapped to 409 with the taxonomy tag
    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/playback/seek",
        Some(json!({ "client_op_id": token, "position_ms": 1000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_state");

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/playback/seek",
        Some(json!({ "client_op_id": token, "position_ms": 1000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_state");
}

#[tokio::test]
async fn test_playback_flow_over_http() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "http").await.unwrap();
    db::tracks::create_track(
        &ctx.db,
        playlist.playlist_id,
        "one",
        &format!("{}/one.mp3", playlist.playlist_id),
        Some(180_000),
    )
    .await
    .unwrap();
    let app = create_router(ctx);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/playback/load",
        Some(json!({
            "client_op_id": op_id("playback_load"),
            "playlist_id": playlist.playlist_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["is_playing"], true);

    let (status, state) = make_request(&app, Method::GET, "/api/v1/playback/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["playlist_id"], playlist.playlist_id.to_string());
    assert_eq!(state["duration_ms"], 180_000);

    // Seek past the end: validation error, position untouched
    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/playback/seek",
        Some(json!({ "client_op_id": op_id("playback_seek"), "position_ms": 200_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");

    let (_, state) = make_request(&app, Method::GET, "/api/v1/playback/state", None).await;
    assert_eq!(state["position_ms"], 0);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/playback/pause",
        Some(json!({ "client_op_id": op_id("playback_pause") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_room_protocol_over_http() {
    let (ctx, _dir) = setup_ctx().await;
    let (session_id, _rx) = connect_session(&ctx, 16);
    let app = create_router(ctx.clone());

    let (status, ack) = make_request(
        &app,
        Method::POST,
        "/api/v1/rooms/subscribe",
        Some(json!({ "session_id": session_id, "room": "playlists" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["room"], "playlists");
    assert_eq!(ack["success"], true);
    assert!(ack["server_seq"].is_u64());

    // Unknown room name is rejected before touching the registry
    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/rooms/subscribe",
        Some(json!({ "session_id": session_id, "room": "backstage" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation");

    // Unknown session is not found
    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/rooms/subscribe",
        Some(json!({ "session_id": uuid::Uuid::new_v4(), "room": "playlists" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, reply) = make_request(
        &app,
        Method::POST,
        "/api/v1/rooms/catch_up",
        Some(json!({
            "last_global_seq": 0,
            "last_room_seqs": { "playlists": 0 },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["resync_required"], false);
    assert!(reply["rooms"]["playlists"].is_array());

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/rooms/unsubscribe",
        Some(json!({ "session_id": session_id, "room": "playlists" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_operation_poll_endpoint() {
    let (ctx, _dir) = setup_ctx().await;
    let app = create_router(ctx);
    let token = op_id("playlist_create");

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/playlists",
        Some(json!({ "client_op_id": token, "name": "Polled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, op) = make_request(
        &app,
        Method::GET,
        &format!("/api/v1/operations/{}", token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(op["resolved"], true);
    assert_eq!(op["operation_name"], "playlist_create");
    assert_eq!(op["outcome"]["status"], "success");

    let (status, _) = make_request(
        &app,
        Method::GET,
        "/api/v1/operations/ghost_1700000000000_x",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_flow_over_http() {
    let (ctx, dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "wire").await.unwrap();
    let app = create_router(ctx);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/uploads",
        Some(json!({
            "client_op_id": op_id("upload_init"),
            "playlist_id": playlist.playlist_id,
            "filename": "wire.mp3",
            "total_size": 6,
            "chunk_size": 4,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["result"]["session_id"].as_str().unwrap().to_string();

    // Raw chunk bodies
    for (index, bytes) in [(0usize, &b"abcd"[..]), (1, &b"ef"[..])] {
        let request = Request::builder()
            .method(Method::PUT)
            .uri(format!("/api/v1/uploads/{}/chunks/{}", session_id, index))
            .header("content-type", "application/octet-stream")
            .body(Body::from(bytes.to_vec()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let (status, body) = make_request(
        &app,
        Method::GET,
        &format!("/api/v1/uploads/{}", session_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bytes_received"], 6);

    let (status, body) = make_request(
        &app,
        Method::POST,
        &format!("/api/v1/uploads/{}/finalize", session_id),
        Some(json!({ "client_op_id": op_id("upload_finalize") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let file_path = body["result"]["file_path"].as_str().unwrap();
    let written = std::fs::read(dir.path().join("music").join(file_path)).unwrap();
    assert_eq!(written, b"abcdef");
}

#[tokio::test]
async fn test_nfc_endpoints_over_http() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "tags").await.unwrap();
    let app = create_router(ctx.clone());

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/nfc/associations",
        Some(json!({
            "client_op_id": op_id("nfc_associate"),
            "playlist_id": playlist.playlist_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["state"], "LISTENING");
    let assoc_id = body["result"]["assoc_id"].as_str().unwrap().to_string();

    let (status, current) = make_request(
        &app,
        Method::GET,
        "/api/v1/nfc/associations/current",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["assoc_id"], assoc_id.as_str());

    // Inject a read the way a hardware driver would
    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/nfc/tag-reads",
        Some(json!({ "tag_id": "tag-http" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The listener task consumes the read and completes the association
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
    loop {
        if db::tags::find_mapping(&ctx.db, "tag-http").await.unwrap()
            == Some(playlist.playlist_id)
        {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "mapping never written");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let (status, body) = make_request(&app, Method::GET, "/api/v1/nfc/mappings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mappings"][0]["tag_id"], "tag-http");
}

//! HTTP API
//!
//! Thin request/response mapping over the owning components. Mutating
//! endpoints accept a client-supplied idempotency token and run through
//! `run_tracked`, which makes retries safe: a retry while the original is in
//! flight sees "pending", and a retry after settlement replays the stored
//! outcome instead of re-executing the mutation.

pub mod library;
pub mod nfc;
pub mod playback;
pub mod rooms;
pub mod sse;
pub mod uploads;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use tagbox_common::{Error, Result};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiResult;
use crate::state::AppContext;
use crate::sync::{OperationOutcome, TrackOutcome};

/// Largest accepted chunk body plus header slack
const MAX_CHUNK_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest(
            "/api/v1",
            Router::new()
                // Event stream and room subscriptions
                .route("/events", get(sse::events))
                .route("/rooms/subscribe", post(rooms::subscribe))
                .route("/rooms/unsubscribe", post(rooms::unsubscribe))
                .route("/rooms/catch_up", post(rooms::catch_up))
                .route("/operations/:client_op_id", get(rooms::get_operation))
                // Playback control
                .route("/playback/state", get(playback::get_state))
                .route("/playback/play", post(playback::play))
                .route("/playback/pause", post(playback::pause))
                .route("/playback/toggle", post(playback::toggle))
                .route("/playback/stop", post(playback::stop))
                .route("/playback/next", post(playback::next))
                .route("/playback/previous", post(playback::previous))
                .route("/playback/seek", post(playback::seek))
                .route("/playback/volume", post(playback::set_volume))
                .route("/playback/mute", post(playback::set_muted))
                .route("/playback/load", post(playback::load_playlist))
                // Library
                .route(
                    "/playlists",
                    get(library::list_playlists).post(library::create_playlist),
                )
                .route(
                    "/playlists/:playlist_id",
                    get(library::get_playlist)
                        .put(library::rename_playlist)
                        .delete(library::delete_playlist),
                )
                .route("/playlists/:playlist_id/tracks", get(library::list_tracks))
                .route("/tracks/:track_id", delete(library::delete_track))
                // Chunked uploads
                .route("/uploads", post(uploads::init))
                .route(
                    "/uploads/:session_id",
                    get(uploads::status).delete(uploads::cancel),
                )
                .route(
                    "/uploads/:session_id/chunks/:index",
                    put(uploads::receive_chunk),
                )
                .route("/uploads/:session_id/finalize", post(uploads::finalize))
                // NFC association
                .route("/nfc/associations", post(nfc::start_association))
                .route("/nfc/associations/current", get(nfc::current_association))
                .route("/nfc/associations/:assoc_id", delete(nfc::stop_association))
                .route("/nfc/override", post(nfc::override_mapping))
                .route("/nfc/mappings", get(nfc::list_mappings))
                .route("/nfc/tag-reads", post(nfc::inject_tag_read)),
        )
        .layer(DefaultBodyLimit::max(MAX_CHUNK_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// GET /health - Health check endpoint
async fn health(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "module": "tagbox-server",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": ctx.registry.session_count(),
        "server_seq": ctx.broadcaster.allocator().current_global(),
    }))
}

/// Rebuild a taxonomy error from a stored operation outcome for replay
fn error_from_outcome(error_type: &str, message: String) -> Error {
    match error_type {
        "validation" => Error::Validation(message),
        "not_found" => Error::NotFound(message),
        "conflict" => Error::Conflict(message),
        "invalid_state" => Error::InvalidState(message),
        "timeout" => Error::Timeout(message),
        "transient_infra" => Error::Io(std::io::Error::new(std::io::ErrorKind::Other, message)),
        _ => Error::Internal(message),
    }
}

/// Execute a mutation under an idempotency token
///
/// The mutation runs only when the token is new. Both the synchronous reply
/// and the tracker settlement carry the same result, so the caller's pending
/// request resolves with what the broadcast already announced.
pub(crate) async fn run_tracked<F, Fut, T>(
    ctx: &AppContext,
    client_op_id: &str,
    operation_name: &str,
    mutation: F,
) -> ApiResult<Json<Value>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
    T: Serialize,
{
    match ctx.operations.track(client_op_id, operation_name)? {
        TrackOutcome::Registered => match mutation().await {
            Ok(result) => {
                let result = serde_json::to_value(&result)
                    .map_err(|e| Error::Internal(format!("serialize result: {}", e)))?;
                ctx.operations.resolve(client_op_id, result.clone());
                Ok(Json(json!({
                    "status": "ok",
                    "client_op_id": client_op_id,
                    "result": result,
                })))
            }
            Err(e) => {
                ctx.operations.reject(client_op_id, &e);
                Err(e.into())
            }
        },
        TrackOutcome::AlreadyPending(op) => Ok(Json(json!({
            "status": "pending",
            "client_op_id": client_op_id,
            "operation_name": op.operation_name,
        }))),
        TrackOutcome::AlreadyResolved(op) => match op.outcome {
            Some(OperationOutcome::Success { result }) => Ok(Json(json!({
                "status": "ok",
                "client_op_id": client_op_id,
                "result": result,
            }))),
            Some(OperationOutcome::Failure {
                error_type,
                message,
                ..
            }) => Err(error_from_outcome(&error_type, message).into()),
            None => Err(Error::Internal("settled operation without outcome".to_string()).into()),
        },
    }
}

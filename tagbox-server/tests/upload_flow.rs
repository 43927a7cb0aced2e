//! Integration tests for the chunked upload lifecycle

mod common;

use common::{connect_session, next_envelope_of, setup_ctx};
use sha2::{Digest, Sha256};
use tagbox_common::events::{playlist_room, UploadStatus};
use tagbox_server::db;

fn chunked_payload(total: usize, chunk: usize) -> (Vec<u8>, Vec<Vec<u8>>) {
    let payload: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
    let chunks = payload.chunks(chunk).map(|c| c.to_vec()).collect();
    (payload, chunks)
}

#[tokio::test]
async fn test_out_of_order_chunks_produce_byte_identical_file() {
    let (ctx, dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "uploads").await.unwrap();

    let (payload, chunks) = chunked_payload(3_000_000, 1_000_000);
    let session = ctx
        .uploads
        .init(playlist.playlist_id, "threeparts.mp3", 3_000_000, 1_000_000)
        .await
        .unwrap();
    assert_eq!(session.expected_chunk_count, 3);
    assert_eq!(session.status, UploadStatus::Pending);

    // Receipt order [1, 0, 2]
    let p = ctx
        .uploads
        .receive_chunk(session.session_id, 1, &chunks[1])
        .await
        .unwrap();
    assert!((p - 100.0 / 3.0).abs() < 0.01);
    ctx.uploads
        .receive_chunk(session.session_id, 0, &chunks[0])
        .await
        .unwrap();
    let p = ctx
        .uploads
        .receive_chunk(session.session_id, 2, &chunks[2])
        .await
        .unwrap();
    assert_eq!(p, 100.0);

    let track = ctx.uploads.finalize(session.session_id, None).await.unwrap();
    assert_eq!(track.playlist_id, playlist.playlist_id);
    assert_eq!(track.title, "threeparts");

    let written = std::fs::read(dir.path().join("music").join(&track.file_path)).unwrap();
    assert_eq!(written, payload);

    // Staging cleaned up after completion
    assert!(!dir
        .path()
        .join("staging")
        .join(session.session_id.to_string())
        .exists());
}

#[tokio::test]
async fn test_progress_is_idempotent_across_chunk_retries() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "retries").await.unwrap();
    let (_, chunks) = chunked_payload(300, 100);

    let session = ctx
        .uploads
        .init(playlist.playlist_id, "retry.mp3", 300, 100)
        .await
        .unwrap();

    let first = ctx
        .uploads
        .receive_chunk(session.session_id, 1, &chunks[1])
        .await
        .unwrap();
    // Retried chunk: same progress, same bytes_received
    let second = ctx
        .uploads
        .receive_chunk(session.session_id, 1, &chunks[1])
        .await
        .unwrap();
    assert_eq!(first, second);

    let snapshot = ctx.uploads.get(session.session_id).unwrap();
    assert_eq!(snapshot.bytes_received, 100);
    assert_eq!(snapshot.status, UploadStatus::InProgress);
}

#[tokio::test]
async fn test_finalize_requires_every_chunk() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "partial").await.unwrap();
    let (_, chunks) = chunked_payload(300, 100);

    let session = ctx
        .uploads
        .init(playlist.playlist_id, "partial.mp3", 300, 100)
        .await
        .unwrap();
    ctx.uploads
        .receive_chunk(session.session_id, 0, &chunks[0])
        .await
        .unwrap();
    ctx.uploads
        .receive_chunk(session.session_id, 2, &chunks[2])
        .await
        .unwrap();

    let err = ctx.uploads.finalize(session.session_id, None).await.unwrap_err();
    assert_eq!(err.error_type(), "invalid_state");
    assert!(err.to_string().contains("1 of 3 chunks missing"));

    // The session survives an early finalize; supplying the gap completes it
    ctx.uploads
        .receive_chunk(session.session_id, 1, &chunks[1])
        .await
        .unwrap();
    ctx.uploads.finalize(session.session_id, None).await.unwrap();
    assert_eq!(
        ctx.uploads.get(session.session_id).unwrap().status,
        UploadStatus::Complete
    );
}

#[tokio::test]
async fn test_checksum_mismatch_cleans_up_everything() {
    let (ctx, dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "checksummed").await.unwrap();
    let (_, chunks) = chunked_payload(200, 100);

    let (session_id, room) = {
        let session = ctx
            .uploads
            .init(playlist.playlist_id, "bad.mp3", 200, 100)
            .await
            .unwrap();
        (session.session_id, playlist_room(playlist.playlist_id))
    };
    let (listener, mut rx) = connect_session(&ctx, 32);
    ctx.broadcaster.subscribe(listener, &room).unwrap();

    ctx.uploads.receive_chunk(session_id, 0, &chunks[0]).await.unwrap();
    ctx.uploads.receive_chunk(session_id, 1, &chunks[1]).await.unwrap();

    let err = ctx
        .uploads
        .finalize(session_id, Some(&"00".repeat(32)))
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "validation");
    assert!(err.to_string().contains("checksum mismatch"));

    // Terminal failure: no partial file, no staging, no track row, broadcast
    assert_eq!(ctx.uploads.get(session_id).unwrap().status, UploadStatus::Failed);
    assert!(!dir.path().join("staging").join(session_id.to_string()).exists());
    let playlist_dir = dir.path().join("music").join(playlist.playlist_id.to_string());
    let leftovers = std::fs::read_dir(&playlist_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0, "finalize left a partial file behind");
    assert!(db::tracks::list_tracks(&ctx.db, playlist.playlist_id)
        .await
        .unwrap()
        .is_empty());

    let failed = next_envelope_of(&mut rx, "UploadFailed").await;
    assert_eq!(failed.room, room);
}

#[tokio::test]
async fn test_correct_checksum_passes() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "verified").await.unwrap();
    let (payload, chunks) = chunked_payload(250, 100);

    let session = ctx
        .uploads
        .init(playlist.playlist_id, "good.mp3", 250, 100)
        .await
        .unwrap();
    for (index, chunk) in chunks.iter().enumerate() {
        ctx.uploads
            .receive_chunk(session.session_id, index, chunk)
            .await
            .unwrap();
    }

    let checksum = hex::encode(Sha256::digest(&payload));
    ctx.uploads
        .finalize(session.session_id, Some(&checksum))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_double_finalize_is_conflict() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "twice").await.unwrap();

    let session = ctx
        .uploads
        .init(playlist.playlist_id, "once.mp3", 4, 4)
        .await
        .unwrap();
    ctx.uploads
        .receive_chunk(session.session_id, 0, b"data")
        .await
        .unwrap();
    ctx.uploads.finalize(session.session_id, None).await.unwrap();

    let err = ctx.uploads.finalize(session.session_id, None).await.unwrap_err();
    assert_eq!(err.error_type(), "conflict");
}

#[tokio::test]
async fn test_cancel_rejects_further_chunks_and_removes_staging() {
    let (ctx, dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "cancelled").await.unwrap();
    let (_, chunks) = chunked_payload(300, 100);

    let session = ctx
        .uploads
        .init(playlist.playlist_id, "gone.mp3", 300, 100)
        .await
        .unwrap();
    ctx.uploads
        .receive_chunk(session.session_id, 0, &chunks[0])
        .await
        .unwrap();

    ctx.uploads.cancel(session.session_id).await.unwrap();
    assert!(!dir
        .path()
        .join("staging")
        .join(session.session_id.to_string())
        .exists());

    let err = ctx
        .uploads
        .receive_chunk(session.session_id, 1, &chunks[1])
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "invalid_state");
}

#[tokio::test]
async fn test_idle_sessions_expire_and_clean_staging() {
    let (ctx, dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "idle").await.unwrap();

    let session = ctx
        .uploads
        .init(playlist.playlist_id, "stale.mp3", 100, 100)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let expired = ctx
        .uploads
        .expire_idle_sessions(chrono::Duration::milliseconds(10))
        .await;
    assert_eq!(expired, 1);
    assert_eq!(
        ctx.uploads.get(session.session_id).unwrap().status,
        UploadStatus::Expired
    );
    assert!(!dir
        .path()
        .join("staging")
        .join(session.session_id.to_string())
        .exists());
}

#[tokio::test]
async fn test_init_validation() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "validate").await.unwrap();

    let err = ctx
        .uploads
        .init(uuid::Uuid::new_v4(), "x.mp3", 100, 10)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "not_found");

    let err = ctx
        .uploads
        .init(playlist.playlist_id, "../escape.mp3", 100, 10)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "validation");

    let err = ctx
        .uploads
        .init(playlist.playlist_id, "x.mp3", 0, 10)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "validation");

    let err = ctx
        .uploads
        .receive_chunk(uuid::Uuid::new_v4(), 0, b"zz")
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "not_found");
}

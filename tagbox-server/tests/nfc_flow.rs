//! Integration tests for NFC association sessions and tag-triggered playback

mod common;

use common::{connect_session, next_envelope_of, setup_ctx};
use tagbox_common::events::{AssociationState, TagboxEvent, ROOM_NFC};
use tagbox_server::db;
use tagbox_server::nfc::reader::TagEvent;

async fn nfc_listener(
    ctx: &tagbox_server::state::AppContext,
) -> tokio::sync::mpsc::Receiver<tagbox_common::events::EventEnvelope> {
    let (session, rx) = connect_session(ctx, 32);
    ctx.broadcaster.subscribe(session, ROOM_NFC).unwrap();
    rx
}

#[tokio::test]
async fn test_unmapped_tag_association_succeeds() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "lullabies").await.unwrap();
    let mut rx = nfc_listener(&ctx).await;

    let session = ctx.associations.start(playlist.playlist_id, 30_000).await.unwrap();
    assert_eq!(session.state, AssociationState::Listening);

    let listening = next_envelope_of(&mut rx, "AssociationStatus").await;
    match listening.data {
        TagboxEvent::AssociationStatus { state, .. } => {
            assert_eq!(state, AssociationState::Listening)
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let state = ctx.associations.on_tag_detected("tag-0001").await.unwrap();
    assert_eq!(state, Some(AssociationState::Success));

    // Mapping written and broadcast, session destroyed
    let mapping = next_envelope_of(&mut rx, "TagMappingChanged").await;
    match mapping.data {
        TagboxEvent::TagMappingChanged {
            tag_id,
            playlist_id,
            previous_playlist_id,
            ..
        } => {
            assert_eq!(tag_id, "tag-0001");
            assert_eq!(playlist_id, playlist.playlist_id);
            assert_eq!(previous_playlist_id, None);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    let success = next_envelope_of(&mut rx, "AssociationStatus").await;
    match success.data {
        TagboxEvent::AssociationStatus { state, .. } => {
            assert_eq!(state, AssociationState::Success)
        }
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(
        db::tags::find_mapping(&ctx.db, "tag-0001").await.unwrap(),
        Some(playlist.playlist_id)
    );
    assert!(ctx.associations.active_session().await.is_none());
}

#[tokio::test]
async fn test_conflicting_tag_requires_explicit_override() {
    let (ctx, _dir) = setup_ctx().await;
    let old = db::playlists::create_playlist(&ctx.db, "old home").await.unwrap();
    let new = db::playlists::create_playlist(&ctx.db, "new home").await.unwrap();
    db::tags::upsert_mapping(&ctx.db, "tag-dup", old.playlist_id).await.unwrap();
    let mut rx = nfc_listener(&ctx).await;

    ctx.associations.start(new.playlist_id, 30_000).await.unwrap();
    let state = ctx.associations.on_tag_detected("tag-dup").await.unwrap();
    assert_eq!(state, Some(AssociationState::Duplicate));

    // Nothing written yet
    assert_eq!(
        db::tags::find_mapping(&ctx.db, "tag-dup").await.unwrap(),
        Some(old.playlist_id)
    );

    let _ = next_envelope_of(&mut rx, "AssociationStatus").await; // Listening
    let duplicate = next_envelope_of(&mut rx, "AssociationStatus").await;
    match duplicate.data {
        TagboxEvent::AssociationStatus {
            state,
            conflict_playlist_id,
            tag_id,
            ..
        } => {
            assert_eq!(state, AssociationState::Duplicate);
            assert_eq!(conflict_playlist_id, Some(old.playlist_id));
            assert_eq!(tag_id.as_deref(), Some("tag-dup"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Explicit override rewrites the mapping and finishes the session
    let finished = ctx
        .associations
        .override_mapping("tag-dup", new.playlist_id)
        .await
        .unwrap();
    assert_eq!(finished.state, AssociationState::Success);
    assert_eq!(
        db::tags::find_mapping(&ctx.db, "tag-dup").await.unwrap(),
        Some(new.playlist_id)
    );

    let mapping = next_envelope_of(&mut rx, "TagMappingChanged").await;
    match mapping.data {
        TagboxEvent::TagMappingChanged {
            previous_playlist_id,
            playlist_id,
            ..
        } => {
            assert_eq!(previous_playlist_id, Some(old.playlist_id));
            assert_eq!(playlist_id, new.playlist_id);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(ctx.associations.active_session().await.is_none());
}

#[tokio::test]
async fn test_override_without_duplicate_is_invalid() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "strict").await.unwrap();

    let err = ctx
        .associations
        .override_mapping("tag-x", playlist.playlist_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "not_found");

    ctx.associations.start(playlist.playlist_id, 30_000).await.unwrap();
    let err = ctx
        .associations
        .override_mapping("tag-x", playlist.playlist_id)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "invalid_state");
}

#[tokio::test]
async fn test_zero_timeout_expires_on_next_sweep() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "hasty").await.unwrap();
    let mut rx = nfc_listener(&ctx).await;

    ctx.associations.start(playlist.playlist_id, 0).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    tagbox_server::tasks::run_sweep(&ctx).await;

    let _ = next_envelope_of(&mut rx, "AssociationStatus").await; // Listening
    let timeout = next_envelope_of(&mut rx, "AssociationStatus").await;
    match timeout.data {
        TagboxEvent::AssociationStatus { state, .. } => {
            assert_eq!(state, AssociationState::Timeout)
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(ctx.associations.active_session().await.is_none());
}

#[tokio::test]
async fn test_stop_cancels_listening_session() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "stopped").await.unwrap();

    let session = ctx.associations.start(playlist.playlist_id, 30_000).await.unwrap();
    ctx.associations.stop(session.assoc_id).await.unwrap();
    assert!(ctx.associations.active_session().await.is_none());

    let err = ctx.associations.stop(session.assoc_id).await.unwrap_err();
    assert_eq!(err.error_type(), "not_found");
}

#[tokio::test]
async fn test_start_conflicts_and_supersession() {
    let (ctx, _dir) = setup_ctx().await;
    let a = db::playlists::create_playlist(&ctx.db, "first").await.unwrap();
    let b = db::playlists::create_playlist(&ctx.db, "second").await.unwrap();

    let original = ctx.associations.start(a.playlist_id, 30_000).await.unwrap();

    // Different target while listening: refused
    let err = ctx.associations.start(b.playlist_id, 30_000).await.unwrap_err();
    assert_eq!(err.error_type(), "conflict");

    // Same target: superseded by a fresh session
    let replacement = ctx.associations.start(a.playlist_id, 30_000).await.unwrap();
    assert_ne!(replacement.assoc_id, original.assoc_id);
    assert_eq!(
        ctx.associations.active_session().await.unwrap().assoc_id,
        replacement.assoc_id
    );
}

#[tokio::test]
async fn test_mapped_tag_read_starts_playback() {
    let (ctx, _dir) = setup_ctx().await;
    let playlist = db::playlists::create_playlist(&ctx.db, "jukebox").await.unwrap();
    db::tracks::create_track(
        &ctx.db,
        playlist.playlist_id,
        "opener",
        &format!("{}/opener.mp3", playlist.playlist_id),
        Some(120_000),
    )
    .await
    .unwrap();
    db::tags::upsert_mapping(&ctx.db, "tag-play", playlist.playlist_id).await.unwrap();

    // A raw read with no session listening triggers the jukebox path
    ctx.tag_events
        .send(TagEvent {
            tag_id: "tag-play".to_string(),
        })
        .await
        .unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
    loop {
        let snapshot = ctx.player.snapshot().await.unwrap();
        if snapshot.is_playing {
            assert_eq!(snapshot.playlist_id, Some(playlist.playlist_id));
            assert_eq!(snapshot.track_index, Some(0));
            assert_eq!(snapshot.duration_ms, 120_000);
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "tag read never started playback"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // Unmapped reads are ignored without disturbing playback
    ctx.tag_events
        .send(TagEvent {
            tag_id: "tag-unknown".to_string(),
        })
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(ctx.player.snapshot().await.unwrap().is_playing);
}

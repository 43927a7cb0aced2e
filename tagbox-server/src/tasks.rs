//! Background maintenance
//!
//! One periodic loop runs every sweep: stale pending operations are
//! force-rejected, idle upload sessions expire, an overdue association
//! session times out, and the sequence reservation is extended ahead of the
//! allocator. Sweeps only move non-terminal states to terminal ones, so they
//! are safe alongside normal traffic, and they never raise into request
//! handling.

use chrono::Duration as ChronoDuration;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use crate::db;
use crate::state::AppContext;
use crate::sync::sequence::SEQUENCE_HEADROOM;

/// Spawn the maintenance loop
pub fn spawn_sweepers(ctx: AppContext) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(ctx.config.sweep_interval_secs.max(1)));
        loop {
            tick.tick().await;
            run_sweep(&ctx).await;
        }
    })
}

/// One maintenance pass; errors are logged, never propagated
pub async fn run_sweep(ctx: &AppContext) {
    let (forced, removed) = ctx
        .operations
        .sweep(ChronoDuration::seconds(ctx.config.operation_ttl_secs as i64));
    if forced > 0 || removed > 0 {
        debug!(forced, removed, "operation sweep");
    }

    let expired = ctx
        .uploads
        .expire_idle_sessions(ChronoDuration::seconds(
            ctx.config.upload_idle_timeout_secs as i64,
        ))
        .await;
    if expired > 0 {
        debug!(expired, "upload sweep");
    }

    if ctx.associations.sweep_timeouts().await {
        debug!("association session timed out by sweep");
    }

    if let Err(e) = extend_sequence_reservation(ctx).await {
        warn!(error = %e, "failed to extend sequence reservation");
    }
}

/// Keep the persisted reservation comfortably ahead of the allocator
async fn extend_sequence_reservation(ctx: &AppContext) -> tagbox_common::Result<()> {
    let current = ctx.broadcaster.allocator().current_global();
    let reserved = db::settings::load_sequence_reservation(&ctx.db).await?;
    if reserved.saturating_sub(current) < SEQUENCE_HEADROOM / 2 {
        db::settings::save_sequence_reservation(&ctx.db, current + SEQUENCE_HEADROOM).await?;
        debug!(
            current,
            reserved = current + SEQUENCE_HEADROOM,
            "sequence reservation extended"
        );
    }
    Ok(())
}

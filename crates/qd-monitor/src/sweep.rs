//! Timeout and orphan sweeper.
//!
//! Two slow-cadence cleanups plus the claim expiry pass share one loop:
//! matches stuck in `waiting` past the matchmaking timeout are voided, and
//! confirmed deposits that never attached to a match are made
//! refund-eligible once the orphan timeout passes.

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use qd_types::{CancelReason, Settings};

use crate::expiry::expiry_tick;

/// Void matches stuck in `waiting` longer than the matchmaking timeout.
/// Returns how many were voided by this tick.
pub async fn waiting_timeout_tick(pool: &PgPool, settings: &Settings) -> anyhow::Result<u64> {
    let now = Utc::now();
    let cutoff = now - settings.waiting_timeout();
    let mut voided = 0u64;

    for m in qd_db::waiting_matches_older_than(pool, cutoff).await? {
        if !qd_db::try_mark_refund_processed(pool, m.match_id).await? {
            continue;
        }
        qd_db::cancel_match(pool, m.match_id, CancelReason::MatchmakingTimeout).await?;
        let freed = qd_db::mark_match_stakes_refund_eligible(
            pool,
            m.match_id,
            CancelReason::MatchmakingTimeout.as_str(),
            now + settings.refund_window(),
        )
        .await?;
        info!(
            match_id = %m.match_id,
            stakes_freed = freed,
            "matchmaking timed out; match voided"
        );
        voided += 1;
    }

    Ok(voided)
}

/// Free confirmed deposits that never found a match. Returns how many were
/// newly marked eligible.
pub async fn orphan_tick(pool: &PgPool, settings: &Settings) -> anyhow::Result<u64> {
    let now = Utc::now();
    let cutoff = now - settings.orphan_timeout();
    let mut marked = 0u64;

    for s in qd_db::orphaned_confirmed_stakes(pool, cutoff).await? {
        if qd_db::mark_refund_eligible(
            pool,
            &s.reference,
            CancelReason::NoMatchFound.as_str(),
            now + settings.refund_window(),
        )
        .await?
        {
            info!(reference = %s.reference, "orphaned deposit marked refund-eligible");
            marked += 1;
        }
    }

    Ok(marked)
}

/// Run the timeout, orphan, and claim-expiry sweeps until `shutdown` flips
/// to true. A failing sub-pass is logged and does not stop the others.
pub fn spawn_sweeper(
    pool: PgPool,
    settings: Settings,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(settings.sweep_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = waiting_timeout_tick(&pool, &settings).await {
                        error!(error = %e, "waiting timeout sweep failed");
                    }
                    if let Err(e) = orphan_tick(&pool, &settings).await {
                        error!(error = %e, "orphan sweep failed");
                    }
                    if let Err(e) = expiry_tick(&pool).await {
                        error!(error = %e, "claim expiry sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}

//! Shared runtime state for qd-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything in here is
//! built once at boot and read-only afterwards; mutable settlement state
//! lives exclusively in Postgres.

use std::sync::Arc;

use sqlx::PgPool;

use qd_ledger::Ledger;
use qd_types::Settings;

use crate::auth::SessionVerifier;

/// Static build metadata included in the health response.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub pool: PgPool,
    pub ledger: Arc<dyn Ledger>,
    pub settings: Settings,
    pub sessions: SessionVerifier,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        ledger: Arc<dyn Ledger>,
        settings: Settings,
        sessions: SessionVerifier,
    ) -> Self {
        Self {
            pool,
            ledger,
            settings,
            sessions,
            build: BuildInfo {
                service: "qd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

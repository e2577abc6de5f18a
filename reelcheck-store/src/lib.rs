//! Reelcheck Store - PostgreSQL backend for the fingerprint store and
//! incident ledger.
//!
//! Implements [`reelcheck_core::IncidentStore`] on top of `sqlx`. Frame hashes
//! live in `video_frames` with one expression index per 8-bit band; incidents
//! and their aliases live in `incident_records` and `incident_aliases`.
//! Migrations are embedded and applied on connect.

pub mod error;
pub mod postgres;

pub use error::PgStoreError;
pub use postgres::{PgStore, PgTransaction};

/// Connection settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgStoreConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Pool size (default: 10)
    pub max_connections: u32,
}

impl PgStoreConfig {
    /// Read `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`.
    ///
    /// Returns `None` when `DATABASE_URL` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())?;

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(10);

        Some(Self {
            database_url,
            max_connections,
        })
    }

    pub async fn connect(&self) -> Result<PgStore, PgStoreError> {
        PgStore::connect(&self.database_url, self.max_connections).await
    }
}

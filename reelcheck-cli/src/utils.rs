//! Common utility functions shared across CLI commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reelcheck_core::MemoryStore;
use reelcheck_store::{PgStore, PgStoreConfig};
use tracing::{info, warn};

/// Backend selected from the environment.
pub enum Store {
    Postgres(PgStore),
    Memory(MemoryStore),
}

/// Connect to `DATABASE_URL`, or fall back to an empty in-memory store.
pub async fn open_store() -> Result<Store> {
    match PgStoreConfig::from_env() {
        Some(config) => {
            let store = config
                .connect()
                .await
                .context("Failed to connect to fingerprint store")?;
            info!(max_connections = config.max_connections, "Using PostgreSQL store");
            Ok(Store::Postgres(store))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store (nothing is persisted)");
            Ok(Store::Memory(MemoryStore::new()))
        }
    }
}

/// Format a timestamp as a human-readable UTC string.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Format a sample offset, e.g. `12.50s`.
pub fn format_offset(seconds: f64) -> String {
    format!("{seconds:.2}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 45).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-15 12:30:45 UTC");
    }

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(0.0), "0.00s");
        assert_eq!(format_offset(12.5), "12.50s");
    }
}

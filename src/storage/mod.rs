pub mod database;
pub mod freshness;
pub mod json_store;

use crate::config::StorageConfig;
use crate::models::BankRecord;
use anyhow::Result;
use tracing::{info, warn};

use self::database::DuckDbSink;
use self::json_store::JsonDocumentStore;

pub use self::freshness::FreshnessStore;

// ── Sink contract ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
}

/// Durable destination for one country's batch. Implementations upsert on
/// (country, swift_code).
pub trait RecordSink {
    fn write_batch(&mut self, country_key: &str, records: &[BankRecord]) -> Result<MergeStats>;
}

// ── Composition ───────────────────────────────────────────────────────────────

/// JSON store (always on) plus the optional DuckDB mirror, decided once at
/// startup.
pub struct RecordSinks {
    primary: JsonDocumentStore,
    secondary: Option<Box<dyn RecordSink>>,
}

impl RecordSinks {
    pub fn new(primary: JsonDocumentStore, secondary: Option<Box<dyn RecordSink>>) -> Self {
        Self { primary, secondary }
    }

    /// Open the JSON store and, when configured and reachable, the DuckDB
    /// mirror. A mirror that cannot be opened leaves the run JSON-only.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let primary = JsonDocumentStore::load(&config.data_path)?;
        let secondary = open_secondary(config).map(|s| Box::new(s) as Box<dyn RecordSink>);
        Ok(Self::new(primary, secondary))
    }

    #[cfg(test)]
    pub fn primary(&self) -> &JsonDocumentStore {
        &self.primary
    }

    #[cfg(test)]
    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }
}

pub fn open_secondary(config: &StorageConfig) -> Option<DuckDbSink> {
    let Some(secondary) = &config.secondary else {
        info!("[DUCKDB] Not configured, JSON only");
        return None;
    };

    let opened = DuckDbSink::open(secondary).and_then(|sink| {
        sink.run_migrations()?;
        Ok(sink)
    });
    match opened {
        Ok(sink) => {
            info!("[DUCKDB] Connected ({:?}, table={})", secondary.db_path, secondary.table);
            Some(sink)
        }
        Err(e) => {
            warn!("[DUCKDB] Not available: {:#}. Continuing with JSON only", e);
            None
        }
    }
}

impl RecordSink for RecordSinks {
    /// The JSON result decides success. Mirror errors are logged only.
    fn write_batch(&mut self, country_key: &str, records: &[BankRecord]) -> Result<MergeStats> {
        let stats = self.primary.write_batch(country_key, records)?;

        if let Some(secondary) = self.secondary.as_mut() {
            if let Err(e) = secondary.write_batch(country_key, records) {
                warn!("[DUCKDB] {}: {:#}", country_key, e);
            }
        }
        Ok(stats)
    }
}

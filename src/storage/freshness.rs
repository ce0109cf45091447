//! Per-country scrape freshness, persisted as one JSON object keyed by the
//! canonical country key.

use crate::models::{FreshnessEntry, IsoCodes};
use crate::utils::write_json_atomic;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct FreshnessStore {
    path: PathBuf,
    entries: BTreeMap<String, FreshnessEntry>,
}

impl FreshnessStore {
    /// Load the whole map. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Corrupt freshness file {:?}", path))?
        } else {
            BTreeMap::new()
        };

        info!("[FRESHNESS] {} countries tracked in {:?}", entries.len(), path);
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn get(&self, country_key: &str) -> Option<&FreshnessEntry> {
        self.entries.get(country_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_stale(&self, country_key: &str, threshold: TimeDelta) -> bool {
        self.is_stale_at(country_key, threshold, Utc::now())
    }

    /// Stale when never scraped, when ISO2 is still unknown, or when the last
    /// scrape is older than `threshold`.
    pub fn is_stale_at(&self, country_key: &str, threshold: TimeDelta, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.entries.get(country_key) else {
            return true;
        };
        if entry.iso2.is_none() {
            return true;
        }
        match entry.last_scraped_at {
            Some(last) => now - last > threshold,
            None => true,
        }
    }

    /// Upsert the entry for `country_key`. In memory only, see `save`.
    /// Returns the entry it replaced so a failed save can be undone.
    pub fn record_success(
        &mut self,
        country_key: &str,
        iso: Option<&IsoCodes>,
        at: DateTime<Utc>,
    ) -> Option<FreshnessEntry> {
        self.entries.insert(
            country_key.to_string(),
            FreshnessEntry {
                last_scraped_at: Some(at),
                iso2: iso.map(|c| c.iso2.clone()),
                iso3: iso.map(|c| c.iso3.clone()),
            },
        )
    }

    /// Put back what `record_success` replaced.
    pub fn restore(&mut self, country_key: &str, previous: Option<FreshnessEntry>) {
        match previous {
            Some(entry) => {
                self.entries.insert(country_key.to_string(), entry);
            }
            None => {
                self.entries.remove(country_key);
            }
        }
    }

    /// Write the full map back, replacing the file atomically.
    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.entries)
    }
}

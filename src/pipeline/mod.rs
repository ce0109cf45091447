//! Pipeline orchestrator: discovery → per-country freshness gate → scrape →
//! ISO enrichment → merge → persist → freshness update.
//!
//! ## Per-country stages
//!
//! ```text
//! Discovered ─(fresh)─▶ Skip
//!      │
//!   (stale)
//!      ▼
//! Scraping ─▶ Enriching ─▶ Merging ─▶ Persisted
//! ```
//!
//! Any error inside a stage is contained at the country boundary: it is
//! logged, the freshness entry is left untouched, and the run moves on. The
//! freshness file is written only after the sink accepted the batch, so an
//! interrupted run re-scrapes the country it was working on.

use crate::config::AppConfig;
use crate::models::{BankRecord, CountryLink, IsoCodes, RawBankRow};
use crate::scraper::cleaner::country_key;
use crate::scraper::http_client::{HttpClient, PageFetcher};
use crate::scraper::iso::{IsoLookup, RestCountriesClient};
use crate::scraper::{ScrapeError, SwiftCodesScraper};
use crate::storage::{FreshnessStore, RecordSink, RecordSinks};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

// ── Errors and outcomes ───────────────────────────────────────────────────────

/// Conditions that end the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("country discovery failed: {0}")]
    Discovery(#[source] ScrapeError),
    #[error("startup failed: {0:#}")]
    State(anyhow::Error),
}

/// Stages that can fail a country. Enrichment degrades instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scraping,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Scraping => "scraping",
            Stage::Persisting => "persisting",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct CountryFailure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

#[derive(Debug)]
pub enum CountryOutcome {
    Skipped,
    Persisted { records: usize, truncated: bool },
    Failed(CountryFailure),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub discovered: usize,
    pub skipped: usize,
    pub scraped: usize,
    pub failed: usize,
    pub records_written: usize,
}

/// Rows collected for one country, with the page each came from.
struct ScrapedBatch {
    rows: Vec<(String, RawBankRow)>,
    pages: u32,
    truncated: bool,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: AppConfig,
    scraper: SwiftCodesScraper,
    iso: Box<dyn IsoLookup>,
    freshness: FreshnessStore,
    sinks: Box<dyn RecordSink>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        scraper: SwiftCodesScraper,
        iso: Box<dyn IsoLookup>,
        freshness: FreshnessStore,
        sinks: Box<dyn RecordSink>,
    ) -> Self {
        Self {
            config,
            scraper,
            iso,
            freshness,
            sinks,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, PipelineError> {
        let client: Arc<dyn PageFetcher> = Arc::new(
            HttpClient::new(&config.scraper).map_err(PipelineError::State)?,
        );
        let scraper = SwiftCodesScraper::new(client.clone(), &config.scraper)
            .map_err(|e| PipelineError::State(e.into()))?;
        let iso = RestCountriesClient::new(client, &config.scraper.iso_base_url)
            .map_err(|e| PipelineError::State(e.into()))?;

        let freshness = FreshnessStore::load(&config.storage.freshness_path)
            .map_err(PipelineError::State)?;
        let sinks = RecordSinks::open(&config.storage).map_err(PipelineError::State)?;

        Ok(Self::new(config, scraper, Box::new(iso), freshness, Box::new(sinks)))
    }

    #[cfg(test)]
    pub fn freshness(&self) -> &FreshnessStore {
        &self.freshness
    }

    pub async fn run(&mut self) -> Result<RunStats, PipelineError> {
        // ── 1. Discover countries ─────────────────────────────────────────────
        info!("=== Step 1: Discovering countries ===");
        let mut countries = self
            .scraper
            .discover_countries()
            .await
            .map_err(PipelineError::Discovery)?;

        if let Some(limit) = self.config.pipeline.country_limit {
            if limit < countries.len() {
                info!("Limiting run to the first {} of {} countries", limit, countries.len());
                countries.truncate(limit);
            }
        }

        // ── 2. Walk countries in order ────────────────────────────────────────
        info!(
            "=== Step 2: Processing {} countries (staleness {} days) ===",
            countries.len(),
            self.config.pipeline.staleness_days
        );
        let mut stats = RunStats {
            discovered: countries.len(),
            ..RunStats::default()
        };

        for link in &countries {
            let key = country_key(&link.display_name, &link.page_path);
            match self.process_country(&key, link).await {
                CountryOutcome::Skipped => stats.skipped += 1,
                CountryOutcome::Persisted { records, truncated } => {
                    stats.scraped += 1;
                    stats.records_written += records;
                    if truncated {
                        warn!("{}: stored a truncated page set", key);
                    }
                }
                CountryOutcome::Failed(failure) => {
                    warn!(
                        "[ERROR] {} ({}) failed while {}: {:#}",
                        key, link.page_path, failure.stage, failure.error
                    );
                    stats.failed += 1;
                }
            }
        }

        info!(
            "=== Done: {} countries | {} scraped | {} skipped | {} failed | {} records ===",
            stats.discovered, stats.scraped, stats.skipped, stats.failed, stats.records_written
        );
        Ok(stats)
    }

    pub async fn process_country(&mut self, key: &str, link: &CountryLink) -> CountryOutcome {
        // Discovered → Skip | Scraping
        let threshold = self.config.pipeline.staleness_threshold();
        if !self.freshness.is_stale(key, threshold) {
            info!("[FRESHNESS] {}: scraped recently, skipping", key);
            return CountryOutcome::Skipped;
        }
        info!("[COUNTRY] {} ({}) is stale, scraping", key, link.display_name);

        // Scraping
        let batch = match self.scrape(&link.page_path).await {
            Ok(batch) => batch,
            Err(error) => {
                return CountryOutcome::Failed(CountryFailure { stage: Stage::Scraping, error });
            }
        };

        // Enriching
        let iso = self.enrich(key).await;

        // Merging
        let now = Utc::now();
        let records: Vec<BankRecord> = batch
            .rows
            .into_iter()
            .map(|(page, row)| BankRecord::from_raw(key, &page, iso.as_ref(), row, now))
            .collect();

        // Persisted
        if let Err(error) = self.persist(key, &records, iso.as_ref(), now) {
            return CountryOutcome::Failed(CountryFailure { stage: Stage::Persisting, error });
        }

        info!(
            "[FRESHNESS] {}: updated, {} rows from {} pages",
            key,
            records.len(),
            batch.pages
        );
        CountryOutcome::Persisted {
            records: records.len(),
            truncated: batch.truncated,
        }
    }

    /// Walk every page. A failed page fails the country; rows from earlier
    /// pages are dropped with it.
    async fn scrape(&self, page_path: &str) -> Result<ScrapedBatch> {
        let mut pages = self.scraper.country_pages(page_path);
        let mut rows = Vec::new();

        while let Some(next) = pages.next_page().await {
            let page = next.with_context(|| {
                format!(
                    "page {} failed after {} rows",
                    pages.pages_fetched(),
                    rows.len()
                )
            })?;
            rows.extend(page.rows.into_iter().map(|row| (page.path.clone(), row)));
        }

        Ok(ScrapedBatch {
            rows,
            pages: pages.pages_fetched(),
            truncated: pages.truncated(),
        })
    }

    /// Cached codes when the freshness entry has them, else one lookup.
    async fn enrich(&self, key: &str) -> Option<IsoCodes> {
        if let Some(cached) = self.freshness.get(key).and_then(|e| e.iso_codes()) {
            info!("[ISO] {}: cached {}/{}", key, cached.iso2, cached.iso3);
            return Some(cached);
        }

        let found = self.iso.lookup_iso(key).await;
        if found.is_none() {
            warn!("[ISO] {}: no ISO codes, will retry next run", key);
        }
        found
    }

    fn persist(
        &mut self,
        key: &str,
        records: &[BankRecord],
        iso: Option<&IsoCodes>,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        self.sinks.write_batch(key, records)?;

        let previous = self.freshness.record_success(key, iso, now);
        if let Err(e) = self.freshness.save() {
            error!("[FRESHNESS] could not save after {}: {:#}", key, e);
            self.freshness.restore(key, previous);
            return Err(e);
        }
        Ok(())
    }
}

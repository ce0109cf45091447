use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Source site, ISO service and politeness settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_browse_path")]
    pub browse_path: String,

    #[serde(default = "default_iso_base_url")]
    pub iso_base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fixed pause between two page fetches of the same country.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Hard ceiling on pages fetched per country.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    #[serde(default = "default_freshness_path")]
    pub freshness_path: PathBuf,

    /// Optional DuckDB mirror of the JSON document store.
    #[serde(default)]
    pub secondary: Option<SecondaryConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecondaryConfig {
    pub db_path: PathBuf,

    #[serde(default = "default_table")]
    pub table: String,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_staleness_days")]
    pub staleness_days: u32,

    /// Only process the first N discovered countries (test runs).
    #[serde(default)]
    pub country_limit: Option<usize>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.theswiftcodes.com".to_string()
}
fn default_browse_path() -> String {
    "/browse-by-country/".to_string()
}
fn default_iso_base_url() -> String {
    "https://restcountries.com/v3.1".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_max_pages() -> u32 {
    500
}
fn default_user_agent() -> String {
    "swift-scraper/0.1 (catalog refresh; sequential, 1 req/s)".to_string()
}
fn default_data_path() -> PathBuf {
    PathBuf::from("swift_data.json")
}
fn default_freshness_path() -> PathBuf {
    PathBuf::from("swift_freshness.json")
}
fn default_table() -> String {
    "swift_codes".to_string()
}
fn default_staleness_days() -> u32 {
    28
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            browse_path: default_browse_path(),
            iso_base_url: default_iso_base_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            max_pages: default_max_pages(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            freshness_path: default_freshness_path(),
            secondary: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staleness_days: default_staleness_days(),
            country_limit: None,
        }
    }
}

impl ScraperConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl PipelineConfig {
    pub fn staleness_threshold(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.staleness_days))
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("SWIFT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let app: Self = cfg.try_deserialize().context("Invalid configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Reject values that deserialize fine but cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.scraper.max_pages == 0 {
            bail!("scraper.max_pages must be at least 1");
        }
        Ok(())
    }
}

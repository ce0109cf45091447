//! ISO 3166 lookup against the REST Countries service.

use crate::models::IsoCodes;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::ScrapeError;
use super::cleaner::normalize_country;
use super::http_client::PageFetcher;

/// Country name → ISO codes. `None` covers both "unknown country" and
/// "service unavailable"; neither may fail the caller.
#[async_trait]
pub trait IsoLookup: Send + Sync {
    async fn lookup_iso(&self, normalized_country: &str) -> Option<IsoCodes>;
}

#[derive(Debug, Deserialize)]
struct CountryName {
    common: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestCountry {
    cca2: Option<String>,
    cca3: Option<String>,
    name: Option<CountryName>,
}

pub struct RestCountriesClient {
    fetcher: Arc<dyn PageFetcher>,
    base_url: Url,
}

impl RestCountriesClient {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: &str) -> Result<Self, ScrapeError> {
        let base_url = Url::parse(base_url).map_err(|e| ScrapeError::Url {
            url: base_url.to_string(),
            source: e,
        })?;
        Ok(Self { fetcher, base_url })
    }

    /// ".../v3.1/name/{country}?fullText=false&fields=cca2,cca3,name"
    fn lookup_url(&self, country: &str) -> Option<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push("name")
            .push(country);
        url.query_pairs_mut()
            .append_pair("fullText", "false")
            .append_pair("fields", "cca2,cca3,name");
        Some(url)
    }
}

/// Prefer the candidate whose common name normalizes to the query; partial
/// matching on the service side can rank e.g. "Guinea-Bissau" before "Guinea".
fn pick_match(candidates: Vec<RestCountry>, query: &str) -> Option<(IsoCodes, Option<String>)> {
    let complete = |c: &RestCountry| c.cca2.is_some() && c.cca3.is_some();

    let idx = candidates
        .iter()
        .position(|c| {
            complete(c)
                && c.name
                    .as_ref()
                    .and_then(|n| n.common.as_deref())
                    .is_some_and(|common| normalize_country(common) == query)
        })
        .or_else(|| candidates.iter().position(complete))?;

    let c = candidates.into_iter().nth(idx)?;
    Some((
        IsoCodes {
            iso2: c.cca2?.to_uppercase(),
            iso3: c.cca3?.to_uppercase(),
        },
        c.name.and_then(|n| n.common),
    ))
}

#[async_trait]
impl IsoLookup for RestCountriesClient {
    async fn lookup_iso(&self, normalized_country: &str) -> Option<IsoCodes> {
        if normalized_country.is_empty() {
            return None;
        }
        let url = self.lookup_url(normalized_country)?;

        let body = match self.fetcher.get_text(url.as_str()).await {
            Ok(body) => body,
            Err(ScrapeError::Status { status: 404, .. }) => {
                debug!("[ISO] no match for '{}'", normalized_country);
                return None;
            }
            Err(e) => {
                warn!("[ISO] lookup failed for '{}': {}", normalized_country, e);
                return None;
            }
        };

        let candidates: Vec<RestCountry> = match serde_json::from_str(&body) {
            Ok(c) => c,
            Err(e) => {
                warn!("[ISO] unexpected response for '{}': {}", normalized_country, e);
                return None;
            }
        };

        let (codes, matched) = pick_match(candidates, normalized_country)?;
        info!(
            "[ISO] '{}' → {}/{} (matched {:?})",
            normalized_country, codes.iso2, codes.iso3, matched
        );
        Some(codes)
    }
}

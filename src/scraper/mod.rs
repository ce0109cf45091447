pub mod cleaner;
pub mod http_client;
pub mod iso;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::models::{BankPage, CountryLink};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use self::cleaner::retain_complete_rows;
use self::http_client::PageFetcher;
use self::parsers::{ROW_SELECTOR, parse_bank_page, parse_country_links};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: &'static str, reason: String },
    #[error("selector {selector:?} matched nothing; the site markup has changed")]
    SelectorMismatch { selector: &'static str },
    #[error("invalid url {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

// ── theswiftcodes.com scraper ─────────────────────────────────────────────────

pub struct SwiftCodesScraper {
    fetcher: Arc<dyn PageFetcher>,
    base_url: Url,
    browse_path: String,
    request_delay: Duration,
    max_pages: u32,
}

impl SwiftCodesScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ScrapeError::Url {
            url: config.base_url.clone(),
            source: e,
        })?;
        Ok(Self {
            fetcher,
            base_url,
            browse_path: config.browse_path.clone(),
            request_delay: config.request_delay(),
            max_pages: config.max_pages,
        })
    }

    /// Resolve a site-relative href. "/netherlands_swift_codes.html" → absolute URL
    fn page_url(&self, href: &str) -> Result<Url, ScrapeError> {
        self.base_url.join(href).map_err(|e| ScrapeError::Url {
            url: href.to_string(),
            source: e,
        })
    }

    /// Fetch the browse page and list every country. Any failure here is
    /// fatal for the run.
    pub async fn discover_countries(&self) -> Result<Vec<CountryLink>, ScrapeError> {
        let url = self.page_url(&self.browse_path)?;
        info!("Fetching country list ({})", url);

        let html = self.fetcher.get_text(url.as_str()).await?;
        let links = parse_country_links(&html)?;

        info!("[COUNTRIES] Found {} countries", links.len());
        Ok(links)
    }

    /// Forward-only walk over a country's paginated table.
    pub fn country_pages(&self, page_path: &str) -> CountryPages<'_> {
        CountryPages {
            scraper: self,
            next_path: Some(page_path.to_string()),
            pages_fetched: 0,
            truncated: false,
        }
    }
}

// ── Pagination ────────────────────────────────────────────────────────────────

/// Lazy page sequence for one country. Ends on the last page, on the page
/// ceiling, or right after yielding the first fetch error.
pub struct CountryPages<'a> {
    scraper: &'a SwiftCodesScraper,
    next_path: Option<String>,
    pages_fetched: u32,
    truncated: bool,
}

impl CountryPages<'_> {
    pub async fn next_page(&mut self) -> Option<Result<BankPage, ScrapeError>> {
        let path = self.next_path.take()?;

        if self.pages_fetched >= self.scraper.max_pages {
            warn!(
                "Reached page limit ({}) before {}, stopping",
                self.scraper.max_pages, path
            );
            self.truncated = true;
            return None;
        }

        if self.pages_fetched > 0 && !self.scraper.request_delay.is_zero() {
            tokio::time::sleep(self.scraper.request_delay).await;
        }
        self.pages_fetched += 1;

        let page = match self.fetch(&path).await {
            Ok(page) => page,
            Err(e) => return Some(Err(e)),
        };

        info!(
            "[PAGE] {} -> {} rows, next={:?}",
            page.path,
            page.rows.len(),
            page.next_href
        );
        self.next_path = page.next_href.clone();
        Some(Ok(page))
    }

    async fn fetch(&self, path: &str) -> Result<BankPage, ScrapeError> {
        let url = self.scraper.page_url(path)?;
        debug!("Fetching country page {}", url);

        let html = self.scraper.fetcher.get_text(url.as_str()).await?;
        let mut page = parse_bank_page(&html, path)?;

        // A country's first page always lists banks; none at all means the
        // table markup changed.
        if self.pages_fetched == 1 && page.rows.is_empty() {
            return Err(ScrapeError::SelectorMismatch {
                selector: ROW_SELECTOR,
            });
        }

        retain_complete_rows(&mut page);
        Ok(page)
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// True when the walk stopped at the page ceiling with pages left.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    async fn drain(pages: &mut CountryPages<'_>) -> (Vec<BankPage>, Option<ScrapeError>) {
        let mut ok = Vec::new();
        while let Some(next) = pages.next_page().await {
            match next {
                Ok(page) => ok.push(page),
                Err(e) => return (ok, Some(e)),
            }
        }
        (ok, None)
    }

    #[tokio::test]
    async fn follows_next_links_to_the_last_page() {
        let site = Arc::new(
            FakeSite::default()
                .with_page("/nl.html", bank_page(&[("A", "AAAANL2A", "X", "Y")], Some("/nl_2.html")))
                .with_page("/nl_2.html", bank_page(&[("B", "BBBBNL2A", "X", "Y"), ("C", "", "X", "Y")], None)),
        );
        let scraper = SwiftCodesScraper::new(site.clone(), &config(10)).unwrap();

        let mut pages = scraper.country_pages("/nl.html");
        let (ok, err) = drain(&mut pages).await;

        assert!(err.is_none());
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[1].path, "/nl_2.html");
        let swifts: Vec<_> = ok.iter().flat_map(|p| &p.rows).map(|r| r.swift_code.as_str()).collect();
        assert_eq!(swifts, ["AAAANL2A", "BBBBNL2A"]);
        assert!(!pages.truncated());
    }

    #[tokio::test]
    async fn infinite_next_loop_stops_at_ceiling() {
        let site = Arc::new(FakeSite::default().with_page(
            "/loop.html",
            bank_page(&[("A", "AAAALOOP", "X", "Y")], Some("/loop.html")),
        ));
        let scraper = SwiftCodesScraper::new(site.clone(), &config(3)).unwrap();

        let mut pages = scraper.country_pages("/loop.html");
        let (ok, err) = drain(&mut pages).await;

        assert!(err.is_none());
        assert_eq!(ok.len(), 3);
        assert_eq!(ok.iter().map(|p| p.rows.len()).sum::<usize>(), 3);
        assert_eq!(site.requested().len(), 3);
        assert!(pages.truncated());
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_earlier_pages_then_ends() {
        let site = Arc::new(FakeSite::default().with_page(
            "/nl.html",
            bank_page(&[("A", "AAAANL2A", "X", "Y")], Some("/missing.html")),
        ));
        let scraper = SwiftCodesScraper::new(site.clone(), &config(10)).unwrap();

        let mut pages = scraper.country_pages("/nl.html");
        let (ok, err) = drain(&mut pages).await;

        assert_eq!(ok.len(), 1);
        assert!(matches!(err, Some(ScrapeError::Status { status: 404, .. })));
        assert!(pages.next_page().await.is_none());
    }

    #[tokio::test]
    async fn first_page_without_bank_rows_is_a_markup_change() {
        let site = Arc::new(FakeSite::default().with_page(
            "/nl.html",
            "<html><body><div class='new-layout'>ABN AMRO BANK N.V. ABNANL2A</div></body></html>",
        ));
        let scraper = SwiftCodesScraper::new(site, &config(10)).unwrap();

        let mut pages = scraper.country_pages("/nl.html");
        let (ok, err) = drain(&mut pages).await;

        assert!(ok.is_empty());
        assert!(matches!(err, Some(ScrapeError::SelectorMismatch { selector: ROW_SELECTOR })));
    }

    #[tokio::test]
    async fn first_page_with_only_incomplete_rows_is_still_valid() {
        let site = Arc::new(FakeSite::default().with_page(
            "/nl.html",
            bank_page(&[("GHOST BANK", "", "UTRECHT", "")], None),
        ));
        let scraper = SwiftCodesScraper::new(site, &config(10)).unwrap();

        let mut pages = scraper.country_pages("/nl.html");
        let (ok, err) = drain(&mut pages).await;

        assert!(err.is_none());
        assert_eq!(ok.len(), 1);
        assert!(ok[0].rows.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_fixed_delay_between_pages_only() {
        let site = Arc::new(
            FakeSite::default()
                .with_page("/nl.html", bank_page(&[("A", "AAAANL2A", "X", "Y")], Some("/nl_2.html")))
                .with_page("/nl_2.html", bank_page(&[("B", "BBBBNL2A", "X", "Y")], None)),
        );
        let delay = Duration::from_millis(1000);
        let scraper = SwiftCodesScraper::new(
            site.clone(),
            &ScraperConfig { request_delay_ms: 1000, ..config(10) },
        )
        .unwrap();
        let mut pages = scraper.country_pages("/nl.html");

        let start = tokio::time::Instant::now();
        assert!(pages.next_page().await.unwrap().is_ok());
        assert!(start.elapsed() < delay, "first page must not wait");

        let second = tokio::time::Instant::now();
        assert!(pages.next_page().await.unwrap().is_ok());
        assert!(second.elapsed() >= delay);
        assert!(pages.next_page().await.is_none());
        assert_eq!(site.requested().len(), 2);
    }

    #[tokio::test]
    async fn discovery_reports_markup_change() {
        let site = Arc::new(FakeSite::default().with_page("/browse-by-country/", "<html><p>maintenance</p></html>"));
        let scraper = SwiftCodesScraper::new(site, &config(10)).unwrap();

        let err = scraper.discover_countries().await.unwrap_err();
        assert!(matches!(err, ScrapeError::SelectorMismatch { .. }));
    }

    #[tokio::test]
    async fn discovery_lists_countries() {
        let site = Arc::new(FakeSite::default().with_page(
            "/browse-by-country/",
            browse_page(&[("Albania", "/albania_swift_codes.html"), ("Netherlands", "/netherlands_swift_codes.html")]),
        ));
        let scraper = SwiftCodesScraper::new(site, &config(10)).unwrap();

        let links = scraper.discover_countries().await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].display_name, "Netherlands");
    }
}

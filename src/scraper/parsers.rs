use crate::models::{BankPage, CountryLink, RawBankRow};
use scraper::{ElementRef, Html, Selector};

use super::ScrapeError;
use super::cleaner::clean_cell;

// ── Selector contract ─────────────────────────────────────────────────────────

pub const COUNTRY_LINK_SELECTOR: &str = "ol > li > a";
pub const ROW_SELECTOR: &str = "tr";
pub const NAME_SELECTOR: &str = "td.table-name";
pub const SWIFT_SELECTOR: &str = "td.table-swift";
pub const CITY_SELECTOR: &str = "td.table-city";
pub const BRANCH_SELECTOR: &str = "td.table-branch";
pub const NEXT_PAGE_SELECTOR: &str = "span.next > a";

fn selector(s: &'static str) -> Result<Selector, ScrapeError> {
    Selector::parse(s).map_err(|e| ScrapeError::Selector {
        selector: s,
        reason: format!("{:?}", e),
    })
}

fn text_of(el: ElementRef<'_>) -> String {
    clean_cell(&el.text().collect::<String>())
}

// ── Browse-by-country page ────────────────────────────────────────────────────

/// All country anchors, in page order. An empty match means the site changed
/// its markup, which is reported instead of silently yielding no countries.
pub fn parse_country_links(html: &str) -> Result<Vec<CountryLink>, ScrapeError> {
    let doc = Html::parse_document(html);
    let a_sel = selector(COUNTRY_LINK_SELECTOR)?;

    let links: Vec<CountryLink> = doc
        .select(&a_sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            Some(CountryLink {
                display_name: text_of(a),
                page_path: href.to_string(),
            })
        })
        .collect();

    if links.is_empty() {
        return Err(ScrapeError::SelectorMismatch {
            selector: COUNTRY_LINK_SELECTOR,
        });
    }
    Ok(links)
}

// ── Country page ──────────────────────────────────────────────────────────────

/// Bank rows and next-page href of one country page. Rows keep empty SWIFT
/// cells; the cleaner decides what to drop.
pub fn parse_bank_page(html: &str, path: &str) -> Result<BankPage, ScrapeError> {
    let doc = Html::parse_document(html);

    let tr_sel = selector(ROW_SELECTOR)?;
    let name_sel = selector(NAME_SELECTOR)?;
    let swift_sel = selector(SWIFT_SELECTOR)?;
    let city_sel = selector(CITY_SELECTOR)?;
    let branch_sel = selector(BRANCH_SELECTOR)?;
    let next_sel = selector(NEXT_PAGE_SELECTOR)?;

    let cell = |tr: ElementRef<'_>, sel: &Selector| -> Option<String> {
        tr.select(sel).next().map(text_of)
    };

    let mut rows = Vec::new();
    for tr in doc.select(&tr_sel) {
        let name = cell(tr, &name_sel);
        let swift = cell(tr, &swift_sel);

        // Header and spacer rows carry none of the data cells.
        if name.is_none() && swift.is_none() {
            continue;
        }

        rows.push(RawBankRow {
            name: name.unwrap_or_default(),
            swift_code: swift.unwrap_or_default(),
            city: cell(tr, &city_sel).unwrap_or_default(),
            branch: cell(tr, &branch_sel).unwrap_or_default(),
        });
    }

    let next_href = doc
        .select(&next_sel)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    Ok(BankPage {
        path: path.to_string(),
        rows,
        next_href,
    })
}

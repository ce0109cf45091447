use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Discovery ─────────────────────────────────────────────────────────────────

/// One anchor from the browse-by-country page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryLink {
    pub display_name: String,
    pub page_path: String,  // "/netherlands_swift_codes.html"
}

// ── Raw page rows ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBankRow {
    pub name: String,
    pub swift_code: String,
    pub city: String,
    pub branch: String,
}

/// Rows from a single country page plus its "next page" pointer.
#[derive(Debug, Clone, Default)]
pub struct BankPage {
    pub path: String,
    pub rows: Vec<RawBankRow>,
    pub next_href: Option<String>,
}

// ── ISO codes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoCodes {
    pub iso2: String,
    pub iso3: String,
}

// ── Freshness ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FreshnessEntry {
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub iso2: Option<String>,
    pub iso3: Option<String>,
}

impl FreshnessEntry {
    pub fn iso_codes(&self) -> Option<IsoCodes> {
        Some(IsoCodes {
            iso2: self.iso2.clone()?,
            iso3: self.iso3.clone()?,
        })
    }
}

// ── Persisted bank record ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankRecord {
    pub iso_code: Option<String>,
    pub iso3: Option<String>,
    pub country: String,   // canonical country key
    pub page: String,      // source path the row was read from
    pub name: String,
    pub swift_code: String,
    pub city: String,
    pub branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankRecord {
    pub fn from_raw(
        country: &str,
        page: &str,
        iso: Option<&IsoCodes>,
        row: RawBankRow,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            iso_code: iso.map(|c| c.iso2.clone()),
            iso3: iso.map(|c| c.iso3.clone()),
            country: country.to_string(),
            page: page.to_string(),
            name: row.name,
            swift_code: row.swift_code,
            city: row.city,
            branch: row.branch,
            created_at: now,
            updated_at: now,
        }
    }

    /// Natural merge key: (country, swift_code).
    pub fn key(&self) -> (String, String) {
        (self.country.clone(), self.swift_code.clone())
    }
}

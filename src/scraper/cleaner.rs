use crate::models::{BankPage, RawBankRow};
use tracing::debug;

// ── Country keys ──────────────────────────────────────────────────────────────

/// Canonical country key: lowercase, trimmed, single-spaced, and limited to
/// letters, digits, spaces and hyphens.
/// "  Netherlands  " → "netherlands" | "Côte d'Ivoire" → "côte divoire"
pub fn normalize_country(raw: &str) -> String {
    let kept: String = raw
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if c.is_alphanumeric() || c == '-' {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Country key derived from a page path.
/// "/netherlands_swift_codes.html" → "netherlands"
/// "/united-states_swift_codes.html" → "united-states"
pub fn country_from_path(path: &str) -> String {
    let file = path
        .trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let stem = file.split("_swift_codes").next().unwrap_or(file);
    normalize_country(&stem.replace('_', " "))
}

/// Key for a discovered country: the display label, or the href when the
/// label is blank.
pub fn country_key(display_name: &str, page_path: &str) -> String {
    let key = normalize_country(display_name);
    if key.is_empty() {
        country_from_path(page_path)
    } else {
        key
    }
}

// ── Row cleaning ──────────────────────────────────────────────────────────────

/// Collapse whitespace inside a scraped cell.
pub fn clean_cell(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop rows without a SWIFT code. Not an error, the site pads some tables.
pub fn retain_complete_rows(page: &mut BankPage) {
    let before = page.rows.len();
    page.rows.retain(|r: &RawBankRow| !r.swift_code.is_empty());
    let dropped = before - page.rows.len();
    if dropped > 0 {
        debug!("{}: skipped {} rows without a SWIFT code", page.path, dropped);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_country() {
        assert_eq!(normalize_country("  Netherlands  "), "netherlands");
        assert_eq!(normalize_country("UNITED   STATES\tOF America"), "united states of america");
        assert_eq!(normalize_country("Guinea-Bissau"), "guinea-bissau");
        assert_eq!(normalize_country("Congo (Democratic Republic)"), "congo democratic republic");
        assert_eq!(normalize_country("St. Kitts & Nevis"), "st kitts nevis");
        assert_eq!(normalize_country(""), "");
        assert_eq!(normalize_country("  !!  "), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "  Netherlands  ",
            "Côte d'Ivoire",
            "Bosnia   and Herzegovina",
            "Korea, Republic of",
            "ÅLAND  ISLANDS",
            "Timor-Leste ",
            "São Tomé & Príncipe",
            "\u{a0}Réunion\u{a0}",
            "a & b",
            "123 -- abc",
        ];
        for raw in samples {
            let once = normalize_country(raw);
            assert_eq!(normalize_country(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn equivalent_labels_share_a_key() {
        assert_eq!(normalize_country("South Africa"), normalize_country(" south  AFRICA "));
        assert_eq!(normalize_country("Korea, Republic of"), normalize_country("korea republic of"));
    }

    #[test]
    fn test_country_from_path() {
        assert_eq!(country_from_path("/netherlands_swift_codes.html"), "netherlands");
        assert_eq!(country_from_path("/united_kingdom_swift_codes.html"), "united kingdom");
        assert_eq!(country_from_path("/guinea-bissau_swift_codes_page_2.html"), "guinea-bissau");
    }

    #[test]
    fn blank_label_falls_back_to_path() {
        assert_eq!(country_key("", "/netherlands_swift_codes.html"), "netherlands");
        assert_eq!(country_key(" France ", "/whatever.html"), "france");
    }

    #[test]
    fn rows_without_swift_are_dropped() {
        let mut page = BankPage {
            path: "/x.html".into(),
            rows: vec![
                RawBankRow { name: "A".into(), swift_code: "AAAANL2A".into(), ..Default::default() },
                RawBankRow { name: "B".into(), ..Default::default() },
            ],
            next_href: None,
        };
        retain_complete_rows(&mut page);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].name, "A");
    }
}

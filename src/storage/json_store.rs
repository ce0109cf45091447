//! JSON document store: the system of record for scraped bank entries.

use crate::models::BankRecord;
use crate::utils::write_json_atomic;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{MergeStats, RecordSink};

pub struct JsonDocumentStore {
    path: PathBuf,
    records: Vec<BankRecord>,
    index: HashMap<(String, String), usize>,
}

/// Enough to undo one merge if the file replace fails.
enum Undo {
    Replaced(usize, BankRecord),
    Appended,
}

impl JsonDocumentStore {
    /// Load every record into memory. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let records: Vec<BankRecord> = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Corrupt record file {:?}", path))?
        } else {
            Vec::new()
        };

        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key(), i))
            .collect();

        info!("[JSON] {} records loaded from {:?}", records.len(), path);
        Ok(Self {
            path: path.to_path_buf(),
            records,
            index,
        })
    }

    #[cfg(test)]
    pub fn records(&self) -> &[BankRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Replace same-key records in place (keeping `created_at`), append new
    /// ones. Returns the undo log.
    fn merge(&mut self, batch: &[BankRecord]) -> (MergeStats, Vec<Undo>) {
        let mut stats = MergeStats::default();
        let mut undo = Vec::with_capacity(batch.len());

        for record in batch {
            let key = record.key();
            match self.index.get(&key) {
                Some(&i) => {
                    let mut merged = record.clone();
                    merged.created_at = self.records[i].created_at;
                    let old = std::mem::replace(&mut self.records[i], merged);
                    undo.push(Undo::Replaced(i, old));
                    stats.updated += 1;
                }
                None => {
                    self.index.insert(key, self.records.len());
                    self.records.push(record.clone());
                    undo.push(Undo::Appended);
                    stats.inserted += 1;
                }
            }
        }

        (stats, undo)
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Replaced(i, old) => self.records[i] = old,
                Undo::Appended => {
                    if let Some(r) = self.records.pop() {
                        self.index.remove(&r.key());
                    }
                }
            }
        }
    }
}

impl RecordSink for JsonDocumentStore {
    fn write_batch(&mut self, country_key: &str, records: &[BankRecord]) -> Result<MergeStats> {
        let (stats, undo) = self.merge(records);

        if let Err(e) = write_json_atomic(&self.path, &self.records) {
            self.rollback(undo);
            return Err(e).with_context(|| format!("JSON write for {}", country_key));
        }

        info!(
            "[JSON] {}: {} new, {} updated ({} total)",
            country_key,
            stats.inserted,
            stats.updated,
            self.records.len()
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IsoCodes, RawBankRow};
    use chrono::{TimeDelta, Utc};

    fn record(swift: &str, name: &str, at: chrono::DateTime<Utc>) -> BankRecord {
        let iso = IsoCodes { iso2: "NL".into(), iso3: "NLD".into() };
        BankRecord::from_raw(
            "netherlands",
            "/netherlands_swift_codes.html",
            Some(&iso),
            RawBankRow {
                name: name.into(),
                swift_code: swift.into(),
                city: "AMSTERDAM".into(),
                branch: "HEAD OFFICE".into(),
            },
            at,
        )
    }

    #[test]
    fn merge_preserves_created_at_and_appends_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let t0 = Utc::now();
        let t1 = t0 + TimeDelta::days(30);

        let mut store = JsonDocumentStore::load(&path).unwrap();
        store.write_batch("netherlands", &[record("ABNANL2A", "ABN AMRO", t0)]).unwrap();

        let stats = store
            .write_batch(
                "netherlands",
                &[record("ABNANL2A", "ABN AMRO BANK N.V.", t1), record("INGBNL2A", "ING", t1)],
            )
            .unwrap();
        assert_eq!(stats, MergeStats { inserted: 1, updated: 1 });

        let abn = &store.records()[0];
        assert_eq!(abn.name, "ABN AMRO BANK N.V.");
        assert_eq!(abn.created_at, t0);
        assert_eq!(abn.updated_at, t1);
        assert_eq!(store.records()[1].swift_code, "INGBNL2A");
    }

    #[test]
    fn reload_reproduces_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let t = Utc::now();
        let written = vec![record("ABNANL2A", "ABN AMRO", t), record("RABONL2U", "RABOBANK", t)];

        let mut store = JsonDocumentStore::load(&path).unwrap();
        store.write_batch("netherlands", &written).unwrap();

        let reloaded = JsonDocumentStore::load(&path).unwrap();
        assert_eq!(reloaded.records(), written.as_slice());
        assert!(reloaded.records().iter().all(|r| r.updated_at >= r.created_at));
    }

    #[test]
    fn same_swift_in_other_country_is_a_separate_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDocumentStore::load(&dir.path().join("data.json")).unwrap();
        let t = Utc::now();

        let mut other = record("ABNANL2A", "ABN AMRO", t);
        other.country = "belgium".into();
        store.write_batch("netherlands", &[record("ABNANL2A", "ABN AMRO", t)]).unwrap();
        store.write_batch("belgium", &[other]).unwrap();

        assert_eq!(store.len(), 2);
    }

    #[test]
    fn failed_write_rolls_back_the_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let t0 = Utc::now();

        let mut store = JsonDocumentStore::load(&path).unwrap();
        store.write_batch("netherlands", &[record("ABNANL2A", "ABN AMRO", t0)]).unwrap();

        // a directory where the file should be makes the rename fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let t1 = t0 + TimeDelta::days(1);
        let result = store.write_batch(
            "netherlands",
            &[record("ABNANL2A", "RENAMED", t1), record("INGBNL2A", "ING", t1)],
        );
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].name, "ABN AMRO");
        assert_eq!(store.records()[0].updated_at, t0);
    }
}

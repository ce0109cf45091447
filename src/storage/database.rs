use crate::config::SecondaryConfig;
use crate::models::BankRecord;
use anyhow::{Context, Result, bail};
use duckdb::{Connection, params};
use std::path::Path;
use tracing::info;

use super::{MergeStats, RecordSink};

// ── Schema ────────────────────────────────────────────────────────────────────

fn ddl(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    country     VARCHAR   NOT NULL,
    swift_code  VARCHAR   NOT NULL,
    iso_code    VARCHAR,
    iso3        VARCHAR,
    page        VARCHAR   NOT NULL,
    name        VARCHAR   NOT NULL,
    city        VARCHAR   NOT NULL,
    branch      VARCHAR   NOT NULL,
    created_at  TIMESTAMP NOT NULL,
    updated_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (country, swift_code)
);
"#
    )
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table(table: &str) -> Result<()> {
    let ok = !table.is_empty()
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if !ok {
        bail!("Invalid table name {:?}", table);
    }
    Ok(())
}

// ── Repository ────────────────────────────────────────────────────────────────

/// DuckDB mirror of the JSON document store.
pub struct DuckDbSink {
    conn: Connection,
    table: String,
}

impl DuckDbSink {
    pub fn open(config: &SecondaryConfig) -> Result<Self> {
        validate_table(&config.table)?;
        let path: &Path = &config.db_path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self {
            conn,
            table: config.table.clone(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(table: &str) -> Result<Self> {
        validate_table(table)?;
        Ok(Self {
            conn: Connection::open_in_memory()?,
            table: table.to_string(),
        })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn
            .execute_batch(&ddl(&self.table))
            .context("DDL failed")?;
        info!("Migrations done.");
        Ok(())
    }

    /// Upsert keyed on (country, swift_code); `created_at` of an existing
    /// row is never overwritten.
    pub fn upsert_records(&self, records: &[BankRecord]) -> Result<MergeStats> {
        if records.is_empty() {
            return Ok(MergeStats::default());
        }

        let sql = format!(
            r#"
            INSERT INTO {t}
                (country, swift_code, iso_code, iso3, page, name, city, branch, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (country, swift_code) DO UPDATE SET
                iso_code   = excluded.iso_code,
                iso3       = excluded.iso3,
                page       = excluded.page,
                name       = excluded.name,
                city       = excluded.city,
                branch     = excluded.branch,
                updated_at = excluded.updated_at
            "#,
            t = self.table
        );
        let exists_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE country = ? AND swift_code = ?",
            self.table
        );

        let tx = self.conn.unchecked_transaction()?;
        let mut stats = MergeStats::default();
        for r in records {
            let existing: i64 = tx
                .query_row(&exists_sql, params![r.country, r.swift_code], |row| row.get(0))?;
            tx.execute(
                &sql,
                params![
                    r.country,
                    r.swift_code,
                    r.iso_code,
                    r.iso3,
                    r.page,
                    r.name,
                    r.city,
                    r.branch,
                    r.created_at.naive_utc(),
                    r.updated_at.naive_utc(),
                ],
            )
            .with_context(|| format!("upsert {} {}", r.country, r.swift_code))?;

            if existing > 0 {
                stats.updated += 1;
            } else {
                stats.inserted += 1;
            }
        }
        tx.commit()?;
        Ok(stats)
    }

    pub fn record_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare(&format!("SELECT COUNT(*) FROM {}", self.table))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    #[cfg(test)]
    /// (name, created_at, updated_at) for one entry.
    pub fn find(
        &self,
        country: &str,
        swift_code: &str,
    ) -> Result<Option<(String, chrono::NaiveDateTime, chrono::NaiveDateTime)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT name, created_at, updated_at FROM {} WHERE country = ? AND swift_code = ?",
            self.table
        ))?;
        let mut rows = stmt.query(params![country, swift_code])?;
        match rows.next()? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?, row.get(2)?))),
            None => Ok(None),
        }
    }
}

impl RecordSink for DuckDbSink {
    fn write_batch(&mut self, country_key: &str, records: &[BankRecord]) -> Result<MergeStats> {
        let stats = self
            .upsert_records(records)
            .with_context(|| format!("DuckDB write for {}", country_key))?;
        info!(
            "[DUCKDB] {}: {} new, {} updated",
            country_key, stats.inserted, stats.updated
        );
        Ok(stats)
    }
}

//! Persistence of scan records.
//!
//! The collector writes through the [`RecordStore`] trait. [`SqliteStore`]
//! keeps results in the `results` table of a SQLite database over a single
//! connection; [`MemoryStore`] keeps them in a `Vec`.

use crate::error::ScanError;
use crate::types::ScanRecord;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

const CREATE_RESULTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS results (
    domain_name TEXT NOT NULL,
    spf_string TEXT,
    dmarc_string TEXT,
    spf_all TEXT,
    dmarc_p TEXT
)";

const INSERT_RESULT: &str = "INSERT INTO results (domain_name, spf_string, dmarc_string, spf_all, dmarc_p) \
     VALUES (?1, ?2, ?3, ?4, ?5)";

const SELECT_RESULTS: &str =
    "SELECT domain_name, spf_string, dmarc_string, spf_all, dmarc_p FROM results ORDER BY rowid";

/// Durable destination for scan records.
#[async_trait]
pub trait RecordStore: Send {
    /// Persist one record.
    async fn insert(&mut self, record: &ScanRecord) -> Result<(), ScanError>;
}

/// SQLite-backed record store.
///
/// Owns exactly one connection. The `results` table must exist before the
/// scan starts; call [`SqliteStore::ensure_schema`] to create it.
pub struct SqliteStore {
    conn: SqliteConnection,
}

impl SqliteStore {
    /// Open (and create if missing) the database at `db`.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn open(db: &str) -> Result<Self, ScanError> {
        let options = if db == ":memory:" || db == "sqlite::memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(db)
                .create_if_missing(true)
        };

        let conn = options
            .connect()
            .await
            .map_err(|e| ScanError::store(format!("Failed to open database '{}': {}", db, e)))?;

        debug!(db, "opened result store");
        Ok(Self { conn })
    }

    /// Create the `results` table if it does not exist yet.
    pub async fn ensure_schema(&mut self) -> Result<(), ScanError> {
        sqlx::query(CREATE_RESULTS_TABLE)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    /// Read back every stored record in insertion order.
    pub async fn records(&mut self) -> Result<Vec<ScanRecord>, ScanError> {
        type Row = (
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        );

        let rows: Vec<Row> = sqlx::query_as(SELECT_RESULTS)
            .fetch_all(&mut self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(domain, spf, dmarc, spf_all, dmarc_p)| ScanRecord {
                domain,
                policy_record: spf.unwrap_or_default(),
                alignment_record: dmarc.unwrap_or_default(),
                policy_qualifier: spf_all.unwrap_or_default(),
                alignment_disposition: dmarc_p.unwrap_or_default(),
            })
            .collect())
    }

    /// Close the connection, flushing any pending state.
    pub async fn close(self) -> Result<(), ScanError> {
        self.conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&mut self, record: &ScanRecord) -> Result<(), ScanError> {
        sqlx::query(INSERT_RESULT)
            .bind(&record.domain)
            .bind(&record.policy_record)
            .bind(&record.alignment_record)
            .bind(&record.policy_qualifier)
            .bind(&record.alignment_disposition)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }
}

/// In-memory record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<ScanRecord>,
    rejected: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse writes for `domain`, to exercise write-failure handling.
    pub fn rejecting<D: Into<String>>(mut self, domain: D) -> Self {
        self.rejected.insert(domain.into());
        self
    }

    pub fn records(&self) -> &[ScanRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ScanRecord> {
        self.records
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&mut self, record: &ScanRecord) -> Result<(), ScanError> {
        if self.rejected.contains(&record.domain) {
            return Err(ScanError::store(format!(
                "write rejected for {}",
                record.domain
            )));
        }
        self.records.push(record.clone());
        Ok(())
    }
}

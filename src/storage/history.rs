//! Verification history in SQLite

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, SecondsFormat};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::verification::{Verdict, VerificationRecord, VerificationResult};

/// Durable, append-only log of verification records
pub trait HistoryStore: Send + Sync {
    /// Persist one record
    fn append(&self, record: &VerificationRecord) -> Result<()>;

    /// Number of stored records
    fn count(&self) -> Result<usize>;

    /// Up to `limit` records, newest first
    fn recent(&self, limit: usize) -> Result<Vec<VerificationRecord>>;

    /// Whether a record with the same texts and outcome already exists
    fn contains(&self, reference_text: &str, sample_text: &str, verdict: Verdict) -> Result<bool>;
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        image_path TEXT NOT NULL,
        reference_text TEXT NOT NULL,
        sample_text TEXT NOT NULL,
        similarity REAL NOT NULL,
        verdict TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history (timestamp);
"#;

/// History store backed by a single SQLite connection
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteHistoryStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open history database {:?}", path))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.init_schema()?;

        info!("History database initialized at: {:?}", path);
        Ok(store)
    }

    /// Database that lives only as long as the store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create the history table if it does not exist
    pub fn init_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(SCHEMA)
            .context("Failed to create history schema")
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Every record, newest first
    pub fn all(&self) -> Result<Vec<VerificationRecord>> {
        self.query(None)
    }

    /// Drop and recreate the history table, discarding every record
    pub fn rebuild(&self) -> Result<()> {
        let conn = self.conn.lock();
        let removed: i64 = conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .unwrap_or(0);

        conn.execute_batch("DROP INDEX IF EXISTS idx_history_timestamp; DROP TABLE IF EXISTS history;")
            .context("Failed to drop history table")?;
        conn.execute_batch(SCHEMA).context("Failed to recreate history schema")?;

        warn!("History rebuilt, {} records removed", removed);
        Ok(())
    }

    fn query(&self, limit: Option<usize>) -> Result<Vec<VerificationRecord>> {
        let conn = self.conn.lock();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(
            r#"
            SELECT timestamp, image_path, reference_text, sample_text, similarity, verdict
            FROM history
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok(RawRecord {
                timestamp: row.get(0)?,
                image_path: row.get(1)?,
                reference_text: row.get(2)?,
                sample_text: row.get(3)?,
                similarity: row.get(4)?,
                verdict: row.get(5)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&self, record: &VerificationRecord) -> Result<()> {
        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO history (timestamp, image_path, reference_text, sample_text, similarity, verdict)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    record.timestamp().to_rfc3339_opts(SecondsFormat::AutoSi, false),
                    record.image_path().to_string_lossy(),
                    record.reference_text(),
                    record.sample_text(),
                    record.similarity(),
                    record.verdict().as_str(),
                ],
            )
            .context("Failed to insert history record")?;

        debug!("Appended history record for {:?}", record.image_path());
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .context("Failed to count history records")?;
        Ok(count as usize)
    }

    fn recent(&self, limit: usize) -> Result<Vec<VerificationRecord>> {
        self.query(Some(limit))
    }

    fn contains(&self, reference_text: &str, sample_text: &str, verdict: Verdict) -> Result<bool> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT 1 FROM history WHERE reference_text = ?1 AND sample_text = ?2 AND verdict = ?3 LIMIT 1",
        )?;
        let exists = stmt.exists(params![reference_text, sample_text, verdict.as_str()])?;
        Ok(exists)
    }
}

/// In-memory history for tests. Appends fail while `broken` is set.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct MemoryHistory {
    records: std::sync::Arc<Mutex<Vec<VerificationRecord>>>,
    broken: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl MemoryHistory {
    pub fn broken() -> Self {
        let history = Self::default();
        history.set_broken(true);
        history
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl HistoryStore for MemoryHistory {
    fn append(&self, record: &VerificationRecord) -> Result<()> {
        if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.lock().len())
    }

    fn recent(&self, limit: usize) -> Result<Vec<VerificationRecord>> {
        Ok(self.records.lock().iter().rev().take(limit).cloned().collect())
    }

    fn contains(&self, reference_text: &str, sample_text: &str, verdict: Verdict) -> Result<bool> {
        Ok(self.records.lock().iter().any(|r| {
            r.reference_text() == reference_text && r.sample_text() == sample_text && r.verdict() == verdict
        }))
    }
}

/// Columns as stored, before validation
struct RawRecord {
    timestamp: String,
    image_path: String,
    reference_text: String,
    sample_text: String,
    similarity: f64,
    verdict: String,
}

impl RawRecord {
    fn into_record(self) -> Result<VerificationRecord> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .with_context(|| format!("Bad timestamp in history: {}", self.timestamp))?
            .with_timezone(&Local);
        let verdict: Verdict = self.verdict.parse().map_err(|e: String| anyhow!(e))?;

        Ok(VerificationRecord::new(
            PathBuf::from(self.image_path),
            self.reference_text,
            self.sample_text,
            VerificationResult {
                similarity: self.similarity,
                verdict,
            },
            timestamp,
        ))
    }
}

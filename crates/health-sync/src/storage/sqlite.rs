//! SQLite-based job storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::JobStore;
use crate::models::{Chunk, FailedChunk, JobId, Stage, SyncJob, SyncType};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One row per sync job
            CREATE TABLE sync_jobs (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                sync_type TEXT NOT NULL,
                status TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                chunk_size_days INTEGER NOT NULL,
                chunks_total INTEGER NOT NULL,
                chunks_completed INTEGER NOT NULL DEFAULT 0,
                current_chunk_index INTEGER,
                current_chunk_range TEXT,
                current_stage TEXT,
                failed_chunks TEXT NOT NULL DEFAULT '[]',
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX idx_sync_jobs_device
                ON sync_jobs(device_id, sync_type, created_at DESC);

            -- Chunk state, replaced wholesale with its job on every save
            CREATE TABLE sync_chunks (
                job_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                PRIMARY KEY (job_id, chunk_index),
                FOREIGN KEY (job_id) REFERENCES sync_jobs(id) ON DELETE CASCADE
            );
            "#,
        ),
        // Migration 2: Status index for startup recovery
        M::up(
            r#"
            CREATE INDEX idx_sync_jobs_status ON sync_jobs(status);
            "#,
        ),
    ])
}

/// Raw job row before conversion to domain types
struct JobRow {
    id: String,
    device_id: String,
    sync_type: String,
    status: String,
    start_date: String,
    end_date: String,
    chunk_size_days: u32,
    chunks_total: i64,
    chunks_completed: i64,
    current_chunk_index: Option<i64>,
    current_chunk_range: Option<String>,
    current_stage: Option<String>,
    failed_chunks: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_id: row.get(1)?,
            sync_type: row.get(2)?,
            status: row.get(3)?,
            start_date: row.get(4)?,
            end_date: row.get(5)?,
            chunk_size_days: row.get(6)?,
            chunks_total: row.get(7)?,
            chunks_completed: row.get(8)?,
            current_chunk_index: row.get(9)?,
            current_chunk_range: row.get(10)?,
            current_stage: row.get(11)?,
            failed_chunks: row.get(12)?,
            error_message: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_job(self, chunks: Vec<Chunk>) -> Result<SyncJob> {
        let failed_chunks: Vec<FailedChunk> = serde_json::from_str(&self.failed_chunks)
            .with_context(|| format!("Corrupt failed_chunks for job {}", self.id))?;

        Ok(SyncJob {
            device_id: self.device_id,
            sync_type: self.sync_type.parse()?,
            status: self.status.parse()?,
            start_date: parse_offset_time(&self.start_date)?,
            end_date: parse_offset_time(&self.end_date)?,
            chunk_size_days: self.chunk_size_days,
            chunks_total: to_usize(self.chunks_total)?,
            chunks_completed: to_usize(self.chunks_completed)?,
            current_chunk_index: self.current_chunk_index.map(to_usize).transpose()?,
            current_chunk_range: self.current_chunk_range,
            // Labels from older builds that no longer match a stage are dropped
            current_stage: self.current_stage.as_deref().and_then(Stage::from_label),
            failed_chunks,
            error_message: self.error_message,
            created_at: parse_offset_time(&self.created_at)?.with_timezone(&Utc),
            updated_at: parse_offset_time(&self.updated_at)?.with_timezone(&Utc),
            chunks,
            id: JobId(self.id),
        })
    }
}

fn parse_offset_time(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).with_context(|| format!("Invalid timestamp: {}", value))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    value
        .parse()
        .with_context(|| format!("Invalid date: {}", value))
}

fn to_usize(value: i64) -> Result<usize> {
    usize::try_from(value).with_context(|| format!("Negative count in database: {}", value))
}

fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).context("Count does not fit in a database integer")
}

/// SQLite-based job storage
///
/// Jobs and chunks live in two tables; each save rewrites both inside one
/// transaction so a killed process never leaves a half-written checkpoint.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the job database at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        // WAL keeps readers unblocked while a checkpoint is written.
        // synchronous = FULL: a checkpoint that returned must survive the
        // process being killed right after the app is backgrounded.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("job database lock poisoned"))
    }

    fn load_chunks(conn: &Connection, job_id: &str) -> Result<Vec<Chunk>> {
        let mut stmt = conn.prepare(
            "SELECT chunk_index, start_date, end_date, status, attempts, last_error
             FROM sync_chunks WHERE job_id = ? ORDER BY chunk_index ASC",
        )?;

        let rows = stmt.query_map([job_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            let (index, start_date, end_date, status, attempts, last_error) = row?;
            chunks.push(Chunk {
                index: to_usize(index)?,
                start_date: parse_date(&start_date)?,
                end_date: parse_date(&end_date)?,
                status: status.parse()?,
                attempts,
                last_error,
            });
        }
        Ok(chunks)
    }

    fn load_job(conn: &Connection, id: &str) -> Result<Option<SyncJob>> {
        let row = conn
            .query_row(
                "SELECT id, device_id, sync_type, status, start_date, end_date, chunk_size_days,
                        chunks_total, chunks_completed, current_chunk_index, current_chunk_range,
                        current_stage, failed_chunks, error_message, created_at, updated_at
                 FROM sync_jobs WHERE id = ?",
                [id],
                JobRow::from_row,
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        let chunks = Self::load_chunks(conn, id)?;
        Ok(Some(row.into_job(chunks)?))
    }

    fn load_ids(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn load_many(conn: &Connection, ids: Vec<String>) -> Result<Vec<SyncJob>> {
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = Self::load_job(conn, &id)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}

impl JobStore for SqliteJobStore {
    fn load(&self, id: &JobId) -> Result<Option<SyncJob>> {
        let conn = self.lock()?;
        Self::load_job(&conn, id.as_str())
    }

    fn save(&self, job: &SyncJob) -> Result<()> {
        let failed_chunks_json = serde_json::to_string(&job.failed_chunks)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO sync_jobs
             (id, device_id, sync_type, status, start_date, end_date, chunk_size_days,
              chunks_total, chunks_completed, current_chunk_index, current_chunk_range,
              current_stage, failed_chunks, error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                chunks_total = excluded.chunks_total,
                chunks_completed = excluded.chunks_completed,
                current_chunk_index = excluded.current_chunk_index,
                current_chunk_range = excluded.current_chunk_range,
                current_stage = excluded.current_stage,
                failed_chunks = excluded.failed_chunks,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at",
            params![
                job.id.as_str(),
                job.device_id,
                job.sync_type.as_str(),
                job.status.as_str(),
                job.start_date.to_rfc3339(),
                job.end_date.to_rfc3339(),
                job.chunk_size_days,
                to_i64(job.chunks_total)?,
                to_i64(job.chunks_completed)?,
                job.current_chunk_index.map(to_i64).transpose()?,
                job.current_chunk_range,
                job.current_stage.map(Stage::label),
                failed_chunks_json,
                job.error_message,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;

        tx.execute("DELETE FROM sync_chunks WHERE job_id = ?", [job.id.as_str()])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sync_chunks
                 (job_id, chunk_index, start_date, end_date, status, attempts, last_error)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for chunk in &job.chunks {
                stmt.execute(params![
                    job.id.as_str(),
                    to_i64(chunk.index)?,
                    chunk.start_date.to_string(),
                    chunk.end_date.to_string(),
                    chunk.status.as_str(),
                    chunk.attempts,
                    chunk.last_error,
                ])?;
            }
        }

        tx.commit().context("Failed to commit job checkpoint")?;
        Ok(())
    }

    fn list_jobs(&self, device_id: &str, sync_type: Option<SyncType>) -> Result<Vec<SyncJob>> {
        let conn = self.lock()?;
        let ids = match sync_type {
            Some(sync_type) => Self::load_ids(
                &conn,
                "SELECT id FROM sync_jobs WHERE device_id = ? AND sync_type = ?
                 ORDER BY created_at DESC, id DESC",
                params![device_id, sync_type.as_str()],
            )?,
            None => Self::load_ids(
                &conn,
                "SELECT id FROM sync_jobs WHERE device_id = ?
                 ORDER BY created_at DESC, id DESC",
                params![device_id],
            )?,
        };
        Self::load_many(&conn, ids)
    }

    fn list_all(&self) -> Result<Vec<SyncJob>> {
        let conn = self.lock()?;
        let ids = Self::load_ids(
            &conn,
            "SELECT id FROM sync_jobs ORDER BY created_at DESC, id DESC",
            [],
        )?;
        Self::load_many(&conn, ids)
    }

    fn delete(&self, id: &JobId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sync_jobs WHERE id = ?", [id.as_str()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkStatus, DateRange, JobStatus};
    use crate::plan::schedule_chunks;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn make_job(device: &str) -> SyncJob {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
        );
        let chunks = schedule_chunks(range, 7).unwrap();
        let start = FixedOffset::east_opt(3600)
            .unwrap()
            .from_local_datetime(&range.start.and_hms_opt(0, 0, 0).unwrap())
            .unwrap();
        SyncJob::new(device, SyncType::Historical, start, Utc::now().fixed_offset(), 7, chunks)
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let mut job = make_job("phone");
        job.status = JobStatus::Running;
        job.current_stage = Some(Stage::FetchingActivities);
        job.current_chunk_index = Some(1);
        job.current_chunk_range = Some(job.chunks[1].range().label());
        job.chunks[0].status = ChunkStatus::Succeeded;
        job.chunks[0].attempts = 1;
        job.chunks[1].status = ChunkStatus::Failed;
        job.chunks[1].attempts = 2;
        job.chunks[1].last_error = Some("network error: offline".to_string());
        job.failed_chunks.push(FailedChunk {
            chunk_index: 1,
            attempts: 2,
            last_error: "network error: offline".to_string(),
        });
        job.recount();

        store.save(&job).unwrap();
        let loaded = store.load(&job.id).unwrap().unwrap();

        assert_eq!(loaded, job);
        assert_eq!(loaded.start_date.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_save_overwrites_chunks() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let mut job = make_job("phone");
        store.save(&job).unwrap();

        job.chunks[2].status = ChunkStatus::Succeeded;
        job.recount();
        store.save(&job).unwrap();

        let loaded = store.load(&job.id).unwrap().unwrap();
        assert_eq!(loaded.chunks.len(), 3);
        assert_eq!(loaded.chunks[2].status, ChunkStatus::Succeeded);
        assert_eq!(loaded.chunks_completed, 1);
    }

    #[test]
    fn test_list_and_delete() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let job_a = make_job("phone");
        let job_b = make_job("tablet");
        store.save(&job_a).unwrap();
        store.save(&job_b).unwrap();

        assert_eq!(store.list_jobs("phone", None).unwrap().len(), 1);
        assert_eq!(
            store.list_jobs("phone", Some(SyncType::Incremental)).unwrap().len(),
            0
        );
        assert_eq!(store.list_all().unwrap().len(), 2);

        store.delete(&job_a.id).unwrap();
        assert!(store.load(&job_a.id).unwrap().is_none());
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("sync.test.sqlite");
        let job = make_job("phone");

        {
            let store = SqliteJobStore::new(&db_path).unwrap();
            store.save(&job).unwrap();
        }

        let reopened = SqliteJobStore::new(&db_path).unwrap();
        assert_eq!(reopened.load(&job.id).unwrap().unwrap(), job);
    }
}

//! Integration tests for the health-sync crate
//!
//! These tests drive the engine end to end with fake collaborators:
//! planning, chunk execution, pause/resume/cancel, and restart recovery.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use health_sync::{
    ActivityRecord, ChunkError, ChunkStatus, DateRange, FailedChunk, HealthReader, HealthRecord,
    InMemoryJobStore, JobId, JobSnapshot, JobStatus, JobStore, MetricType, SqliteJobStore, Stage,
    SyncDuration, SyncEngine, SyncError, SyncJob, SyncObserver, SyncOptions, SyncType,
    UploadBatch, UploadClient, schedule_chunks,
};
use serde_json::json;
use tempfile::TempDir;

const DEVICE: &str = "phone";

/// Reader returning one metric and one activity per chunk
struct FakeReader;

impl HealthReader for FakeReader {
    fn read_health(
        &self,
        range: &DateRange,
        _metrics: &[MetricType],
    ) -> Result<Vec<HealthRecord>, ChunkError> {
        Ok(vec![HealthRecord {
            metric: MetricType::Sleep,
            date: range.start,
            data: json!({ "sleepScore": 78, "ownerId": 42 }),
        }])
    }

    fn read_activities(&self, range: &DateRange) -> Result<Vec<ActivityRecord>, ChunkError> {
        Ok(vec![ActivityRecord {
            activity_id: format!("run-{}", range.start),
            name: None,
            type_key: Some("trail_running".into()),
            start_time: Utc::now(),
            distance_m: Some(8000.0),
            duration_s: Some(3000.0),
            elapsed_duration_s: None,
            moving_duration_s: None,
            details: json!({}),
        }])
    }
}

/// Uploader that records idempotency keys and fails scripted chunks once
#[derive(Default)]
struct FakeUploader {
    failures: Mutex<Vec<(usize, ChunkError)>>,
    uploaded: Mutex<Vec<usize>>,
    batches: Mutex<Vec<UploadBatch>>,
}

impl FakeUploader {
    fn failing_once(index: usize, error: ChunkError) -> Self {
        Self {
            failures: Mutex::new(vec![(index, error)]),
            ..Default::default()
        }
    }

    fn uploaded(&self) -> Vec<usize> {
        self.uploaded.lock().unwrap().clone()
    }
}

impl UploadClient for FakeUploader {
    fn has_data(&self, _device_id: &str, _range: &DateRange) -> Result<bool, ChunkError> {
        Ok(false)
    }

    fn upload(&self, batch: &UploadBatch) -> Result<(), ChunkError> {
        let index: usize = batch
            .idempotency_key
            .rsplit(':')
            .next()
            .and_then(|i| i.parse().ok())
            .expect("idempotency key ends in the chunk index");

        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|(i, _)| *i == index) {
            return Err(failures.remove(pos).1);
        }
        self.uploaded.lock().unwrap().push(index);
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

/// Store that fails exactly one save, counted from 1
struct FailingSave {
    inner: InMemoryJobStore,
    saves: AtomicUsize,
    fail_at: usize,
}

impl FailingSave {
    fn new(fail_at: usize) -> Self {
        Self {
            inner: InMemoryJobStore::new(),
            saves: AtomicUsize::new(0),
            fail_at,
        }
    }
}

impl JobStore for FailingSave {
    fn load(&self, id: &JobId) -> anyhow::Result<Option<SyncJob>> {
        self.inner.load(id)
    }

    fn save(&self, job: &SyncJob) -> anyhow::Result<()> {
        if self.saves.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
            anyhow::bail!("disk I/O error");
        }
        self.inner.save(job)
    }

    fn list_jobs(&self, device_id: &str, sync_type: Option<SyncType>) -> anyhow::Result<Vec<SyncJob>> {
        self.inner.list_jobs(device_id, sync_type)
    }

    fn list_all(&self) -> anyhow::Result<Vec<SyncJob>> {
        self.inner.list_all()
    }

    fn delete(&self, id: &JobId) -> anyhow::Result<()> {
        self.inner.delete(id)
    }
}

enum Action {
    Pause,
    Cancel,
    StartAgain,
}

/// Observer that records snapshots and fires one control call mid-run
struct Trigger {
    engine: OnceLock<Weak<SyncEngine>>,
    when: Box<dyn Fn(&JobSnapshot) -> bool + Send + Sync>,
    action: Action,
    fired: AtomicBool,
    seen: Mutex<Vec<JobSnapshot>>,
    rejected_start: AtomicBool,
}

impl Trigger {
    fn new(action: Action, when: impl Fn(&JobSnapshot) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            engine: OnceLock::new(),
            when: Box::new(when),
            action,
            fired: AtomicBool::new(false),
            seen: Mutex::new(Vec::new()),
            rejected_start: AtomicBool::new(false),
        })
    }

    fn recorder() -> Arc<Self> {
        Self::new(Action::Pause, |_| false)
    }

    fn seen(&self) -> Vec<JobSnapshot> {
        self.seen.lock().unwrap().clone()
    }
}

impl SyncObserver for Trigger {
    fn on_update(&self, snapshot: &JobSnapshot) {
        self.seen.lock().unwrap().push(snapshot.clone());
        if !(self.when)(snapshot) || self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = self
            .engine
            .get()
            .and_then(Weak::upgrade)
            .expect("engine registered");
        match self.action {
            Action::Pause => {
                engine.pause(&snapshot.job_id).unwrap();
            }
            Action::Cancel => {
                engine.cancel(&snapshot.job_id).unwrap();
            }
            Action::StartAgain => {
                let result = engine.start_at(SyncDuration::Days7, snapshot.sync_type, &fixed_now());
                let rejected = matches!(result, Err(SyncError::AlreadyRunning { .. }));
                self.rejected_start.store(rejected, Ordering::SeqCst);
            }
        }
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn options(chunk_size_days: u32) -> SyncOptions {
    SyncOptions {
        chunk_size_days,
        ..SyncOptions::new(DEVICE)
    }
}

fn engine(
    store: Arc<dyn JobStore>,
    uploader: Arc<FakeUploader>,
    chunk_size_days: u32,
    observer: Option<Arc<Trigger>>,
) -> Arc<SyncEngine> {
    let mut engine = SyncEngine::new(store, Arc::new(FakeReader), uploader, options(chunk_size_days)).unwrap();
    if let Some(observer) = &observer {
        engine = engine.with_observer(observer.clone());
    }
    let engine = Arc::new(engine);
    if let Some(observer) = observer {
        observer.engine.set(Arc::downgrade(&engine)).ok();
    }
    engine
}

/// A stored job over `chunks` weekly chunks, not yet started
fn stored_job(chunks: u64) -> SyncJob {
    let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
    let range = DateRange::new(start, start + chrono::Days::new(chunks * 7 - 1));
    let now = fixed_now().fixed_offset();
    SyncJob::new(DEVICE, SyncType::Historical, now, now, 7, schedule_chunks(range, 7).unwrap())
}

fn assert_monotonic(snapshots: &[JobSnapshot]) {
    for pair in snapshots.windows(2) {
        assert!(
            pair[1].chunks_completed >= pair[0].chunks_completed,
            "chunks_completed went from {} to {}",
            pair[0].chunks_completed,
            pair[1].chunks_completed
        );
    }
}

#[test]
fn test_single_chunk_week_completes() {
    let store = Arc::new(InMemoryJobStore::new());
    let uploader = Arc::new(FakeUploader::default());
    let observer = Trigger::recorder();
    let engine = engine(store.clone(), uploader.clone(), 7, Some(observer.clone()));

    let snapshot = engine
        .start_at(SyncDuration::Days7, SyncType::Historical, &fixed_now())
        .unwrap();

    assert_eq!(snapshot.chunks_total, 1);
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.percent, 100);
    assert_eq!(snapshot.current_stage, None);

    let seen = observer.seen();
    let complete = seen
        .iter()
        .find(|s| s.current_stage == Some(Stage::Complete))
        .expect("chunk reached Chunk complete");
    assert_eq!(complete.stage_label(), Some("Chunk complete"));
    assert_eq!(complete.percent, 99);
    assert!(seen.iter().filter(|s| s.status == JobStatus::Running).all(|s| s.percent <= 99));

    // Upload carries cleaned, converted records
    let batches = uploader.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].idempotency_key, format!("{}:0", snapshot.job_id));
    assert_eq!(batches[0].metrics[0].data, json!({ "sleepScore": 78 }));
    assert_eq!(batches[0].activities[0].name.as_deref(), Some("Trail Running"));
    assert_eq!(batches[0].activities[0].distance_km, Some(8.0));
    assert_eq!(batches[0].activities[0].duration_min, Some(50.0));
}

#[test]
fn test_failed_chunk_is_retried_on_resume() {
    let store = Arc::new(InMemoryJobStore::new());
    let uploader = Arc::new(FakeUploader::failing_once(
        1,
        ChunkError::Network("connection reset".into()),
    ));
    let engine = engine(store.clone(), uploader.clone(), 3, None);

    let snapshot = engine
        .start_at(SyncDuration::Days7, SyncType::Historical, &fixed_now())
        .unwrap();

    assert_eq!(snapshot.chunks_total, 3);
    assert_eq!(snapshot.chunks_completed, 2);
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.error_message, None);
    assert_eq!(snapshot.failed_chunks.len(), 1);
    assert_eq!(snapshot.failed_chunks[0].chunk_index, 1);
    assert_eq!(snapshot.failed_chunks[0].attempts, 1);
    assert_eq!(
        snapshot.failure_summary().as_deref(),
        Some("1 chunk(s) failed, will retry on resume")
    );
    assert_eq!(uploader.uploaded(), vec![0, 2]);

    let resumed = engine.resume(&snapshot.job_id).unwrap();

    assert_eq!(uploader.uploaded(), vec![0, 2, 1]);
    assert_eq!(resumed.chunks_completed, 3);
    assert_eq!(resumed.status, JobStatus::Completed);
    assert!(resumed.failed_chunks.is_empty());

    let job = store.load(&snapshot.job_id).unwrap().unwrap();
    assert_eq!(job.chunks[1].attempts, 2);
    assert_eq!(job.chunks[0].attempts, 1);
}

#[test]
fn test_180_day_window_starts_at_local_midnight() {
    let store = Arc::new(InMemoryJobStore::new());
    let engine = engine(store.clone(), Arc::new(FakeUploader::default()), 7, None);
    let now = Utc.with_ymd_and_hms(2026, 2, 26, 14, 30, 0).unwrap();

    let snapshot = engine
        .start_at(SyncDuration::Days180, SyncType::Historical, &now)
        .unwrap();
    let job = store.load(&snapshot.job_id).unwrap().unwrap();

    assert_eq!(job.start_date.hour(), 0);
    assert_eq!(job.start_date.minute(), 0);
    let back = now.fixed_offset() - job.start_date;
    assert!(back >= Duration::days(179) && back <= Duration::days(180));
    assert_eq!(job.chunks_total, 26);
    assert_eq!(snapshot.status, JobStatus::Completed);
}

#[test]
fn test_pause_mid_chunk_and_resume() {
    let store = Arc::new(InMemoryJobStore::new());
    let uploader = Arc::new(FakeUploader::default());
    let observer = Trigger::new(Action::Pause, |s| {
        s.chunks_completed == 1 && s.current_stage == Some(Stage::FetchingHealth)
    });
    let engine = engine(store.clone(), uploader.clone(), 3, Some(observer.clone()));

    let paused = engine
        .start_at(SyncDuration::Days7, SyncType::Historical, &fixed_now())
        .unwrap();

    assert_eq!(paused.status, JobStatus::Paused);
    assert_eq!(paused.chunks_completed, 1);
    assert_eq!(paused.current_stage, None);
    assert_eq!(paused.current_chunk_index, Some(1));
    assert_eq!(paused.percent, 33);

    let job = store.load(&paused.job_id).unwrap().unwrap();
    assert_eq!(job.chunks[1].status, ChunkStatus::Pending);
    assert_eq!(job.chunks[2].attempts, 0);

    // Pausing again is a no-op
    assert_eq!(engine.pause(&paused.job_id).unwrap().status, JobStatus::Paused);

    let resumed = engine.resume(&paused.job_id).unwrap();
    assert_eq!(resumed.status, JobStatus::Completed);
    assert_eq!(resumed.chunks_completed, 3);
    assert_eq!(uploader.uploaded(), vec![0, 1, 2]);
    assert_monotonic(&observer.seen());
}

#[test]
fn test_cancel_running_job() {
    let store = Arc::new(InMemoryJobStore::new());
    let uploader = Arc::new(FakeUploader::default());
    let observer = Trigger::new(Action::Cancel, |s| {
        s.chunks_completed == 1 && s.current_stage == Some(Stage::Starting)
    });
    let engine = engine(store.clone(), uploader.clone(), 3, Some(observer));

    let snapshot = engine
        .start_at(SyncDuration::Days7, SyncType::Historical, &fixed_now())
        .unwrap();

    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert_eq!(snapshot.chunks_completed, 1);
    assert_eq!(uploader.uploaded(), vec![0]);

    // Terminal: further control calls change nothing
    assert_eq!(engine.pause(&snapshot.job_id).unwrap().status, JobStatus::Cancelled);
    assert_eq!(engine.resume(&snapshot.job_id).unwrap().status, JobStatus::Cancelled);
    assert_eq!(uploader.uploaded(), vec![0]);
}

#[test]
fn test_cancel_from_every_idle_state() {
    let store = Arc::new(InMemoryJobStore::new());
    let engine = engine(store.clone(), Arc::new(FakeUploader::default()), 7, None);

    for status in [JobStatus::Pending, JobStatus::Paused, JobStatus::Failed] {
        let mut job = stored_job(2);
        job.status = status;
        store.save(&job).unwrap();

        let snapshot = engine.cancel(&job.id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Cancelled, "from {status}");
        assert_eq!(engine.resume(&job.id).unwrap().status, JobStatus::Cancelled);
        assert_eq!(engine.pause(&job.id).unwrap().status, JobStatus::Cancelled);
    }
}

#[test]
fn test_completed_job_ignores_control_calls() {
    let store = Arc::new(InMemoryJobStore::new());
    let uploader = Arc::new(FakeUploader::default());
    let engine = engine(store.clone(), uploader.clone(), 7, None);

    let done = engine
        .start_at(SyncDuration::Days3, SyncType::Historical, &fixed_now())
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    for snapshot in [
        engine.pause(&done.job_id).unwrap(),
        engine.resume(&done.job_id).unwrap(),
        engine.cancel(&done.job_id).unwrap(),
    ] {
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.percent, 100);
    }
    assert_eq!(uploader.uploaded().len(), 1);
}

#[test]
fn test_second_start_is_rejected_while_running() {
    let store = Arc::new(InMemoryJobStore::new());
    let observer = Trigger::new(Action::StartAgain, |s| s.current_stage == Some(Stage::Checking));
    let engine = engine(store.clone(), Arc::new(FakeUploader::default()), 7, Some(observer.clone()));

    let snapshot = engine
        .start_at(SyncDuration::Days7, SyncType::Historical, &fixed_now())
        .unwrap();

    assert!(observer.rejected_start.load(Ordering::SeqCst));
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(engine.list_jobs(None).unwrap().len(), 1);

    // Once the first run ended, a new one may start
    engine
        .start_at(SyncDuration::Today, SyncType::Historical, &fixed_now())
        .unwrap();
    assert_eq!(engine.list_jobs(Some(SyncType::Historical)).unwrap().len(), 2);
}

#[test]
fn test_fatal_error_stops_job() {
    let store = Arc::new(InMemoryJobStore::new());
    let uploader = Arc::new(FakeUploader::failing_once(
        0,
        ChunkError::Unauthorized("token expired".into()),
    ));
    let engine = engine(store.clone(), uploader.clone(), 3, None);

    let snapshot = engine
        .start_at(SyncDuration::Days7, SyncType::Historical, &fixed_now())
        .unwrap();

    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.error_message.as_deref(), Some("authentication failed: token expired"));
    assert!(uploader.uploaded().is_empty());
    let job = store.load(&snapshot.job_id).unwrap().unwrap();
    assert_eq!(job.chunks[1].attempts, 0);
    assert_eq!(job.chunks[2].attempts, 0);

    let resumed = engine.resume(&snapshot.job_id).unwrap();
    assert_eq!(resumed.status, JobStatus::Completed);
    assert_eq!(resumed.error_message, None);
}

#[test]
fn test_resume_reprocesses_only_unfinished_chunks() {
    let store = Arc::new(InMemoryJobStore::new());
    let uploader = Arc::new(FakeUploader::default());
    let engine = engine(store.clone(), uploader.clone(), 7, None);

    // k = 2 succeeded, f = 1 failed, 5 total
    let mut job = stored_job(5);
    job.status = JobStatus::Failed;
    for index in [0, 2] {
        job.chunks[index].status = ChunkStatus::Succeeded;
        job.chunks[index].attempts = 1;
    }
    job.chunks[1].status = ChunkStatus::Failed;
    job.chunks[1].attempts = 1;
    job.failed_chunks.push(FailedChunk {
        chunk_index: 1,
        attempts: 1,
        last_error: "request timed out".into(),
    });
    job.recount();
    store.save(&job).unwrap();

    let resumed = engine.resume(&job.id).unwrap();

    let uploaded = uploader.uploaded();
    assert_eq!(uploaded.len(), 1 + (5 - 2 - 1));
    assert_eq!(uploaded, vec![1, 3, 4]);
    assert_eq!(resumed.status, JobStatus::Completed);

    let job = store.load(&job.id).unwrap().unwrap();
    assert_eq!(job.chunks[0].attempts, 1);
    assert_eq!(job.chunks[2].attempts, 1);
}

#[test]
fn test_restart_recovers_interrupted_job() {
    let dir = TempDir::new().unwrap();
    // Use .test.sqlite extension to clearly distinguish from production databases
    let db_path = dir.path().join("sync.test.sqlite");

    let mut job = stored_job(3);
    job.status = JobStatus::Running;
    job.chunks[0].status = ChunkStatus::Succeeded;
    job.chunks[0].attempts = 1;
    job.chunks[1].status = ChunkStatus::InProgress;
    job.chunks[1].attempts = 1;
    job.current_chunk_index = Some(1);
    job.current_stage = Some(Stage::Uploading);
    job.recount();
    {
        let store = SqliteJobStore::new(&db_path).unwrap();
        store.save(&job).unwrap();
    }

    // Process restarts
    let store = Arc::new(SqliteJobStore::new(&db_path).unwrap());
    let uploader = Arc::new(FakeUploader::default());
    let engine = engine(store.clone(), uploader.clone(), 7, None);

    let recovered = engine.snapshot(&job.id).unwrap();
    assert_eq!(recovered.status, JobStatus::Paused);
    assert_eq!(recovered.current_stage, None);
    assert_eq!(recovered.chunks_completed, 1);
    let stored = store.load(&job.id).unwrap().unwrap();
    assert_eq!(stored.chunks[1].status, ChunkStatus::Pending);

    let resumed = engine.resume(&job.id).unwrap();
    assert_eq!(resumed.status, JobStatus::Completed);
    assert_eq!(uploader.uploaded(), vec![1, 2]);
}

#[test]
fn test_incremental_cadence() {
    let store = Arc::new(InMemoryJobStore::new());
    let engine = engine(store.clone(), Arc::new(FakeUploader::default()), 7, None);

    assert!(engine.incremental_due().unwrap());

    engine
        .start_at(SyncDuration::Hours24, SyncType::Incremental, &fixed_now())
        .unwrap();

    let now = Utc::now();
    assert!(!engine.incremental_due_at(now).unwrap());
    assert!(engine.incremental_due_at(now + Duration::seconds(901)).unwrap());

    let latest = engine.latest_job(SyncType::Incremental).unwrap().unwrap();
    assert_eq!(latest.chunks_total, 1);
    assert!(engine.latest_job(SyncType::Historical).unwrap().is_none());
}

#[test]
fn test_unknown_job() {
    let store = Arc::new(InMemoryJobStore::new());
    let engine = engine(store, Arc::new(FakeUploader::default()), 7, None);
    let missing = JobId::new("missing");

    assert!(matches!(engine.resume(&missing), Err(SyncError::JobNotFound(_))));
    assert!(matches!(engine.cancel(&missing), Err(SyncError::JobNotFound(_))));
}

#[test]
fn test_store_error_mid_run_parks_job_for_resume() {
    // Saves: create, running, begin chunk 0, enter Checking
    let store = Arc::new(FailingSave::new(4));
    let uploader = Arc::new(FakeUploader::default());
    let engine = engine(store.clone(), uploader.clone(), 7, None);

    let result = engine.start_at(SyncDuration::Days7, SyncType::Historical, &fixed_now());
    assert!(matches!(result, Err(SyncError::Internal(_))));

    let job = store.list_all().unwrap().remove(0);
    assert_eq!(job.status, JobStatus::Paused);
    assert_eq!(job.chunks[0].status, ChunkStatus::Pending);
    assert_eq!(job.current_stage, None);

    // Neither a new start nor a resume is blocked by the stopped run
    let resumed = engine.resume(&job.id).unwrap();
    assert_eq!(resumed.status, JobStatus::Completed);
    assert_eq!(uploader.uploaded(), vec![0]);

    let again = engine
        .start_at(SyncDuration::Days7, SyncType::Historical, &fixed_now())
        .unwrap();
    assert_eq!(again.status, JobStatus::Completed);
}

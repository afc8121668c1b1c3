//! Control surface over stored jobs: start, pause, resume, cancel

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;
use chrono::{DateTime, Local, TimeZone, Utc};
use log::{info, warn};

use super::SyncError;
use super::classify::{DefaultClassifier, ErrorClassifier};
use super::control::RunControl;
use super::executor::{ChunkExecutor, RunOutcome};
use super::retry::plan_resume;
use super::snapshot::{JobSnapshot, SyncObserver};
use super::state_machine::JobStateMachine;
use super::timing::{cooldown_elapsed_at, last_completed_at};
use crate::health::{HealthReader, UploadClient};
use crate::models::{JobId, JobStatus, MetricType, SyncJob, SyncType};
use crate::plan::{SyncDuration, plan_window, schedule_chunks};
use crate::settings::SyncSettings;
use crate::storage::JobStore;

/// Per-device engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub device_id: String,
    pub chunk_size_days: u32,
    /// Empty means every metric
    pub metric_types: Vec<MetricType>,
    pub incremental_cooldown_secs: u64,
}

impl SyncOptions {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            chunk_size_days: 7,
            metric_types: Vec::new(),
            incremental_cooldown_secs: 15 * 60,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            device_id: settings.device_id.clone(),
            chunk_size_days: settings.chunk_size_days,
            metric_types: settings.metric_types.clone(),
            incremental_cooldown_secs: settings.incremental_cooldown_secs,
        }
    }
}

struct ActiveRun {
    sync_type: SyncType,
    control: RunControl,
    /// Reported until the job's first save lands
    claimed: JobSnapshot,
}

/// Drives sync jobs for one device
///
/// All methods take `&self`. `start` and `resume` block until the run stops,
/// so hosts call them from a background thread and use `pause` or `cancel`
/// from any other thread.
pub struct SyncEngine {
    store: Arc<dyn JobStore>,
    reader: Arc<dyn HealthReader>,
    uploader: Arc<dyn UploadClient>,
    classifier: Arc<dyn ErrorClassifier>,
    observer: Option<Arc<dyn SyncObserver>>,
    options: SyncOptions,
    active: Mutex<HashMap<JobId, ActiveRun>>,
}

impl SyncEngine {
    /// Create an engine and park any job a previous process left running
    pub fn new(
        store: Arc<dyn JobStore>,
        reader: Arc<dyn HealthReader>,
        uploader: Arc<dyn UploadClient>,
        options: SyncOptions,
    ) -> Result<Self, SyncError> {
        let engine = Self {
            store,
            reader,
            uploader,
            classifier: Arc::new(DefaultClassifier),
            observer: None,
            options,
            active: Mutex::new(HashMap::new()),
        };
        let recovered = engine.recover_interrupted()?;
        if recovered > 0 {
            warn!("Recovered {} interrupted sync job(s) as paused", recovered);
        }
        Ok(engine)
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Plan a window ending now and run it to a stop
    pub fn start(
        &self,
        duration: SyncDuration,
        sync_type: SyncType,
    ) -> Result<JobSnapshot, SyncError> {
        self.start_at(duration, sync_type, &Local::now())
    }

    /// [`start`](Self::start) against an explicit clock
    pub fn start_at<Tz: TimeZone>(
        &self,
        duration: SyncDuration,
        sync_type: SyncType,
        now: &DateTime<Tz>,
    ) -> Result<JobSnapshot, SyncError> {
        let window = plan_window(duration, now);
        let chunks = schedule_chunks(window.date_range(), self.options.chunk_size_days)?;
        let job = SyncJob::new(
            self.options.device_id.clone(),
            sync_type,
            window.start,
            window.end,
            self.options.chunk_size_days,
            chunks,
        );
        info!(
            "Starting {} sync for {} ({}): {}",
            sync_type,
            self.options.device_id,
            duration.as_str(),
            window.date_range()
        );

        let id = job.id.clone();
        let control = self.claim(&job)?;
        let result = self.create_and_run(job, &control);
        self.release(&id);
        result
    }

    /// Ask a running job to stop at its next stage boundary
    ///
    /// Jobs that are not running are returned unchanged.
    pub fn pause(&self, id: &JobId) -> Result<JobSnapshot, SyncError> {
        if let Some((control, claimed)) = self.active_run(id)? {
            control.request_pause();
            return self.live_snapshot(id, claimed);
        }

        let job = self.load(id)?;
        if job.status != JobStatus::Running {
            return Ok(JobSnapshot::from_job(&job));
        }
        // Running in the store with no live run here
        let mut machine = self.machine(job);
        machine.recover()?;
        Ok(JobSnapshot::from_job(machine.job()))
    }

    /// Cancel a job from any non-terminal status
    ///
    /// A live run stops at its next stage boundary. Terminal jobs are
    /// returned unchanged.
    pub fn cancel(&self, id: &JobId) -> Result<JobSnapshot, SyncError> {
        if let Some((control, claimed)) = self.active_run(id)? {
            control.request_cancel();
            return self.live_snapshot(id, claimed);
        }

        let job = self.load(id)?;
        if job.status.is_terminal() {
            return Ok(JobSnapshot::from_job(&job));
        }
        let mut machine = self.machine(job);
        machine.cancel()?;
        info!("Cancelled job {}", id);
        Ok(JobSnapshot::from_job(machine.job()))
    }

    /// Continue a paused or failed job, reprocessing only unfinished chunks
    ///
    /// Terminal jobs are returned unchanged.
    pub fn resume(&self, id: &JobId) -> Result<JobSnapshot, SyncError> {
        let job = self.load(id)?;
        match job.status {
            JobStatus::Completed | JobStatus::Cancelled => return Ok(JobSnapshot::from_job(&job)),
            JobStatus::Running => {
                return Err(SyncError::AlreadyRunning {
                    device_id: job.device_id,
                    sync_type: job.sync_type,
                });
            }
            JobStatus::Pending | JobStatus::Paused | JobStatus::Failed => {}
        }

        let control = self.claim(&job)?;
        let result = self.resume_claimed(job, &control);
        self.release(id);
        result
    }

    pub fn snapshot(&self, id: &JobId) -> Result<JobSnapshot, SyncError> {
        Ok(JobSnapshot::from_job(&self.load(id)?))
    }

    /// Jobs for this device, newest first
    pub fn list_jobs(&self, sync_type: Option<SyncType>) -> Result<Vec<JobSnapshot>, SyncError> {
        let jobs = self.store.list_jobs(&self.options.device_id, sync_type)?;
        Ok(jobs.iter().map(JobSnapshot::from_job).collect())
    }

    /// Most recent job of `sync_type`
    pub fn latest_job(&self, sync_type: SyncType) -> Result<Option<JobSnapshot>, SyncError> {
        Ok(self.list_jobs(Some(sync_type))?.into_iter().next())
    }

    /// Whether the incremental cooldown has passed since the last completed incremental sync
    pub fn incremental_due(&self) -> Result<bool, SyncError> {
        self.incremental_due_at(Utc::now())
    }

    pub fn incremental_due_at(&self, now: DateTime<Utc>) -> Result<bool, SyncError> {
        let jobs = self
            .store
            .list_jobs(&self.options.device_id, Some(SyncType::Incremental))?;
        let last = last_completed_at(&jobs, SyncType::Incremental);
        Ok(cooldown_elapsed_at(
            last,
            self.options.incremental_cooldown_secs,
            now,
        ))
    }

    /// Park jobs stored as running that have no live run in this process
    ///
    /// Returns how many jobs were recovered.
    pub fn recover_interrupted(&self) -> Result<usize, SyncError> {
        let stale: Vec<SyncJob> = {
            let active = self.lock_active()?;
            self.store
                .list_jobs(&self.options.device_id, None)?
                .into_iter()
                .filter(|job| job.status == JobStatus::Running && !active.contains_key(&job.id))
                .collect()
        };

        let count = stale.len();
        for job in stale {
            info!("Job {} was interrupted, parking as paused", job.id);
            self.machine(job).recover()?;
        }
        Ok(count)
    }

    fn create_and_run(&self, job: SyncJob, control: &RunControl) -> Result<JobSnapshot, SyncError> {
        let mut machine = self.machine(job);
        machine.create()?;
        let queue: Vec<usize> = (0..machine.job().chunks_total).collect();
        self.drive(machine, &queue, control)
    }

    fn resume_claimed(&self, job: SyncJob, control: &RunControl) -> Result<JobSnapshot, SyncError> {
        let plan = plan_resume(&job);
        info!(
            "Resuming job {}: {} succeeded, {} failed, {} remaining",
            job.id, plan.chunks_succeeded, plan.chunks_failed, plan.chunks_remaining
        );
        let machine = self.machine(job);
        self.drive(machine, &plan.queue, control)
    }

    fn drive(
        &self,
        mut machine: JobStateMachine<'_>,
        queue: &[usize],
        control: &RunControl,
    ) -> Result<JobSnapshot, SyncError> {
        let executor = ChunkExecutor::new(
            self.reader.as_ref(),
            self.uploader.as_ref(),
            self.classifier.as_ref(),
            control,
            &self.options.metric_types,
        );
        let outcome = match executor.run(&mut machine, queue) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.park_after_error(&machine.job().id);
                return Err(e);
            }
        };
        let job = machine.job();
        match outcome {
            RunOutcome::Completed => info!("Job {} completed", job.id),
            RunOutcome::Failed => warn!(
                "Job {} ended failed with {} chunk(s) awaiting retry",
                job.id,
                job.failed_chunks.len()
            ),
            RunOutcome::Paused | RunOutcome::Cancelled => {}
        }
        Ok(JobSnapshot::from_job(job))
    }

    /// Park a run that stopped on an engine error so it can be resumed
    ///
    /// The stored record may lag the in-memory one, so the job is reloaded.
    fn park_after_error(&self, id: &JobId) {
        let parked = self.store.load(id).map_err(SyncError::from).and_then(|job| match job {
            Some(job) if job.status == JobStatus::Running => self.machine(job).recover().map(|()| true),
            _ => Ok(false),
        });
        match parked {
            Ok(true) => warn!("Job {} stopped on an error, parked as paused", id),
            Ok(false) => {}
            Err(e) => warn!("Failed to park job {} after error: {}", id, e),
        }
    }

    fn machine(&self, job: SyncJob) -> JobStateMachine<'_> {
        JobStateMachine::new(job, self.store.as_ref()).with_observer(self.observer.as_deref())
    }

    fn load(&self, id: &JobId) -> Result<SyncJob, SyncError> {
        self.store
            .load(id)?
            .ok_or_else(|| SyncError::JobNotFound(id.clone()))
    }

    /// Register a live run, enforcing one running job per device and type
    fn claim(&self, job: &SyncJob) -> Result<RunControl, SyncError> {
        let mut active = self.lock_active()?;
        let busy = active
            .iter()
            .any(|(id, run)| run.sync_type == job.sync_type && *id != job.id)
            || self
                .store
                .list_jobs(&job.device_id, Some(job.sync_type))?
                .iter()
                .any(|other| other.status == JobStatus::Running && other.id != job.id);
        if busy || active.contains_key(&job.id) {
            return Err(SyncError::AlreadyRunning {
                device_id: job.device_id.clone(),
                sync_type: job.sync_type,
            });
        }

        let control = RunControl::new();
        active.insert(
            job.id.clone(),
            ActiveRun {
                sync_type: job.sync_type,
                control: control.clone(),
                claimed: JobSnapshot::from_job(job),
            },
        );
        Ok(control)
    }

    fn release(&self, id: &JobId) {
        match self.active.lock() {
            Ok(mut active) => {
                active.remove(id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(id);
            }
        }
    }

    fn active_run(&self, id: &JobId) -> Result<Option<(RunControl, JobSnapshot)>, SyncError> {
        Ok(self
            .lock_active()?
            .get(id)
            .map(|run| (run.control.clone(), run.claimed.clone())))
    }

    /// Stored view of a live run, or its claimed view before the first save
    fn live_snapshot(&self, id: &JobId, claimed: JobSnapshot) -> Result<JobSnapshot, SyncError> {
        Ok(match self.store.load(id)? {
            Some(job) => JobSnapshot::from_job(&job),
            None => claimed,
        })
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, HashMap<JobId, ActiveRun>>, SyncError> {
        self.active
            .lock()
            .map_err(|_| anyhow!("active run registry lock poisoned").into())
    }
}

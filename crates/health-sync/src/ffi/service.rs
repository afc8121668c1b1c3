//! SyncService facade for UniFFI export
//!
//! This provides a high-level, FFI-friendly API that wraps the sync engine,
//! its SQLite job store, and the REST upload client.

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::ffi::logging::{init_ffi_logger, set_log_callback};
use crate::ffi::types::*;
use crate::health::{
    ActivityRecord, ChunkError, HealthReader, HealthRecord, HttpUploadClient,
};
use crate::models::{DateRange, JobId, MetricType};
use crate::progress::weight_for_label;
use crate::settings::SyncSettings;
use crate::storage::SqliteJobStore;
use crate::sync::{JobSnapshot, SyncEngine, SyncObserver, SyncOptions};

/// Adapts a host reader callback to [`HealthReader`]
struct HostReader {
    inner: Box<dyn FfiHealthReader>,
}

impl HostReader {
    fn parse<T: DeserializeOwned>(json: &str) -> Result<Vec<T>, ChunkError> {
        serde_json::from_str(json).map_err(|e| ChunkError::MalformedResponse(e.to_string()))
    }
}

impl HealthReader for HostReader {
    fn read_health(
        &self,
        range: &DateRange,
        metrics: &[MetricType],
    ) -> Result<Vec<HealthRecord>, ChunkError> {
        let metrics = metrics.iter().map(|m| m.as_str().to_string()).collect();
        let json = self
            .inner
            .read_health(range.start.to_string(), range.end.to_string(), metrics)?;
        Self::parse(&json)
    }

    fn read_activities(&self, range: &DateRange) -> Result<Vec<ActivityRecord>, ChunkError> {
        let json = self
            .inner
            .read_activities(range.start.to_string(), range.end.to_string())?;
        Self::parse(&json)
    }
}

/// Forwards engine snapshots to a host progress callback
struct CallbackObserver {
    inner: Box<dyn SyncProgressCallback>,
}

impl SyncObserver for CallbackObserver {
    fn on_update(&self, snapshot: &JobSnapshot) {
        self.inner.on_update(FfiJobSnapshot::from(snapshot.clone()));
    }
}

/// Main service object for sync operations
///
/// This is the entry point for Swift/Kotlin code. `start_sync` and `resume`
/// block until the run stops, so call them off the main thread; `pause` and
/// `cancel` may be called from any thread while a run is in progress.
#[derive(uniffi::Object)]
pub struct SyncService {
    engine: SyncEngine,
}

#[uniffi::export]
impl SyncService {
    /// Create a new SyncService
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite job database
    /// * `settings_json` - Settings as JSON; when `None`, settings load from
    ///   the config directory or environment
    /// * `reader` - Host health platform reader
    /// * `progress` - Optional progress callback
    #[uniffi::constructor]
    pub fn new(
        db_path: String,
        settings_json: Option<String>,
        reader: Box<dyn FfiHealthReader>,
        progress: Option<Box<dyn SyncProgressCallback>>,
    ) -> Result<Arc<Self>, FfiSyncError> {
        let settings = match settings_json {
            Some(json) => SyncSettings::from_json(&json),
            None => SyncSettings::load(),
        }
        .map_err(|e| FfiSyncError::InvalidArgument {
            message: format!("{:#}", e),
        })?;

        // Ensure parent directory exists
        if let Some(parent) = PathBuf::from(&db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| FfiSyncError::Storage {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }
        let store = SqliteJobStore::new(&db_path)?;

        let uploader =
            HttpUploadClient::from_settings(&settings).map_err(|e| FfiSyncError::InvalidArgument {
                message: format!("{:#}", e),
            })?;

        let mut engine = SyncEngine::new(
            Arc::new(store),
            Arc::new(HostReader { inner: reader }),
            Arc::new(uploader),
            SyncOptions::from_settings(&settings),
        )?;
        if let Some(progress) = progress {
            engine = engine.with_observer(Arc::new(CallbackObserver { inner: progress }));
        }

        Ok(Arc::new(Self { engine }))
    }

    // ========================================================================
    // Job Control
    // ========================================================================

    /// Plan a window ending now and run it until it completes, fails, or is
    /// paused or cancelled
    pub fn start_sync(
        &self,
        duration: FfiSyncDuration,
        sync_type: FfiSyncType,
    ) -> Result<FfiJobSnapshot, FfiSyncError> {
        let snapshot = self.engine.start(duration.into(), sync_type.into())?;
        Ok(snapshot.into())
    }

    /// Request a pause; a running job stops at its next stage boundary
    pub fn pause(&self, job_id: String) -> Result<FfiJobSnapshot, FfiSyncError> {
        Ok(self.engine.pause(&JobId::new(job_id))?.into())
    }

    /// Continue a paused or failed job, reprocessing only unfinished chunks
    pub fn resume(&self, job_id: String) -> Result<FfiJobSnapshot, FfiSyncError> {
        Ok(self.engine.resume(&JobId::new(job_id))?.into())
    }

    pub fn cancel(&self, job_id: String) -> Result<FfiJobSnapshot, FfiSyncError> {
        Ok(self.engine.cancel(&JobId::new(job_id))?.into())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_job(&self, job_id: String) -> Result<FfiJobSnapshot, FfiSyncError> {
        Ok(self.engine.snapshot(&JobId::new(job_id))?.into())
    }

    /// Jobs for this device, newest first
    pub fn list_jobs(
        &self,
        sync_type: Option<FfiSyncType>,
    ) -> Result<Vec<FfiJobSnapshot>, FfiSyncError> {
        let jobs = self.engine.list_jobs(sync_type.map(Into::into))?;
        Ok(jobs.into_iter().map(FfiJobSnapshot::from).collect())
    }

    pub fn latest_job(
        &self,
        sync_type: FfiSyncType,
    ) -> Result<Option<FfiJobSnapshot>, FfiSyncError> {
        Ok(self.engine.latest_job(sync_type.into())?.map(FfiJobSnapshot::from))
    }

    /// Whether enough time has passed for another incremental sync
    pub fn is_incremental_due(&self) -> Result<bool, FfiSyncError> {
        Ok(self.engine.incremental_due()?)
    }
}

// ============================================================================
// Free Functions
// ============================================================================

/// Install the log bridge and route records to `callback`
///
/// Safe to call more than once; later calls only swap the callback and level.
#[uniffi::export]
pub fn initialize_logging(callback: Box<dyn LogCallback>, max_level: FfiLogLevel) {
    let level = log::Level::from(max_level);
    if init_ffi_logger(level).is_err() {
        super::logging::set_log_level(level);
    }
    set_log_callback(Some(Arc::from(callback)));
}

/// Progress weight for a free-form stage label reported by older hosts
#[uniffi::export]
pub fn stage_label_weight(label: String) -> f64 {
    weight_for_label(&label)
}

/// Days covered by an import window
#[uniffi::export]
pub fn sync_duration_days(duration: FfiSyncDuration) -> u32 {
    crate::plan::SyncDuration::from(duration).window_days()
}

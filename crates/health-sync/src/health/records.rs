//! Record types exchanged with the health platform and the server

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{DateRange, MetricType};

/// One daily metric as read from the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub metric: MetricType,
    pub date: NaiveDate,
    /// Raw platform payload
    pub data: Value,
}

/// One activity as read from the device, in platform units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub activity_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Platform type key, e.g. `trail_running`
    #[serde(default)]
    pub type_key: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub distance_m: Option<f64>,
    #[serde(default)]
    pub duration_s: Option<f64>,
    #[serde(default)]
    pub elapsed_duration_s: Option<f64>,
    #[serde(default)]
    pub moving_duration_s: Option<f64>,
    /// Splits, weather, gear and other detail blobs
    #[serde(default)]
    pub details: Value,
}

/// Cleaned metric ready for upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetric {
    pub metric: MetricType,
    pub date: NaiveDate,
    pub data: Value,
}

/// Activity converted to server units (km, minutes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadActivity {
    pub activity_id: String,
    pub name: Option<String>,
    pub type_key: Option<String>,
    pub start_time: DateTime<Utc>,
    pub distance_km: Option<f64>,
    pub duration_min: Option<f64>,
    pub elapsed_duration_min: Option<f64>,
    pub moving_duration_min: Option<f64>,
    pub details: Option<Value>,
}

/// Everything uploaded for one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadBatch {
    /// `"{job_id}:{chunk_index}"`, stable across retries of the same chunk
    pub idempotency_key: String,
    pub device_id: String,
    pub range: DateRange,
    pub metrics: Vec<UploadMetric>,
    pub activities: Vec<UploadActivity>,
}

impl UploadBatch {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.activities.is_empty()
    }
}

//! Transform platform records into upload batches
//!
//! Cleaning drops nulls, zeros and platform-internal identifiers, and
//! unpacks string fields that hold embedded JSON. Unit conversion moves
//! activities to kilometres and minutes and summaries to kilograms.

use serde_json::{Map, Value};

use super::records::{ActivityRecord, HealthRecord, UploadActivity, UploadBatch, UploadMetric};
use crate::models::{DateRange, JobId};

/// Keys that identify platform-internal entities and are never uploaded
const INTERNAL_KEYS: [&str; 5] = [
    "ownerId",
    "userProfilePk",
    "permissionId",
    "userRoles",
    "equipmentTypeId",
];

/// Key fragment of workout-step comparison fields
const END_CONDITION_COMPARE: &str = "endConditionCompare";

/// Recursively strip empty and internal fields from a payload
///
/// - objects lose null and zero members and internal keys; an object left
///   empty becomes `None`
/// - arrays lose null and zero elements
/// - strings holding JSON are parsed (doubled quotes collapsed) and cleaned
///
/// `false` counts as zero, as it does on the platform side.
pub fn clean_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter(|(key, _)| !is_internal_key(key))
                .filter_map(|(key, v)| keep(clean_value(v)).map(|v| (key, v)))
                .collect();
            (!cleaned.is_empty()).then_some(Value::Object(cleaned))
        }
        Value::Array(items) => Some(Value::Array(
            items
                .into_iter()
                .filter_map(|item| keep(clean_value(item)))
                .collect(),
        )),
        Value::String(text) => match serde_json::from_str::<Value>(&text.replace("\"\"", "\"")) {
            Ok(parsed) => clean_value(parsed),
            Err(_) => Some(Value::String(text)),
        },
        other => Some(other),
    }
}

fn keep(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !is_zero(v))
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(b) => !b,
        _ => false,
    }
}

fn is_internal_key(key: &str) -> bool {
    INTERNAL_KEYS.contains(&key) || key.contains(END_CONDITION_COMPARE)
}

pub fn grams_to_kg(grams: f64) -> f64 {
    grams / 1000.0
}

pub fn meters_to_km(meters: f64) -> f64 {
    meters / 1000.0
}

pub fn seconds_to_minutes(seconds: f64) -> f64 {
    seconds / 60.0
}

/// Convert summary weights from grams to kilograms in place
pub fn convert_summary_units(data: &mut Value) {
    if let Some(weight) = data.get_mut("totalWeight") {
        if let Some(grams) = weight.as_f64() {
            *weight = Value::from(grams_to_kg(grams));
        }
    }
}

/// Title-case a platform type key: `trail_running` becomes `Trail Running`
pub fn type_key_to_name(type_key: &str) -> String {
    let mut name = String::with_capacity(type_key.len());
    let mut word_start = true;
    for ch in type_key.replace('_', " ").chars() {
        if word_start {
            name.extend(ch.to_uppercase());
        } else {
            name.extend(ch.to_lowercase());
        }
        word_start = !ch.is_alphabetic();
    }
    name
}

/// Clean daily metrics, dropping records that end up empty
pub fn prepare_metrics(records: Vec<HealthRecord>) -> Vec<UploadMetric> {
    records
        .into_iter()
        .filter_map(|record| {
            let mut data = record.data;
            convert_summary_units(&mut data);
            clean_value(data).map(|data| UploadMetric {
                metric: record.metric,
                date: record.date,
                data,
            })
        })
        .collect()
}

/// Convert activities to server units and fill in missing names
pub fn prepare_activities(records: Vec<ActivityRecord>) -> Vec<UploadActivity> {
    records
        .into_iter()
        .map(|record| {
            let name = record
                .name
                .filter(|n| !n.trim().is_empty())
                .or_else(|| record.type_key.as_deref().map(type_key_to_name));
            UploadActivity {
                activity_id: record.activity_id,
                name,
                type_key: record.type_key,
                start_time: record.start_time,
                distance_km: record.distance_m.map(meters_to_km),
                duration_min: record.duration_s.map(seconds_to_minutes),
                elapsed_duration_min: record.elapsed_duration_s.map(seconds_to_minutes),
                moving_duration_min: record.moving_duration_s.map(seconds_to_minutes),
                details: clean_value(record.details),
            }
        })
        .collect()
}

/// Idempotency key for one chunk of one job
pub fn idempotency_key(job_id: &JobId, chunk_index: usize) -> String {
    format!("{}:{}", job_id, chunk_index)
}

/// Assemble the upload for one chunk
pub fn build_batch(
    job_id: &JobId,
    chunk_index: usize,
    device_id: &str,
    range: DateRange,
    metrics: Vec<UploadMetric>,
    activities: Vec<UploadActivity>,
) -> UploadBatch {
    UploadBatch {
        idempotency_key: idempotency_key(job_id, chunk_index),
        device_id: device_id.to_string(),
        range,
        metrics,
        activities,
    }
}

//! FFI bindings for UniFFI export
//!
//! This module provides Swift/Kotlin bindings for the health-sync crate via UniFFI.
//!
//! ## Usage from Swift
//!
//! ```swift
//! import HealthSyncFFI
//!
//! // Initialize logging first
//! initializeLogging(callback: myLogCallback, maxLevel: .info)
//!
//! // The reader returns JSON arrays of records read from HealthKit
//! let service = try SyncService(
//!     dbPath: "/path/to/sync.db",
//!     settingsJson: nil,
//!     reader: healthKitReader,
//!     progress: progressCallback
//! )
//!
//! // On a background queue
//! let snapshot = try service.startSync(duration: .days30, syncType: .historical)
//!
//! // From the UI
//! try service.pause(jobId: snapshot.jobId)
//! try service.resume(jobId: snapshot.jobId)
//! ```

mod logging;
mod service;
mod types;

pub use logging::{init_ffi_logger, set_log_callback, set_log_level};
pub use service::*;
pub use types::*;

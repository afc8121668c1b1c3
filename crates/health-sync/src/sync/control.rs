//! Cooperative pause/cancel flag shared between a run and its callers

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const CONTINUE: u8 = 0;
const PAUSE: u8 = 1;
const CANCEL: u8 = 2;

/// What a run should do at its next stage boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    Pause,
    Cancel,
}

/// Control flag for one running job
///
/// Clones share the same flag. Requests only ever escalate, so a cancel
/// cannot be downgraded to a pause by a later call.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    flag: Arc<AtomicU8>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_pause(&self) {
        self.flag.fetch_max(PAUSE, Ordering::SeqCst);
    }

    pub fn request_cancel(&self) {
        self.flag.fetch_max(CANCEL, Ordering::SeqCst);
    }

    pub fn signal(&self) -> ControlSignal {
        match self.flag.load(Ordering::SeqCst) {
            CONTINUE => ControlSignal::Continue,
            PAUSE => ControlSignal::Pause,
            _ => ControlSignal::Cancel,
        }
    }
}

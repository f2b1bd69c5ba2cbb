//! Ring feedback lifecycle
//!
//! Local ring feedback (ringtone/vibration) is reachable from every live
//! instance, so it is a single process-wide owned resource with its own
//! lock and an explicit start/stop lifecycle - it must be stoppable from an
//! instance other than the one that started it. Actual audio output belongs
//! to the platform surface; this type owns only who is ringing.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::call::CallId;

/// Process-wide ring feedback owner.
#[derive(Debug, Default)]
pub struct RingFeedback {
    active: Mutex<Option<CallId>>,
}

impl RingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ringing for a call, replacing any current owner.
    pub fn start(&self, call_id: &str) {
        let mut active = self.active.lock();
        if let Some(previous) = active.replace(call_id.to_string()) {
            debug!(previous = %previous, call_id = %call_id, "ring feedback owner replaced");
        } else {
            info!(call_id = %call_id, "ring feedback started");
        }
    }

    /// Stop ringing regardless of owner.
    pub fn stop(&self) {
        if let Some(call_id) = self.active.lock().take() {
            info!(call_id = %call_id, "ring feedback stopped");
        }
    }

    /// Stop ringing only if `call_id` is the current owner.
    pub fn stop_for(&self, call_id: &str) {
        let mut active = self.active.lock();
        if active.as_deref() == Some(call_id) {
            *active = None;
            info!(call_id = %call_id, "ring feedback stopped");
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.active.lock().is_some()
    }
}

//! Durable pending-event store
//!
//! A user accept/decline that happens while no application listener is
//! reachable is persisted here so a later application launch can replay it.
//! The hosting process may be terminated immediately after the triggering
//! action, so writes are flushed to disk before returning.
//!
//! One slot per kind: a new write of the same kind overwrites the prior one,
//! and consumption is exactly-once. Consumption clears the slot first, then
//! checks the TTL; an expired event is discarded as if the slot were empty,
//! bounding how stale a delivered user action may be.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::call::CallId;
use crate::error::{BridgeError, BridgeResult};

/// How long a persisted user action stays replayable
pub const PENDING_TTL: Duration = Duration::from_secs(60);

/// Slot file name for the pending accept. Part of the on-disk contract.
pub const ACCEPT_SLOT: &str = "pending_accept.json";

/// Slot file name for the pending decline. Part of the on-disk contract.
pub const DECLINE_SLOT: &str = "pending_decline.json";

/// Kind of a persisted user action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingKind {
    Accept,
    Decline,
}

/// A durably persisted user action awaiting replay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvent {
    pub kind: PendingKind,
    pub call_id: CallId,
    pub extra: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// File-backed store holding at most one pending Accept and one pending
/// Decline.
#[derive(Debug, Clone)]
pub struct PendingStore {
    dir: PathBuf,
}

impl PendingStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> BridgeResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| BridgeError::store(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    /// Persist a pending accept, overwriting any prior one.
    pub fn save_accept(&self, call_id: &str, extra: HashMap<String, Value>) -> BridgeResult<()> {
        self.save(PendingKind::Accept, call_id, extra)
    }

    /// Persist a pending decline, overwriting any prior one.
    pub fn save_decline(&self, call_id: &str, extra: HashMap<String, Value>) -> BridgeResult<()> {
        self.save(PendingKind::Decline, call_id, extra)
    }

    /// Take the pending accept, if present and not expired.
    pub fn consume_accept(&self) -> Option<PendingEvent> {
        self.consume_at(PendingKind::Accept, Utc::now())
    }

    /// Take the pending decline, if present and not expired.
    pub fn consume_decline(&self) -> Option<PendingEvent> {
        self.consume_at(PendingKind::Decline, Utc::now())
    }

    fn slot_path(&self, kind: PendingKind) -> PathBuf {
        match kind {
            PendingKind::Accept => self.dir.join(ACCEPT_SLOT),
            PendingKind::Decline => self.dir.join(DECLINE_SLOT),
        }
    }

    fn save(&self, kind: PendingKind, call_id: &str, extra: HashMap<String, Value>) -> BridgeResult<()> {
        let event = PendingEvent {
            kind,
            call_id: call_id.to_string(),
            extra,
            created_at: Utc::now(),
        };
        let path = self.slot_path(kind);
        let data = serde_json::to_vec(&event)
            .map_err(|e| BridgeError::store(format!("encode pending event: {}", e)))?;

        // The process may be killed right after the triggering callback:
        // the write is not durable until both the file and its directory
        // entry are flushed.
        let mut file = File::create(&path)
            .map_err(|e| BridgeError::store(format!("create {}: {}", path.display(), e)))?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|e| BridgeError::store(format!("write {}: {}", path.display(), e)))?;
        sync_dir(&self.dir);

        info!(call_id = %call_id, kind = ?kind, "pending event persisted");
        Ok(())
    }

    /// Clear the slot, then TTL-check what it held against `now`.
    fn consume_at(&self, kind: PendingKind, now: DateTime<Utc>) -> Option<PendingEvent> {
        let path = self.slot_path(kind);
        if !path.exists() {
            return None;
        }

        let mut raw = String::new();
        let read = File::open(&path).and_then(|mut f| f.read_to_string(&mut raw));

        // Clear first: whatever happens next, this write was consumed.
        if let Err(e) = fs::remove_file(&path) {
            warn!(kind = ?kind, error = %e, "failed to clear pending slot");
        }

        if let Err(e) = read {
            warn!(kind = ?kind, error = %e, "failed to read pending slot, discarding");
            return None;
        }

        let event: PendingEvent = match serde_json::from_str(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(kind = ?kind, error = %e, "corrupt pending slot, discarding");
                return None;
            }
        };

        let age = now.signed_duration_since(event.created_at);
        if age.to_std().map_or(false, |age| age > PENDING_TTL) {
            info!(
                call_id = %event.call_id,
                kind = ?kind,
                age_secs = age.num_seconds(),
                "pending event expired, discarding"
            );
            return None;
        }

        debug!(call_id = %event.call_id, kind = ?kind, "pending event consumed");
        Some(event)
    }
}

fn sync_dir(dir: &Path) {
    // Best effort; missing directory fsync only widens the crash window.
    #[cfg(unix)]
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}

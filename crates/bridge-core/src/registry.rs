//! In-memory call registry
//!
//! Thread-safe map from call id to [`CallRecord`]. Operations are O(1) and
//! safe under concurrent access from dispatch callbacks and queries; per-call
//! operations are sequentially consistent, there is no ordering guarantee
//! across different call ids.

use std::sync::Arc;

use dashmap::DashMap;

use crate::call::{CallId, CallRecord, CallState, CallStats};
use crate::error::{BridgeError, BridgeResult};

/// Shared registry of live call records.
///
/// Cloning is cheap; all clones observe the same map.
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    calls: Arc<DashMap<CallId, CallRecord>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for its call id.
    pub fn upsert(&self, record: CallRecord) {
        self.calls.insert(record.call_id.clone(), record);
    }

    /// Snapshot of a single record.
    pub fn get(&self, call_id: &str) -> Option<CallRecord> {
        self.calls.get(call_id).map(|r| r.clone())
    }

    /// Remove and return a record.
    pub fn remove(&self, call_id: &str) -> Option<CallRecord> {
        self.calls.remove(call_id).map(|(_, record)| record)
    }

    /// Remove every record, returning the removed snapshots.
    pub fn remove_all(&self) -> Vec<CallRecord> {
        let ids: Vec<CallId> = self.calls.iter().map(|r| r.key().clone()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Update the state of a tracked call.
    ///
    /// `is_accepted_override` additionally sets the accepted flag when given.
    /// The update happens under the record's entry lock, so concurrent
    /// updates to the same call serialize.
    pub fn update_state(
        &self,
        call_id: &str,
        new_state: CallState,
        is_accepted_override: Option<bool>,
    ) -> BridgeResult<()> {
        match self.calls.get_mut(call_id) {
            Some(mut record) => {
                record.state = new_state;
                if let Some(accepted) = is_accepted_override {
                    record.is_accepted = accepted;
                }
                Ok(())
            }
            None => Err(BridgeError::call_not_found(call_id)),
        }
    }

    /// Remove a record only if it is currently in `state`, atomically with
    /// respect to concurrent state updates.
    pub fn remove_if_state(&self, call_id: &str, state: CallState) -> Option<CallRecord> {
        self.calls
            .remove_if(call_id, |_, record| record.state == state)
            .map(|(_, record)| record)
    }

    /// Snapshots of all non-terminal records.
    pub fn active_calls(&self) -> Vec<CallRecord> {
        self.calls
            .iter()
            .filter(|r| !r.state.is_terminal())
            .map(|r| r.clone())
            .collect()
    }

    pub fn stats(&self) -> CallStats {
        let mut stats = CallStats { total_calls: 0, ringing_calls: 0, active_calls: 0 };
        for record in self.calls.iter() {
            stats.total_calls += 1;
            match record.state {
                CallState::Ringing => stats.ringing_calls += 1,
                CallState::Active | CallState::Held => stats.active_calls += 1,
                _ => {}
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

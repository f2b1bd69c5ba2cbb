//! Call records and call state
//!
//! This module provides the call record structure and lightweight state
//! tracking. Records are owned exclusively by the registry and mutated only
//! through reconciliation controller operations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a call, supplied by the caller and treated as opaque
pub type CallId = String;

/// Current state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Incoming call presented, waiting for a user decision
    Ringing,
    /// Outgoing call placed, waiting for the remote side
    Dialing,
    /// Call is connected
    Active,
    /// Call is on hold
    Held,
    /// Call has ended
    Ended,
}

impl CallState {
    /// Check if the call has reached its terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended)
    }

    /// Check if the call is still waiting for a user or remote decision
    pub fn is_pending(&self) -> bool {
        matches!(self, CallState::Ringing | CallState::Dialing)
    }
}

/// Information about a tracked call
///
/// A record is removed once the call reaches [`CallState::Ended`] and its
/// terminal event has been dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Unique call identifier
    pub call_id: CallId,
    /// Display name of the remote party
    pub caller_name: String,
    /// Application-defined call type (e.g. 0 audio, 1 video); opaque to the core
    pub call_type: i32,
    /// Current state of the call
    pub state: CallState,
    /// Whether the user accepted this call at any point
    pub is_accepted: bool,
    /// Opaque application metadata carried on every event for this call
    pub extra: HashMap<String, Value>,
    /// When the call was first reported
    pub start_time: DateTime<Utc>,
}

impl CallRecord {
    /// Create a record in the given initial state, stamped now.
    pub fn new(call_id: impl Into<CallId>, caller_name: impl Into<String>, state: CallState) -> Self {
        Self {
            call_id: call_id.into(),
            caller_name: caller_name.into(),
            call_type: 0,
            state,
            is_accepted: false,
            extra: HashMap::new(),
            start_time: Utc::now(),
        }
    }

    pub fn with_call_type(mut self, call_type: i32) -> Self {
        self.call_type = call_type;
        self
    }

    pub fn with_extra(mut self, extra: HashMap<String, Value>) -> Self {
        self.extra = extra;
        self
    }
}

/// Statistics about currently tracked calls
#[derive(Debug, Clone)]
pub struct CallStats {
    pub total_calls: usize,
    pub ringing_calls: usize,
    pub active_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_is_only_ended() {
        assert!(CallState::Ended.is_terminal());
        for state in [CallState::Ringing, CallState::Dialing, CallState::Active, CallState::Held] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn record_defaults() {
        let record = CallRecord::new("c1", "Alice", CallState::Ringing);
        assert_eq!(record.call_id, "c1");
        assert!(!record.is_accepted);
        assert_eq!(record.call_type, 0);
        assert!(record.extra.is_empty());
    }
}

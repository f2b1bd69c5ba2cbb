//! Event model for the bridge core
//!
//! Events flow one way: from the native layer to the application runtime,
//! over the dispatch channel of whichever instance is currently canonical.
//! The controller builds an [`EventDraft`]; the channel stamps the
//! per-channel monotonic `event_id` and the timestamp at send time, so a
//! [`CallEvent`] is immutable once constructed and the monotonicity
//! invariant holds by construction.
//!
//! `is_user_initiated` rides on every interactive/terminal event so the
//! application layer can distinguish a native-surface tap from an
//! application-initiated termination without any cross-call mutable flag.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::call::CallId;
use crate::error::BridgeResult;

/// Kind of a call event delivered to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallEventKind {
    /// User accepted the call from the native surface
    Accepted,
    /// User declined the call from the native surface
    Declined,
    /// Call ended
    Ended,
    /// Incoming call rang out without a user decision
    TimedOut,
    /// Mute state changed
    Muted,
    /// Hold state changed
    Held,
    /// Incoming call presented
    Incoming,
    /// Incoming call ended remotely before any user decision
    Missed,
}

/// An event as built by the controller, before the channel stamps it
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub kind: CallEventKind,
    pub call_id: CallId,
    pub is_user_initiated: bool,
    pub extra: HashMap<String, Value>,
}

impl EventDraft {
    pub fn new(kind: CallEventKind, call_id: impl Into<CallId>, is_user_initiated: bool) -> Self {
        Self {
            kind,
            call_id: call_id.into(),
            is_user_initiated,
            extra: HashMap::new(),
        }
    }

    /// Draft for a user-initiated action (native-surface tap).
    pub fn user(kind: CallEventKind, call_id: impl Into<CallId>, extra: HashMap<String, Value>) -> Self {
        Self { kind, call_id: call_id.into(), is_user_initiated: true, extra }
    }

    /// Draft for a programmatic transition.
    pub fn system(kind: CallEventKind, call_id: impl Into<CallId>, extra: HashMap<String, Value>) -> Self {
        Self { kind, call_id: call_id.into(), is_user_initiated: false, extra }
    }

    pub fn with_extra(mut self, extra: HashMap<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    pub(crate) fn into_event(self, event_id: u64, timestamp: DateTime<Utc>) -> CallEvent {
        CallEvent {
            kind: self.kind,
            call_id: self.call_id,
            is_user_initiated: self.is_user_initiated,
            extra: self.extra,
            event_id,
            timestamp,
        }
    }
}

/// A stamped event. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub kind: CallEventKind,
    pub call_id: CallId,
    pub is_user_initiated: bool,
    pub extra: HashMap<String, Value>,
    /// Strictly increasing within one channel instance's lifetime
    pub event_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl CallEvent {
    /// The string-keyed event map handed to the application runtime.
    pub fn to_wire(&self) -> Value {
        json!({
            "event": self.kind,
            "callId": self.call_id,
            "isUserInitiated": self.is_user_initiated,
            "eventId": self.event_id,
            "timestamp": self.timestamp.to_rfc3339(),
            "body": self.extra,
        })
    }
}

/// Receiver side of the dispatch channel, implemented by the application
/// runtime endpoint.
///
/// Calls arrive on a single serialized execution context regardless of the
/// sending thread. Errors are logged by the channel and never escalated.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, event: CallEvent) -> BridgeResult<()>;

    async fn on_token_updated(&self, token: String) -> BridgeResult<()>;

    /// Signals that pending-event replay has completed after configure.
    async fn on_ready(&self) -> BridgeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_map_carries_required_keys() {
        let draft = EventDraft::user(CallEventKind::Declined, "c1", HashMap::new());
        let event = draft.into_event(7, Utc::now());
        let wire = event.to_wire();

        assert_eq!(wire["event"], "declined");
        assert_eq!(wire["callId"], "c1");
        assert_eq!(wire["isUserInitiated"], true);
        assert_eq!(wire["eventId"], 7);
        assert!(wire["timestamp"].is_string());
    }

    #[test]
    fn kind_serializes_camel_case() {
        assert_eq!(serde_json::to_value(CallEventKind::TimedOut).unwrap(), "timedOut");
        assert_eq!(serde_json::to_value(CallEventKind::Incoming).unwrap(), "incoming");
    }

    #[test]
    fn extra_rides_in_body() {
        let mut extra = HashMap::new();
        extra.insert("platform".to_string(), json!("android"));
        let event = EventDraft::system(CallEventKind::Ended, "c2", extra).into_event(1, Utc::now());

        assert_eq!(event.to_wire()["body"]["platform"], "android");
    }
}

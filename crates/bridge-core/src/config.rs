//! Bridge configuration and call parameters
//!
//! [`BridgeConfig`] is the payload of the `configure` command; the
//! structures mirror the camelCase wire maps the application runtime sends.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use callbridge_direct_action::BackgroundActionConfig;

use crate::call::CallId;
use crate::strategy::StrategyTable;

/// Default time an incoming call may ring without a user decision
pub const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(60);

/// Application-supplied configuration, delivered via `configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Application display name used by the platform surface
    pub app_name: String,
    /// Incoming-call ring timeout in milliseconds
    pub ring_timeout_ms: u64,
    /// Device classification table for the notification strategy
    pub strategy_table: StrategyTable,
    /// Background direct-action configuration; persisted on configure so a
    /// cold-started native layer can still perform the action
    pub background_action: Option<BackgroundActionConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            ring_timeout_ms: DEFAULT_RING_TIMEOUT.as_millis() as u64,
            strategy_table: StrategyTable::default(),
            background_action: None,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_strategy_table(mut self, table: StrategyTable) -> Self {
        self.strategy_table = table;
        self
    }

    pub fn with_background_action(mut self, action: BackgroundActionConfig) -> Self {
        self.background_action = Some(action);
        self
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_millis(self.ring_timeout_ms)
    }
}

/// Parameters for presenting an incoming or outgoing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallParams {
    /// Unique call identifier; required, validated before any state mutation
    pub call_id: CallId,
    /// Display name of the remote party
    pub caller_name: String,
    /// Application-defined call type, opaque to the core
    pub call_type: i32,
    /// Opaque metadata echoed back on every event for this call
    pub extra: HashMap<String, Value>,
    /// Per-call override of the configured ring timeout, in milliseconds
    pub ring_timeout_ms: Option<u64>,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            call_id: String::new(),
            caller_name: String::new(),
            call_type: 0,
            extra: HashMap::new(),
            ring_timeout_ms: None,
        }
    }
}

impl CallParams {
    pub fn new(call_id: impl Into<CallId>, caller_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            caller_name: caller_name.into(),
            ..Default::default()
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

    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

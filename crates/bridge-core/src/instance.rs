//! Application-runtime instance endpoints
//!
//! A [`BridgeInstance`] is one attached application-runtime endpoint: its
//! dispatch channel plus the command entry point. Several instances may be
//! alive at once (startup handshake racing an asynchronous wakeup); the
//! arbiter decides which one owns event routing.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::arbiter::{InstanceHandle, InstanceId};
use crate::channel::EventChannel;
use crate::command::Command;
use crate::controller::ReconciliationController;
use crate::error::{BridgeError, BridgeResult};
use crate::events::EventSink;

/// One attached application-runtime endpoint.
pub struct BridgeInstance {
    handle: Arc<InstanceHandle>,
    controller: Arc<ReconciliationController>,
}

impl BridgeInstance {
    /// Create an instance, spawn its channel and offer it to the arbiter.
    pub fn attach(controller: Arc<ReconciliationController>) -> Arc<Self> {
        let id = Uuid::new_v4();
        let channel = EventChannel::new(id);
        let handle = Arc::new(InstanceHandle::new(id, channel));
        let canonical = controller.arbiter().attach(handle.clone());
        info!(instance_id = %id, canonical, "bridge instance attached");
        Arc::new(Self { handle, controller })
    }

    pub fn id(&self) -> InstanceId {
        self.handle.id()
    }

    /// Whether this instance currently owns event routing.
    pub fn is_canonical(&self) -> bool {
        self.controller
            .arbiter()
            .current()
            .map(|current| current.id() == self.handle.id())
            .unwrap_or(false)
    }

    /// Attach the application-side event receiver for this instance.
    pub fn set_sink(&self, sink: Arc<dyn EventSink>) {
        self.handle.channel().attach_sink(sink);
    }

    pub fn clear_sink(&self) {
        self.handle.channel().detach_sink();
    }

    /// Parse and execute one inbound command.
    ///
    /// Malformed commands are rejected with a structured error before any
    /// state mutation; effect-only commands reply with `null`.
    pub async fn handle_command(&self, method: &str, args: Value) -> BridgeResult<Value> {
        let command = Command::parse(method, args)?;
        debug!(instance_id = %self.handle.id(), method, "command received");

        match command {
            Command::Configure(config) => {
                self.controller.handle_configure(self.handle.clone(), config).await?;
                Ok(Value::Null)
            }
            Command::ShowIncomingCall(params) => {
                self.controller.report_incoming_call(params).await?;
                Ok(Value::Null)
            }
            Command::ShowOutgoingCall(params) => {
                self.controller.report_outgoing_call(params).await?;
                Ok(Value::Null)
            }
            Command::EndCall { call_id } => {
                self.controller.on_programmatic_end(&call_id).await?;
                Ok(Value::Null)
            }
            Command::EndAllCalls => {
                self.controller.end_all_calls().await?;
                Ok(Value::Null)
            }
            Command::SetCallConnected { call_id } => {
                self.controller.set_call_connected(&call_id).await?;
                Ok(Value::Null)
            }
            Command::GetActiveCalls => {
                let calls = self.controller.active_calls();
                serde_json::to_value(calls)
                    .map_err(|e| BridgeError::internal(format!("encode active calls: {}", e)))
            }
            Command::CheckPermissions => {
                Ok(Value::Bool(self.controller.check_permissions().await?))
            }
            Command::RequestPermissions => {
                Ok(Value::Bool(self.controller.request_permissions().await?))
            }
            Command::GetToken => Ok(Value::String(self.controller.push_token().await?)),
            Command::MuteCall { call_id, muted } => {
                self.controller.mute_call(&call_id, muted).await?;
                Ok(Value::Null)
            }
            Command::HoldCall { call_id, held } => {
                self.controller.hold_call(&call_id, held).await?;
                Ok(Value::Null)
            }
            Command::Dispose => {
                self.detach();
                Ok(Value::Null)
            }
        }
    }

    /// Release the arbiter slot (if owned) and stop the channel.
    pub fn detach(&self) {
        let released = self.controller.arbiter().detach(self.handle.id());
        self.handle.channel().close();
        info!(instance_id = %self.handle.id(), released, "bridge instance detached");
    }
}

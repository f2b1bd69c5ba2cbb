//! Platform call-UI capability set
//!
//! The native callback surfaces (telephony framework, notification
//! receiver, platform call UI) are modeled as one polymorphic capability
//! set implemented by whichever platform integration is compiled in; the
//! core never inspects which concrete integration is active.

use async_trait::async_trait;

use crate::config::CallParams;
use crate::error::BridgeResult;
use crate::strategy::NotificationStrategy;

/// Operations the core requires from the platform call-UI integration.
///
/// Best-effort paths in the controller log and continue on surface errors;
/// command-driven queries propagate them to the caller.
#[async_trait]
pub trait CallUiSurface: Send + Sync {
    /// Present the incoming-call UI using the selected strategy.
    async fn show_incoming_call(&self, params: &CallParams, strategy: NotificationStrategy) -> BridgeResult<()>;

    /// Present the outgoing-call UI.
    async fn show_outgoing_call(&self, params: &CallParams) -> BridgeResult<()>;

    /// Tear down any call UI for this call.
    async fn end_call(&self, call_id: &str) -> BridgeResult<()>;

    /// Reflect the connected state in the call UI.
    async fn set_connected(&self, call_id: &str) -> BridgeResult<()>;

    /// Bring the application to the foreground.
    async fn bring_to_foreground(&self) -> BridgeResult<()>;

    /// Reflect the mute state in the call UI.
    async fn set_muted(&self, call_id: &str, muted: bool) -> BridgeResult<()>;

    /// Reflect the hold state in the call UI.
    async fn set_on_hold(&self, call_id: &str, held: bool) -> BridgeResult<()>;

    /// Whether the notification/call-UI permissions are granted.
    async fn check_permissions(&self) -> BridgeResult<bool>;

    /// Request the notification/call-UI permissions from the user.
    async fn request_permissions(&self) -> BridgeResult<bool>;

    /// The device push token used to wake the application.
    async fn push_token(&self) -> BridgeResult<String>;
}

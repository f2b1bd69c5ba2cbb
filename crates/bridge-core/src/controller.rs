//! Reconciliation controller
//!
//! The core's entry point: a per-call state machine over the registry plus
//! the two global flags `configured` and `ready`. User actions arriving
//! while no application listener is reachable are made durable (pending
//! store) and, for declines, mirrored to the backend by the background
//! direct action; once an application instance configures, pending actions
//! are replayed in a fixed order and the instance is signalled ready.
//!
//! The one invariant this type must never violate: a user-initiated
//! accept/decline is never lost without at least one pending-store write
//! attempt having been made.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use callbridge_direct_action::{ActionConfigStore, DirectActionExecutor, SecretStore};

use crate::arbiter::{InstanceArbiter, InstanceHandle};
use crate::call::{CallRecord, CallState, CallStats};
use crate::config::{BridgeConfig, CallParams};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{CallEventKind, EventDraft};
use crate::registry::CallRegistry;
use crate::ring::RingFeedback;
use crate::store::PendingStore;
use crate::strategy::DeviceProfile;
use crate::surface::CallUiSurface;

/// Orchestrates registry, arbiter, durability and dispatch.
///
/// One controller exists per process; instances ([`crate::instance::BridgeInstance`])
/// share it. Entry points may be invoked concurrently from any execution
/// context.
pub struct ReconciliationController {
    registry: CallRegistry,
    arbiter: Arc<InstanceArbiter>,
    store: PendingStore,
    ring: Arc<RingFeedback>,
    surface: Arc<dyn CallUiSurface>,
    executor: DirectActionExecutor,
    action_store: ActionConfigStore,
    config: RwLock<BridgeConfig>,
    device: DeviceProfile,
    configured: AtomicBool,
    ready: AtomicBool,
    /// Serializes "persist if unconfigured" against "set configured and
    /// replay", closing the window where a user action saved between the
    /// two halves of configure would sit unobserved until the next launch.
    replay_gate: Mutex<()>,
}

impl ReconciliationController {
    /// Create a controller rooted at `data_dir` (pending slots, credentials
    /// and the persisted direct-action config live underneath it).
    pub fn new(
        data_dir: impl Into<PathBuf>,
        device: DeviceProfile,
        surface: Arc<dyn CallUiSurface>,
    ) -> BridgeResult<Arc<Self>> {
        let data_dir = data_dir.into();
        let store = PendingStore::new(data_dir.join("pending"))?;
        let secrets = SecretStore::new(data_dir.join("credentials"))
            .map_err(|e| BridgeError::store(e.to_string()))?;
        let action_store = ActionConfigStore::new(data_dir.join("config"))
            .map_err(|e| BridgeError::store(e.to_string()))?;
        let executor = DirectActionExecutor::new(secrets)
            .map_err(|e| BridgeError::internal(format!("http client: {}", e)))?;

        Ok(Arc::new(Self {
            registry: CallRegistry::new(),
            arbiter: Arc::new(InstanceArbiter::new()),
            store,
            ring: Arc::new(RingFeedback::new()),
            surface,
            executor,
            action_store,
            config: RwLock::new(BridgeConfig::default()),
            device,
            configured: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            replay_gate: Mutex::new(()),
        }))
    }

    pub(crate) fn arbiter(&self) -> &Arc<InstanceArbiter> {
        &self.arbiter
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn active_calls(&self) -> Vec<CallRecord> {
        self.registry.active_calls()
    }

    pub fn stats(&self) -> CallStats {
        self.registry.stats()
    }

    /// Present an incoming call: track it, start ring feedback, announce it
    /// and arm the ring-timeout watchdog.
    pub async fn report_incoming_call(&self, params: CallParams) -> BridgeResult<()> {
        info!(call_id = %params.call_id, caller = %params.caller_name, "incoming call reported");

        let record = CallRecord::new(&params.call_id, &params.caller_name, CallState::Ringing)
            .with_call_type(params.call_type)
            .with_extra(params.extra.clone());
        self.registry.upsert(record);
        self.ring.start(&params.call_id);

        self.dispatch(EventDraft::system(
            CallEventKind::Incoming,
            &params.call_id,
            params.extra.clone(),
        ));

        let strategy = self.config.read().strategy_table.select(&self.device);
        if let Err(e) = self.surface.show_incoming_call(&params, strategy).await {
            warn!(call_id = %params.call_id, error = %e, "failed to present incoming call");
        }

        self.spawn_ring_watchdog(&params);
        Ok(())
    }

    /// Track an outgoing call and present its UI.
    pub async fn report_outgoing_call(&self, params: CallParams) -> BridgeResult<()> {
        info!(call_id = %params.call_id, callee = %params.caller_name, "outgoing call reported");

        let record = CallRecord::new(&params.call_id, &params.caller_name, CallState::Dialing)
            .with_call_type(params.call_type)
            .with_extra(params.extra.clone());
        self.registry.upsert(record);

        if let Err(e) = self.surface.show_outgoing_call(&params).await {
            warn!(call_id = %params.call_id, error = %e, "failed to present outgoing call");
        }
        Ok(())
    }

    /// User accepted from the native surface.
    ///
    /// `fallback_extra` is used when the registry has no record for the
    /// call, e.g. a notification action firing after a cold start.
    pub async fn on_user_accept(
        &self,
        call_id: &str,
        fallback_extra: HashMap<String, Value>,
    ) -> BridgeResult<()> {
        info!(call_id = %call_id, "user accepted call");

        let extra = match self.registry.get(call_id) {
            Some(record) => record.extra,
            None => {
                debug!(call_id = %call_id, "accept for untracked call, using fallback metadata");
                fallback_extra
            }
        };
        let _ = self.registry.update_state(call_id, CallState::Active, Some(true));
        self.ring.stop_for(call_id);

        {
            let _gate = self.replay_gate.lock();
            if self.configured.load(Ordering::SeqCst) {
                self.dispatch(EventDraft::user(CallEventKind::Accepted, call_id, extra));
            } else if let Err(e) = self.store.save_accept(call_id, extra) {
                error!(call_id = %call_id, error = %e, "failed to persist pending accept");
            }
        }

        if let Err(e) = self.surface.bring_to_foreground().await {
            warn!(call_id = %call_id, error = %e, "failed to foreground application");
        }
        Ok(())
    }

    /// User declined from the native surface.
    ///
    /// The decline event is always dispatched best-effort: a not-yet
    /// canonical secondary instance may still have a live listener. When no
    /// instance has configured, the decline is additionally persisted and
    /// the background direct action fires so the remote side effect happens
    /// even if no listener ever attaches.
    pub async fn on_user_decline(
        &self,
        call_id: &str,
        fallback_extra: HashMap<String, Value>,
    ) -> BridgeResult<()> {
        info!(call_id = %call_id, "user declined call");

        let extra = match self.registry.get(call_id) {
            Some(record) => record.extra,
            None => {
                debug!(call_id = %call_id, "decline for untracked call, using fallback metadata");
                fallback_extra
            }
        };
        let _ = self.registry.update_state(call_id, CallState::Ended, None);
        self.ring.stop_for(call_id);

        let run_fallback = {
            let _gate = self.replay_gate.lock();
            self.dispatch(EventDraft::user(CallEventKind::Declined, call_id, extra.clone()));
            if self.configured.load(Ordering::SeqCst) {
                false
            } else {
                if let Err(e) = self.store.save_decline(call_id, extra.clone()) {
                    error!(call_id = %call_id, error = %e, "failed to persist pending decline");
                }
                true
            }
        };
        if run_fallback {
            self.spawn_direct_action(call_id, &extra);
        }

        self.registry.remove(call_id);
        if let Err(e) = self.surface.end_call(call_id).await {
            warn!(call_id = %call_id, error = %e, "failed to dismiss call surface");
        }
        Ok(())
    }

    /// The application runtime configured: persist the action config, make
    /// the configuring instance canonical, replay pending actions (accept
    /// before decline) and signal readiness.
    pub async fn handle_configure(
        &self,
        handle: Arc<InstanceHandle>,
        config: BridgeConfig,
    ) -> BridgeResult<()> {
        info!(instance_id = %handle.id(), app = %config.app_name, "configure received");

        if let Some(action) = &config.background_action {
            self.action_store
                .save(action)
                .map_err(|e| BridgeError::store(e.to_string()))?;
        }
        *self.config.write() = config;

        let (pending_accept, pending_decline) = {
            let _gate = self.replay_gate.lock();
            self.configured.store(true, Ordering::SeqCst);
            self.arbiter.configure(handle.clone());
            (self.store.consume_accept(), self.store.consume_decline())
        };

        // Fixed replay order: an in-flight accept takes priority over a
        // stale decline.
        if let Some(pending) = pending_accept {
            info!(call_id = %pending.call_id, "replaying pending accept");
            handle
                .channel()
                .send(EventDraft::user(CallEventKind::Accepted, pending.call_id, pending.extra));
        }
        if let Some(pending) = pending_decline {
            info!(call_id = %pending.call_id, "replaying pending decline");
            handle
                .channel()
                .send(EventDraft::user(CallEventKind::Declined, pending.call_id, pending.extra));
        }

        handle.channel().send_ready();
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Application- or remote-initiated end of a call.
    ///
    /// A never-accepted ringing call ends as `Missed`; anything else ends
    /// as `Ended`. Ending an untracked call is a no-op.
    pub async fn on_programmatic_end(&self, call_id: &str) -> BridgeResult<()> {
        let Some(record) = self.registry.remove(call_id) else {
            debug!(call_id = %call_id, "end for untracked call ignored");
            return Ok(());
        };
        self.ring.stop_for(call_id);

        let kind = if record.state == CallState::Ringing && !record.is_accepted {
            CallEventKind::Missed
        } else {
            CallEventKind::Ended
        };
        info!(call_id = %call_id, event = ?kind, "call ended programmatically");
        self.dispatch(EventDraft::system(kind, call_id, record.extra));

        if let Err(e) = self.surface.end_call(call_id).await {
            warn!(call_id = %call_id, error = %e, "failed to dismiss call surface");
        }
        Ok(())
    }

    /// End every tracked call.
    pub async fn end_all_calls(&self) -> BridgeResult<()> {
        self.ring.stop();
        for record in self.registry.remove_all() {
            let kind = if record.state == CallState::Ringing && !record.is_accepted {
                CallEventKind::Missed
            } else {
                CallEventKind::Ended
            };
            self.dispatch(EventDraft::system(kind, &record.call_id, record.extra));
            if let Err(e) = self.surface.end_call(&record.call_id).await {
                warn!(call_id = %record.call_id, error = %e, "failed to dismiss call surface");
            }
        }
        Ok(())
    }

    /// The call connected end-to-end.
    pub async fn set_call_connected(&self, call_id: &str) -> BridgeResult<()> {
        self.registry.update_state(call_id, CallState::Active, None)?;
        self.ring.stop_for(call_id);
        if let Err(e) = self.surface.set_connected(call_id).await {
            warn!(call_id = %call_id, error = %e, "failed to reflect connected state");
        }
        Ok(())
    }

    /// Change the mute state of a connected call.
    pub async fn mute_call(&self, call_id: &str, muted: bool) -> BridgeResult<()> {
        if self.registry.get(call_id).is_none() {
            return Err(BridgeError::call_not_found(call_id));
        }
        let mut extra = HashMap::new();
        extra.insert("isMuted".to_string(), Value::Bool(muted));
        self.dispatch(EventDraft::system(CallEventKind::Muted, call_id, extra));
        if let Err(e) = self.surface.set_muted(call_id, muted).await {
            warn!(call_id = %call_id, error = %e, "failed to reflect mute state");
        }
        Ok(())
    }

    /// Change the hold state of a connected call.
    pub async fn hold_call(&self, call_id: &str, held: bool) -> BridgeResult<()> {
        let new_state = if held { CallState::Held } else { CallState::Active };
        self.registry.update_state(call_id, new_state, None)?;
        let mut extra = HashMap::new();
        extra.insert("isOnHold".to_string(), Value::Bool(held));
        self.dispatch(EventDraft::system(CallEventKind::Held, call_id, extra));
        if let Err(e) = self.surface.set_on_hold(call_id, held).await {
            warn!(call_id = %call_id, error = %e, "failed to reflect hold state");
        }
        Ok(())
    }

    // Consumed platform callbacks.

    pub async fn on_answer(&self, call_id: &str) -> BridgeResult<()> {
        self.on_user_accept(call_id, HashMap::new()).await
    }

    pub async fn on_reject(&self, call_id: &str) -> BridgeResult<()> {
        self.on_user_decline(call_id, HashMap::new()).await
    }

    pub async fn on_disconnect(&self, call_id: &str) -> BridgeResult<()> {
        self.on_programmatic_end(call_id).await
    }

    /// Notification action-receiver entry point.
    pub async fn on_action_tapped(
        &self,
        action: &str,
        call_id: &str,
        extra: HashMap<String, Value>,
    ) -> BridgeResult<()> {
        match action {
            "ACCEPT" => self.on_user_accept(call_id, extra).await,
            "DECLINE" => self.on_user_decline(call_id, extra).await,
            other => Err(BridgeError::invalid_command(format!("unknown action '{}'", other))),
        }
    }

    // Platform passthroughs.

    pub async fn check_permissions(&self) -> BridgeResult<bool> {
        self.surface.check_permissions().await
    }

    pub async fn request_permissions(&self) -> BridgeResult<bool> {
        self.surface.request_permissions().await
    }

    pub async fn push_token(&self) -> BridgeResult<String> {
        self.surface.push_token().await
    }

    /// Forward a rotated push token to the canonical instance.
    pub fn notify_token_updated(&self, token: String) {
        match self.arbiter.current() {
            Some(handle) => handle.channel().send_token(token),
            None => warn!("push token updated with no live instance, dropping"),
        }
    }

    /// Route an event to the canonical instance's channel.
    fn dispatch(&self, draft: EventDraft) {
        dispatch_via(&self.arbiter, draft);
    }

    fn spawn_direct_action(&self, call_id: &str, extra: &HashMap<String, Value>) {
        let config = match self.action_store.load() {
            Ok(Some(config)) => config,
            Ok(None) => {
                info!(call_id = %call_id, "no direct action configured, relying on pending store");
                return;
            }
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "failed to load direct action config");
                return;
            }
        };

        let metadata = flatten_metadata(call_id, extra);
        let executor = self.executor.clone();
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            match executor.execute(&config, &metadata).await {
                Ok(()) => info!(call_id = %call_id, "background decline action completed"),
                Err(e) => warn!(
                    call_id = %call_id,
                    error = %e,
                    category = e.category(),
                    "background decline action failed, pending store remains"
                ),
            }
        });
    }

    fn spawn_ring_watchdog(&self, params: &CallParams) {
        let timeout = params
            .ring_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.read().ring_timeout());

        let call_id = params.call_id.clone();
        let registry = self.registry.clone();
        let ring = self.ring.clone();
        let arbiter = self.arbiter.clone();
        let surface = self.surface.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            // A user decision that landed first wins; only a still-ringing
            // call times out.
            let Some(record) = registry.remove_if_state(&call_id, CallState::Ringing) else {
                return;
            };
            info!(call_id = %call_id, "incoming call rang out");
            ring.stop_for(&call_id);
            dispatch_via(
                &arbiter,
                EventDraft::system(CallEventKind::TimedOut, &call_id, record.extra),
            );
            if let Err(e) = surface.end_call(&call_id).await {
                warn!(call_id = %call_id, error = %e, "failed to dismiss rang-out call");
            }
        });
    }
}

fn dispatch_via(arbiter: &InstanceArbiter, draft: EventDraft) {
    match arbiter.current() {
        Some(handle) => handle.channel().send(draft),
        None => debug!(
            call_id = %draft.call_id,
            event = ?draft.kind,
            "no live instance, dropping event"
        ),
    }
}

/// Flat string view of a call's metadata for template resolution.
fn flatten_metadata(call_id: &str, extra: &HashMap<String, Value>) -> HashMap<String, String> {
    let mut metadata = HashMap::with_capacity(extra.len() + 1);
    for (key, value) in extra {
        let flat = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        metadata.insert(key.clone(), flat);
    }
    metadata.insert("callId".to_string(), call_id.to_string());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PendingKind, DECLINE_SLOT};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;

    struct QuietSurface;

    #[async_trait]
    impl CallUiSurface for QuietSurface {
        async fn show_incoming_call(
            &self,
            _params: &CallParams,
            _strategy: crate::strategy::NotificationStrategy,
        ) -> BridgeResult<()> {
            Ok(())
        }
        async fn show_outgoing_call(&self, _params: &CallParams) -> BridgeResult<()> {
            Ok(())
        }
        async fn end_call(&self, _call_id: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn set_connected(&self, _call_id: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn bring_to_foreground(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn set_muted(&self, _call_id: &str, _muted: bool) -> BridgeResult<()> {
            Ok(())
        }
        async fn set_on_hold(&self, _call_id: &str, _held: bool) -> BridgeResult<()> {
            Ok(())
        }
        async fn check_permissions(&self) -> BridgeResult<bool> {
            Ok(true)
        }
        async fn request_permissions(&self) -> BridgeResult<bool> {
            Ok(true)
        }
        async fn push_token(&self) -> BridgeResult<String> {
            Ok("test-token".to_string())
        }
    }

    fn controller(dir: &std::path::Path) -> Arc<ReconciliationController> {
        ReconciliationController::new(dir, DeviceProfile::default(), Arc::new(QuietSurface)).unwrap()
    }

    #[tokio::test]
    async fn accept_before_configure_is_persisted() {
        let dir = tempdir().unwrap();
        let controller = controller(dir.path());

        controller
            .report_incoming_call(CallParams::new("c1", "Alice"))
            .await
            .unwrap();
        controller.on_user_accept("c1", HashMap::new()).await.unwrap();

        let pending = controller.store.consume_accept().unwrap();
        assert_eq!(pending.call_id, "c1");
        assert_eq!(pending.kind, PendingKind::Accept);
    }

    #[tokio::test]
    async fn decline_before_configure_is_persisted_and_removes_call() {
        let dir = tempdir().unwrap();
        let controller = controller(dir.path());

        controller
            .report_incoming_call(CallParams::new("c1", "Alice"))
            .await
            .unwrap();
        controller.on_user_decline("c1", HashMap::new()).await.unwrap();

        assert!(controller.registry.get("c1").is_none());
        assert!(dir.path().join("pending").join(DECLINE_SLOT).exists());
    }

    #[tokio::test]
    async fn accept_uses_record_extra_over_fallback() {
        let dir = tempdir().unwrap();
        let controller = controller(dir.path());

        let mut extra = HashMap::new();
        extra.insert("tenant".to_string(), json!("acme"));
        controller
            .report_incoming_call(CallParams::new("c1", "Alice").with_extra(extra))
            .await
            .unwrap();

        let mut fallback = HashMap::new();
        fallback.insert("tenant".to_string(), json!("wrong"));
        controller.on_user_accept("c1", fallback).await.unwrap();

        let pending = controller.store.consume_accept().unwrap();
        assert_eq!(pending.extra["tenant"], json!("acme"));
    }

    #[tokio::test]
    async fn accept_marks_record_active_and_accepted() {
        let dir = tempdir().unwrap();
        let controller = controller(dir.path());

        controller
            .report_incoming_call(CallParams::new("c1", "Alice"))
            .await
            .unwrap();
        controller.on_user_accept("c1", HashMap::new()).await.unwrap();

        let record = controller.registry.get("c1").unwrap();
        assert_eq!(record.state, CallState::Active);
        assert!(record.is_accepted);
        assert!(!controller.ring.is_ringing());
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let dir = tempdir().unwrap();
        let controller = controller(dir.path());

        let err = controller
            .on_action_tapped("EXPLODE", "c1", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidCommand { .. }));
    }

    #[tokio::test]
    async fn hold_and_connected_track_state() {
        let dir = tempdir().unwrap();
        let controller = controller(dir.path());

        controller
            .report_outgoing_call(CallParams::new("c1", "Bob"))
            .await
            .unwrap();
        controller.set_call_connected("c1").await.unwrap();
        assert_eq!(controller.registry.get("c1").unwrap().state, CallState::Active);

        controller.hold_call("c1", true).await.unwrap();
        assert_eq!(controller.registry.get("c1").unwrap().state, CallState::Held);

        controller.hold_call("c1", false).await.unwrap();
        assert_eq!(controller.registry.get("c1").unwrap().state, CallState::Active);
    }

    #[tokio::test]
    async fn operations_on_unknown_calls_error_where_commanded() {
        let dir = tempdir().unwrap();
        let controller = controller(dir.path());

        assert!(matches!(
            controller.set_call_connected("nope").await.unwrap_err(),
            BridgeError::CallNotFound { .. }
        ));
        assert!(matches!(
            controller.mute_call("nope", true).await.unwrap_err(),
            BridgeError::CallNotFound { .. }
        ));
        // Programmatic end of an unknown call is idempotent.
        controller.on_programmatic_end("nope").await.unwrap();
    }

    #[test]
    fn flatten_metadata_stringifies_values() {
        let mut extra = HashMap::new();
        extra.insert("name".to_string(), json!("Alice"));
        extra.insert("attempt".to_string(), json!(3));

        let flat = flatten_metadata("c1", &extra);
        assert_eq!(flat["callId"], "c1");
        assert_eq!(flat["name"], "Alice");
        assert_eq!(flat["attempt"], "3");
    }
}

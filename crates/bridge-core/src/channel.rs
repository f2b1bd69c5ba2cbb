//! Event dispatch channel
//!
//! One channel per application-runtime instance, carrying both replayed and
//! live events plus the `ready` and token signals. A single channel is used
//! deliberately instead of a second independently-lifecycled event stream,
//! whose subscriber registration can race with delivery and silently drop
//! messages.
//!
//! Senders may originate from any thread; delivery happens on one dedicated
//! task in enqueue order, because the consuming presentation layer requires
//! single-threaded affinity for inbound calls. `send` always attempts
//! delivery regardless of readiness - callers decide separately whether to
//! also persist to the pending store. A failed delivery is logged and
//! dropped, never escalated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::arbiter::InstanceId;
use crate::events::{CallEvent, EventDraft, EventSink};

enum Outbound {
    Event(CallEvent),
    TokenUpdated(String),
    Ready,
    Shutdown,
}

type SinkSlot = Arc<RwLock<Option<Arc<dyn EventSink>>>>;

/// Bidirectional transport endpoint for one instance.
///
/// The outbound half lives here; the inbound (command) half is routed
/// through [`crate::instance::BridgeInstance::handle_command`].
pub struct EventChannel {
    instance_id: InstanceId,
    next_event_id: AtomicU64,
    tx: mpsc::UnboundedSender<Outbound>,
    sink: SinkSlot,
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("instance_id", &self.instance_id)
            .field("next_event_id", &self.next_event_id)
            .finish()
    }
}

impl EventChannel {
    /// Create the channel and spawn its delivery task.
    pub fn new(instance_id: InstanceId) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: SinkSlot = Arc::new(RwLock::new(None));

        tokio::spawn(deliver(instance_id, rx, sink.clone()));

        Arc::new(Self {
            instance_id,
            next_event_id: AtomicU64::new(0),
            tx,
            sink,
        })
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Attach the application-side receiver. Replaces any previous one.
    pub fn attach_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write() = Some(sink);
        debug!(instance_id = %self.instance_id, "event sink attached");
    }

    pub fn detach_sink(&self) {
        *self.sink.write() = None;
        debug!(instance_id = %self.instance_id, "event sink detached");
    }

    /// Stamp and enqueue an event. Never blocks, never errors.
    ///
    /// The event id is taken from this channel's strictly increasing counter
    /// at send time.
    pub fn send(&self, draft: EventDraft) {
        let event_id = self.next_event_id.fetch_add(1, Ordering::SeqCst) + 1;
        let event = draft.into_event(event_id, Utc::now());
        let kind = event.kind;
        let call_id = event.call_id.clone();
        if self.tx.send(Outbound::Event(event)).is_err() {
            warn!(
                instance_id = %self.instance_id,
                call_id = %call_id,
                event = ?kind,
                "dispatch channel closed, dropping event"
            );
        }
    }

    /// Signal that pending-event replay has completed.
    pub fn send_ready(&self) {
        if self.tx.send(Outbound::Ready).is_err() {
            warn!(instance_id = %self.instance_id, "dispatch channel closed, dropping ready signal");
        }
    }

    /// Forward a push-token update.
    pub fn send_token(&self, token: String) {
        if self.tx.send(Outbound::TokenUpdated(token)).is_err() {
            warn!(instance_id = %self.instance_id, "dispatch channel closed, dropping token update");
        }
    }

    /// Stop the delivery task and detach the sink.
    pub fn close(&self) {
        self.detach_sink();
        let _ = self.tx.send(Outbound::Shutdown);
    }
}

async fn deliver(
    instance_id: InstanceId,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    sink_slot: SinkSlot,
) {
    while let Some(outbound) = rx.recv().await {
        if matches!(outbound, Outbound::Shutdown) {
            break;
        }

        let sink = sink_slot.read().clone();
        let Some(sink) = sink else {
            match &outbound {
                Outbound::Event(event) => warn!(
                    instance_id = %instance_id,
                    call_id = %event.call_id,
                    event = ?event.kind,
                    "no event sink attached, dropping event"
                ),
                _ => warn!(instance_id = %instance_id, "no event sink attached, dropping signal"),
            }
            continue;
        };

        let result = match outbound {
            Outbound::Event(event) => {
                let call_id = event.call_id.clone();
                let kind = event.kind;
                sink.on_event(event)
                    .await
                    .map_err(|e| (e, format!("event {:?} for call {}", kind, call_id)))
            }
            Outbound::TokenUpdated(token) => {
                sink.on_token_updated(token).await.map_err(|e| (e, "token update".to_string()))
            }
            Outbound::Ready => sink.on_ready().await.map_err(|e| (e, "ready signal".to_string())),
            Outbound::Shutdown => unreachable!(),
        };

        // A dropped live event is recoverable through the pending store or a
        // later user action; it must never take the native layer down.
        if let Err((error, context)) = result {
            warn!(
                instance_id = %instance_id,
                error = %error,
                "delivery of {} failed, dropping", context
            );
        }
    }
    debug!(instance_id = %instance_id, "delivery task stopped");
}

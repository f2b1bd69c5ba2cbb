//! Callbridge-core: call event reconciliation between a native call
//! subsystem and an application runtime
//!
//! The application runtime consuming call events may not be running yet,
//! may exist as more than one concurrent instance, or may be killed
//! entirely between a user action and its delivery. This crate delivers
//! user-triggered interaction events (accept/decline/end) across that gap
//! by combining:
//!
//! - an in-memory call registry,
//! - a durable pending-event store that survives process death,
//! - single-writer instance arbitration with reclaim-on-configure,
//! - a per-instance dispatch channel with serialized delivery and
//!   monotonic event ids,
//! - a reconciliation controller replaying pending actions once the
//!   runtime signals readiness.
//!
//! ## Proper Layer Separation
//! ```text
//! bridge-core -> direct-action
//! ```
//!
//! The remote side effect for declines with no reachable listener is
//! delegated to `callbridge-direct-action`; platform call-UI integration is
//! injected behind [`CallUiSurface`].

pub mod arbiter;
pub mod call;
pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod instance;
pub mod registry;
pub mod ring;
pub mod store;
pub mod strategy;
pub mod surface;

// Public API exports
pub use arbiter::{InstanceArbiter, InstanceHandle, InstanceId};
pub use call::{CallId, CallRecord, CallState, CallStats};
pub use channel::EventChannel;
pub use command::Command;
pub use config::{BridgeConfig, CallParams, DEFAULT_RING_TIMEOUT};
pub use controller::ReconciliationController;
pub use error::{BridgeError, BridgeResult};
pub use events::{CallEvent, CallEventKind, EventDraft, EventSink};
pub use instance::BridgeInstance;
pub use registry::CallRegistry;
pub use ring::RingFeedback;
pub use store::{PendingEvent, PendingKind, PendingStore, PENDING_TTL};
pub use strategy::{DeviceProfile, NotificationStrategy, StrategyRule, StrategyTable};
pub use surface::CallUiSurface;

// Re-export the direct-action types applications configure (for convenience)
pub use callbridge_direct_action::{BackgroundActionConfig, RefreshConfig};

/// Bridge-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

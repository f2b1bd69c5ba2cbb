//! Instance arbitration
//!
//! More than one application-runtime instance can be alive at once: an
//! asynchronous wakeup (e.g. a push delivery) may spin up a second instance
//! before the primary finishes its startup handshake. Exactly one instance
//! may own event routing, so the arbiter holds a single canonical
//! [`InstanceHandle`] behind a versioned slot and resolves the race
//! structurally:
//!
//! - a newly attached instance becomes canonical only if no canonical
//!   instance exists yet, or the existing one has not configured;
//! - configuring an instance unconditionally reclaims canonicity, because
//!   only the true application entry point ever configures.
//!
//! Without the reclaim, the secondary instance would permanently own event
//! routing and silently blackhole every future user action.
//!
//! State walk: `Unset -> Tentative(A) -> [B attaches, A unconfigured] ->
//! Tentative(B) -> [A configures] -> Canonical(A) -> [A detaches] -> Unset`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::channel::EventChannel;

/// Opaque identity of one application-runtime instance
pub type InstanceId = Uuid;

/// One live application-runtime endpoint: identity, configured flag and its
/// dispatch channel.
#[derive(Debug)]
pub struct InstanceHandle {
    id: InstanceId,
    configured: AtomicBool,
    channel: Arc<EventChannel>,
}

impl InstanceHandle {
    pub fn new(id: InstanceId, channel: Arc<EventChannel>) -> Self {
        Self { id, configured: AtomicBool::new(false), channel }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    fn mark_configured(&self) {
        self.configured.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Slot {
    epoch: u64,
    current: Option<Arc<InstanceHandle>>,
}

/// Single-writer election among concurrently live instances.
///
/// Every transition is one atomic conditional update of a versioned
/// reference under a narrow lock; the lock is never held across I/O.
#[derive(Default)]
pub struct InstanceArbiter {
    slot: Mutex<Slot>,
}

impl InstanceArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a newly created instance. Returns whether it became canonical.
    pub fn attach(&self, handle: Arc<InstanceHandle>) -> bool {
        let mut slot = self.slot.lock();
        let claim = match &slot.current {
            None => true,
            Some(current) => !current.is_configured(),
        };
        if claim {
            slot.epoch += 1;
            debug!(
                instance_id = %handle.id(),
                epoch = slot.epoch,
                replaced = slot.current.is_some(),
                "instance attached as canonical"
            );
            slot.current = Some(handle);
        } else {
            debug!(instance_id = %handle.id(), "instance attached as secondary");
        }
        claim
    }

    /// Mark the instance configured and unconditionally reclaim canonicity.
    pub fn configure(&self, handle: Arc<InstanceHandle>) {
        handle.mark_configured();
        let mut slot = self.slot.lock();
        slot.epoch += 1;
        info!(instance_id = %handle.id(), epoch = slot.epoch, "configured instance reclaimed canonicity");
        slot.current = Some(handle);
    }

    /// Release canonicity if `id` still holds it. Returns whether it did.
    pub fn detach(&self, id: InstanceId) -> bool {
        let mut slot = self.slot.lock();
        match &slot.current {
            Some(current) if current.id() == id => {
                slot.epoch += 1;
                slot.current = None;
                debug!(instance_id = %id, epoch = slot.epoch, "canonical instance detached");
                true
            }
            _ => {
                debug!(instance_id = %id, "non-canonical instance detached");
                false
            }
        }
    }

    /// The currently canonical instance, if any.
    pub fn current(&self) -> Option<Arc<InstanceHandle>> {
        self.slot.lock().current.clone()
    }

    /// Version of the slot; bumps on every ownership change.
    pub fn epoch(&self) -> u64 {
        self.slot.lock().epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> Arc<InstanceHandle> {
        let id = Uuid::new_v4();
        Arc::new(InstanceHandle::new(id, EventChannel::new(id)))
    }

    #[tokio::test]
    async fn first_attach_is_canonical() {
        let arbiter = InstanceArbiter::new();
        let a = handle();
        assert!(arbiter.attach(a.clone()));
        assert_eq!(arbiter.current().unwrap().id(), a.id());
    }

    #[tokio::test]
    async fn second_attach_displaces_unconfigured_first() {
        let arbiter = InstanceArbiter::new();
        let a = handle();
        let b = handle();

        arbiter.attach(a.clone());
        assert!(arbiter.attach(b.clone()));
        assert_eq!(arbiter.current().unwrap().id(), b.id());
    }

    #[tokio::test]
    async fn attach_does_not_displace_configured_instance() {
        let arbiter = InstanceArbiter::new();
        let a = handle();
        let b = handle();

        arbiter.attach(a.clone());
        arbiter.configure(a.clone());
        assert!(!arbiter.attach(b.clone()));
        assert_eq!(arbiter.current().unwrap().id(), a.id());
    }

    #[tokio::test]
    async fn configure_reclaims_from_later_attach() {
        let arbiter = InstanceArbiter::new();
        let a = handle();
        let b = handle();

        // A created, B attaches while A is still unconfigured: B owns routing.
        arbiter.attach(a.clone());
        arbiter.attach(b.clone());
        assert_eq!(arbiter.current().unwrap().id(), b.id());

        // A configures: canonicity reclaimed regardless of creation order.
        arbiter.configure(a.clone());
        assert_eq!(arbiter.current().unwrap().id(), a.id());
        assert!(a.is_configured());
    }

    #[tokio::test]
    async fn detach_clears_only_canonical_owner() {
        let arbiter = InstanceArbiter::new();
        let a = handle();
        let b = handle();

        arbiter.attach(a.clone());
        arbiter.attach(b.clone());

        // A no longer owns the slot; detaching it changes nothing.
        assert!(!arbiter.detach(a.id()));
        assert_eq!(arbiter.current().unwrap().id(), b.id());

        assert!(arbiter.detach(b.id()));
        assert!(arbiter.current().is_none());
    }

    #[tokio::test]
    async fn epoch_bumps_on_ownership_changes() {
        let arbiter = InstanceArbiter::new();
        let a = handle();
        let b = handle();

        let e0 = arbiter.epoch();
        arbiter.attach(a.clone());
        arbiter.attach(b.clone());
        arbiter.configure(a.clone());
        arbiter.detach(a.id());
        assert_eq!(arbiter.epoch(), e0 + 4);
    }

    #[tokio::test]
    async fn concurrent_attaches_elect_exactly_one_owner() {
        let arbiter = Arc::new(InstanceArbiter::new());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let arbiter = arbiter.clone();
            let instance = handle();
            handles.push(tokio::spawn(async move { arbiter.attach(instance) }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Whatever the interleaving, the slot holds exactly one instance.
        assert!(arbiter.current().is_some());
    }
}

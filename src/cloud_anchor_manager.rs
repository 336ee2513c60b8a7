//! Callback-style completion on top of the AR subsystem's polled cloud anchor
//! states.
//!
//! Hosting and resolving requests hand back an anchor handle whose
//! [`CloudAnchorState`](crate::ar_session::CloudAnchorState) changes on its own
//! as the request progresses. [`CloudAnchorManager`] remembers which listener
//! belongs to which handle and, each time [`CloudAnchorManager::on_update`] is
//! called (once per rendered frame), hands every finished handle to its
//! listener.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::ar_session::{Anchor, ArSession};

/// Identifies one registered request.
pub type PendingId = u64;

/// Invoked once with the anchor handle when its request finishes, whether it
/// succeeded or failed. The listener inspects the handle's state itself.
pub type CloudAnchorListener<A> = Box<dyn FnOnce(A) + Send>;

struct PendingAnchor<A> {
    id: PendingId,
    anchor: A,
    listener: CloudAnchorListener<A>,
}

struct PendingAnchors<A> {
    next_id: PendingId,
    entries: Vec<PendingAnchor<A>>,
}

/// Tracks in-flight host and resolve requests and dispatches their results.
///
/// Every method takes `&self` and runs inside one critical section guarding
/// the pending set, so gesture handlers and the render loop can share a
/// manager through an `Arc`.
pub struct CloudAnchorManager<S>
where
    S: ArSession,
{
    session: Arc<Mutex<S>>,
    ttl_days: u32,
    pending: Mutex<PendingAnchors<S::Anchor>>,
}

impl<S> CloudAnchorManager<S>
where
    S: ArSession,
{
    /// Creates a manager issuing requests on `session`. Hosted anchors are
    /// requested to live for `ttl_days`.
    pub fn new(session: Arc<Mutex<S>>, ttl_days: u32) -> Self {
        Self {
            session,
            ttl_days,
            pending: Mutex::new(PendingAnchors {
                next_id: 0,
                entries: Vec::new(),
            }),
        }
    }

    /// Hosts `anchor`. `listener` is invoked once the result is available.
    pub fn host_cloud_anchor<F>(&self, anchor: Option<&S::Anchor>, listener: F) -> PendingId
    where
        F: FnOnce(S::Anchor) + Send + 'static,
    {
        let mut pending = self.lock_pending();
        let handle = self
            .lock_session()
            .host_cloud_anchor_with_ttl(anchor, self.ttl_days);
        let id = Self::register(&mut pending, handle, Box::new(listener));
        info!("Hosting request {id} issued with a ttl of {} day(s)", self.ttl_days);
        id
    }

    /// Resolves the anchor hosted under `anchor_id`. `listener` is invoked once
    /// the result is available. Resolving the same id twice gives two
    /// independent requests.
    pub fn resolve_cloud_anchor<F>(&self, anchor_id: &str, listener: F) -> PendingId
    where
        F: FnOnce(S::Anchor) + Send + 'static,
    {
        let mut pending = self.lock_pending();
        let handle = self.lock_session().resolve_cloud_anchor(anchor_id);
        let id = Self::register(&mut pending, handle, Box::new(listener));
        info!("Resolving request {id} issued for {anchor_id}");
        id
    }

    /// Delivers every request that is no longer in progress to its listener
    /// and forgets it. Should be called after each session update.
    ///
    /// Finished entries leave the pending set before any listener runs, and
    /// the listeners run outside the lock so they may issue new requests.
    pub fn on_update(&self) {
        let ready = {
            let mut pending = self.lock_pending();
            if pending.entries.is_empty() {
                return;
            }
            let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut pending.entries)
                .into_iter()
                .partition(|p| p.anchor.cloud_anchor_state().is_terminal());
            pending.entries = waiting;
            ready
        };

        for PendingAnchor {
            id,
            anchor,
            listener,
        } in ready
        {
            debug!(
                "Request {id} finished in state {}",
                anchor.cloud_anchor_state()
            );
            listener(anchor);
        }
    }

    /// Forgets all registered listeners without calling them. Requests already
    /// sent to the AR subsystem keep running; their results are just dropped.
    pub fn clear_listeners(&self) {
        let mut pending = self.lock_pending();
        if !pending.entries.is_empty() {
            info!("Dropping {} pending listener(s)", pending.entries.len());
        }
        pending.entries.clear();
    }

    /// Number of requests still waiting for a result.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().entries.len()
    }

    fn register(
        pending: &mut PendingAnchors<S::Anchor>,
        anchor: S::Anchor,
        listener: CloudAnchorListener<S::Anchor>,
    ) -> PendingId {
        let id = pending.next_id;
        pending.next_id += 1;
        pending.entries.push(PendingAnchor {
            id,
            anchor,
            listener,
        });
        id
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingAnchors<S::Anchor>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_session(&self) -> MutexGuard<'_, S> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ar_session::CloudAnchorState;
    use crate::dummy_session::{DummyAnchor, DummyArSession};
    use crate::geometry::Pose;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn manager() -> (Arc<Mutex<DummyArSession>>, CloudAnchorManager<DummyArSession>) {
        let session = Arc::new(Mutex::new(DummyArSession::builder().seed(7).build()));
        let manager = CloudAnchorManager::new(session.clone(), 1);
        (session, manager)
    }

    fn counting_listener(
        counter: &Arc<AtomicUsize>,
        seen: &Arc<Mutex<Vec<CloudAnchorState>>>,
    ) -> impl FnOnce(DummyAnchor) + Send + 'static {
        let counter = counter.clone();
        let seen = seen.clone();
        move |anchor: DummyAnchor| {
            counter.fetch_add(1, Ordering::SeqCst);
            seen.lock().unwrap().push(anchor.cloud_anchor_state());
        }
    }

    #[test]
    fn tick_without_entries_is_noop() {
        let (_, manager) = manager();
        manager.on_update();
        manager.on_update();
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn host_delivers_exactly_once() {
        let (session, manager) = manager();
        let local = session.lock().unwrap().create_anchor(Pose::identity());
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        manager.host_cloud_anchor(Some(&local), counting_listener(&counter, &seen));
        let handle = session.lock().unwrap().in_flight_anchors()[0].clone();
        assert_eq!(handle.cloud_anchor_state(), CloudAnchorState::TaskInProgress);

        manager.on_update();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        handle.set_cloud_anchor_state(CloudAnchorState::Success);
        manager.on_update();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        manager.on_update();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![CloudAnchorState::Success]);
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn error_states_are_forwarded() {
        let (session, manager) = manager();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        manager.resolve_cloud_anchor("missing", counting_listener(&counter, &seen));
        session.lock().unwrap().in_flight_anchors()[0]
            .set_cloud_anchor_state(CloudAnchorState::ErrorCloudIdNotFound);
        manager.on_update();
        manager.on_update();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![CloudAnchorState::ErrorCloudIdNotFound]
        );
    }

    #[test]
    fn duplicate_resolves_are_independent() {
        let (session, manager) = manager();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let a = manager.resolve_cloud_anchor("same", counting_listener(&counter, &seen));
        let b = manager.resolve_cloud_anchor("same", counting_listener(&counter, &seen));
        assert_ne!(a, b);
        assert_eq!(manager.pending_count(), 2);

        let handles = session.lock().unwrap().in_flight_anchors();
        handles[0].set_cloud_anchor_state(CloudAnchorState::Success);
        manager.on_update();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(manager.pending_count(), 1);

        handles[1].set_cloud_anchor_state(CloudAnchorState::Success);
        manager.on_update();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_silences_pending_listeners() {
        let (session, manager) = manager();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        manager.resolve_cloud_anchor("abc", counting_listener(&counter, &seen));
        manager.clear_listeners();
        session.lock().unwrap().in_flight_anchors()[0]
            .set_cloud_anchor_state(CloudAnchorState::Success);
        manager.on_update();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn listener_may_issue_new_requests() {
        let (session, manager) = manager();
        let manager = Arc::new(manager);
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_manager = manager.clone();
        let inner_counter = counter.clone();
        manager.resolve_cloud_anchor("first", move |_| {
            inner_counter.fetch_add(1, Ordering::SeqCst);
            inner_manager.resolve_cloud_anchor("second", |_| {});
        });

        session.lock().unwrap().in_flight_anchors()[0]
            .set_cloud_anchor_state(CloudAnchorState::Success);
        manager.on_update();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn requests_from_another_thread_are_delivered_once() {
        const REQUESTS: usize = 200;
        let (session, manager) = manager();
        let manager = Arc::new(manager);
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let issuer = {
            let manager = manager.clone();
            let counter = counter.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for i in 0..REQUESTS {
                    manager.resolve_cloud_anchor(
                        &format!("anchor-{i}"),
                        counting_listener(&counter, &seen),
                    );
                }
            })
        };

        let mut rounds = 0;
        while !(issuer.is_finished() && counter.load(Ordering::SeqCst) == REQUESTS) {
            for handle in session.lock().unwrap().in_flight_anchors() {
                handle.set_cloud_anchor_state(CloudAnchorState::Success);
            }
            manager.on_update();
            rounds += 1;
            assert!(rounds < 1_000_000, "requests were never all delivered");
        }
        issuer.join().unwrap();
        manager.on_update();

        assert_eq!(counter.load(Ordering::SeqCst), REQUESTS);
        assert_eq!(seen.lock().unwrap().len(), REQUESTS);
        assert_eq!(manager.pending_count(), 0);
    }
}

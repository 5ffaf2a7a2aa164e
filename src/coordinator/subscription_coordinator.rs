//! One upstream watch per resource, shared by every interested feature.
//!
//! [`SubscriptionCoordinator`] reference-counts feature subscriptions and
//! drives a single [`UpstreamConnection`] through the [`Phase`] state
//! machine. All state sits behind one mutex that is never held across an
//! `.await`; the suspending steps (open, close, grace timer) run on
//! spawned tasks that re-enter the state machine when they finish.
//!
//! Three mechanisms keep the watch unique:
//!
//! - the stored [`JoinHandle`] of the connect task is the "open in
//!   progress" guard, so repeated `subscribe` calls never issue a second
//!   open;
//! - every connect attempt gets a generation number, and results or
//!   events carrying a superseded generation are discarded;
//! - closes, and opens that were superseded while in flight, are chained
//!   through a shared barrier; a new open keeps waiting until no barrier
//!   is left, so a new watch is only requested once the old one is gone.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use super::status::{ConnectionStats, CoordinatorStatus, Phase};
use crate::domain::{ChangeEvent, Identity, NotificationBus, ResourceKey};
use crate::error::HubError;
use crate::upstream::{ChangeFeed, EventSink, UpstreamConnection};

/// Default grace window before an unused watch is closed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Multiplexes any number of feature subscriptions onto one upstream watch.
///
/// Built once per watched resource at startup and shared by cloning;
/// clones drive the same state machine. [`SubscriptionCoordinator::subscribe`]
/// and [`SubscriptionCoordinator::unsubscribe`] must be called from within
/// a Tokio runtime.
#[derive(Debug, Clone)]
pub struct SubscriptionCoordinator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    resource: ResourceKey,
    feed: Arc<dyn ChangeFeed>,
    bus: NotificationBus,
    grace_period: Duration,
    state: Mutex<CoordinatorState>,
    phase_tx: watch::Sender<Phase>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    phase: Phase,
    identity: Option<Identity>,
    subscribers: usize,
    generation: u64,
    connection: Option<UpstreamConnection>,
    opening: Option<JoinHandle<()>>,
    pending_teardown: Option<AbortHandle>,
    teardown_seq: u64,
    closing: Option<CloseBarrier>,
    closes_in_flight: usize,
    stats: ConnectionStats,
    last_error: Option<String>,
}

/// Resolves once every close scheduled before it has completed.
#[derive(Clone)]
struct CloseBarrier(Shared<BoxFuture<'static, ()>>);

impl CloseBarrier {
    fn new(task: JoinHandle<()>) -> Self {
        Self(
            async move {
                let _ = task.await;
            }
            .boxed()
            .shared(),
        )
    }

    async fn wait(self) {
        self.0.await;
    }
}

impl fmt::Debug for CloseBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseBarrier").finish_non_exhaustive()
    }
}

impl SubscriptionCoordinator {
    /// Creates the coordinator for `resource`. No watch is opened until
    /// the first [`SubscriptionCoordinator::subscribe`].
    #[must_use]
    pub fn new(
        resource: ResourceKey,
        feed: Arc<dyn ChangeFeed>,
        bus: NotificationBus,
        grace_period: Duration,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Idle);
        Self {
            inner: Arc::new(Inner {
                resource,
                feed,
                bus,
                grace_period,
                state: Mutex::new(CoordinatorState::default()),
                phase_tx,
            }),
        }
    }

    /// Resource this coordinator watches.
    #[must_use]
    pub fn resource(&self) -> &ResourceKey {
        &self.inner.resource
    }

    /// Registers one more subscriber owned by `identity`.
    ///
    /// Opens the upstream watch if none exists, reuses it if it belongs
    /// to the same identity, and rebuilds it if the identity changed.
    pub fn subscribe(&self, identity: Identity) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        state.subscribers = state.subscribers.saturating_add(1);

        if inner.cancel_grace(&mut state) {
            tracing::debug!(resource = %inner.resource, "pending teardown cancelled");
        }

        match state.identity.clone() {
            Some(bound) if bound == identity => {
                // Connecting: the open in flight serves this subscriber too.
                if state.connection.is_some() {
                    inner.transition(&mut state, Phase::Active);
                }
                return;
            }
            Some(bound) => {
                tracing::info!(
                    resource = %inner.resource,
                    from = %bound,
                    to = %identity,
                    "identity changed; rebuilding upstream watch"
                );
                inner.release(&mut state, "identity changed");
            }
            None => {}
        }

        inner.begin_connect(&mut state, identity);
    }

    /// Releases one subscriber.
    ///
    /// When the count reaches zero the watch is closed after the grace
    /// period, unless a new subscriber arrives first. Calls beyond the
    /// number of subscribers are ignored.
    pub fn unsubscribe(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        let Some(remaining) = state.subscribers.checked_sub(1) else {
            tracing::debug!(resource = %inner.resource, "unsubscribe without subscribers ignored");
            return;
        };
        state.subscribers = remaining;
        if remaining > 0 || state.identity.is_none() {
            return;
        }

        if state.connection.is_some() {
            inner.transition(&mut state, Phase::TearingDown);
        }
        inner.schedule_grace(&mut state);
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Current subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers
    }

    /// Returns a receiver that observes every phase transition.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.inner.phase_tx.subscribe()
    }

    /// Snapshot of the coordinator for diagnostics.
    #[must_use]
    pub fn status(&self) -> CoordinatorStatus {
        let state = self.inner.state.lock();
        let connection = state.connection.as_ref();
        CoordinatorStatus {
            resource: self.inner.resource.to_string(),
            phase: state.phase,
            subscribers: state.subscribers,
            identity_bound: state.identity.is_some(),
            open_in_progress: state.opening.is_some(),
            teardown_pending: state.pending_teardown.is_some(),
            watch_id: connection.and_then(UpstreamConnection::watch_id).map(|id| id.to_string()),
            connected_since: connection.map(UpstreamConnection::opened_at),
            stats: state.stats,
            last_error: state.last_error.clone(),
        }
    }

    /// Drops every subscriber, closes the watch and waits for the close
    /// to complete.
    pub async fn shutdown(&self) {
        let barrier = {
            let mut state = self.inner.state.lock();
            state.subscribers = 0;
            self.inner.release(&mut state, "shutdown");
            state.closing.clone()
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
    }
}

impl Inner {
    fn transition(&self, state: &mut CoordinatorState, next: Phase) {
        if state.phase != next {
            tracing::debug!(
                resource = %self.resource,
                from = ?state.phase,
                to = ?next,
                "coordinator transition"
            );
            state.phase = next;
            self.phase_tx.send_replace(next);
        }
    }

    /// Binds `identity` and starts a connect task. The task waits for any
    /// close still in flight before asking the feed for a new watch.
    fn begin_connect(self: &Arc<Self>, state: &mut CoordinatorState, identity: Identity) {
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        state.identity = Some(identity.clone());

        let weak: Weak<Self> = Arc::downgrade(self);
        let lost = Weak::clone(&weak);
        let sink = EventSink::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.relay(generation, event);
            }
        })
        .on_lost(move |err| {
            if let Some(inner) = lost.upgrade() {
                inner.watch_lost(generation, &err);
            }
        });

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            if !inner.settle_closes(generation).await {
                return;
            }
            let result = UpstreamConnection::open(
                Arc::clone(&inner.feed),
                inner.resource.clone(),
                identity,
                sink,
            )
            .await;
            inner.finish_connect(generation, result);
        });

        state.opening = Some(task);
        state.stats.connect_attempts = state.stats.connect_attempts.saturating_add(1);
        self.transition(state, Phase::Connecting);
    }

    /// Waits until no close or superseded open is in flight. A barrier
    /// can be replaced while it is awaited, so the check repeats under the
    /// lock. Returns `false` if `generation` was superseded meanwhile.
    async fn settle_closes(&self, generation: u64) -> bool {
        loop {
            let barrier = {
                let state = self.state.lock();
                if state.generation != generation {
                    return false;
                }
                state.closing.clone()
            };
            match barrier {
                Some(barrier) => barrier.wait().await,
                None => return true,
            }
        }
    }

    fn finish_connect(
        self: &Arc<Self>,
        generation: u64,
        result: Result<UpstreamConnection, HubError>,
    ) {
        let mut state = self.state.lock();

        if state.generation != generation {
            // Superseded while the feed was answering.
            if let Ok(connection) = result {
                tracing::debug!(resource = %self.resource, "discarding superseded upstream watch");
                self.schedule_close(&mut state, connection);
            }
            return;
        }

        state.opening = None;
        match result {
            Ok(connection) => {
                state.stats.opens_succeeded = state.stats.opens_succeeded.saturating_add(1);
                state.last_error = None;
                state.connection = Some(connection);
                let next = if state.subscribers == 0 {
                    Phase::TearingDown
                } else {
                    Phase::Active
                };
                self.transition(&mut state, next);
            }
            Err(err) => {
                state.stats.opens_failed = state.stats.opens_failed.saturating_add(1);
                state.identity = None;
                self.cancel_grace(&mut state);
                tracing::error!(
                    resource = %self.resource,
                    error = %err,
                    "failed to open upstream watch; real-time updates unavailable"
                );
                state.last_error = Some(err.to_string());
                self.transition(&mut state, Phase::Idle);
            }
        }
    }

    /// Forced teardown: cancels the grace timer and any in-flight open,
    /// unbinds the identity and closes the live watch.
    fn release(self: &Arc<Self>, state: &mut CoordinatorState, reason: &'static str) {
        self.cancel_grace(state);
        if let Some(open) = state.opening.take() {
            open.abort();
            tracing::debug!(resource = %self.resource, reason, "in-flight open cancelled");
            // The open may already hold a watch; later opens wait for it.
            self.chain_teardown(state, false, async move {
                let _ = open.await;
            });
        }
        state.identity = None;
        state.generation = state.generation.wrapping_add(1);

        if let Some(connection) = state.connection.take() {
            tracing::info!(resource = %self.resource, reason, "releasing upstream watch");
            self.schedule_close(state, connection);
        }

        let next = if state.closes_in_flight > 0 {
            Phase::TearingDown
        } else {
            Phase::Idle
        };
        self.transition(state, next);
    }

    fn schedule_close(
        self: &Arc<Self>,
        state: &mut CoordinatorState,
        mut connection: UpstreamConnection,
    ) {
        self.chain_teardown(state, true, async move {
            connection.close().await;
        });
    }

    /// Appends `work` to the close chain; it runs after every earlier entry.
    fn chain_teardown<F>(self: &Arc<Self>, state: &mut CoordinatorState, is_close: bool, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let previous = state.closing.take();
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.wait().await;
            }
            work.await;
            inner.finish_close(is_close);
        });
        state.closing = Some(CloseBarrier::new(task));
        state.closes_in_flight = state.closes_in_flight.saturating_add(1);
    }

    fn finish_close(&self, is_close: bool) {
        let mut state = self.state.lock();
        state.closes_in_flight = state.closes_in_flight.saturating_sub(1);
        if is_close {
            state.stats.closes_completed = state.stats.closes_completed.saturating_add(1);
        }
        if state.closes_in_flight > 0 {
            return;
        }
        state.closing = None;
        if state.phase == Phase::TearingDown && state.connection.is_none() && state.opening.is_none()
        {
            self.transition(&mut state, Phase::Idle);
        }
    }

    /// Cancels the grace timer, if any. A timer already past its sleep
    /// sees the bumped sequence and does nothing.
    fn cancel_grace(&self, state: &mut CoordinatorState) -> bool {
        state.teardown_seq = state.teardown_seq.wrapping_add(1);
        let Some(timer) = state.pending_teardown.take() else {
            return false;
        };
        timer.abort();
        true
    }

    fn schedule_grace(self: &Arc<Self>, state: &mut CoordinatorState) {
        self.cancel_grace(state);
        let seq = state.teardown_seq;
        let grace = self.grace_period;
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire_grace(seq);
            }
        });
        state.pending_teardown = Some(timer.abort_handle());
        tracing::debug!(resource = %self.resource, ?grace, "teardown scheduled");
    }

    /// One-shot recheck: tears down only if nobody subscribed meanwhile.
    fn expire_grace(self: &Arc<Self>, seq: u64) {
        let mut state = self.state.lock();
        if state.teardown_seq != seq {
            return;
        }
        state.pending_teardown = None;
        if state.subscribers > 0 {
            return;
        }
        self.release(&mut state, "grace window elapsed");
    }

    /// The backend reported the watch dead. Handled like a failed open:
    /// the identity is unbound and the next subscribe reconnects.
    fn watch_lost(self: &Arc<Self>, generation: u64, err: &HubError) {
        let mut state = self.state.lock();
        if state.generation != generation || state.connection.is_none() {
            return;
        }
        tracing::error!(
            resource = %self.resource,
            error = %err,
            "upstream watch lost; real-time updates unavailable"
        );
        state.stats.watches_lost = state.stats.watches_lost.saturating_add(1);
        state.last_error = Some(err.to_string());
        self.release(&mut state, "upstream watch lost");
    }

    fn relay(&self, generation: u64, event: ChangeEvent) {
        let current = {
            let state = self.state.lock();
            state.generation == generation && state.identity.is_some()
        };
        if !current {
            tracing::trace!(resource = %self.resource, "dropping event from superseded watch");
            return;
        }
        let delivered = self.bus.publish(event);
        tracing::trace!(resource = %self.resource, delivered, "change relayed");
    }
}

//! # Telemetry Poll Coordinator
//!
//! One monitoring poll loop shared by every view that shows host metrics.
//!
//! ## Overview
//!
//! Views [`attach`](TelemetryCoordinator::attach) with the cadence and
//! history window they want and get a [`Subscription`]. The loop runs while
//! at least one subscription is attached:
//!
//! ```text
//! attach ─→ fetch ─1s─→ fetch ─1s─→ fetch ─cadence─→ fetch ─cadence─→ ...
//!                                                        ↑
//!                          cadence change ───────────────┘ (fetch now)
//! ```
//!
//! The effective cadence is the fastest requested one, floored at
//! `min_cadence`. Fetches never overlap. Every snapshot fans out to all
//! subscribers, each deriving its own [`MetricsHistory`] for its window.
//!
//! ## Failure handling
//!
//! A host that reports `available: false` puts the coordinator in
//! [`CoordinatorState::Degraded`]; a failed or timed-out request puts it in
//! [`CoordinatorState::Failed`]. Neither stops the loop, and the next good
//! sample returns it to `Running`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut subscription = coordinator.attach(SubscriberRequest {
//!     cadence_ms: 2_000,
//!     window_ms: 60_000,
//! });
//! loop {
//!     subscription.changed().await;
//!     render(subscription.view());
//! }
//! ```

use async_trait::async_trait;
use bridge_traits::{Clock, SystemClock};
use core_async::sync::{watch, CancellationToken, Notify};
use core_async::time::{sleep, timeout, Duration};
use core_runtime::config::{CoreConfig, TelemetryConfig};
use core_runtime::events::{CoreEvent, EventBus, TelemetryEvent};
use provider_backend::{BackendConnector, MonitoringResource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::history::MetricsHistory;
use crate::model::MetricsSnapshot;

// ============================================================================
// Source
// ============================================================================

/// Where monitoring samples come from.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self) -> Result<MonitoringResource>;
}

#[async_trait]
impl MetricsSource for BackendConnector {
    async fn fetch(&self) -> Result<MonitoringResource> {
        Ok(self.fetch_monitoring().await?)
    }
}

// ============================================================================
// Public types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberRequest {
    pub cadence_ms: u64,
    pub window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No subscribers, no loop.
    Idle,
    Running,
    /// The host answered but cannot report metrics.
    Degraded(Option<String>),
    /// The last fetch failed.
    Failed(String),
}

/// What one subscriber sees.
#[derive(Debug, Clone)]
pub struct SubscriberView {
    pub state: CoordinatorState,
    pub latest: Option<MetricsSnapshot>,
    pub history: MetricsHistory,
    /// Cadence the loop actually runs at.
    pub cadence_ms: u64,
}

// ============================================================================
// Shared state
// ============================================================================

struct Slot {
    request: SubscriberRequest,
    history: MetricsHistory,
}

struct LoopHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
}

struct Inner {
    slots: HashMap<u64, Slot>,
    next_id: u64,
    running: Option<LoopHandle>,
    cadence_ms: u64,
    latest: Option<MetricsSnapshot>,
    state: CoordinatorState,
}

struct Shared {
    source: Arc<dyn MetricsSource>,
    config: TelemetryConfig,
    clock: Arc<dyn Clock>,
    event_bus: Option<Arc<EventBus>>,
    inner: Mutex<Inner>,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Telemetry(event)).ok();
        }
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    fn min_cadence_ms(&self) -> u64 {
        self.config.min_cadence.as_millis() as u64
    }

    /// Recompute the effective cadence and resize every history to it.
    fn recompute_cadence(&self, inner: &mut Inner) -> u64 {
        let floor = self.min_cadence_ms();
        let cadence = inner
            .slots
            .values()
            .map(|slot| slot.request.cadence_ms)
            .min()
            .unwrap_or(floor)
            .max(floor);
        inner.cadence_ms = cadence;
        for slot in inner.slots.values_mut() {
            slot.history.resize(slot.request.window_ms, cadence);
        }
        cadence
    }

    /// Wake a running loop for an immediate fetch when the effective
    /// cadence moved or `requested_changed` is set. Only the former is
    /// announced.
    fn reschedule(
        &self,
        inner: MutexGuard<'_, Inner>,
        previous: u64,
        cadence: u64,
        requested_changed: bool,
    ) {
        let effective_changed = cadence != previous;
        if !effective_changed && !requested_changed {
            return;
        }
        let wake = inner.running.as_ref().map(|handle| Arc::clone(&handle.wake));
        drop(inner);

        let Some(wake) = wake else {
            return;
        };
        if effective_changed {
            info!(cadence_ms = cadence, "Telemetry cadence changed");
            self.emit(TelemetryEvent::CadenceChanged { cadence_ms: cadence });
        } else {
            debug!(cadence_ms = cadence, "Subscriber cadence changed");
        }
        wake.notify_one();
    }

    fn attach(self: &Arc<Self>, request: SubscriberRequest) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.insert(
            id,
            Slot {
                request,
                history: MetricsHistory::new(request.window_ms, request.cadence_ms),
            },
        );

        let previous = inner.cadence_ms;
        let cadence = self.recompute_cadence(&mut inner);

        if inner.running.is_none() {
            let handle = LoopHandle {
                cancel: CancellationToken::new(),
                wake: Arc::new(Notify::new()),
            };
            let cancel = handle.cancel.clone();
            let wake = Arc::clone(&handle.wake);
            inner.running = Some(handle);
            inner.state = CoordinatorState::Running;
            drop(inner);

            info!(cadence_ms = cadence, "Telemetry polling started");
            self.emit(TelemetryEvent::LoopStarted { cadence_ms: cadence });
            let shared = Arc::clone(self);
            core_async::task::spawn(async move {
                shared.run_loop(cancel, wake).await;
            });
        } else {
            self.reschedule(inner, previous, cadence, false);
        }

        self.notify_changed();
        id
    }

    fn detach(&self, id: u64) {
        let mut inner = self.lock();
        if inner.slots.remove(&id).is_none() {
            return;
        }

        if inner.slots.is_empty() {
            if let Some(handle) = inner.running.take() {
                handle.cancel.cancel();
            }
            inner.state = CoordinatorState::Idle;
            drop(inner);

            info!("Telemetry polling stopped");
            self.emit(TelemetryEvent::LoopStopped);
        } else {
            let previous = inner.cadence_ms;
            let cadence = self.recompute_cadence(&mut inner);
            self.reschedule(inner, previous, cadence, false);
        }
        self.notify_changed();
    }

    fn update_request<F>(&self, id: u64, change: F)
    where
        F: FnOnce(&mut SubscriberRequest),
    {
        let mut inner = self.lock();
        let Some(slot) = inner.slots.get_mut(&id) else {
            return;
        };
        let requested = slot.request.cadence_ms;
        change(&mut slot.request);
        let requested_changed = slot.request.cadence_ms != requested;

        let previous = inner.cadence_ms;
        let cadence = self.recompute_cadence(&mut inner);
        self.reschedule(inner, previous, cadence, requested_changed);
        self.notify_changed();
    }

    async fn run_loop(&self, cancel: CancellationToken, wake: Arc<Notify>) {
        let mut burst_left = self.config.burst_fetches;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.fetch_once() => {}
            }

            let delay = if burst_left > 0 {
                burst_left -= 1;
                self.config.burst_spacing
            } else {
                Duration::from_millis(self.lock().cadence_ms)
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = wake.notified() => debug!("Out-of-cycle fetch"),
                _ = sleep(delay) => {}
            }
        }
        debug!("Telemetry loop exited");
    }

    async fn fetch_once(&self) {
        let result = match timeout(self.config.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::Timeout(
                self.config.fetch_timeout.as_millis() as u64,
            )),
        };
        let received_at_ms = self.clock.unix_timestamp_millis().max(0) as u64;

        let event = {
            let mut inner = self.lock();
            if inner.running.is_none() {
                return;
            }
            let was_healthy = matches!(inner.state, CoordinatorState::Running);
            let was_degraded = matches!(inner.state, CoordinatorState::Degraded(_));

            match result {
                Ok(resource) => {
                    let snapshot = MetricsSnapshot::from_resource(resource, received_at_ms);
                    let event = if snapshot.available {
                        for slot in inner.slots.values_mut() {
                            slot.history.push(&snapshot);
                        }
                        inner.state = CoordinatorState::Running;
                        (!was_healthy).then_some(TelemetryEvent::Recovered)
                    } else {
                        inner.state = CoordinatorState::Degraded(snapshot.message.clone());
                        (!was_degraded).then(|| TelemetryEvent::Degraded {
                            message: snapshot.message.clone(),
                        })
                    };
                    inner.latest = Some(snapshot);
                    event
                }
                Err(e) => {
                    let message = e.message();
                    warn!(error = %message, "Monitoring fetch failed");
                    inner.state = CoordinatorState::Failed(message.clone());
                    Some(TelemetryEvent::FetchFailed { message })
                }
            }
        };

        if let Some(event) = event {
            self.emit(event);
        }
        self.notify_changed();
    }
}

// ============================================================================
// Coordinator
// ============================================================================

#[derive(Clone)]
pub struct TelemetryCoordinator {
    shared: Arc<Shared>,
}

impl TelemetryCoordinator {
    pub fn new(source: Arc<dyn MetricsSource>, config: TelemetryConfig) -> Self {
        Self::with_parts(source, config, Arc::new(SystemClock), None)
    }

    pub fn with_parts(
        source: Arc<dyn MetricsSource>,
        config: TelemetryConfig,
        clock: Arc<dyn Clock>,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        let min_cadence_ms = config.min_cadence.as_millis() as u64;
        Self {
            shared: Arc::new(Shared {
                source,
                config,
                clock,
                event_bus,
                inner: Mutex::new(Inner {
                    slots: HashMap::new(),
                    next_id: 0,
                    running: None,
                    cadence_ms: min_cadence_ms,
                    latest: None,
                    state: CoordinatorState::Idle,
                }),
                changes,
            }),
        }
    }

    pub fn from_config(
        config: &CoreConfig,
        connector: BackendConnector,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::with_parts(
            Arc::new(connector),
            config.telemetry.clone(),
            Arc::clone(&config.clock),
            Some(event_bus),
        )
    }

    /// Register a view. The first attach starts the loop.
    pub fn attach(&self, request: SubscriberRequest) -> Subscription {
        let changes = self.shared.changes.subscribe();
        let id = self.shared.attach(request);
        Subscription {
            id,
            shared: Arc::clone(&self.shared),
            changes,
            attached: true,
        }
    }

    /// Latest sample, including degraded ones.
    pub fn snapshot(&self) -> Option<MetricsSnapshot> {
        self.shared.lock().latest.clone()
    }

    pub fn state(&self) -> CoordinatorState {
        self.shared.lock().state.clone()
    }

    /// Effective cadence, or `None` while idle.
    pub fn cadence_ms(&self) -> Option<u64> {
        let inner = self.shared.lock();
        inner.running.as_ref().map(|_| inner.cadence_ms)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().slots.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running.is_some()
    }
}

impl std::fmt::Debug for TelemetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("TelemetryCoordinator")
            .field("subscribers", &inner.slots.len())
            .field("cadence_ms", &inner.cadence_ms)
            .field("state", &inner.state)
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// An attached view. Dropping it detaches.
pub struct Subscription {
    id: u64,
    shared: Arc<Shared>,
    changes: watch::Receiver<u64>,
    attached: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_cadence(&self, cadence_ms: u64) {
        self.shared
            .update_request(self.id, |request| request.cadence_ms = cadence_ms);
    }

    pub fn set_window(&self, window_ms: u64) {
        self.shared
            .update_request(self.id, |request| request.window_ms = window_ms);
    }

    pub fn view(&self) -> SubscriberView {
        let inner = self.shared.lock();
        let history = inner
            .slots
            .get(&self.id)
            .map(|slot| slot.history.clone())
            .unwrap_or_else(|| MetricsHistory::new(0, inner.cadence_ms));
        SubscriberView {
            state: inner.state.clone(),
            latest: inner.latest.clone(),
            history,
            cadence_ms: inner.cadence_ms,
        }
    }

    /// Wait until a fetch or a subscription change updates what
    /// [`view`](Self::view) returns.
    pub async fn changed(&mut self) {
        // The sender lives in `shared`, which this subscription keeps alive.
        self.changes.changed().await.ok();
    }

    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.attached) {
            self.shared.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.attached)
            .finish()
    }
}

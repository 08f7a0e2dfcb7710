//! # Bandwidth Lease Manager
//!
//! Converts "N concurrent callers want a high-bandwidth network" into
//! exactly one platform-level request, reference-counted, with async-await
//! semantics and bounded wait.
//!
//! ## Overview
//!
//! The first acquirer spawns a driver task that issues the platform request
//! and publishes its outcome through a shared `watch` channel; later
//! acquirers reuse the in-flight channel. The platform request is released
//! only when the last [`BandwidthLease`] closes. All reference-count
//! mutation happens inside a single mutex-guarded critical section, and no
//! lock is held across an await or a listener callback.
//!
//! ## Ownership
//!
//! A lease is always returned to the caller, even when the subsequent wait
//! for activation fails: the failed waiter still holds its claim and
//! releases it through `close()` or `Drop`. Dropping an unclosed lease
//! closes it, so a caller cancelled while awaiting activation can never
//! leak a claim.

use bridge_traits::activation::{ActivationGrant, ActivationRequest, NetworkActivator};
use bridge_traits::network::{NetworkId, TransportKind};
use core_runtime::events::{CoreEvent, EventBus, LeaseEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LeaseError;

/// Notified exactly once per high-bandwidth availability transition.
pub trait HighBandwidthListener: Send + Sync {
    fn on_high_bandwidth_available(&self, network: &NetworkId);

    fn on_high_bandwidth_unavailable(&self);
}

/// Resolution of the shared platform request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ActivationOutcome {
    Pending,
    Ready(NetworkId),
    Unavailable,
}

struct SharedState {
    /// Outstanding lease count. The platform request exists iff this is > 0.
    holders: usize,
    /// Shared outcome of the in-flight (or resolved) platform request.
    outcome: Option<watch::Receiver<ActivationOutcome>>,
    /// Grant to hand back to the platform when the count reaches zero.
    grant: Option<ActivationGrant>,
    /// Whether listeners were told the network is up.
    announced: bool,
    /// Bumped whenever the request round changes; a stale driver discards
    /// its result and releases any grant it obtained.
    generation: u64,
}

struct ManagerInner {
    activator: Arc<dyn NetworkActivator>,
    state: Mutex<SharedState>,
    listeners: Mutex<Vec<Arc<dyn HighBandwidthListener>>>,
    activation_timeout: Duration,
    events: Option<EventBus>,
}

/// Reference-counted coordinator for the shared high-bandwidth request.
#[derive(Clone)]
pub struct BandwidthLeaseManager {
    inner: Arc<ManagerInner>,
}

impl BandwidthLeaseManager {
    /// Create a manager over the platform activator.
    ///
    /// `activation_timeout` bounds the platform's own activation time; it is
    /// enforced here even if the activator never responds.
    pub fn new(
        activator: Arc<dyn NetworkActivator>,
        activation_timeout: Duration,
        events: Option<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                activator,
                state: Mutex::new(SharedState {
                    holders: 0,
                    outcome: None,
                    grant: None,
                    announced: false,
                    generation: 0,
                }),
                listeners: Mutex::new(Vec::new()),
                activation_timeout,
                events,
            }),
        }
    }

    /// Register an availability listener.
    pub fn add_listener(&self, listener: Arc<dyn HighBandwidthListener>) {
        self.inner
            .listeners
            .lock()
            .expect("lease listener lock poisoned")
            .push(listener);
    }

    /// Current outstanding lease count.
    pub fn holders(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("lease state lock poisoned")
            .holders
    }

    /// Claim the shared high-bandwidth request.
    ///
    /// Increments the reference count; the first acquirer issues the
    /// platform request, later acquirers reuse the in-flight outcome. The
    /// returned lease must be closed (or dropped) exactly once per acquire.
    pub fn acquire(&self, transports: &[TransportKind]) -> BandwidthLease {
        let lease_id = Uuid::new_v4();

        let (outcome, holders) = {
            let mut state = self.inner.state.lock().expect("lease state lock poisoned");
            state.holders += 1;

            if state.outcome.is_none() {
                let (tx, rx) = watch::channel(ActivationOutcome::Pending);
                state.outcome = Some(rx);
                state.generation += 1;

                let inner = Arc::clone(&self.inner);
                let request = ActivationRequest::new(transports.to_vec());
                let generation = state.generation;
                tokio::spawn(drive_activation(inner, tx, generation, request));
                debug!(transports = ?transports, "Issued platform high-bandwidth request");
            }

            let outcome = state
                .outcome
                .clone()
                .expect("outcome channel present after acquire");
            (outcome, state.holders)
        };

        debug!(lease = %lease_id, holders, "High-bandwidth lease acquired");
        self.emit(LeaseEvent::Acquired {
            lease: lease_id.to_string(),
            holders: holders as u64,
        });

        BandwidthLease {
            id: lease_id,
            inner: Arc::clone(&self.inner),
            outcome,
            closed: AtomicBool::new(false),
        }
    }

    fn emit(&self, event: LeaseEvent) {
        emit(&self.inner, event);
    }
}

/// One caller's claim on the shared platform request.
pub struct BandwidthLease {
    id: Uuid,
    inner: Arc<ManagerInner>,
    outcome: watch::Receiver<ActivationOutcome>,
    closed: AtomicBool,
}

impl BandwidthLease {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Await the platform's confirmation, bounded by `ceiling`.
    ///
    /// On ceiling expiry the lease is still held; the holder must still
    /// close it. Every waiter of a failed platform request observes
    /// [`LeaseError::Unavailable`].
    pub async fn activated(&self, ceiling: Duration) -> Result<NetworkId, LeaseError> {
        if self.is_closed() {
            return Err(LeaseError::Closed);
        }

        let mut outcome = self.outcome.clone();
        let wait = outcome.wait_for(|o| !matches!(o, ActivationOutcome::Pending));

        let resolved = match tokio::time::timeout(ceiling, wait).await {
            Ok(Ok(resolved)) => match &*resolved {
                ActivationOutcome::Ready(network) => Ok(network.clone()),
                _ => Err(LeaseError::Unavailable),
            },
            // Channel torn down: the last holder closed while we waited.
            Ok(Err(_)) => Err(LeaseError::Unavailable),
            Err(_) => Err(LeaseError::WaitTimeout(ceiling)),
        };
        resolved
    }

    /// Release this claim. Safe to call multiple times; only the first call
    /// decrements the count.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            release_one(&self.inner, self.id);
        }
    }
}

impl Drop for BandwidthLease {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive_activation(
    inner: Arc<ManagerInner>,
    tx: watch::Sender<ActivationOutcome>,
    generation: u64,
    request: ActivationRequest,
) {
    let result = tokio::time::timeout(
        inner.activation_timeout,
        inner.activator.request_network(request),
    )
    .await;

    // Any grant captured from a stale round, to be handed back outside the
    // lock (the release future must not hold the guard across its await).
    let abandoned_grant: Option<ActivationGrant> = {
        let mut state = inner.state.lock().expect("lease state lock poisoned");
        if state.generation != generation {
            // Every lease from this round closed before the platform
            // answered; hand straight back whatever it granted.
            match result {
                Ok(Ok(grant)) => Some(grant),
                _ => None,
            }
        } else {
            match result {
                Ok(Ok(grant)) => {
                    let network = grant.network.clone();
                    state.grant = Some(grant);
                    state.announced = true;
                    drop(state);

                    tx.send_replace(ActivationOutcome::Ready(network.clone()));
                    info!(network = %network, "High-bandwidth network activated");
                    for listener in listeners(&inner) {
                        listener.on_high_bandwidth_available(&network);
                    }
                    emit(
                        &inner,
                        LeaseEvent::Activated {
                            network: network.to_string(),
                        },
                    );
                }
                Ok(Err(error)) => {
                    drop(state);
                    tx.send_replace(ActivationOutcome::Unavailable);
                    warn!(error = %error, "Platform refused the high-bandwidth request");
                    emit(
                        &inner,
                        LeaseEvent::ActivationFailed {
                            message: error.to_string(),
                        },
                    );
                }
                Err(_) => {
                    drop(state);
                    tx.send_replace(ActivationOutcome::Unavailable);
                    warn!(
                        timeout = ?inner.activation_timeout,
                        "Platform network activation timed out"
                    );
                    emit(
                        &inner,
                        LeaseEvent::ActivationFailed {
                            message: format!(
                                "platform activation timed out after {:?}",
                                inner.activation_timeout
                            ),
                        },
                    );
                }
            }
            None
        }
    };

    if let Some(grant) = abandoned_grant {
        debug!(network = %grant.network, "Releasing grant from an abandoned request");
        inner.activator.release(grant).await;
    }
}

fn release_one(inner: &Arc<ManagerInner>, lease_id: Uuid) {
    let (holders, dropped_grant, announced) = {
        let mut state = inner.state.lock().expect("lease state lock poisoned");
        debug_assert!(state.holders > 0, "lease close without matching acquire");
        state.holders = state.holders.saturating_sub(1);

        if state.holders == 0 {
            let grant = state.grant.take();
            let announced = std::mem::take(&mut state.announced);
            state.outcome = None;
            state.generation += 1;
            (0, grant, announced)
        } else {
            (state.holders, None, false)
        }
    };

    debug!(lease = %lease_id, holders, "High-bandwidth lease released");
    emit(
        inner,
        LeaseEvent::Released {
            lease: lease_id.to_string(),
            holders: holders as u64,
        },
    );

    if holders > 0 {
        return;
    }

    if let Some(grant) = dropped_grant {
        let activator = Arc::clone(&inner.activator);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    activator.release(grant).await;
                });
            }
            Err(_) => {
                warn!("No runtime available to release the platform network request");
            }
        }
    }

    if announced {
        info!("High-bandwidth network released");
        for listener in listeners(inner) {
            listener.on_high_bandwidth_unavailable();
        }
        emit(inner, LeaseEvent::HighBandwidthDropped);
    }
}

fn listeners(inner: &Arc<ManagerInner>) -> Vec<Arc<dyn HighBandwidthListener>> {
    inner
        .listeners
        .lock()
        .expect("lease listener lock poisoned")
        .clone()
}

fn emit(inner: &Arc<ManagerInner>, event: LeaseEvent) {
    if let Some(bus) = &inner.events {
        bus.emit(CoreEvent::Lease(event)).ok();
    }
}

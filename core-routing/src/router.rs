//! # Request Router
//!
//! Orchestrates purpose tagging, network selection, high-bandwidth gating,
//! executor caching, and usage accounting for every outgoing call.
//!
//! ## State machine per request
//!
//! 1. **Tagging** - an untagged request carries `RequestPurpose::Unknown`
//!    (builder default).
//! 2. **Selection** - the policy engine picks a preferred network over the
//!    catalog's current snapshot; no match fails the call before it ever
//!    reaches the network.
//! 3. **Executor acquisition** - one network-bound executor per distinct
//!    interface, lazily built and cached; a cached executor whose interface
//!    left the inventory is discarded, never reused.
//! 4. **High-bandwidth gating** - purposes that need it acquire a lease and
//!    await activation up to the wait ceiling.
//! 5. **Dispatch** - the executor re-validates policy against the actually
//!    bound network at connection time and runs the call.
//! 6. **Completion** - the held lease is closed exactly once on every exit
//!    path and a usage record is forwarded to the recorder.
//!
//! Requests are immutable once dispatched; binding state lives here, never
//! on the request, so a rebuilt retry re-runs selection from scratch.

use bridge_traits::error::BridgeError;
use bridge_traits::http::{
    CallContext, CallExecutor, CallListener, CallResponse, ConnectionInterceptor, ExecutorFactory,
    OutboundRequest, RequestPurpose, Verdict,
};
use bridge_traits::network::{NetworkId, NetworkKind};
use bridge_traits::usage::{CallOutcome, UsageRecord, UsageRecorder};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CallEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::catalog::{NetworkCatalog, NetworkEntry};
use crate::error::RouteError;
use crate::lease::{BandwidthLease, BandwidthLeaseManager};
use crate::policy::RoutingPolicy;

/// Network-aware call router.
///
/// Owns the catalog worker and the lease manager; the catalog's listener is
/// registered with the lease manager at construction so the active-network
/// designation tracks lease transitions.
pub struct RequestRouter {
    catalog: Arc<NetworkCatalog>,
    leases: BandwidthLeaseManager,
    policy: RoutingPolicy,
    factory: Arc<dyn ExecutorFactory>,
    usage: Arc<dyn UsageRecorder>,
    executors: Mutex<HashMap<NetworkId, Arc<dyn CallExecutor>>>,
    wait_ceiling: Duration,
    events: Option<EventBus>,
}

impl RequestRouter {
    /// Build the router and its collaborators from a validated config.
    pub fn new(config: CoreConfig, policy: RoutingPolicy, events: Option<EventBus>) -> Self {
        let catalog = NetworkCatalog::spawn(config.lost_grace, events.clone());
        let leases = BandwidthLeaseManager::new(
            config.activator,
            config.activation_timeout,
            events.clone(),
        );
        leases.add_listener(catalog.high_bandwidth_listener());

        Self {
            catalog,
            leases,
            policy,
            factory: config.executor_factory,
            usage: config.usage_recorder,
            executors: Mutex::new(HashMap::new()),
            wait_ceiling: config.wait_ceiling,
            events,
        }
    }

    /// The catalog handle; the platform connectivity notifier feeds this.
    pub fn catalog(&self) -> &Arc<NetworkCatalog> {
        &self.catalog
    }

    /// The lease manager handle.
    pub fn leases(&self) -> &BandwidthLeaseManager {
        &self.leases
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Route and execute one outgoing request.
    #[instrument(skip(self, request), fields(purpose = %request.purpose, url = %request.url))]
    pub async fn submit(&self, request: OutboundRequest) -> Result<CallResponse, RouteError> {
        let purpose = request.purpose;

        // Selection over the current snapshot.
        let snapshot = self.catalog.current_snapshot();
        let Some(selected) = self.policy.preferred_network(purpose, &snapshot) else {
            debug!("No permitted network in the current snapshot");
            self.emit(CallEvent::NoSuitableNetwork {
                purpose: purpose.to_string(),
            });
            return Err(RouteError::NoSuitableNetwork { purpose });
        };
        let mut target = selected.clone();

        // High-bandwidth gating. The lease stays held through dispatch and
        // is closed on every exit path, including caller cancellation.
        let mut lease: Option<BandwidthLease> = None;
        if self.policy.is_high_bandwidth(purpose) && !snapshot.high_bandwidth_active() {
            let transports = self.policy.supported_transports(purpose);
            let held = self.leases.acquire(&transports);

            match held.activated(self.wait_ceiling).await {
                Ok(network) => {
                    // Prefer the activated interface once the catalog has
                    // learned about it; otherwise the original selection
                    // stands and connection-time re-validation still applies.
                    if let Some(entry) = self.catalog.current_snapshot().get(&network) {
                        target = entry.clone();
                    }
                    lease = Some(held);
                }
                Err(error) => {
                    warn!(error = %error, "High-bandwidth activation did not complete");
                    self.emit(CallEvent::NoSuitableNetwork {
                        purpose: purpose.to_string(),
                    });
                    // `held` drops here, releasing the failed claim.
                    return Err(RouteError::NoSuitableNetwork { purpose });
                }
            }
        }

        let result = self.dispatch(request, &target).await;

        if let Some(lease) = lease {
            lease.close();
        }

        result
    }

    async fn dispatch(
        &self,
        request: OutboundRequest,
        target: &NetworkEntry,
    ) -> Result<CallResponse, RouteError> {
        let purpose = request.purpose;
        let executor = self.executor_for(target)?;

        let counters = Arc::new(ByteCounters::default());
        let guard = UsageGuard::new(
            Arc::clone(&self.usage),
            purpose,
            target.kind(),
            Arc::clone(&counters),
        );

        let ctx = CallContext {
            interceptor: Arc::new(PolicyInterceptor {
                catalog: Arc::clone(&self.catalog),
                policy: self.policy.clone(),
                purpose,
                predicted: target.kind(),
            }),
            listener: Arc::new(CountingListener { counters }),
        };

        debug!(network = %target.id, "Dispatching call");
        self.emit(CallEvent::Dispatched {
            purpose: purpose.to_string(),
            network: target.id.to_string(),
        });

        match executor.execute(request, ctx).await {
            Ok(response) => {
                let status = response.status;
                let bytes_received = guard.bytes_received();
                guard.finish(CallOutcome::Completed { status }).await;
                self.emit(CallEvent::Completed {
                    purpose: purpose.to_string(),
                    network: target.id.to_string(),
                    status,
                    bytes_received,
                });
                Ok(response)
            }
            Err(BridgeError::Forbidden) => {
                guard.finish(CallOutcome::Rejected).await;
                self.emit(CallEvent::Rejected {
                    purpose: purpose.to_string(),
                    network: target.id.to_string(),
                });
                Err(RouteError::Forbidden {
                    purpose,
                    network: target.kind(),
                })
            }
            Err(error) => {
                guard.finish(CallOutcome::Failed).await;
                self.emit(CallEvent::Failed {
                    purpose: purpose.to_string(),
                    message: error.to_string(),
                });
                Err(RouteError::Transport(error))
            }
        }
    }

    /// Get or lazily build the executor bound to `target`'s interface.
    ///
    /// Cached executors whose interface has left the snapshot are dropped
    /// first: a pool bound to a dead interface must not silently reuse
    /// sockets from another.
    fn executor_for(&self, target: &NetworkEntry) -> Result<Arc<dyn CallExecutor>, RouteError> {
        let snapshot = self.catalog.current_snapshot();
        let mut cache = self.executors.lock().expect("executor cache lock poisoned");

        cache.retain(|id, _| snapshot.get(id).is_some());

        if let Some(executor) = cache.get(&target.id) {
            return Ok(Arc::clone(executor));
        }

        let executor = self
            .factory
            .build(&target.id, &target.link)
            .map_err(|e| RouteError::Platform(e.to_string()))?;
        cache.insert(target.id.clone(), Arc::clone(&executor));
        debug!(network = %target.id, "Built and cached network-bound executor");
        Ok(executor)
    }

    fn emit(&self, event: CallEvent) {
        if let Some(bus) = &self.events {
            bus.emit(CoreEvent::Call(event)).ok();
        }
    }
}

/// Re-validates policy against the network actually bound at connection
/// establishment.
struct PolicyInterceptor {
    catalog: Arc<NetworkCatalog>,
    policy: RoutingPolicy,
    purpose: RequestPurpose,
    predicted: NetworkKind,
}

impl ConnectionInterceptor for PolicyInterceptor {
    fn on_connection_established(&self, local_addr: Option<IpAddr>) -> Verdict {
        let actual = local_addr
            .and_then(|addr| self.catalog.network_for_local_address(addr))
            .map(|entry| entry.kind())
            .unwrap_or_else(|| self.predicted.clone());

        self.policy.check_request(self.purpose, &actual)
    }
}

#[derive(Default)]
struct ByteCounters {
    sent: AtomicU64,
    received: AtomicU64,
}

struct CountingListener {
    counters: Arc<ByteCounters>,
}

impl CallListener for CountingListener {
    fn on_bytes_transferred(&self, sent: u64, received: u64) {
        self.counters.sent.fetch_add(sent, Ordering::Relaxed);
        self.counters.received.fetch_add(received, Ordering::Relaxed);
    }
}

/// Records exactly one usage entry per dispatched call.
///
/// Normal completion goes through `finish`; a dropped guard (caller
/// cancellation mid-dispatch) records the bytes observed so far as a
/// cancelled call.
struct UsageGuard {
    recorder: Arc<dyn UsageRecorder>,
    purpose: RequestPurpose,
    network: NetworkKind,
    counters: Arc<ByteCounters>,
    done: AtomicBool,
}

impl UsageGuard {
    fn new(
        recorder: Arc<dyn UsageRecorder>,
        purpose: RequestPurpose,
        network: NetworkKind,
        counters: Arc<ByteCounters>,
    ) -> Self {
        Self {
            recorder,
            purpose,
            network,
            counters,
            done: AtomicBool::new(false),
        }
    }

    fn bytes_received(&self) -> u64 {
        self.counters.received.load(Ordering::Relaxed)
    }

    fn build_record(&self, outcome: CallOutcome) -> UsageRecord {
        UsageRecord::new(
            self.purpose,
            self.network.clone(),
            self.counters.sent.load(Ordering::Relaxed),
            self.counters.received.load(Ordering::Relaxed),
            outcome,
        )
    }

    async fn finish(&self, outcome: CallOutcome) {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.recorder.record(self.build_record(outcome)).await;
        }
    }
}

impl Drop for UsageGuard {
    fn drop(&mut self) {
        if !self.done.swap(true, Ordering::SeqCst) {
            let record = self.build_record(CallOutcome::Cancelled);
            let recorder = Arc::clone(&self.recorder);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    recorder.record(record).await;
                });
            }
        }
    }
}

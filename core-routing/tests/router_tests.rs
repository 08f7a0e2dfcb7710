//! End-to-end routing scenarios over mock bridges: selection, policy
//! enforcement, high-bandwidth gating, executor caching, and usage
//! accounting.

use async_trait::async_trait;
use bridge_traits::activation::{ActivationGrant, ActivationRequest, NetworkActivator};
use bridge_traits::error::BridgeError;
use bridge_traits::http::{
    CallContext, CallExecutor, CallResponse, ExecutorFactory, OutboundRequest, RequestPurpose,
    Verdict,
};
use bridge_traits::network::{
    ConnectivitySink, InterfaceCapabilities, LinkAttributes, NetworkId, TransportKind,
};
use bridge_traits::usage::{CallOutcome, UsageRecord, UsageRecorder};
use bytes::Bytes;
use core_routing::{PurposeRule, RequestRouter, RouteError, RoutingPolicy};
use core_runtime::config::CoreConfig;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Activator gated by the test: requests stay pending until the gate opens.
struct GateActivator {
    calls: AtomicUsize,
    releases: AtomicUsize,
    gate: watch::Receiver<bool>,
}

impl GateActivator {
    fn new() -> (Arc<Self>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                gate: rx,
            }),
            tx,
        )
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkActivator for GateActivator {
    async fn request_network(
        &self,
        _request: ActivationRequest,
    ) -> Result<ActivationGrant, BridgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| BridgeError::NotAvailable("activation gate".to_string()))?;
        Ok(ActivationGrant {
            network: NetworkId::from("cell-hb"),
            token: "grant-1".to_string(),
        })
    }

    async fn release(&self, _grant: ActivationGrant) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Executor that answers every call with a canned response after running the
/// interceptor with a configurable local address.
struct StubExecutor {
    network: NetworkId,
    local_addr: Option<IpAddr>,
    body: &'static str,
}

#[async_trait]
impl CallExecutor for StubExecutor {
    fn network(&self) -> &NetworkId {
        &self.network
    }

    async fn execute(
        &self,
        request: OutboundRequest,
        ctx: CallContext,
    ) -> Result<CallResponse, BridgeError> {
        ctx.listener.on_connection_acquired(&self.network);

        if ctx.interceptor.on_connection_established(self.local_addr) == Verdict::Forbid {
            let err = BridgeError::Forbidden;
            ctx.listener.on_call_failed(&err);
            return Err(err);
        }

        let sent = request.body.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        let body = Bytes::from_static(self.body.as_bytes());
        ctx.listener.on_bytes_transferred(sent, body.len() as u64);
        ctx.listener.on_call_end();

        Ok(CallResponse {
            status: 200,
            headers: HashMap::new(),
            body,
        })
    }
}

struct StubExecutorFactory {
    built: Mutex<Vec<String>>,
    /// Forced local address reported to the interceptor; falls back to the
    /// interface's first link address.
    forced_local: Option<IpAddr>,
}

impl StubExecutorFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            built: Mutex::new(Vec::new()),
            forced_local: None,
        })
    }

    fn with_forced_local(addr: IpAddr) -> Arc<Self> {
        Arc::new(Self {
            built: Mutex::new(Vec::new()),
            forced_local: Some(addr),
        })
    }

    fn built(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }
}

impl ExecutorFactory for StubExecutorFactory {
    fn build(
        &self,
        network: &NetworkId,
        link: &LinkAttributes,
    ) -> Result<Arc<dyn CallExecutor>, BridgeError> {
        self.built.lock().unwrap().push(network.to_string());
        let local_addr = self.forced_local.or_else(|| link.addresses.first().copied());
        Ok(Arc::new(StubExecutor {
            network: network.clone(),
            local_addr,
            body: "hello",
        }))
    }
}

#[derive(Default)]
struct RecordingUsage {
    records: Mutex<Vec<UsageRecord>>,
}

impl RecordingUsage {
    fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageRecorder for RecordingUsage {
    async fn record(&self, record: UsageRecord) {
        self.records.lock().unwrap().push(record);
    }
}

fn build_router(
    policy: RoutingPolicy,
    activator: Arc<GateActivator>,
    factory: Arc<StubExecutorFactory>,
    usage: Arc<RecordingUsage>,
    wait_ceiling: Duration,
) -> RequestRouter {
    let config = CoreConfig::builder()
        .activator(activator)
        .executor_factory(factory)
        .usage_recorder(usage)
        .wait_ceiling(wait_ceiling)
        .activation_timeout(Duration::from_secs(30))
        .build()
        .unwrap();
    RequestRouter::new(config, policy, None)
}

fn wifi_caps() -> InterfaceCapabilities {
    InterfaceCapabilities::for_transport(TransportKind::Wifi)
}

fn cell_caps() -> InterfaceCapabilities {
    InterfaceCapabilities::for_transport(TransportKind::Cellular)
}

fn announce(
    router: &RequestRouter,
    id: &str,
    caps: InterfaceCapabilities,
    link: LinkAttributes,
) {
    let catalog = router.catalog();
    catalog.on_capabilities_changed(NetworkId::from(id), caps);
    catalog.on_link_changed(NetworkId::from(id), link);
    catalog.on_available(NetworkId::from(id));
}

async fn wait_for_entries(router: &RequestRouter, count: usize) {
    let mut rx = router.catalog().subscribe();
    tokio::time::timeout(
        Duration::from_secs(1),
        rx.wait_for(|snapshot| snapshot.entries().len() == count),
    )
    .await
    .expect("catalog did not publish expected entries")
    .expect("catalog worker stopped");
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn cellular_only_purpose_fails_without_touching_the_platform() {
    let (activator, _gate) = GateActivator::new();
    let factory = StubExecutorFactory::new();
    let usage = Arc::new(RecordingUsage::default());

    let cellular_only = PurposeRule {
        wifi: false,
        cellular_unmetered: true,
        cellular_metered: true,
        bluetooth: false,
        unclassified: false,
        high_bandwidth: false,
    };
    let policy = RoutingPolicy::default().with_rule(RequestPurpose::BackgroundSync, cellular_only);

    let router = build_router(
        policy,
        activator.clone(),
        factory.clone(),
        usage.clone(),
        Duration::from_secs(1),
    );

    announce(&router, "wifi-1", wifi_caps(), LinkAttributes::named("wlan0"));
    wait_for_entries(&router, 1).await;

    let request = OutboundRequest::get("https://api.example.com/sync")
        .purpose(RequestPurpose::BackgroundSync)
        .build();

    let err = router.submit(request).await.unwrap_err();
    assert!(matches!(err, RouteError::NoSuitableNetwork { .. }));

    // The call never reached the network and no platform request was issued.
    assert_eq!(activator.calls(), 0);
    assert!(factory.built().is_empty());
    assert!(usage.records().is_empty());
}

#[tokio::test]
async fn concurrent_streaming_callers_share_one_activation() {
    let (activator, gate) = GateActivator::new();
    let factory = StubExecutorFactory::new();
    let usage = Arc::new(RecordingUsage::default());

    let router = Arc::new(build_router(
        RoutingPolicy::default(),
        activator.clone(),
        factory.clone(),
        usage.clone(),
        Duration::from_secs(5),
    ));

    announce(&router, "wifi-1", wifi_caps(), LinkAttributes::named("wlan0"));
    router
        .catalog()
        .on_default_network_changed(Some(NetworkId::from("wifi-1")));
    wait_for_entries(&router, 1).await;

    // Open the gate only once both callers hold a lease, so the second
    // caller provably reused the in-flight platform request.
    {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            loop {
                if router.leases().holders() == 2 {
                    gate.send(true).ok();
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
    }

    let request = || {
        OutboundRequest::get("https://cdn.example.com/track.flac")
            .purpose(RequestPurpose::StreamingMedia)
            .build()
    };

    let (a, b) = tokio::join!(router.submit(request()), router.submit(request()));
    assert_eq!(a.unwrap().status, 200);
    assert_eq!(b.unwrap().status, 200);

    assert_eq!(activator.calls(), 1);
    assert_eq!(router.leases().holders(), 0);
    eventually(|| activator.releases() == 1).await;
}

#[tokio::test]
async fn lease_wait_timeout_surfaces_no_suitable_network() {
    let (activator, _gate) = GateActivator::new();
    let factory = StubExecutorFactory::new();
    let usage = Arc::new(RecordingUsage::default());

    let router = build_router(
        RoutingPolicy::default(),
        activator.clone(),
        factory.clone(),
        usage.clone(),
        Duration::from_millis(100),
    );

    announce(&router, "wifi-1", wifi_caps(), LinkAttributes::named("wlan0"));
    wait_for_entries(&router, 1).await;

    let request = OutboundRequest::get("https://cdn.example.com/track.flac")
        .purpose(RequestPurpose::StreamingMedia)
        .build();

    let err = router.submit(request).await.unwrap_err();
    assert!(matches!(err, RouteError::NoSuitableNetwork { .. }));

    // The platform request was issued, and the failed claim was released.
    assert_eq!(activator.calls(), 1);
    eventually(|| router.leases().holders() == 0).await;

    // Nothing was dispatched.
    assert!(factory.built().is_empty());
    assert!(usage.records().is_empty());
}

#[tokio::test]
async fn policy_rejects_actual_bound_network_at_connection_time() {
    let (activator, _gate) = GateActivator::new();
    // The executor reports a local address matching no entry, so the
    // interceptor resolves the Bluetooth fallback.
    let factory = StubExecutorFactory::with_forced_local("192.0.2.9".parse().unwrap());
    let usage = Arc::new(RecordingUsage::default());

    let router = build_router(
        RoutingPolicy::default(),
        activator,
        factory.clone(),
        usage.clone(),
        Duration::from_secs(1),
    );

    announce(
        &router,
        "wifi-1",
        wifi_caps(),
        LinkAttributes::named("wlan0").with_address("10.0.0.2".parse().unwrap()),
    );
    announce(
        &router,
        "bt-1",
        InterfaceCapabilities::for_transport(TransportKind::Bluetooth),
        LinkAttributes::named("bnep0"),
    );
    wait_for_entries(&router, 2).await;

    let request = OutboundRequest::get("https://img.example.com/avatar.png")
        .purpose(RequestPurpose::ImageFetch)
        .build();

    let err = router.submit(request).await.unwrap_err();
    assert!(matches!(err, RouteError::Forbidden { .. }));

    let records = usage.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::Rejected);
}

#[tokio::test]
async fn rebuilt_retry_reselects_after_interface_loss() {
    let (activator, _gate) = GateActivator::new();
    let factory = StubExecutorFactory::new();
    let usage = Arc::new(RecordingUsage::default());

    let router = build_router(
        RoutingPolicy::default(),
        activator,
        factory.clone(),
        usage.clone(),
        Duration::from_secs(1),
    );

    announce(&router, "wifi-1", wifi_caps(), LinkAttributes::named("wlan0"));
    wait_for_entries(&router, 1).await;

    let original = OutboundRequest::get("https://api.example.com/feed")
        .purpose(RequestPurpose::BackgroundSync)
        .build();

    let response = router.submit(original.clone()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(factory.built(), vec!["wifi-1"]);

    // The interface drops mid-session and cellular appears.
    router.catalog().on_lost(NetworkId::from("wifi-1"));
    announce(&router, "cell-1", cell_caps(), LinkAttributes::named("rmnet0"));
    let mut rx = router.catalog().subscribe();
    tokio::time::timeout(
        Duration::from_secs(1),
        rx.wait_for(|snapshot| {
            snapshot.get(&NetworkId::from("cell-1")).is_some()
                && snapshot.get(&NetworkId::from("wifi-1")).is_none()
        }),
    )
    .await
    .expect("catalog did not converge after interface loss")
    .expect("catalog worker stopped");

    // A retry is a fresh request rebuilt from immutable data; it re-runs
    // selection and lands on the new interface with a new executor.
    let retry = original.rebuild().build();
    let response = router.submit(retry).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(factory.built(), vec!["wifi-1", "cell-1"]);
}

#[tokio::test]
async fn usage_recorded_with_byte_counts_on_success() {
    let (activator, _gate) = GateActivator::new();
    let factory = StubExecutorFactory::new();
    let usage = Arc::new(RecordingUsage::default());

    let router = build_router(
        RoutingPolicy::default(),
        activator,
        factory,
        usage.clone(),
        Duration::from_secs(1),
    );

    announce(&router, "wifi-1", wifi_caps(), LinkAttributes::named("wlan0"));
    wait_for_entries(&router, 1).await;

    let request = OutboundRequest::post("https://api.example.com/upload")
        .purpose(RequestPurpose::BackgroundSync)
        .body(Bytes::from_static(b"payload"))
        .build();

    router.submit(request).await.unwrap();

    let records = usage.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].purpose, RequestPurpose::BackgroundSync);
    assert_eq!(records[0].bytes_sent, 7);
    assert_eq!(records[0].bytes_received, 5);
    assert_eq!(records[0].outcome, CallOutcome::Completed { status: 200 });
}

#[tokio::test]
async fn executor_reused_for_same_interface() {
    let (activator, _gate) = GateActivator::new();
    let factory = StubExecutorFactory::new();
    let usage = Arc::new(RecordingUsage::default());

    let router = build_router(
        RoutingPolicy::default(),
        activator,
        factory.clone(),
        usage,
        Duration::from_secs(1),
    );

    announce(&router, "wifi-1", wifi_caps(), LinkAttributes::named("wlan0"));
    wait_for_entries(&router, 1).await;

    for _ in 0..3 {
        let request = OutboundRequest::get("https://api.example.com/feed")
            .purpose(RequestPurpose::ImageFetch)
            .build();
        router.submit(request).await.unwrap();
    }

    // One build, three dispatches.
    assert_eq!(factory.built(), vec!["wifi-1"]);
}

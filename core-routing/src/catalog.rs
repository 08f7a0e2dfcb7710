//! # Network Catalog
//!
//! Single source of truth for the live set of network interfaces and what is
//! known about them.
//!
//! ## Overview
//!
//! Platform connectivity callbacks are routed through one serialized inbox:
//! a dedicated worker task owns the mutable inventory and republishes an
//! immutable [`NetworkSnapshot`] through a `tokio::sync::watch` channel on
//! every mutation. Callers read the latest snapshot without blocking and
//! never observe a partially-applied update.
//!
//! ## Lifecycle
//!
//! An entry is created `Unknown` on first sighting and follows
//! `Unknown → Available ⇄ Losing → Lost`. Entries reported `Lost` are kept
//! for a grace window so flappy callbacks can re-announce them; the purge
//! message the worker schedules for itself removes the entry only if it is
//! still `Lost` when the window elapses. A re-announced interface gets a
//! fresh entry, so no entry ever transitions backward out of `Lost`.

use bridge_traits::network::{
    ConnectivitySink, InterfaceCapabilities, LinkAttributes, NetworkId, NetworkKind,
};
use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::lease::HighBandwidthListener;

/// Lifecycle state of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Sighted (e.g. via a capability callback) but not yet announced.
    Unknown,
    /// Usable.
    Available,
    /// Going away; the platform expects usability until `deadline`.
    Losing { deadline: Instant },
    /// Disconnected; purged after the grace window unless re-announced.
    Lost,
}

/// Everything known about one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEntry {
    pub id: NetworkId,
    pub state: NetworkState,
    pub capabilities: InterfaceCapabilities,
    pub link: LinkAttributes,
}

impl NetworkEntry {
    fn sighted(id: NetworkId) -> Self {
        Self {
            id,
            state: NetworkState::Unknown,
            capabilities: InterfaceCapabilities::default(),
            link: LinkAttributes::default(),
        }
    }

    /// Derived category from the current capability and link payloads.
    pub fn kind(&self) -> NetworkKind {
        NetworkKind::classify(&self.capabilities, &self.link)
    }

    /// Whether the interface can carry traffic right now.
    pub fn is_usable(&self) -> bool {
        matches!(
            self.state,
            NetworkState::Available | NetworkState::Losing { .. }
        )
    }
}

/// Immutable view of the inventory.
///
/// Contains every known entry except `Lost` ones, plus the designated
/// *active* entry: a currently-leased high-bandwidth network if one exists
/// and is still present, else the platform-reported default network. The
/// active entry, when present, always appears in the entry list.
#[derive(Debug, Clone, Default)]
pub struct NetworkSnapshot {
    entries: Vec<NetworkEntry>,
    active: Option<NetworkId>,
    high_bandwidth: Option<NetworkId>,
}

impl NetworkSnapshot {
    pub(crate) fn assemble(
        entries: Vec<NetworkEntry>,
        active: Option<NetworkId>,
        high_bandwidth: Option<NetworkId>,
    ) -> Self {
        Self {
            entries,
            active,
            high_bandwidth,
        }
    }

    pub fn entries(&self) -> &[NetworkEntry] {
        &self.entries
    }

    pub fn get(&self, id: &NetworkId) -> Option<&NetworkEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// The designated active entry, resolved against the entry list.
    pub fn active(&self) -> Option<&NetworkEntry> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    /// Whether a leased high-bandwidth network is present and active.
    pub fn high_bandwidth_active(&self) -> bool {
        self.high_bandwidth.is_some()
    }
}

enum Command {
    Available(NetworkId),
    Losing(NetworkId, Duration),
    Lost(NetworkId),
    Capabilities(NetworkId, InterfaceCapabilities),
    Link(NetworkId, LinkAttributes),
    DefaultChanged(Option<NetworkId>),
    HighBandwidthUp(NetworkId),
    HighBandwidthDown,
    PurgeIfLost(NetworkId),
    Inspect(oneshot::Sender<usize>),
}

/// Handle to the catalog worker.
///
/// Cheap to share; all mutation goes through the worker's inbox.
pub struct NetworkCatalog {
    tx: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<NetworkSnapshot>,
}

impl NetworkCatalog {
    /// Spawn the catalog worker.
    ///
    /// `lost_grace` is how long a `Lost` entry is retained before removal.
    pub fn spawn(lost_grace: Duration, events: Option<EventBus>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(NetworkSnapshot::default());

        let worker = Worker {
            entries: HashMap::new(),
            default_network: None,
            high_bandwidth: None,
            last_active: None,
            lost_grace,
            tx: tx.clone(),
            snapshot: snapshot_tx,
            events,
        };
        tokio::spawn(worker.run(rx));

        Arc::new(Self {
            tx,
            snapshot: snapshot_rx,
        })
    }

    /// Non-blocking read of the latest published snapshot.
    pub fn current_snapshot(&self) -> NetworkSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch for snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<NetworkSnapshot> {
        self.snapshot.clone()
    }

    /// Reverse lookup used to tag an in-flight connection with its interface
    /// after the HTTP engine picks a local address.
    ///
    /// Falls back to the Bluetooth entry, if any, when no link-address match
    /// exists. The fallback mirrors the proxied-transport setup where
    /// Bluetooth traffic carries no local interface address; it is a
    /// documented heuristic, not a general rule.
    pub fn network_for_local_address(&self, addr: IpAddr) -> Option<NetworkEntry> {
        let snapshot = self.snapshot.borrow();
        snapshot
            .entries()
            .iter()
            .find(|entry| entry.link.addresses.contains(&addr))
            .cloned()
            .or_else(|| {
                snapshot
                    .entries()
                    .iter()
                    .find(|entry| matches!(entry.kind(), NetworkKind::Bluetooth { .. }))
                    .cloned()
            })
    }

    /// Number of interfaces the worker currently tracks, including `Lost`
    /// entries still inside their grace window. Diagnostic only.
    pub async fn tracked_interfaces(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Inspect(tx));
        rx.await.unwrap_or(0)
    }

    /// Listener adapter for the lease manager's availability transitions.
    pub fn high_bandwidth_listener(&self) -> Arc<dyn HighBandwidthListener> {
        Arc::new(CatalogLeaseListener {
            tx: self.tx.clone(),
        })
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("Network catalog worker stopped; dropping connectivity update");
        }
    }
}

impl ConnectivitySink for NetworkCatalog {
    fn on_available(&self, id: NetworkId) {
        self.send(Command::Available(id));
    }

    fn on_losing(&self, id: NetworkId, grace: Duration) {
        self.send(Command::Losing(id, grace));
    }

    fn on_lost(&self, id: NetworkId) {
        self.send(Command::Lost(id));
    }

    fn on_capabilities_changed(&self, id: NetworkId, capabilities: InterfaceCapabilities) {
        self.send(Command::Capabilities(id, capabilities));
    }

    fn on_link_changed(&self, id: NetworkId, link: LinkAttributes) {
        self.send(Command::Link(id, link));
    }

    fn on_default_network_changed(&self, id: Option<NetworkId>) {
        self.send(Command::DefaultChanged(id));
    }
}

/// Routes lease transitions into the catalog inbox. No lock is shared with
/// the lease manager.
struct CatalogLeaseListener {
    tx: mpsc::UnboundedSender<Command>,
}

impl HighBandwidthListener for CatalogLeaseListener {
    fn on_high_bandwidth_available(&self, network: &NetworkId) {
        self.tx.send(Command::HighBandwidthUp(network.clone())).ok();
    }

    fn on_high_bandwidth_unavailable(&self) {
        self.tx.send(Command::HighBandwidthDown).ok();
    }
}

struct Worker {
    entries: HashMap<NetworkId, NetworkEntry>,
    default_network: Option<NetworkId>,
    high_bandwidth: Option<NetworkId>,
    last_active: Option<NetworkId>,
    lost_grace: Duration,
    tx: mpsc::UnboundedSender<Command>,
    snapshot: watch::Sender<NetworkSnapshot>,
    events: Option<EventBus>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            if self.apply(command) {
                self.publish();
            }
        }
        debug!("Network catalog worker shutting down");
    }

    /// Apply one inbox command. Returns whether the inventory changed.
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Available(id) => {
                let entry = self
                    .entries
                    .entry(id.clone())
                    .or_insert_with(|| NetworkEntry::sighted(id.clone()));
                if entry.state == NetworkState::Lost {
                    // Re-announcement after loss: a fresh entry replaces the
                    // stale one instead of walking backward out of Lost.
                    *entry = NetworkEntry::sighted(id.clone());
                }
                entry.state = NetworkState::Available;
                self.emit(NetworkEvent::InterfaceAvailable {
                    network: id.to_string(),
                });
                true
            }
            Command::Losing(id, grace) => {
                let entry = self
                    .entries
                    .entry(id.clone())
                    .or_insert_with(|| NetworkEntry::sighted(id.clone()));
                if entry.state == NetworkState::Lost {
                    return false;
                }
                entry.state = NetworkState::Losing {
                    deadline: Instant::now() + grace,
                };
                self.emit(NetworkEvent::InterfaceLosing {
                    network: id.to_string(),
                    grace_ms: grace.as_millis() as u64,
                });
                true
            }
            Command::Lost(id) => {
                let Some(entry) = self.entries.get_mut(&id) else {
                    return false;
                };
                if entry.state == NetworkState::Lost {
                    return false;
                }
                entry.state = NetworkState::Lost;
                self.schedule_purge(id.clone());
                self.emit(NetworkEvent::InterfaceLost {
                    network: id.to_string(),
                });
                true
            }
            Command::Capabilities(id, capabilities) => {
                let entry = self
                    .entries
                    .entry(id.clone())
                    .or_insert_with(|| NetworkEntry::sighted(id));
                entry.capabilities = capabilities;
                true
            }
            Command::Link(id, link) => {
                let entry = self
                    .entries
                    .entry(id.clone())
                    .or_insert_with(|| NetworkEntry::sighted(id));
                entry.link = link;
                true
            }
            Command::DefaultChanged(id) => {
                self.default_network = id;
                true
            }
            Command::HighBandwidthUp(id) => {
                self.high_bandwidth = Some(id);
                true
            }
            Command::HighBandwidthDown => {
                self.high_bandwidth = None;
                true
            }
            Command::PurgeIfLost(id) => {
                let still_lost = self
                    .entries
                    .get(&id)
                    .map(|entry| entry.state == NetworkState::Lost)
                    .unwrap_or(false);
                if still_lost {
                    self.entries.remove(&id);
                    self.emit(NetworkEvent::InterfacePurged {
                        network: id.to_string(),
                    });
                    return true;
                }
                false
            }
            Command::Inspect(reply) => {
                reply.send(self.entries.len()).ok();
                false
            }
        }
    }

    fn schedule_purge(&self, id: NetworkId) {
        let tx = self.tx.clone();
        let grace = self.lost_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tx.send(Command::PurgeIfLost(id)).ok();
        });
    }

    fn publish(&mut self) {
        let mut entries: Vec<NetworkEntry> = self
            .entries
            .values()
            .filter(|entry| entry.state != NetworkState::Lost)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        let usable = |id: &NetworkId| {
            entries
                .iter()
                .any(|entry| &entry.id == id && entry.is_usable())
        };

        let high_bandwidth = self.high_bandwidth.clone().filter(|id| usable(id));
        let active = high_bandwidth
            .clone()
            .or_else(|| self.default_network.clone().filter(|id| usable(id)));

        if active != self.last_active {
            self.last_active = active.clone();
            self.emit(NetworkEvent::ActiveChanged {
                network: active.as_ref().map(|id| id.to_string()),
            });
        }

        self.snapshot
            .send_replace(NetworkSnapshot::assemble(entries, active, high_bandwidth));
    }

    fn emit(&self, event: NetworkEvent) {
        if let Some(bus) = &self.events {
            bus.emit(CoreEvent::Network(event)).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::network::TransportKind;

    fn wifi_caps() -> InterfaceCapabilities {
        InterfaceCapabilities::for_transport(TransportKind::Wifi)
    }

    fn cell_caps() -> InterfaceCapabilities {
        InterfaceCapabilities::for_transport(TransportKind::Cellular)
    }

    async fn wait_until<F>(catalog: &NetworkCatalog, mut predicate: F)
    where
        F: FnMut(&NetworkSnapshot) -> bool,
    {
        let mut rx = catalog.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| predicate(s)))
            .await
            .expect("snapshot predicate not reached")
            .expect("catalog worker stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_entry_is_published() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        catalog.on_capabilities_changed(NetworkId::from("wifi-1"), wifi_caps());
        catalog.on_available(NetworkId::from("wifi-1"));

        wait_until(&catalog, |s| {
            s.get(&NetworkId::from("wifi-1"))
                .map(|e| e.is_usable())
                .unwrap_or(false)
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_callbacks_yield_single_entry() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        catalog.on_available(NetworkId::from("wifi-1"));
        catalog.on_available(NetworkId::from("wifi-1"));
        catalog.on_capabilities_changed(NetworkId::from("wifi-1"), wifi_caps());

        wait_until(&catalog, |s| !s.entries().is_empty()).await;
        assert_eq!(catalog.current_snapshot().entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_entry_leaves_snapshot_immediately() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        catalog.on_available(NetworkId::from("wifi-1"));
        wait_until(&catalog, |s| !s.entries().is_empty()).await;

        catalog.on_lost(NetworkId::from("wifi-1"));
        wait_until(&catalog, |s| s.entries().is_empty()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_entry_purged_after_grace() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        catalog.on_available(NetworkId::from("wifi-1"));
        wait_until(&catalog, |s| !s.entries().is_empty()).await;
        assert_eq!(catalog.tracked_interfaces().await, 1);

        catalog.on_lost(NetworkId::from("wifi-1"));
        wait_until(&catalog, |s| s.entries().is_empty()).await;

        // Still tracked inside the grace window.
        assert_eq!(catalog.tracked_interfaces().await, 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(catalog.tracked_interfaces().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flap_back_to_available_cancels_purge() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        catalog.on_available(NetworkId::from("wifi-1"));
        catalog.on_lost(NetworkId::from("wifi-1"));
        catalog.on_available(NetworkId::from("wifi-1"));

        wait_until(&catalog, |s| !s.entries().is_empty()).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(catalog.tracked_interfaces().await, 1);
        assert!(!catalog.current_snapshot().entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_losing_entry_remains_usable() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        catalog.on_available(NetworkId::from("wifi-1"));
        catalog.on_losing(NetworkId::from("wifi-1"), Duration::from_secs(30));

        wait_until(&catalog, |s| {
            matches!(
                s.get(&NetworkId::from("wifi-1")).map(|e| e.state),
                Some(NetworkState::Losing { .. })
            )
        })
        .await;

        let snapshot = catalog.current_snapshot();
        assert!(snapshot.get(&NetworkId::from("wifi-1")).unwrap().is_usable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_network_designates_active() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        catalog.on_capabilities_changed(NetworkId::from("wifi-1"), wifi_caps());
        catalog.on_available(NetworkId::from("wifi-1"));
        catalog.on_default_network_changed(Some(NetworkId::from("wifi-1")));

        wait_until(&catalog, |s| s.active().is_some()).await;
        assert_eq!(
            catalog.current_snapshot().active().unwrap().id,
            NetworkId::from("wifi-1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_leased_network_overrides_default_active() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        catalog.on_capabilities_changed(NetworkId::from("wifi-1"), wifi_caps());
        catalog.on_available(NetworkId::from("wifi-1"));
        catalog.on_default_network_changed(Some(NetworkId::from("wifi-1")));

        catalog.on_capabilities_changed(NetworkId::from("cell-hb"), cell_caps());
        catalog.on_available(NetworkId::from("cell-hb"));

        let listener = catalog.high_bandwidth_listener();
        listener.on_high_bandwidth_available(&NetworkId::from("cell-hb"));

        wait_until(&catalog, |s| {
            s.active().map(|e| e.id == NetworkId::from("cell-hb")).unwrap_or(false)
        })
        .await;
        assert!(catalog.current_snapshot().high_bandwidth_active());

        listener.on_high_bandwidth_unavailable();
        wait_until(&catalog, |s| {
            s.active().map(|e| e.id == NetworkId::from("wifi-1")).unwrap_or(false)
        })
        .await;
        assert!(!catalog.current_snapshot().high_bandwidth_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_always_appears_in_entries() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);

        // Default points at an interface the catalog has never seen.
        catalog.on_default_network_changed(Some(NetworkId::from("ghost")));
        catalog.on_available(NetworkId::from("wifi-1"));

        wait_until(&catalog, |s| !s.entries().is_empty()).await;
        assert!(catalog.current_snapshot().active().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_lookup_with_bluetooth_fallback() {
        let catalog = NetworkCatalog::spawn(Duration::from_secs(5), None);
        let wifi_addr: IpAddr = "10.0.0.2".parse().unwrap();

        catalog.on_capabilities_changed(NetworkId::from("wifi-1"), wifi_caps());
        catalog.on_link_changed(
            NetworkId::from("wifi-1"),
            LinkAttributes::named("wlan0").with_address(wifi_addr),
        );
        catalog.on_available(NetworkId::from("wifi-1"));

        catalog.on_capabilities_changed(
            NetworkId::from("bt-1"),
            InterfaceCapabilities::for_transport(TransportKind::Bluetooth),
        );
        catalog.on_available(NetworkId::from("bt-1"));

        wait_until(&catalog, |s| s.entries().len() == 2).await;

        let matched = catalog.network_for_local_address(wifi_addr).unwrap();
        assert_eq!(matched.id, NetworkId::from("wifi-1"));

        // No address match resolves to the Bluetooth entry.
        let fallback = catalog
            .network_for_local_address("192.0.2.1".parse().unwrap())
            .unwrap();
        assert_eq!(fallback.id, NetworkId::from("bt-1"));
    }
}

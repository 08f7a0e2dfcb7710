//! # Routing Policy Engine
//!
//! Pure decision logic: given a request's declared purpose and a candidate
//! network's kind, decide permit/forbid, and pick a preferred network for a
//! purpose. No I/O, deterministic given inputs.
//!
//! The permission table is plain data with a documented default, so hosts
//! can tighten or loosen individual purposes without touching the engine.

use bridge_traits::http::{RequestPurpose, Verdict};
use bridge_traits::network::{NetworkKind, TransportKind};

use crate::catalog::{NetworkEntry, NetworkSnapshot};

/// Permissions for one request purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurposeRule {
    pub wifi: bool,
    pub cellular_unmetered: bool,
    pub cellular_metered: bool,
    pub bluetooth: bool,
    pub unclassified: bool,
    /// Whether this purpose may trigger a high-bandwidth lease acquisition.
    pub high_bandwidth: bool,
}

impl PurposeRule {
    fn permits(&self, kind: &NetworkKind) -> bool {
        match kind {
            NetworkKind::Wifi { .. } => self.wifi,
            NetworkKind::Cellular { metered: false, .. } => self.cellular_unmetered,
            NetworkKind::Cellular { metered: true, .. } => self.cellular_metered,
            NetworkKind::Bluetooth { .. } => self.bluetooth,
            NetworkKind::Unknown { .. } => self.unclassified,
        }
    }
}

/// Permission table keyed by purpose.
///
/// The default table:
///
/// | Purpose         | Wi-Fi | Cell (unmetered) | Cell (metered) | Bluetooth | Unknown kind | High-bandwidth |
/// |-----------------|-------|------------------|----------------|-----------|--------------|----------------|
/// | background-sync | yes   | yes              | yes            | yes       | yes          | no             |
/// | streaming-media | yes   | yes              | no             | no        | no           | yes            |
/// | image-fetch     | yes   | yes              | yes            | no        | no           | no             |
/// | unknown         | yes   | yes              | yes            | yes       | yes          | no             |
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    background_sync: PurposeRule,
    streaming_media: PurposeRule,
    image_fetch: PurposeRule,
    unknown: PurposeRule,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        let permissive = PurposeRule {
            wifi: true,
            cellular_unmetered: true,
            cellular_metered: true,
            bluetooth: true,
            unclassified: true,
            high_bandwidth: false,
        };

        Self {
            background_sync: permissive,
            streaming_media: PurposeRule {
                wifi: true,
                cellular_unmetered: true,
                cellular_metered: false,
                bluetooth: false,
                unclassified: false,
                high_bandwidth: true,
            },
            image_fetch: PurposeRule {
                wifi: true,
                cellular_unmetered: true,
                cellular_metered: true,
                bluetooth: false,
                unclassified: false,
                high_bandwidth: false,
            },
            unknown: permissive,
        }
    }
}

impl RoutingPolicy {
    /// Replace the rule for one purpose.
    pub fn with_rule(mut self, purpose: RequestPurpose, rule: PurposeRule) -> Self {
        match purpose {
            RequestPurpose::BackgroundSync => self.background_sync = rule,
            RequestPurpose::StreamingMedia => self.streaming_media = rule,
            RequestPurpose::ImageFetch => self.image_fetch = rule,
            RequestPurpose::Unknown => self.unknown = rule,
        }
        self
    }

    pub fn rule(&self, purpose: RequestPurpose) -> &PurposeRule {
        match purpose {
            RequestPurpose::BackgroundSync => &self.background_sync,
            RequestPurpose::StreamingMedia => &self.streaming_media,
            RequestPurpose::ImageFetch => &self.image_fetch,
            RequestPurpose::Unknown => &self.unknown,
        }
    }

    /// Whether satisfying `purpose` may trigger a lease acquisition.
    pub fn is_high_bandwidth(&self, purpose: RequestPurpose) -> bool {
        self.rule(purpose).high_bandwidth
    }

    /// Permit/forbid a purpose on a network kind.
    ///
    /// Re-validated at connection-establishment time, not just selection
    /// time: the network actually bound to a socket may differ from the one
    /// selected ahead of dispatch.
    pub fn check_request(&self, purpose: RequestPurpose, kind: &NetworkKind) -> Verdict {
        if self.rule(purpose).permits(kind) {
            Verdict::Permit
        } else {
            Verdict::Forbid
        }
    }

    /// Transports to request from the platform when acquiring a
    /// high-bandwidth lease for this purpose.
    pub fn supported_transports(&self, purpose: RequestPurpose) -> Vec<TransportKind> {
        let rule = self.rule(purpose);
        let mut transports = Vec::new();
        if rule.wifi {
            transports.push(TransportKind::Wifi);
        }
        if rule.cellular_unmetered || rule.cellular_metered {
            transports.push(TransportKind::Cellular);
        }
        transports
    }

    /// Preferred network for `purpose` over the given snapshot.
    ///
    /// Returns the snapshot's active entry if its kind is permitted;
    /// otherwise the first permitted usable entry in the fixed priority
    /// order Wi-Fi > Cellular-unmetered > Cellular-metered > Bluetooth.
    pub fn preferred_network<'a>(
        &self,
        purpose: RequestPurpose,
        snapshot: &'a NetworkSnapshot,
    ) -> Option<&'a NetworkEntry> {
        let rule = self.rule(purpose);

        if let Some(active) = snapshot.active() {
            if rule.permits(&active.kind()) {
                return Some(active);
            }
        }

        let candidates = |predicate: fn(&NetworkKind) -> bool| {
            snapshot
                .entries()
                .iter()
                .find(move |entry| entry.is_usable() && predicate(&entry.kind()))
        };

        let tiers: [fn(&NetworkKind) -> bool; 4] = [
            |kind| matches!(kind, NetworkKind::Wifi { .. }),
            |kind| matches!(kind, NetworkKind::Cellular { metered: false, .. }),
            |kind| matches!(kind, NetworkKind::Cellular { metered: true, .. }),
            |kind| matches!(kind, NetworkKind::Bluetooth { .. }),
        ];

        tiers
            .into_iter()
            .filter_map(candidates)
            .find(|entry| rule.permits(&entry.kind()))
    }
}

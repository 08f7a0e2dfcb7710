//! Connectivity Abstraction
//!
//! Payload types reported by the platform connectivity notifier, plus the
//! sink trait the notifier feeds. The derived [`NetworkKind`] classification
//! is the single place where raw capability flags are turned into a usable
//! network category.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Opaque identifier assigned by the platform per physical or virtual
/// interface. Unique while the interface is up; a re-announced interface may
/// reuse an old identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Transport category used in capability bits and activation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Wifi,
    Cellular,
    Bluetooth,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Wifi => f.write_str("wifi"),
            TransportKind::Cellular => f.write_str("cellular"),
            TransportKind::Bluetooth => f.write_str("bluetooth"),
        }
    }
}

/// Capability payload delivered by the platform's capability-change callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceCapabilities {
    /// Declared transport bits. Usually a single entry.
    pub transports: Vec<TransportKind>,
    /// Explicit Wi-Fi transport info. Outranks the transport bits during
    /// classification.
    pub ssid: Option<String>,
    /// Whether the platform flags the interface as metered.
    pub metered: bool,
    /// Whether the interface validated internet reachability.
    pub internet: bool,
}

impl InterfaceCapabilities {
    pub fn for_transport(transport: TransportKind) -> Self {
        Self {
            transports: vec![transport],
            internet: true,
            ..Self::default()
        }
    }

    pub fn has_transport(&self, transport: TransportKind) -> bool {
        self.transports.contains(&transport)
    }
}

/// Link-property payload delivered by the platform's link-change callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAttributes {
    /// OS-level interface name (e.g. `wlan0`, `rmnet0`, `bnep0`).
    pub interface_name: Option<String>,
    /// Local addresses bound to the interface.
    pub addresses: Vec<IpAddr>,
}

impl LinkAttributes {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            interface_name: Some(name.into()),
            addresses: Vec::new(),
        }
    }

    pub fn with_address(mut self, addr: IpAddr) -> Self {
        self.addresses.push(addr);
        self
    }
}

/// Derived network category.
///
/// Classification is derived from the capability and link payloads with a
/// fixed priority: explicit transport info (Wi-Fi SSID) > declared transport
/// bit > interface-name heuristic > `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkKind {
    Wifi { name: String, ssid: Option<String> },
    Cellular { name: String, metered: bool },
    Bluetooth { name: String },
    Unknown { name: String },
}

impl NetworkKind {
    /// Classify an interface from its platform-reported payloads.
    pub fn classify(capabilities: &InterfaceCapabilities, link: &LinkAttributes) -> Self {
        let name = link
            .interface_name
            .clone()
            .unwrap_or_else(|| "unnamed".to_string());

        // Explicit transport info wins over everything else.
        if capabilities.ssid.is_some() {
            return NetworkKind::Wifi {
                name,
                ssid: capabilities.ssid.clone(),
            };
        }

        // Declared transport bit.
        if capabilities.has_transport(TransportKind::Wifi) {
            return NetworkKind::Wifi { name, ssid: None };
        }
        if capabilities.has_transport(TransportKind::Cellular) {
            return NetworkKind::Cellular {
                name,
                metered: capabilities.metered,
            };
        }
        if capabilities.has_transport(TransportKind::Bluetooth) {
            return NetworkKind::Bluetooth { name };
        }

        // Interface-name heuristic as a last resort before Unknown.
        let lowered = name.to_lowercase();
        if lowered.starts_with("wlan") || lowered.starts_with("wifi") {
            NetworkKind::Wifi { name, ssid: None }
        } else if lowered.starts_with("rmnet")
            || lowered.starts_with("ccmni")
            || lowered.starts_with("wwan")
        {
            NetworkKind::Cellular {
                name,
                metered: capabilities.metered,
            }
        } else if lowered.starts_with("bt") || lowered.starts_with("bnep") {
            NetworkKind::Bluetooth { name }
        } else {
            NetworkKind::Unknown { name }
        }
    }

    /// Transport category of this kind, if it maps to one.
    pub fn transport(&self) -> Option<TransportKind> {
        match self {
            NetworkKind::Wifi { .. } => Some(TransportKind::Wifi),
            NetworkKind::Cellular { .. } => Some(TransportKind::Cellular),
            NetworkKind::Bluetooth { .. } => Some(TransportKind::Bluetooth),
            NetworkKind::Unknown { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NetworkKind::Wifi { name, .. }
            | NetworkKind::Cellular { name, .. }
            | NetworkKind::Bluetooth { name }
            | NetworkKind::Unknown { name } => name,
        }
    }

    pub fn is_metered(&self) -> bool {
        matches!(self, NetworkKind::Cellular { metered: true, .. })
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Wifi {
                name,
                ssid: Some(ssid),
            } => write!(f, "wifi {} ({})", name, ssid),
            NetworkKind::Wifi { name, ssid: None } => write!(f, "wifi {}", name),
            NetworkKind::Cellular {
                name,
                metered: true,
            } => write!(f, "cellular {} (metered)", name),
            NetworkKind::Cellular { name, .. } => write!(f, "cellular {}", name),
            NetworkKind::Bluetooth { name } => write!(f, "bluetooth {}", name),
            NetworkKind::Unknown { name } => write!(f, "unknown {}", name),
        }
    }
}

/// Sink for platform connectivity callbacks.
///
/// The platform notifier (or a polling stand-in on hosts without one) pushes
/// interface lifecycle updates into whatever owns the live inventory.
/// Implementations must tolerate out-of-order and duplicate callbacks.
pub trait ConnectivitySink: Send + Sync {
    /// The interface satisfied its request and is usable.
    fn on_available(&self, id: NetworkId);

    /// The interface is about to go away; `grace` is the platform's estimate
    /// of remaining usability.
    fn on_losing(&self, id: NetworkId, grace: Duration);

    /// The interface disconnected.
    fn on_lost(&self, id: NetworkId);

    /// Capability flags changed (also delivered once after availability).
    fn on_capabilities_changed(&self, id: NetworkId, capabilities: InterfaceCapabilities);

    /// Link properties changed (also delivered once after availability).
    fn on_link_changed(&self, id: NetworkId, link: LinkAttributes);

    /// The platform's default network changed; `None` when there is none.
    fn on_default_network_changed(&self, id: Option<NetworkId>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssid_outranks_transport_bits() {
        let caps = InterfaceCapabilities {
            transports: vec![TransportKind::Cellular],
            ssid: Some("home-net".to_string()),
            metered: true,
            internet: true,
        };
        let link = LinkAttributes::named("rmnet0");

        // Explicit Wi-Fi info wins even with a cellular transport bit.
        assert_eq!(
            NetworkKind::classify(&caps, &link),
            NetworkKind::Wifi {
                name: "rmnet0".to_string(),
                ssid: Some("home-net".to_string()),
            }
        );
    }

    #[test]
    fn test_transport_bit_outranks_name_heuristic() {
        let caps = InterfaceCapabilities::for_transport(TransportKind::Bluetooth);
        let link = LinkAttributes::named("wlan0");

        assert_eq!(
            NetworkKind::classify(&caps, &link),
            NetworkKind::Bluetooth {
                name: "wlan0".to_string(),
            }
        );
    }

    #[test]
    fn test_name_heuristic() {
        let caps = InterfaceCapabilities::default();

        assert!(matches!(
            NetworkKind::classify(&caps, &LinkAttributes::named("wlan0")),
            NetworkKind::Wifi { .. }
        ));
        assert!(matches!(
            NetworkKind::classify(&caps, &LinkAttributes::named("ccmni1")),
            NetworkKind::Cellular { .. }
        ));
        assert!(matches!(
            NetworkKind::classify(&caps, &LinkAttributes::named("bnep0")),
            NetworkKind::Bluetooth { .. }
        ));
        assert!(matches!(
            NetworkKind::classify(&caps, &LinkAttributes::named("eth0")),
            NetworkKind::Unknown { .. }
        ));
    }

    #[test]
    fn test_unnamed_interface_is_unknown() {
        let kind = NetworkKind::classify(
            &InterfaceCapabilities::default(),
            &LinkAttributes::default(),
        );
        assert_eq!(
            kind,
            NetworkKind::Unknown {
                name: "unnamed".to_string(),
            }
        );
    }

    #[test]
    fn test_metered_flag_carried_into_cellular() {
        let caps = InterfaceCapabilities {
            transports: vec![TransportKind::Cellular],
            metered: true,
            internet: true,
            ssid: None,
        };
        let kind = NetworkKind::classify(&caps, &LinkAttributes::named("rmnet0"));
        assert!(kind.is_metered());
        assert_eq!(kind.transport(), Some(TransportKind::Cellular));
    }
}

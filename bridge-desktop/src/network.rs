//! Connectivity Probe Implementation
//!
//! Desktop stand-in for the platform connectivity notifier. Desktop hosts
//! have no callback-based interface inventory, so the probe polls a
//! well-known endpoint and synthesizes availability/loss callbacks for a
//! single host-default interface.
//!
//! Note: Platform-specific implementations (Linux netlink, macOS
//! SystemConfiguration, Windows WinAPI) would be more robust but require
//! additional dependencies.

use bridge_traits::network::{ConnectivitySink, InterfaceCapabilities, LinkAttributes, NetworkId};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

const PROBE_ENDPOINT: &str = "8.8.8.8:53";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls for connectivity and feeds a [`ConnectivitySink`] with synthetic
/// callbacks for the host's default route.
pub struct PollingConnectivityProbe {
    sink: Arc<dyn ConnectivitySink>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollingConnectivityProbe {
    /// Create a probe polling every 5 seconds
    pub fn new(sink: Arc<dyn ConnectivitySink>) -> Self {
        Self::with_interval(sink, Duration::from_secs(5))
    }

    /// Create a probe with a custom polling interval
    pub fn with_interval(sink: Arc<dyn ConnectivitySink>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            handle: Mutex::new(None),
        }
    }

    /// Capabilities reported for the synthetic host-default interface.
    pub fn default_capabilities() -> InterfaceCapabilities {
        InterfaceCapabilities {
            transports: Vec::new(),
            ssid: None,
            // Desktop connections are typically not metered
            metered: false,
            internet: true,
        }
    }

    /// Start polling. A second call replaces the previous poll loop.
    pub fn start(&self) {
        let sink = Arc::clone(&self.sink);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let id = NetworkId::from("host-default");
            let mut was_up = false;

            loop {
                let local = check_connectivity().await;
                debug!(up = local.is_some(), local_addr = ?local, "Connectivity probe tick");
                apply_probe_result(&mut was_up, &id, sink.as_ref(), local);
                tokio::time::sleep(interval).await;
            }
        });

        let mut handle = self.handle.lock().unwrap();
        if let Some(previous) = handle.replace(task) {
            previous.abort();
        }
    }

    /// Stop polling. Already-delivered callbacks are not rolled back.
    pub fn stop(&self) {
        if let Some(task) = self.handle.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for PollingConnectivityProbe {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Synthesize callbacks for an up/down edge; steady state stays silent.
fn apply_probe_result(
    was_up: &mut bool,
    id: &NetworkId,
    sink: &dyn ConnectivitySink,
    local: Option<IpAddr>,
) {
    let up = local.is_some();

    if up && !*was_up {
        let mut link = LinkAttributes::named("host0");
        if let Some(addr) = local {
            link = link.with_address(addr);
        }
        sink.on_capabilities_changed(id.clone(), PollingConnectivityProbe::default_capabilities());
        sink.on_link_changed(id.clone(), link);
        sink.on_available(id.clone());
        sink.on_default_network_changed(Some(id.clone()));
    } else if !up && *was_up {
        sink.on_lost(id.clone());
        sink.on_default_network_changed(None);
    }

    *was_up = up;
}

/// Check network connectivity by attempting a connection to a reliable
/// endpoint; returns the local address the OS chose for the route.
async fn check_connectivity() -> Option<IpAddr> {
    match tokio::time::timeout(
        PROBE_TIMEOUT,
        tokio::net::TcpStream::connect(PROBE_ENDPOINT),
    )
    .await
    {
        Ok(Ok(stream)) => stream.local_addr().ok().map(|addr| addr.ip()),
        Ok(Err(_)) => None,
        Err(_) => None,
    }
}

//! # Network-Aware Request Routing
//!
//! Core of the connectivity layer: classifies outgoing HTTP calls by
//! purpose, matches them against a live inventory of network interfaces,
//! enforces policy about which request types may use which network, and
//! coordinates transient high-bandwidth activation with reference counting
//! and timeouts.
//!
//! ## Components
//!
//! - [`catalog::NetworkCatalog`] - live interface inventory fed by the
//!   platform connectivity notifier, publishing immutable snapshots
//! - [`lease::BandwidthLeaseManager`] - reference-counted coordinator for
//!   the shared high-bandwidth platform request
//! - [`policy::RoutingPolicy`] - pure permit/forbid and preference logic
//! - [`router::RequestRouter`] - per-request state machine tying the above
//!   together with per-interface executor caching and usage accounting
//!
//! ## Usage
//!
//! ```ignore
//! use core_routing::{RequestRouter, RoutingPolicy};
//! use core_runtime::config::CoreConfig;
//! use bridge_traits::{ConnectivitySink, OutboundRequest, RequestPurpose};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .activator(platform_activator)
//!     .build()?;
//! let router = RequestRouter::new(config, RoutingPolicy::default(), None);
//!
//! // Platform callbacks feed the catalog:
//! router.catalog().on_available("wifi-1".into());
//!
//! let request = OutboundRequest::get("https://api.example.com/feed")
//!     .purpose(RequestPurpose::BackgroundSync)
//!     .build();
//! let response = router.submit(request).await?;
//! ```

pub mod catalog;
pub mod error;
pub mod lease;
pub mod policy;
pub mod router;

pub use catalog::{NetworkCatalog, NetworkEntry, NetworkSnapshot, NetworkState};
pub use error::{LeaseError, RouteError};
pub use lease::{BandwidthLease, BandwidthLeaseManager, HighBandwidthListener};
pub use policy::{PurposeRule, RoutingPolicy};
pub use router::RequestRouter;

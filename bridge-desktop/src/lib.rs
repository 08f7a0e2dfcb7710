//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop development hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! a desktop host can satisfy:
//! - `ExecutorFactory` / `CallExecutor` using `reqwest`, one client bound
//!   per network interface
//! - A polling connectivity probe that stands in for the platform
//!   connectivity notifier
//!
//! There is no desktop implementation of `NetworkActivator`: desktop hosts
//! have no transient high-bandwidth network to request. Hosts wire in the
//! platform adapter where one exists.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{PollingConnectivityProbe, ReqwestExecutorFactory};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let factory = ReqwestExecutorFactory::new();
//!     let probe = PollingConnectivityProbe::new(sink);
//!     probe.start();
//! }
//! ```

mod http;
mod network;

pub use http::{BoundCallExecutor, ReqwestExecutorFactory};
pub use network::PollingConnectivityProbe;

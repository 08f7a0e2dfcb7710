//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the routing core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that must be implemented differently per platform
//! (wearable, companion phone, desktop development host).
//!
//! ## Traits
//!
//! ### Connectivity
//! - [`ConnectivitySink`](network::ConnectivitySink) - Target of the platform
//!   connectivity notifier's interface lifecycle callbacks
//! - [`NetworkActivator`](activation::NetworkActivator) - Transient
//!   high-bandwidth network requests with explicit release
//!
//! ### Call Execution
//! - [`CallExecutor`](http::CallExecutor) - HTTP engine bound to one network
//!   interface, with connection-time policy re-validation hooks
//! - [`ExecutorFactory`](http::ExecutorFactory) - Builds an executor per
//!   interface for the router's cache
//!
//! ### Accounting
//! - [`UsageRecorder`](usage::UsageRecorder) - Per-call byte/outcome sink
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for
//! consistent error handling. Platform implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Pass connection-level I/O errors through unchanged
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks. Implementations must ensure thread safety.

pub mod activation;
pub mod error;
pub mod http;
pub mod network;
pub mod usage;

pub use error::BridgeError;

// Re-export commonly used types
pub use activation::{ActivationGrant, ActivationRequest, NetworkActivator};
pub use http::{
    CallContext, CallExecutor, CallListener, CallResponse, ConnectionInterceptor, ExecutorFactory,
    HttpMethod, OutboundRequest, OutboundRequestBuilder, RequestPurpose, Verdict,
};
pub use network::{
    ConnectivitySink, InterfaceCapabilities, LinkAttributes, NetworkId, NetworkKind, TransportKind,
};
pub use usage::{CallOutcome, LogUsageRecorder, UsageRecord, UsageRecorder};

//! HTTP Call Execution Abstraction
//!
//! Request/response model with purpose tagging, plus the traits the routing
//! core uses to drive a network-bound call executor. The executor owns
//! connection establishment, TLS, and pooling; the routing core only selects
//! which executor runs a call and observes its lifecycle through the hooks
//! defined here.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::network::{LinkAttributes, NetworkId};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

/// Caller-declared classification of why a request is being made.
///
/// The purpose picks the routing policy; it is immutable once the request
/// leaves the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestPurpose {
    /// Periodic data synchronization that tolerates slow transports.
    BackgroundSync,
    /// Continuous media transfer needing sustained throughput.
    StreamingMedia,
    /// One-shot asset fetch (thumbnails, avatars).
    ImageFetch,
    /// No purpose declared by the caller.
    Unknown,
}

impl fmt::Display for RequestPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPurpose::BackgroundSync => f.write_str("background-sync"),
            RequestPurpose::StreamingMedia => f.write_str("streaming-media"),
            RequestPurpose::ImageFetch => f.write_str("image-fetch"),
            RequestPurpose::Unknown => f.write_str("unknown"),
        }
    }
}

/// An outgoing HTTP request with its purpose tag.
///
/// Immutable once built. Routing state (selected network, lease) never lives
/// on the request, so a retry is a fresh instance produced through
/// [`OutboundRequest::rebuild`] that re-runs selection from scratch.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
    pub purpose: RequestPurpose,
}

impl OutboundRequest {
    pub fn builder(method: HttpMethod, url: impl Into<String>) -> OutboundRequestBuilder {
        OutboundRequestBuilder::new(method, url)
    }

    pub fn get(url: impl Into<String>) -> OutboundRequestBuilder {
        Self::builder(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> OutboundRequestBuilder {
        Self::builder(HttpMethod::Post, url)
    }

    /// Start a fresh builder carrying this request's immutable data.
    ///
    /// This is the retry path: the rebuilt request has no connection to any
    /// previous dispatch and goes through network selection again.
    pub fn rebuild(&self) -> OutboundRequestBuilder {
        OutboundRequestBuilder {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: self.timeout,
            purpose: self.purpose,
        }
    }
}

/// Builder for [`OutboundRequest`].
#[derive(Debug, Clone)]
pub struct OutboundRequestBuilder {
    method: HttpMethod,
    url: String,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    purpose: RequestPurpose,
}

impl OutboundRequestBuilder {
    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
            purpose: RequestPurpose::Unknown,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn purpose(mut self, purpose: RequestPurpose) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn build(self) -> OutboundRequest {
        OutboundRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
            purpose: self.purpose,
        }
    }
}

/// HTTP response
#[derive(Debug)]
pub struct CallResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl CallResponse {
    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Forbid,
}

/// Hook invoked at connection-establishment time.
///
/// The network actually bound to a socket may differ from the one selected
/// ahead of dispatch, so executors re-ask before sending. A `Forbid` verdict
/// aborts the call with [`BridgeError::Forbidden`].
pub trait ConnectionInterceptor: Send + Sync {
    fn on_connection_established(&self, local_addr: Option<IpAddr>) -> Verdict;
}

/// Lifecycle listener invoked by executors around a call.
///
/// All methods default to no-ops so implementations only override the events
/// they care about.
pub trait CallListener: Send + Sync {
    fn on_connection_acquired(&self, _network: &NetworkId) {}

    fn on_bytes_transferred(&self, _sent: u64, _received: u64) {}

    fn on_call_end(&self) {}

    fn on_call_failed(&self, _error: &BridgeError) {}
}

struct PermitAll;

impl ConnectionInterceptor for PermitAll {
    fn on_connection_established(&self, _local_addr: Option<IpAddr>) -> Verdict {
        Verdict::Permit
    }
}

struct NoopListener;

impl CallListener for NoopListener {}

/// Hooks handed to an executor for one call.
#[derive(Clone)]
pub struct CallContext {
    pub interceptor: Arc<dyn ConnectionInterceptor>,
    pub listener: Arc<dyn CallListener>,
}

impl CallContext {
    /// Context that permits everything and observes nothing. Useful for
    /// direct executor use outside the router.
    pub fn passthrough() -> Self {
        Self {
            interceptor: Arc::new(PermitAll),
            listener: Arc::new(NoopListener),
        }
    }
}

/// A call executor bound to one specific network interface.
///
/// Each executor owns its own connection pool with sockets bound to its
/// interface; pools are never shared across interfaces.
#[async_trait]
pub trait CallExecutor: Send + Sync {
    /// The interface this executor's sockets are bound to.
    fn network(&self) -> &NetworkId;

    /// Run the request to completion, invoking the context hooks at the
    /// documented lifecycle points.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Forbidden`] when the interceptor rejects the
    /// bound network; connection-level errors pass through unchanged.
    async fn execute(&self, request: OutboundRequest, ctx: CallContext) -> Result<CallResponse>;
}

/// Factory producing network-bound executors.
///
/// Invoked lazily by the router the first time a call targets an interface;
/// the result is cached per network id until the interface leaves the
/// inventory.
pub trait ExecutorFactory: Send + Sync {
    fn build(&self, network: &NetworkId, link: &LinkAttributes) -> Result<Arc<dyn CallExecutor>>;
}

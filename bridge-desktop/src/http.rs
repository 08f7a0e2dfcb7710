//! Network-Bound HTTP Execution using Reqwest
//!
//! One reqwest `Client` per network interface: the factory binds each
//! client's sockets to the interface's local address, so every executor has
//! its own connection pool and pools are never shared across interfaces.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{CallContext, CallExecutor, CallResponse, ExecutorFactory, HttpMethod, OutboundRequest,
           Verdict},
    network::{LinkAttributes, NetworkId},
};
use reqwest::Client;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Builds reqwest clients bound to specific network interfaces.
///
/// Configuration applies to every executor the factory produces:
/// - Connection pooling per interface via reqwest
/// - TLS support by default
/// - Request timeout and connect timeout
pub struct ReqwestExecutorFactory {
    timeout: Duration,
    connect_timeout: Duration,
    pool_max_idle: usize,
    user_agent: String,
}

impl ReqwestExecutorFactory {
    /// Create a factory with default configuration
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a factory with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            connect_timeout: Duration::from_secs(10),
            pool_max_idle: 10,
            user_agent: "routing-core/0.1.0".to_string(),
        }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

impl Default for ReqwestExecutorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorFactory for ReqwestExecutorFactory {
    fn build(&self, network: &NetworkId, link: &LinkAttributes) -> Result<Arc<dyn CallExecutor>> {
        let local = link.addresses.first().copied();

        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_max_idle)
            .user_agent(self.user_agent.clone());

        // Bind outgoing sockets to the interface's address; without one the
        // OS routing table decides, which only the interceptor can veto.
        if let Some(addr) = local {
            builder = builder.local_address(addr);
        } else {
            warn!(network = %network, "No link address to bind; using default routing");
        }

        let client = builder.build().map_err(|e| {
            BridgeError::OperationFailed(format!(
                "Failed to build HTTP client for {}: {}",
                network, e
            ))
        })?;

        debug!(network = %network, local_addr = ?local, "Built network-bound executor");

        Ok(Arc::new(BoundCallExecutor {
            client,
            network: network.clone(),
            local,
            timeout: self.timeout,
        }))
    }
}

/// Call executor whose sockets are bound to one interface.
pub struct BoundCallExecutor {
    client: Client,
    network: NetworkId,
    local: Option<IpAddr>,
    timeout: Duration,
}

impl BoundCallExecutor {
    fn build_request(&self, request: &OutboundRequest) -> reqwest::RequestBuilder {
        let method = ReqwestExecutorFactory::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }
}

#[async_trait]
impl CallExecutor for BoundCallExecutor {
    fn network(&self) -> &NetworkId {
        &self.network
    }

    async fn execute(&self, request: OutboundRequest, ctx: CallContext) -> Result<CallResponse> {
        ctx.listener.on_connection_acquired(&self.network);

        // Policy re-validation with the address the pool actually binds;
        // the interface backing it may have changed since selection.
        if ctx.interceptor.on_connection_established(self.local) == Verdict::Forbid {
            let err = BridgeError::Forbidden;
            warn!(network = %self.network, url = %request.url, "Call forbidden at connection time");
            ctx.listener.on_call_failed(&err);
            return Err(err);
        }

        let bytes_sent = request.body.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        debug!(network = %self.network, url = %request.url, "Executing HTTP request");

        match self.build_request(&request).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers: HashMap<String, String> = response
                    .headers()
                    .iter()
                    .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
                    .collect();

                let body = response.bytes().await.map_err(|e| {
                    let err = BridgeError::OperationFailed(e.to_string());
                    ctx.listener.on_call_failed(&err);
                    err
                })?;

                ctx.listener
                    .on_bytes_transferred(bytes_sent, body.len() as u64);
                ctx.listener.on_call_end();

                Ok(CallResponse {
                    status,
                    headers,
                    body,
                })
            }
            Err(e) => {
                let err = if e.is_timeout() {
                    BridgeError::Timeout(request.timeout.unwrap_or(self.timeout))
                } else if e.is_connect() {
                    BridgeError::OperationFailed(format!("Connection failed: {}", e))
                } else {
                    BridgeError::OperationFailed(e.to_string())
                };

                warn!(network = %self.network, error = %err, "HTTP request failed");
                ctx.listener.on_call_failed(&err);
                Err(err)
            }
        }
    }
}

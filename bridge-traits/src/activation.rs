//! Network Activation Abstraction
//!
//! Contract for the platform API that brings up a transient high-bandwidth
//! network on demand. The lease manager in the routing core is the only
//! consumer; callers never touch this trait directly.

use async_trait::async_trait;

use crate::error::Result;
use crate::network::{NetworkId, TransportKind};

/// Parameters of a platform network request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    /// Transports acceptable to the requester, in preference order.
    pub transports: Vec<TransportKind>,
    /// Require validated internet reachability on the activated network.
    pub require_internet: bool,
}

impl ActivationRequest {
    pub fn new(transports: impl Into<Vec<TransportKind>>) -> Self {
        Self {
            transports: transports.into(),
            require_internet: true,
        }
    }
}

/// Handle to an outstanding platform network request.
///
/// Must be passed back to [`NetworkActivator::release`] exactly once; the
/// platform keeps the network up as long as the grant is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationGrant {
    /// Identifier of the network the platform brought up.
    pub network: NetworkId,
    /// Opaque platform token identifying the request.
    pub token: String,
}

/// Platform network-activation API.
///
/// # Platform Support
///
/// - **Wearable/Mobile**: connectivity service network requests
/// - **Desktop**: typically unavailable; hosts report `NotAvailable`
#[async_trait]
pub trait NetworkActivator: Send + Sync {
    /// Ask the platform to bring up a network matching `request`.
    ///
    /// Resolves once the network is available. Implementations apply their
    /// own platform-side deadline and report expiry as an error; the caller
    /// layers its own timeout on top and must not assume this future ever
    /// completes.
    async fn request_network(&self, request: ActivationRequest) -> Result<ActivationGrant>;

    /// Release an outstanding request. The platform may tear the network
    /// down once the last grant is released.
    async fn release(&self, grant: ActivationGrant);
}

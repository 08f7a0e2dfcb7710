use bridge_traits::error::BridgeError;
use bridge_traits::http::RequestPurpose;
use bridge_traits::network::NetworkKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("No suitable network for {purpose} requests")]
    NoSuitableNetwork { purpose: RequestPurpose },

    #[error("{purpose} requests are forbidden on {network}")]
    Forbidden {
        purpose: RequestPurpose,
        network: NetworkKind,
    },

    #[error("Platform error: {0}")]
    Platform(String),

    #[error(transparent)]
    Transport(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, RouteError>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseError {
    #[error("High-bandwidth activation wait exceeded {0:?}")]
    WaitTimeout(Duration),

    #[error("Platform reported the high-bandwidth network unavailable")]
    Unavailable,

    #[error("Lease already closed")]
    Closed,
}

//! # Event Bus System
//!
//! Provides an event-driven architecture for the routing core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between core modules through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, NetworkEvent};
//!
//! let event_bus = EventBus::new(100);
//! let _subscriber = event_bus.subscribe();
//!
//! let event = CoreEvent::Network(NetworkEvent::InterfaceAvailable {
//!     network: "wifi-1".to_string(),
//! });
//! event_bus.emit(event).ok();
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types
//! of errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n`
//!   events. This is non-fatal; the subscriber can continue receiving.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates
//!   shutdown.
//!
//! Subscribers should handle `Lagged` gracefully and treat `Closed` as a
//! signal to exit.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of
/// events. Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Interface inventory events
    Network(NetworkEvent),
    /// High-bandwidth lease events
    Lease(LeaseEvent),
    /// Outgoing call lifecycle events
    Call(CallEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Network(e) => e.description(),
            CoreEvent::Lease(e) => e.description(),
            CoreEvent::Call(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Lease(LeaseEvent::ActivationFailed { .. }) => EventSeverity::Error,
            CoreEvent::Call(CallEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Call(CallEvent::Rejected { .. }) => EventSeverity::Warning,
            CoreEvent::Call(CallEvent::NoSuitableNetwork { .. }) => EventSeverity::Warning,
            CoreEvent::Network(NetworkEvent::InterfaceLost { .. }) => EventSeverity::Warning,
            CoreEvent::Lease(LeaseEvent::Activated { .. }) => EventSeverity::Info,
            CoreEvent::Call(CallEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Network Events
// ============================================================================

/// Events related to the network interface inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum NetworkEvent {
    /// An interface became usable.
    InterfaceAvailable {
        /// The interface identifier.
        network: String,
    },
    /// An interface is about to disconnect.
    InterfaceLosing {
        /// The interface identifier.
        network: String,
        /// Remaining usability estimate in milliseconds.
        grace_ms: u64,
    },
    /// An interface disconnected.
    InterfaceLost {
        /// The interface identifier.
        network: String,
    },
    /// A lost interface was removed after its grace window elapsed.
    InterfacePurged {
        /// The interface identifier.
        network: String,
    },
    /// The active interface designation changed.
    ActiveChanged {
        /// The now-active interface, if any.
        network: Option<String>,
    },
}

impl NetworkEvent {
    fn description(&self) -> &str {
        match self {
            NetworkEvent::InterfaceAvailable { .. } => "Interface available",
            NetworkEvent::InterfaceLosing { .. } => "Interface losing connectivity",
            NetworkEvent::InterfaceLost { .. } => "Interface lost",
            NetworkEvent::InterfacePurged { .. } => "Lost interface purged",
            NetworkEvent::ActiveChanged { .. } => "Active interface changed",
        }
    }
}

// ============================================================================
// Lease Events
// ============================================================================

/// Events related to the shared high-bandwidth network request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LeaseEvent {
    /// A caller acquired a lease on the shared request.
    Acquired {
        /// Lease identifier (for log correlation).
        lease: String,
        /// Outstanding lease count after the acquisition.
        holders: u64,
    },
    /// The platform confirmed the high-bandwidth network.
    Activated {
        /// The activated interface identifier.
        network: String,
    },
    /// The platform request failed or timed out.
    ActivationFailed {
        /// Human-readable failure reason.
        message: String,
    },
    /// A caller released its lease.
    Released {
        /// Lease identifier.
        lease: String,
        /// Outstanding lease count after the release.
        holders: u64,
    },
    /// The last lease closed and the platform request was released.
    HighBandwidthDropped,
}

impl LeaseEvent {
    fn description(&self) -> &str {
        match self {
            LeaseEvent::Acquired { .. } => "High-bandwidth lease acquired",
            LeaseEvent::Activated { .. } => "High-bandwidth network activated",
            LeaseEvent::ActivationFailed { .. } => "High-bandwidth activation failed",
            LeaseEvent::Released { .. } => "High-bandwidth lease released",
            LeaseEvent::HighBandwidthDropped => "High-bandwidth network released",
        }
    }
}

// ============================================================================
// Call Events
// ============================================================================

/// Events related to outgoing call routing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CallEvent {
    /// A call was handed to a network-bound executor.
    Dispatched {
        /// Declared purpose of the call.
        purpose: String,
        /// The selected interface identifier.
        network: String,
    },
    /// A call completed with a response.
    Completed {
        /// Declared purpose of the call.
        purpose: String,
        /// The interface that carried the call.
        network: String,
        /// HTTP status of the response.
        status: u16,
        /// Response bytes received.
        bytes_received: u64,
    },
    /// Policy rejected the actually-bound network at connection time.
    Rejected {
        /// Declared purpose of the call.
        purpose: String,
        /// The interface the call was bound to.
        network: String,
    },
    /// No permitted network existed for the call.
    NoSuitableNetwork {
        /// Declared purpose of the call.
        purpose: String,
    },
    /// The executor reported a connection-level failure.
    Failed {
        /// Declared purpose of the call.
        purpose: String,
        /// Human-readable error message.
        message: String,
    },
}

impl CallEvent {
    fn description(&self) -> &str {
        match self {
            CallEvent::Dispatched { .. } => "Call dispatched",
            CallEvent::Completed { .. } => "Call completed",
            CallEvent::Rejected { .. } => "Call rejected by policy",
            CallEvent::NoSuitableNetwork { .. } => "No suitable network",
            CallEvent::Failed { .. } => "Call failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all
    /// future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering
/// capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let stream = EventStream::new(event_bus.subscribe());
///
/// // Filter for lease events only
/// let mut lease_stream = stream.filter(|event| {
///     matches!(event, CoreEvent::Lease(_))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events. Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }

            // Event didn't match filter, continue to next event
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }

                    // Event didn't match filter, continue
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

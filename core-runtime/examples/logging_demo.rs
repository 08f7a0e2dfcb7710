//! Demonstrates logging initialization and event bus wiring.
//!
//! Run with: cargo run --example logging_demo -p core-runtime

use core_runtime::events::{CallEvent, CoreEvent, EventBus, NetworkEvent};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Pretty)
        .with_level(LogLevel::Debug)
        .with_thread_info(false);

    init_logging(config).expect("Failed to initialize logging");

    info!("Routing core runtime started");

    let bus = EventBus::new(100);
    let mut subscriber = bus.subscribe();

    let consumer = tokio::spawn(async move {
        while let Ok(event) = subscriber.recv().await {
            info!(
                severity = ?event.severity(),
                description = event.description(),
                "Event received"
            );
        }
    });

    bus.emit(CoreEvent::Network(NetworkEvent::InterfaceAvailable {
        network: "wifi-1".to_string(),
    }))
    .ok();

    bus.emit(CoreEvent::Call(CallEvent::Completed {
        purpose: "background-sync".to_string(),
        network: "wifi-1".to_string(),
        status: 200,
        bytes_received: 4096,
    }))
    .ok();

    debug!(network = "wifi-1", "Structured fields flow through the filter");
    warn!("Shutting down demo");

    drop(bus);
    consumer.await.ok();
}

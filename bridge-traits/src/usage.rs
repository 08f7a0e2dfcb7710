//! Usage Accounting Abstraction
//!
//! Sink for per-call transfer statistics. The routing core reports one
//! record per dispatched call at completion or failure; what happens to the
//! records (aggregation, persistence, quota enforcement) is entirely the
//! host's concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::http::RequestPurpose;
use crate::network::NetworkKind;

/// How a dispatched call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The executor produced a response.
    Completed { status: u16 },
    /// Policy rejected the actually-bound network at connection time.
    Rejected,
    /// Connection-level failure inside the executor.
    Failed,
    /// The caller abandoned the call mid-flight.
    Cancelled,
}

/// One call's transfer statistics.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub purpose: RequestPurpose,
    pub network: NetworkKind,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub outcome: CallOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        purpose: RequestPurpose,
        network: NetworkKind,
        bytes_sent: u64,
        bytes_received: u64,
        outcome: CallOutcome,
    ) -> Self {
        Self {
            purpose,
            network,
            bytes_sent,
            bytes_received,
            outcome,
            recorded_at: Utc::now(),
        }
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_sent + self.bytes_received
    }
}

/// Usage statistics sink.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, record: UsageRecord);
}

/// Default recorder that mirrors usage into the tracing pipeline.
#[derive(Debug, Default)]
pub struct LogUsageRecorder;

#[async_trait]
impl UsageRecorder for LogUsageRecorder {
    async fn record(&self, record: UsageRecord) {
        debug!(
            purpose = %record.purpose,
            network = %record.network,
            bytes_sent = record.bytes_sent,
            bytes_received = record.bytes_received,
            outcome = ?record.outcome,
            "Call usage recorded"
        );
    }
}

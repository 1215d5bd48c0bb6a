use crate::resource::ResourceId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Outcome of one discovery-and-protect cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub discovered: usize,
    /// Ids not in the known set before this cycle, in discovery order.
    pub new: Vec<ResourceId>,
    /// Ids handed to the protection step.
    pub submitted: Vec<ResourceId>,
    pub interval_ms: u64,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerEvent {
    ScanCompleted(ScanReport),
    /// One protection pass finished. `ids` are the resources attempted.
    BatchProtected {
        ids: Vec<ResourceId>,
        skipped: usize,
    },
    /// Inside the suppression window.
    ResourceSkipped {
        id: ResourceId,
        since_last: Duration,
    },
    ProtectionFailed {
        id: ResourceId,
        reason: String,
    },
    IntervalChanged {
        from: Duration,
        to: Duration,
        resource_count: usize,
    },
}

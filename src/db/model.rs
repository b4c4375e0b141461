//! View models assembled from more than one table.

use crate::model::SenderStats;
use chrono::{DateTime, Utc};

/// System-wide counters shown by `/info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: i64,
    pub total_sent: i64,
}

/// Per-sender slice used by the admin dashboard.
#[derive(Debug, Clone)]
pub struct SenderActivity {
    pub stats: Option<SenderStats>,
    pub last_sent_at: Option<DateTime<Utc>>,
}

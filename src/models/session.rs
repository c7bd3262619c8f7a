use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Browser tab identifier, as delivered by the host's tab events.
pub type TabId = i64;

/// One tab's active interval on a tracked domain, from navigation-complete
/// (or temp-allowed navigation-start) until close, deactivation, or the next
/// navigation. In-memory only; an interval in flight when the process dies
/// is lost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VisitSession {
    pub domain: String,
    pub started_at: DateTime<Utc>,
    /// Time spent in this session is deducted from the domain's
    /// temporary-allow grant when the session flushes.
    pub temp_allowed: bool,
}

impl VisitSession {
    pub fn new(domain: impl Into<String>, started_at: DateTime<Utc>, temp_allowed: bool) -> Self {
        Self {
            domain: domain.into(),
            started_at,
            temp_allowed,
        }
    }

    /// Elapsed active time at `now`, clamped to zero.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_milliseconds().max(0)
    }
}

//! Site-blocking and time-accounting core for a distraction blocker.
//!
//! The host (a browser extension's background glue) feeds navigation and
//! tab events into [`SiteTracker`] and acts on the returned
//! [`NavigationDecision`]. Everything else — blocklist matching,
//! temporary-allow budgets, per-domain visit statistics, and the daily
//! limit warning — happens behind that surface, on top of a two-partition
//! key-value [`Storage`].

pub mod allow;
pub mod blocklist;
pub mod domain;
pub mod limits;
mod locks;
pub mod models;
pub mod stats;
pub mod storage;
pub mod tracker;

pub use allow::{TempAllowLedger, TEMP_ALLOW_TIME_MS};
pub use blocklist::{load_blocked_sites, save_blocked_sites, BLOCKED_SITES_KEY};
pub use domain::{canonicalize, match_blocked};
pub use limits::{
    LimitMonitor, LogNotifier, Notification, Notifier, DAILY_LIMIT_TAG, DAILY_LIMIT_WARNING_MS,
};
pub use models::{BucketTotals, SiteStats, StoredGrant, TabId, TodayStats, VisitSession};
pub use stats::{date_key, week_key, VisitStats};
pub use storage::{Partition, Storage};
pub use tracker::{NavigationDecision, SiteTracker, TabState, TrackerConfig, SWEEP_INTERVAL};

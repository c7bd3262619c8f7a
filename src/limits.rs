//! Daily limit monitor.
//!
//! Runs after every duration flush: sums today's recorded time across the
//! blocklist and raises a warning once the total crosses the threshold.
//! Notifications reuse a fixed tag so repeated triggers replace the prior
//! one instead of stacking; a notifier failure is logged and dropped.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::blocklist::load_blocked_sites;
use crate::stats::VisitStats;
use crate::storage::Storage;

/// Accumulated blocked-site time past this raises the daily warning.
pub const DAILY_LIMIT_WARNING_MS: u64 = 10 * 60 * 1000;

/// Fixed tag; the host replaces any prior notification with the same tag.
pub const DAILY_LIMIT_TAG: &str = "dailyLimit";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub require_interaction: bool,
}

/// Outbound notification channel. The host wires this to the browser's
/// notification API; tests record what would have been shown.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<()>;
}

/// Default notifier for hosts without a notification surface.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> Result<()> {
        warn!("[{}] {}: {}", notification.tag, notification.title, notification.message);
        Ok(())
    }
}

#[derive(Clone)]
pub struct LimitMonitor {
    storage: Storage,
    stats: VisitStats,
    notifier: Arc<dyn Notifier>,
}

impl LimitMonitor {
    pub fn new(storage: Storage, stats: VisitStats, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            storage,
            stats,
            notifier,
        }
    }

    /// Checks today's accumulated blocked-site time and notifies when it
    /// exceeds [`DAILY_LIMIT_WARNING_MS`]. Best-effort: storage and
    /// notifier failures are swallowed.
    pub async fn check_daily_limit(&self) {
        self.check_daily_limit_at(Utc::now()).await
    }

    pub(crate) async fn check_daily_limit_at(&self, now: DateTime<Utc>) {
        let blocked_sites = load_blocked_sites(&self.storage).await;
        if blocked_sites.is_empty() {
            return;
        }

        let total_ms = match self.stats.today_time_across_at(&blocked_sites, now).await {
            Ok(total) => total,
            Err(err) => {
                warn!("Daily limit check failed to read stats: {err:#}");
                return;
            }
        };

        if total_ms <= DAILY_LIMIT_WARNING_MS {
            return;
        }

        let notification = Notification {
            tag: DAILY_LIMIT_TAG.to_string(),
            kind: "basic".to_string(),
            title: "Usage time warning".to_string(),
            message: "You have spent more than 10 minutes on blocked sites today.".to_string(),
            require_interaction: true,
        };

        if let Err(err) = self.notifier.notify(notification) {
            warn!("Failed to raise daily limit notification: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::save_blocked_sites;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        raised: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) -> Result<()> {
            self.raised.lock().unwrap().push(notification);
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _notification: Notification) -> Result<()> {
            anyhow::bail!("notifications denied")
        }
    }

    async fn setup(notifier: Arc<dyn Notifier>) -> (Storage, VisitStats, LimitMonitor) {
        let storage = Storage::open_in_memory().unwrap();
        let stats = VisitStats::new(storage.clone());
        let monitor = LimitMonitor::new(storage.clone(), stats.clone(), notifier);
        save_blocked_sites(&storage, &["example.com".to_string(), "reddit.com".to_string()])
            .await
            .unwrap();
        (storage, stats, monitor)
    }

    #[tokio::test]
    async fn crossing_the_limit_raises_one_tagged_notification() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (_storage, stats, monitor) = setup(notifier.clone()).await;

        // 601000 ms across the blocklist: just over ten minutes.
        stats.record_duration("example.com", 400_000).await.unwrap();
        stats.record_duration("reddit.com", 201_000).await.unwrap();
        monitor.check_daily_limit().await;

        let raised = notifier.raised.lock().unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].tag, DAILY_LIMIT_TAG);
        assert_eq!(raised[0].kind, "basic");
        assert!(raised[0].require_interaction);
    }

    #[tokio::test]
    async fn at_or_below_the_limit_stays_quiet() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (_storage, stats, monitor) = setup(notifier.clone()).await;

        stats
            .record_duration("example.com", DAILY_LIMIT_WARNING_MS)
            .await
            .unwrap();
        monitor.check_daily_limit().await;

        assert!(notifier.raised.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notifier_failure_is_swallowed() {
        let (_storage, stats, monitor) = setup(Arc::new(FailingNotifier)).await;

        stats.record_duration("example.com", 700_000).await.unwrap();
        // Must not panic or propagate.
        monitor.check_daily_limit().await;
    }
}

//! Navigation interceptor.
//!
//! Reacts to the host's navigation and tab events: decides per navigation
//! whether to redirect to the block page, opens and flushes visit
//! sessions, feeds the statistics store and the temporary-allow ledger,
//! and runs the periodic grant sweep. Event handlers are best-effort; a
//! storage failure degrades to "this one action did not happen" and the
//! navigation is allowed through.

pub mod state;

pub use state::TabState;

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info};
use tokio::{sync::Mutex, task::JoinHandle, time};
use url::Url;

use crate::{
    allow::TempAllowLedger,
    blocklist::load_blocked_sites,
    domain::{canonicalize, match_blocked},
    limits::{LimitMonitor, Notifier},
    models::{TabId, TodayStats, VisitSession},
    stats::VisitStats,
    storage::Storage,
};

/// How often the expired-grant sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// The interceptor's verdict on one navigation. The host performs the
/// actual tab update for `Redirect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Redirect(String),
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Where blocked navigations are sent; `domain`, `visits`, and `time`
    /// are appended as query parameters.
    pub block_page_url: String,
    /// Literal substring that exempts the block page's own URL from
    /// matching.
    pub block_page_marker: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            block_page_url: "app://blocked/block-page.html".into(),
            block_page_marker: "block-page.html".into(),
        }
    }
}

#[derive(Clone)]
pub struct SiteTracker {
    storage: Storage,
    ledger: TempAllowLedger,
    stats: VisitStats,
    monitor: LimitMonitor,
    tabs: Arc<Mutex<HashMap<TabId, TabState>>>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
    config: TrackerConfig,
}

impl SiteTracker {
    pub fn new(storage: Storage, config: TrackerConfig, notifier: Arc<dyn Notifier>) -> Self {
        let ledger = TempAllowLedger::new(storage.clone());
        let stats = VisitStats::new(storage.clone());
        let monitor = LimitMonitor::new(storage.clone(), stats.clone(), notifier);

        Self {
            storage,
            ledger,
            stats,
            monitor,
            tabs: Arc::new(Mutex::new(HashMap::new())),
            sweeper: Arc::new(Mutex::new(None)),
            config,
        }
    }

    /// The ledger handle; the popup's "allow for 5 minutes" button calls
    /// [`TempAllowLedger::grant`] through this.
    pub fn ledger(&self) -> &TempAllowLedger {
        &self.ledger
    }

    /// The statistics handle, for the stats page collaborator.
    pub fn stats(&self) -> &VisitStats {
        &self.stats
    }

    /// Starts the periodic expired-grant sweep. The first tick fires
    /// immediately, covering the startup sweep.
    pub async fn start(&self) {
        let mut guard = self.sweeper.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let ledger = self.ledger.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(err) = ledger.sweep_expired().await {
                    error!("Temporary allow sweep failed: {err:#}");
                }
            }
        });

        *guard = Some(handle);
        info!("Site tracker started");
    }

    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
    }

    /// Main-frame navigation started in `tab`. Returns the block/allow
    /// verdict; errors are swallowed and the navigation allowed through.
    pub async fn handle_navigation_start(&self, tab: TabId, url: &str) -> NavigationDecision {
        match self.navigation_start_at(tab, url, Utc::now()).await {
            Ok(decision) => decision,
            Err(err) => {
                error!("Navigation-start handling failed for tab {tab}: {err:#}");
                NavigationDecision::Allow
            }
        }
    }

    /// Main-frame navigation finished loading in `tab`.
    pub async fn handle_navigation_complete(&self, tab: TabId, url: &str) {
        if let Err(err) = self.navigation_complete_at(tab, url, Utc::now()).await {
            error!("Navigation-complete handling failed for tab {tab}: {err:#}");
        }
    }

    /// `tab` was closed. Flushes its session, if any.
    pub async fn handle_tab_closed(&self, tab: TabId) {
        if let Err(err) = self.tab_closed_at(tab, Utc::now()).await {
            error!("Tab-close handling failed for tab {tab}: {err:#}");
        }
    }

    /// The user switched away from `tab`. Flushes its session, if any.
    pub async fn handle_tab_deactivated(&self, tab: TabId) {
        if let Err(err) = self.flush_session_at(tab, Utc::now()).await {
            error!("Tab-deactivate handling failed for tab {tab}: {err:#}");
        }
    }

    async fn navigation_start_at(
        &self,
        tab: TabId,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<NavigationDecision> {
        // Flush-then-start: the previous page's session ends here rather
        // than being silently overwritten. Runs before the block-page
        // exemption so navigating onto the block page also closes out the
        // prior page's time.
        self.flush_session_at(tab, now).await?;

        // The block page itself is exempt from matching.
        if url.contains(&self.config.block_page_marker) {
            return Ok(NavigationDecision::Allow);
        }

        let domain = canonicalize(url);
        let blocked_sites = load_blocked_sites(&self.storage).await;

        let Some(matched) = match_blocked(&domain, &blocked_sites) else {
            self.tabs.lock().await.insert(tab, TabState::Navigating);
            return Ok(NavigationDecision::Allow);
        };

        if self.ledger.is_active(matched).await? {
            // Time spent here is deducted from the grant at session end.
            let session = VisitSession::new(matched, now, true);
            self.tabs.lock().await.insert(tab, TabState::Tracking(session));
            return Ok(NavigationDecision::Allow);
        }

        // Stats bucket under the blocklist entry; the redirect shows the
        // domain the user actually navigated to.
        self.stats.record_visit_at(matched, now).await?;
        let snapshot = self.stats.today_snapshot_at(matched, now).await?;
        let redirect = self.block_page_redirect(&domain, snapshot)?;

        self.tabs.lock().await.insert(tab, TabState::Blocked);
        info!("Blocked {domain} in tab {tab}");
        Ok(NavigationDecision::Redirect(redirect))
    }

    async fn navigation_complete_at(
        &self,
        tab: TabId,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if url.contains(&self.config.block_page_marker) {
            return Ok(());
        }

        let domain = canonicalize(url);
        if domain.is_empty() {
            return Ok(());
        }

        let mut tabs = self.tabs.lock().await;
        // A redirected tab's original navigation can still complete before
        // the block page load supplants it; the block page is excluded from
        // time tracking, so a Blocked tab never opens a session.
        let keep_state = matches!(
            tabs.get(&tab),
            Some(TabState::Tracking(_)) | Some(TabState::Blocked)
        );
        if !keep_state {
            tabs.insert(tab, TabState::Tracking(VisitSession::new(domain, now, false)));
        }
        Ok(())
    }

    async fn tab_closed_at(&self, tab: TabId, now: DateTime<Utc>) -> Result<()> {
        self.flush_session_at(tab, now).await?;
        self.tabs.lock().await.remove(&tab);
        Ok(())
    }

    /// Ends the tab's session if one is open: records the duration,
    /// charges the temporary-allow grant, and runs the limit check. The
    /// only path that persists in-progress time; a crash before it fires
    /// loses the interval.
    async fn flush_session_at(&self, tab: TabId, now: DateTime<Utc>) -> Result<()> {
        let session = {
            let mut tabs = self.tabs.lock().await;
            match tabs.get(&tab) {
                Some(TabState::Tracking(_)) => match tabs.remove(&tab) {
                    Some(TabState::Tracking(session)) => Some(session),
                    _ => None,
                },
                _ => None,
            }
        };

        let Some(session) = session else {
            return Ok(());
        };

        let duration_ms = session.elapsed_ms(now);
        self.stats
            .record_duration_at(&session.domain, duration_ms as u64, now)
            .await?;
        if session.temp_allowed {
            self.ledger.consume(&session.domain, duration_ms).await?;
        }
        self.monitor.check_daily_limit_at(now).await;
        Ok(())
    }

    fn block_page_redirect(&self, domain: &str, snapshot: TodayStats) -> Result<String> {
        let url = Url::parse_with_params(
            &self.config.block_page_url,
            &[
                ("domain", domain),
                ("visits", &snapshot.visits.to_string()),
                ("time", &snapshot.time_minutes.to_string()),
            ],
        )?;
        Ok(url.into())
    }

    #[cfg(test)]
    async fn tab_state(&self, tab: TabId) -> Option<TabState> {
        self.tabs.lock().await.get(&tab).cloned()
    }
}

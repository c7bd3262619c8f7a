//! Visit statistics store.
//!
//! Every recorded visit/duration lands in three places: the legacy flat
//! per-day keys (`visits_<domain>_<date>`, `time_<domain>_<date>`), the
//! aggregated `site_stats_<domain>` record, and (for visits) the
//! `visit_tracking` index the popup uses to list domains with history.
//! The legacy keys are still the source for the block page's "today"
//! numbers and the daily limit check.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::locks::KeyLocks;
use crate::models::{SiteStats, TodayStats};
use crate::storage::{Partition, Storage};

const VISIT_TRACKING_KEY: &str = "visit_tracking";

/// `YYYY-MM-DD` bucket key for `date`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `YYYY-Www` bucket key for `date`.
///
/// Week numbering counts seven-day windows from Jan 1, offset by Jan 1's
/// Sunday-based weekday. This is close to ISO week numbering but has no
/// year-boundary correction; existing stats were written with exactly this
/// formula, so it must not be "fixed" without migrating them.
pub fn week_key(date: NaiveDate) -> String {
    let first_jan = date.with_ordinal(1).unwrap_or(date);
    let days_since_first_jan = (date - first_jan).num_days();
    let first_jan_weekday = first_jan.weekday().num_days_from_sunday() as i64;
    let week = (days_since_first_jan + first_jan_weekday + 1 + 6) / 7;
    format!("{}-W{:02}", date.year(), week)
}

fn visits_key(domain: &str, date: NaiveDate) -> String {
    format!("visits_{domain}_{}", date_key(date))
}

fn time_key(domain: &str, date: NaiveDate) -> String {
    format!("time_{domain}_{}", date_key(date))
}

fn site_stats_key(domain: &str) -> String {
    format!("site_stats_{domain}")
}

#[derive(Clone)]
pub struct VisitStats {
    storage: Storage,
    locks: KeyLocks,
}

impl VisitStats {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            locks: KeyLocks::new(),
        }
    }

    /// Counts one visit to `domain` in today's daily bucket, this week's
    /// bucket, and the total. Every call is a distinct visit event.
    pub async fn record_visit(&self, domain: &str) -> Result<()> {
        self.record_visit_at(domain, Utc::now()).await
    }

    pub(crate) async fn record_visit_at(&self, domain: &str, now: DateTime<Utc>) -> Result<()> {
        let today = now.date_naive();

        {
            let _guard = self.locks.acquire(domain).await;

            let key = visits_key(domain, today);
            let visits: u64 = self
                .storage
                .get(Partition::Local, &key)
                .await?
                .unwrap_or(0);
            self.storage.set(Partition::Local, &key, &(visits + 1)).await?;

            self.update_site_stats(domain, today, 1, 0).await?;
        }

        // Separate key, separate lock; shared by all domains.
        let _guard = self.locks.acquire(VISIT_TRACKING_KEY).await;
        let mut tracking: HashMap<String, u64> = self
            .storage
            .get(Partition::Local, VISIT_TRACKING_KEY)
            .await?
            .unwrap_or_default();
        *tracking.entry(domain.to_string()).or_insert(0) += 1;
        self.storage
            .set(Partition::Local, VISIT_TRACKING_KEY, &tracking)
            .await?;

        Ok(())
    }

    /// Adds `duration_ms` of active time to the same three buckets.
    pub async fn record_duration(&self, domain: &str, duration_ms: u64) -> Result<()> {
        self.record_duration_at(domain, duration_ms, Utc::now()).await
    }

    pub(crate) async fn record_duration_at(
        &self,
        domain: &str,
        duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let today = now.date_naive();
        let _guard = self.locks.acquire(domain).await;

        let key = time_key(domain, today);
        let time_ms: u64 = self
            .storage
            .get(Partition::Local, &key)
            .await?
            .unwrap_or(0);
        self.storage
            .set(Partition::Local, &key, &(time_ms + duration_ms))
            .await?;

        self.update_site_stats(domain, today, 0, duration_ms).await
    }

    /// Today's numbers for the block page, with time floored to whole
    /// minutes. Reads the legacy per-day keys.
    pub async fn today_snapshot(&self, domain: &str) -> Result<TodayStats> {
        self.today_snapshot_at(domain, Utc::now()).await
    }

    pub(crate) async fn today_snapshot_at(
        &self,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<TodayStats> {
        let today = now.date_naive();
        let visits: u64 = self
            .storage
            .get(Partition::Local, &visits_key(domain, today))
            .await?
            .unwrap_or(0);
        let time_ms: u64 = self
            .storage
            .get(Partition::Local, &time_key(domain, today))
            .await?
            .unwrap_or(0);

        Ok(TodayStats {
            visits,
            time_minutes: time_ms / 1000 / 60,
        })
    }

    /// Sum of today's recorded time across `domains`, in milliseconds.
    pub async fn today_time_across(&self, domains: &[String]) -> Result<u64> {
        self.today_time_across_at(domains, Utc::now()).await
    }

    pub(crate) async fn today_time_across_at(
        &self,
        domains: &[String],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let today = now.date_naive();
        let mut total = 0u64;
        for domain in domains {
            let time_ms: u64 = self
                .storage
                .get(Partition::Local, &time_key(domain, today))
                .await?
                .unwrap_or(0);
            total += time_ms;
        }
        Ok(total)
    }

    /// The aggregated `site_stats_<domain>` record, if the domain has one.
    pub async fn site_stats(&self, domain: &str) -> Result<Option<SiteStats>> {
        self.storage
            .get(Partition::Local, &site_stats_key(domain))
            .await
    }

    /// Read-modify-write of the aggregated record. Caller holds the
    /// domain lock.
    async fn update_site_stats(
        &self,
        domain: &str,
        today: NaiveDate,
        visits: u64,
        time_ms: u64,
    ) -> Result<()> {
        let key = site_stats_key(domain);
        let mut stats: SiteStats = self
            .storage
            .get(Partition::Local, &key)
            .await?
            .unwrap_or_default();
        stats.record(&date_key(today), &week_key(today), visits, time_ms);
        self.storage.set(Partition::Local, &key, &stats).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn stats() -> VisitStats {
        VisitStats::new(Storage::open_in_memory().unwrap())
    }

    #[test]
    fn week_key_matches_fixed_dates() {
        // 2024 opens on a Monday (Sunday-based weekday 1).
        assert_eq!(week_key(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()), "2024-W01");
        assert_eq!(week_key(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), "2024-W24");
        // No ISO year-boundary correction: late December stays in week 53.
        assert_eq!(week_key(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()), "2023-W53");
        assert_eq!(week_key(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()), "2024-W53");
        assert_eq!(week_key(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()), "2025-W01");
    }

    #[test]
    fn date_key_is_iso_calendar_date() {
        assert_eq!(date_key(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()), "2024-03-07");
    }

    #[tokio::test]
    async fn each_visit_is_a_distinct_event() {
        let stats = stats();
        let now = at(2024, 6, 15);

        for _ in 0..5 {
            stats.record_visit_at("example.com", now).await.unwrap();
        }

        let record = stats.site_stats("example.com").await.unwrap().unwrap();
        assert_eq!(record.total.visits, 5);
        assert_eq!(record.daily["2024-06-15"].visits, 5);
        assert_eq!(record.weekly["2024-W24"].visits, 5);

        let snapshot = stats.today_snapshot_at("example.com", now).await.unwrap();
        assert_eq!(snapshot.visits, 5);
    }

    #[tokio::test]
    async fn totals_reaggregate_from_daily_buckets() {
        let stats = stats();
        let day_one = at(2024, 6, 15);
        let day_two = at(2024, 6, 16);

        stats.record_visit_at("example.com", day_one).await.unwrap();
        stats.record_duration_at("example.com", 90_000, day_one).await.unwrap();
        stats.record_visit_at("example.com", day_two).await.unwrap();
        stats.record_visit_at("example.com", day_two).await.unwrap();
        stats.record_duration_at("example.com", 30_000, day_two).await.unwrap();

        let record = stats.site_stats("example.com").await.unwrap().unwrap();
        let daily_visits: u64 = record.daily.values().map(|b| b.visits).sum();
        let daily_time: u64 = record.daily.values().map(|b| b.time_ms).sum();
        let weekly_visits: u64 = record.weekly.values().map(|b| b.visits).sum();

        assert_eq!(record.total.visits, daily_visits);
        assert_eq!(record.total.time_ms, daily_time);
        assert_eq!(record.total.visits, weekly_visits);
        assert_eq!(record.total.visits, 3);
        assert_eq!(record.total.time_ms, 120_000);
    }

    #[tokio::test]
    async fn snapshot_floors_time_to_whole_minutes() {
        let stats = stats();
        let now = at(2024, 6, 15);

        stats.record_duration_at("example.com", 119_999, now).await.unwrap();
        let snapshot = stats.today_snapshot_at("example.com", now).await.unwrap();
        assert_eq!(snapshot.time_minutes, 1);
        assert_eq!(snapshot.visits, 0);
    }

    #[tokio::test]
    async fn legacy_keys_are_still_written() {
        let stats = stats();
        let now = at(2024, 6, 15);

        stats.record_visit_at("example.com", now).await.unwrap();
        stats.record_duration_at("example.com", 1234, now).await.unwrap();

        let visits: Option<u64> = stats
            .storage
            .get(Partition::Local, "visits_example.com_2024-06-15")
            .await
            .unwrap();
        let time_ms: Option<u64> = stats
            .storage
            .get(Partition::Local, "time_example.com_2024-06-15")
            .await
            .unwrap();
        assert_eq!(visits, Some(1));
        assert_eq!(time_ms, Some(1234));
    }

    #[tokio::test]
    async fn visit_tracking_indexes_cumulative_counts() {
        let stats = stats();
        let now = at(2024, 6, 15);

        stats.record_visit_at("example.com", now).await.unwrap();
        stats.record_visit_at("example.com", at(2024, 6, 16)).await.unwrap();
        stats.record_visit_at("reddit.com", now).await.unwrap();

        let tracking: HashMap<String, u64> = stats
            .storage
            .get(Partition::Local, VISIT_TRACKING_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracking.get("example.com"), Some(&2));
        assert_eq!(tracking.get("reddit.com"), Some(&1));
    }

    #[tokio::test]
    async fn today_time_sums_only_listed_domains() {
        let stats = stats();
        let now = at(2024, 6, 15);

        stats.record_duration_at("example.com", 60_000, now).await.unwrap();
        stats.record_duration_at("reddit.com", 30_000, now).await.unwrap();
        stats.record_duration_at("unlisted.com", 99_000, now).await.unwrap();
        // Yesterday's time does not count toward today.
        stats.record_duration_at("example.com", 500_000, at(2024, 6, 14)).await.unwrap();

        let domains = vec!["example.com".to_string(), "reddit.com".to_string()];
        let total = stats.today_time_across_at(&domains, now).await.unwrap();
        assert_eq!(total, 90_000);
    }
}

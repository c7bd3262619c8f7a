use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Visit count and accumulated active time for one aggregation bucket.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketTotals {
    pub visits: u64,
    pub time_ms: u64,
}

impl BucketTotals {
    pub fn add(&mut self, visits: u64, time_ms: u64) {
        self.visits += visits;
        self.time_ms += time_ms;
    }
}

/// Per-domain statistics record (`site_stats_<domain>`), aggregated at
/// daily, weekly, and all-time granularity. Every write path updates all
/// three buckets in one read-modify-write, so `total` always equals the
/// sum over `daily` (and over `weekly`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStats {
    pub daily: BTreeMap<String, BucketTotals>,
    pub weekly: BTreeMap<String, BucketTotals>,
    pub total: BucketTotals,
}

impl SiteStats {
    /// Applies one increment to the daily bucket at `date_key`, the weekly
    /// bucket at `week_key`, and the total.
    pub fn record(&mut self, date_key: &str, week_key: &str, visits: u64, time_ms: u64) {
        self.total.add(visits, time_ms);
        self.daily
            .entry(date_key.to_string())
            .or_default()
            .add(visits, time_ms);
        self.weekly
            .entry(week_key.to_string())
            .or_default()
            .add(visits, time_ms);
    }
}

/// Today's numbers for one domain, shaped for the block page: whole
/// minutes, floored.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodayStats {
    pub visits: u64,
    pub time_minutes: u64,
}

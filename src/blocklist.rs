use anyhow::Result;
use log::error;

use crate::storage::{Partition, Storage};

/// Synced-partition key holding the user's ordered blocklist.
pub const BLOCKED_SITES_KEY: &str = "blockedSites";

/// The user's blocklist, or empty when unset or unreadable. A storage
/// failure here degrades to "nothing is blocked" for the one event that
/// observed it.
pub async fn load_blocked_sites(storage: &Storage) -> Vec<String> {
    match storage
        .get::<Vec<String>>(Partition::Synced, BLOCKED_SITES_KEY)
        .await
    {
        Ok(sites) => sites.unwrap_or_default(),
        Err(err) => {
            error!("Failed to load blocked sites: {err:#}");
            Vec::new()
        }
    }
}

/// Replaces the blocklist. The popup owns list edits; the core only reads.
pub async fn save_blocked_sites(storage: &Storage, sites: &[String]) -> Result<()> {
    storage
        .set(Partition::Synced, BLOCKED_SITES_KEY, &sites.to_vec())
        .await
}

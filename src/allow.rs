//! Temporary-allow ledger.
//!
//! A grant is an active-time budget, not a wall-clock deadline: it only
//! burns down while a tab is open on the allowed domain, so the tracker
//! reports elapsed session time back through [`TempAllowLedger::consume`]
//! rather than the ledger expiring itself on a timer. Legacy
//! absolute-deadline records are still honored on read (see
//! [`StoredGrant`]).

use anyhow::Result;
use chrono::Utc;
use log::info;

use crate::locks::KeyLocks;
use crate::models::StoredGrant;
use crate::storage::{Partition, Storage};

/// Initial budget of a fresh grant: 5 minutes of active time.
pub const TEMP_ALLOW_TIME_MS: i64 = 5 * 60 * 1000;

const KEY_PREFIX: &str = "temp_allow_";

fn grant_key(domain: &str) -> String {
    format!("{KEY_PREFIX}{domain}")
}

#[derive(Clone)]
pub struct TempAllowLedger {
    storage: Storage,
    locks: KeyLocks,
}

impl TempAllowLedger {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            locks: KeyLocks::new(),
        }
    }

    /// Grants `domain` a full budget, overwriting any existing grant.
    pub async fn grant(&self, domain: &str) -> Result<()> {
        let _guard = self.locks.acquire(domain).await;
        self.storage
            .set(
                Partition::Local,
                &grant_key(domain),
                &StoredGrant::Budget {
                    remaining: TEMP_ALLOW_TIME_MS,
                },
            )
            .await?;
        info!("Granted temporary allow for {domain}");
        Ok(())
    }

    /// True iff `domain` holds a grant with budget left. An exhausted
    /// record found on the way is deleted (lazy expiry).
    pub async fn is_active(&self, domain: &str) -> Result<bool> {
        self.is_active_at(domain, Utc::now().timestamp_millis()).await
    }

    async fn is_active_at(&self, domain: &str, now_ms: i64) -> Result<bool> {
        let _guard = self.locks.acquire(domain).await;
        let key = grant_key(domain);

        let Some(grant) = self.storage.get::<StoredGrant>(Partition::Local, &key).await? else {
            return Ok(false);
        };

        if grant.remaining_ms(now_ms) > 0 {
            Ok(true)
        } else {
            self.storage.remove(Partition::Local, &key).await?;
            info!("Temporary allow expired for {domain}");
            Ok(false)
        }
    }

    /// Deducts `elapsed_ms` of active time from the domain's grant. A grant
    /// driven to zero or below is deleted; absence is a no-op.
    pub async fn consume(&self, domain: &str, elapsed_ms: i64) -> Result<()> {
        self.consume_at(domain, elapsed_ms, Utc::now().timestamp_millis())
            .await
    }

    async fn consume_at(&self, domain: &str, elapsed_ms: i64, now_ms: i64) -> Result<()> {
        let _guard = self.locks.acquire(domain).await;
        let key = grant_key(domain);

        let Some(grant) = self.storage.get::<StoredGrant>(Partition::Local, &key).await? else {
            return Ok(());
        };

        let remaining = grant.remaining_ms(now_ms) - elapsed_ms;
        if remaining > 0 {
            self.storage
                .set(Partition::Local, &key, &StoredGrant::Budget { remaining })
                .await?;
        } else {
            self.storage.remove(Partition::Local, &key).await?;
            info!("Temporary allow for {domain} used up");
        }
        Ok(())
    }

    /// Deletes every exhausted grant. Runs at startup and on a fixed
    /// interval so abandoned records do not accumulate.
    pub async fn sweep_expired(&self) -> Result<()> {
        self.sweep_expired_at(Utc::now().timestamp_millis()).await
    }

    async fn sweep_expired_at(&self, now_ms: i64) -> Result<()> {
        let keys = self
            .storage
            .keys_with_prefix(Partition::Local, KEY_PREFIX)
            .await?;

        let mut removed = 0usize;
        for key in keys {
            let Some(domain) = key.strip_prefix(KEY_PREFIX) else {
                continue;
            };
            // Same lock as grant/consume: a grant refreshed between the
            // read and the remove must not be swept away.
            let _guard = self.locks.acquire(domain).await;
            let Some(grant) = self.storage.get::<StoredGrant>(Partition::Local, &key).await? else {
                continue;
            };
            if grant.remaining_ms(now_ms) <= 0 {
                self.storage.remove(Partition::Local, &key).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Swept {removed} expired temporary allows");
        }
        Ok(())
    }
}

use serde::{Deserialize, Serialize};

/// Stored value of a `temp_allow_<domain>` record.
///
/// The current shape is an active-time budget: milliseconds left on the
/// grant, consumed only while a tab is open on the domain. Early releases
/// wrote a bare epoch-milliseconds expiry instead; those records are still
/// readable, and the next write normalizes them to the budget shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StoredGrant {
    Budget { remaining: i64 },
    LegacyDeadline(i64),
}

impl StoredGrant {
    /// Milliseconds of budget left, evaluated at `now_ms` (epoch ms) for
    /// legacy deadline records. Zero or negative means expired.
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        match *self {
            StoredGrant::Budget { remaining } => remaining,
            StoredGrant::LegacyDeadline(deadline_ms) => deadline_ms - now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_shape_roundtrips() {
        let grant = StoredGrant::Budget { remaining: 120_000 };
        let json = serde_json::to_string(&grant).unwrap();
        assert_eq!(json, r#"{"remaining":120000}"#);
        assert_eq!(serde_json::from_str::<StoredGrant>(&json).unwrap(), grant);
    }

    #[test]
    fn legacy_bare_number_decodes_as_deadline() {
        let grant: StoredGrant = serde_json::from_str("1700000300000").unwrap();
        assert_eq!(grant.remaining_ms(1_700_000_000_000), 300_000);
        assert!(grant.remaining_ms(1_700_000_400_000) <= 0);
    }
}

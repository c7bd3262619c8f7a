pub mod grant;
pub mod session;
pub mod stats;

pub use grant::StoredGrant;
pub use session::{TabId, VisitSession};
pub use stats::{BucketTotals, SiteStats, TodayStats};

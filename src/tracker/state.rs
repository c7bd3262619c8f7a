use crate::models::VisitSession;

/// Where a tab sits in the blocking lifecycle. Absence from the tab map is
/// the idle state. A session only exists inside `Tracking`, so a blocked
/// tab cannot accumulate time by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabState {
    /// Navigation started toward an unblocked domain; no session yet.
    Navigating,
    /// The page is open and its active time is accumulating.
    Tracking(VisitSession),
    /// The tab was redirected to the block page.
    Blocked,
}

impl TabState {
    pub fn session(&self) -> Option<&VisitSession> {
        match self {
            TabState::Tracking(session) => Some(session),
            _ => None,
        }
    }
}

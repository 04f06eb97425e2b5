//! Wall clock helpers.

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to microseconds, the resolution of `timestamptz`.
///
/// Keeping application timestamps at database precision means cursors built
/// from freshly created rows compare equal to what is read back later.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

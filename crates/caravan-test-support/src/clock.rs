//! Test clock — deterministic `Clock` implementation for tests.

use caravan_core::clock::Clock;
use chrono::{DateTime, Utc};

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

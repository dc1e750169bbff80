//! Unix timestamps with second precision.

use std::{fmt, ops::Add, time::Duration};

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, as carried in `exp` and `nbf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Wraps a number of seconds since the Unix epoch.
    #[must_use]
    pub const fn from_unix(seconds: u64) -> Self {
        Self(seconds)
    }

    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(mandate_common::time::unix_now())
    }

    /// Seconds since the Unix epoch.
    #[must_use]
    pub const fn to_unix(self) -> u64 {
        self.0
    }

    /// This timestamp moved `seconds` into the past, saturating at the epoch.
    #[must_use]
    pub const fn saturating_sub(self, seconds: u64) -> Self {
        Self(self.0.saturating_sub(seconds))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Self::Output {
        Self(self.0.saturating_add(duration.as_secs()))
    }
}

impl From<u64> for Timestamp {
    fn from(seconds: u64) -> Self {
        Self(seconds)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

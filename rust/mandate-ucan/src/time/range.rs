//! Time range for UCAN validity windows.

use super::timestamp::Timestamp;
use std::{
    fmt,
    ops::{Bound, RangeBounds},
};
use thiserror::Error;

/// The window during which a delegation may be used.
///
/// `not_before` is inclusive and `expiration` is exclusive: a token is usable
/// at `t` when `nbf <= t < exp`.
///
/// Uses [`Bound::Unbounded`] for open ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Earliest time this range is valid.
    pub not_before: Bound<Timestamp>,

    /// First time this range is no longer valid.
    pub expiration: Bound<Timestamp>,
}

/// Why a timestamp falls outside a [`TimeRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeBoundError {
    /// The range ended at or before the checked time.
    #[error("expired at {expiration} (now {now})")]
    Expired {
        /// End of the range.
        expiration: Timestamp,
        /// Time that was checked.
        now: Timestamp,
    },

    /// The range starts after the checked time.
    #[error("not valid before {not_before} (now {now})")]
    TooEarly {
        /// Start of the range.
        not_before: Timestamp,
        /// Time that was checked.
        now: Timestamp,
    },
}

impl TimeRange {
    /// An unbounded time range (no constraints).
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            not_before: Bound::Unbounded,
            expiration: Bound::Unbounded,
        }
    }

    /// Creates a time range from optional `not_before` and `expiration` bounds.
    #[must_use]
    pub const fn new(not_before: Option<Timestamp>, expiration: Option<Timestamp>) -> Self {
        Self {
            not_before: match not_before {
                Some(t) => Bound::Included(t),
                None => Bound::Unbounded,
            },
            expiration: match expiration {
                Some(t) => Bound::Excluded(t),
                None => Bound::Unbounded,
            },
        }
    }

    /// Returns `true` if some instant lies within this range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match (self.not_before, self.expiration) {
            (Bound::Included(nbf), Bound::Excluded(exp)) => nbf < exp,
            _ => true,
        }
    }

    /// Checks that `now` lies within this range.
    ///
    /// # Errors
    ///
    /// Returns [`TimeBoundError::Expired`] when `now` is at or past the
    /// expiration, and [`TimeBoundError::TooEarly`] when it precedes `not_before`.
    pub fn check(&self, now: Timestamp) -> Result<(), TimeBoundError> {
        match self.expiration {
            Bound::Excluded(expiration) if now >= expiration => {
                return Err(TimeBoundError::Expired { expiration, now });
            }
            Bound::Included(expiration) if now > expiration => {
                return Err(TimeBoundError::Expired { expiration, now });
            }
            _ => {}
        }
        match self.not_before {
            Bound::Included(not_before) if now < not_before => {
                Err(TimeBoundError::TooEarly { not_before, now })
            }
            Bound::Excluded(not_before) if now <= not_before => {
                Err(TimeBoundError::TooEarly { not_before, now })
            }
            _ => Ok(()),
        }
    }
}

impl RangeBounds<Timestamp> for TimeRange {
    fn start_bound(&self) -> Bound<&Timestamp> {
        self.not_before.as_ref()
    }

    fn end_bound(&self) -> Bound<&Timestamp> {
        self.expiration.as_ref()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.not_before {
            Bound::Included(nbf) | Bound::Excluded(nbf) => write!(f, "{nbf}")?,
            Bound::Unbounded => {}
        }
        write!(f, "..")?;
        match self.expiration {
            Bound::Included(exp) => write!(f, "={exp}"),
            Bound::Excluded(exp) => write!(f, "{exp}"),
            Bound::Unbounded => Ok(()),
        }
    }
}

//! Time utilities.
//!
//! The [`Timestamp`] struct is the main type for representing time in a UCAN token.

pub mod range;
pub mod timestamp;

pub use range::*;
pub use timestamp::*;

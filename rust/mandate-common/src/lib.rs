#![warn(missing_docs)]

//! This crate constitutes a library of light weight helpers that are shared
//! across the other mandate crates: cross-target `Send` bounds, wall clock
//! access and the cancellable polling loop used by asynchronous
//! authorization flows.

mod sync;
pub use sync::*;

pub mod time;

pub mod poll;
pub use poll::*;

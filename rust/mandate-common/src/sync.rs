//! `Send` bounds that disappear on `wasm32-unknown-unknown`.
//!
//! Storage backends and signers are shared across tasks on native targets,
//! while browser futures are `!Send`. Bounding on these traits instead of
//! `Send`/`Sync` lets one trait definition serve both.

#[cfg(not(target_arch = "wasm32"))]
mod bounds {
    /// `Send` on native targets.
    pub trait ConditionalSend: Send {}
    impl<T: Send> ConditionalSend for T {}

    /// `Send + Sync` on native targets.
    pub trait ConditionalSync: Send + Sync {}
    impl<T: Send + Sync> ConditionalSync for T {}
}

#[cfg(target_arch = "wasm32")]
mod bounds {
    /// No bound on wasm.
    pub trait ConditionalSend {}
    impl<T> ConditionalSend for T {}

    /// No bound on wasm.
    pub trait ConditionalSync {}
    impl<T> ConditionalSync for T {}
}

pub use bounds::{ConditionalSend, ConditionalSync};

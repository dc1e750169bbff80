//! DID-to-verifier resolution.

use std::future::Future;

use crate::{did::Did, signature::Verifier};

/// Resolves a DID to a [`Verifier`].
///
/// Given a DID string, looks up or derives the public key material
/// needed to verify signatures. Async to support network-based
/// DID methods (e.g. did:web, did:plc).
pub trait Resolver {
    /// Error type for resolution failures.
    type Error: std::error::Error;

    /// Resolve a DID to a verifier.
    fn resolve(&self, did: &Did) -> impl Future<Output = Result<impl Verifier, Self::Error>>;
}

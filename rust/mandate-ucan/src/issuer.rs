//! UCAN issuer trait.

use mandate_varsig::{Principal, Signer};

/// An entity that can issue UCANs: it can sign tokens and is
/// identified by a DID.
///
/// Blanket-implemented for any type that is both a [`Signer`]
/// and a [`Principal`].
pub trait Issuer: Signer + Principal {}

impl<T> Issuer for T where T: Signer + Principal {}

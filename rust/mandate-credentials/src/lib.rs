//! Concrete key and signing types for mandate principals.
//!
//! Implementations:
//! - **Ed25519** `did:key` signers, verifiers and a resolver that also
//!   understands service aliases such as `did:web:upload.example`
//! - **Absentee** principals (`did:mailto` accounts) that cannot sign and
//!   produce an empty signature instead
//!
//! Every type here implements [`Principal`] and, where it applies,
//! [`Signer`] or [`Verifier`] from `mandate-varsig`.
//!
//! [`Principal`]: mandate_varsig::Principal
//! [`Signer`]: mandate_varsig::Signer
//! [`Verifier`]: mandate_varsig::Verifier

mod absentee;
pub mod ed25519;

pub use absentee::Absentee;
pub use ed25519::*;

//! Ed25519 key types, DID, and signer implementations.

mod error;
mod resolver;
mod signer;
mod verifier;

pub use error::{Ed25519DidFromStrError, Ed25519KeyError, Ed25519ResolveError};
pub use resolver::Ed25519KeyResolver;
pub use signer::Ed25519Signer;
pub use verifier::Ed25519Verifier;

/// Multicodec prefix of an Ed25519 public key (`0xed` as a varint).
pub(crate) const ED25519_PUB: [u8; 2] = [0xed, 0x01];

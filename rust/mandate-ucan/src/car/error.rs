use ipld_core::cid::Cid;
use thiserror::Error;

use crate::{block::EncodeError as BlockEncodeError, delegation::DelegationError};

/// Errors producing a CAR bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// There is nothing to encode.
    #[error("cannot encode an empty list of delegations")]
    EmptyInput,

    /// The header could not be encoded.
    #[error(transparent)]
    Header(#[from] BlockEncodeError),

    /// A delegation's proofs could not be exported.
    #[error(transparent)]
    Delegation(#[from] DelegationError),
}

/// Errors reading a CAR bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input is empty.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The bytes do not follow the CAR layout.
    #[error("invalid CAR format: {0}")]
    InvalidCarFormat(String),

    /// The header announces a version other than 1 or 2.
    #[error("unsupported CAR version {0}")]
    UnsupportedVersion(u64),

    /// A root listed in the header has no block.
    #[error("root block {0} not found")]
    RootBlockNotFound(Cid),

    /// A block's bytes do not hash to its CID.
    #[error("block {0} does not match its multihash")]
    BlockHashMismatch(Cid),

    /// A root block is not a valid delegation.
    #[error(transparent)]
    Delegation(#[from] DelegationError),
}

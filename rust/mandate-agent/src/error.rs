use ipld_core::cid::Cid;
use mandate_credentials::Ed25519KeyError;
use mandate_ucan::{car, delegation::BuildError, delegation::DelegationError};
use mandate_varsig::Did;
use thiserror::Error;

use crate::{proofs::ResolutionError, session::SessionError};

/// Errors produced by a [`StorageBackend`](crate::StorageBackend) and the
/// profile encoding layered on top of it
#[derive(Error, Debug)]
pub enum StorageError {
    /// An error that occurs while encoding a profile
    #[error("Failed to encode a profile: {0}")]
    EncodeFailed(String),

    /// An error that occurs while decoding a profile
    #[error("Failed to decode a profile: {0}")]
    DecodeFailed(String),

    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),
}

/// Errors produced by an [`Agent`](crate::Agent)
#[derive(Error, Debug)]
pub enum AgentError {
    /// Reading or writing the persisted profile failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No profile is stored under the given name
    #[error("No agent profile named {0:?}")]
    ProfileNotFound(String),

    /// The archived principal could not be restored, or a key could not be
    /// generated
    #[error("Invalid agent key: {0}")]
    Key(#[from] Ed25519KeyError),

    /// The space is not one this agent knows about
    #[error("Unknown space {0}")]
    UnknownSpace(Did),

    /// No stored delegation has the given CID
    #[error("Delegation {0} not found")]
    DelegationNotFound(Cid),

    /// Issuing a delegation failed
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A stored delegation could not be read
    #[error(transparent)]
    Delegation(#[from] DelegationError),

    /// An imported bundle could not be decoded
    #[error(transparent)]
    Import(#[from] car::DecodeError),

    /// No proofs authorize the requested capabilities
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Session resolution failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Waiting was cancelled
    #[error("Aborted: {reason}")]
    Aborted {
        /// The reason given when aborting
        reason: String,
    },

    /// Claiming delegations from the access service failed
    #[error("Claim failed: {0}")]
    Claim(String),
}

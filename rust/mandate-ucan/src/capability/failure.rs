use thiserror::Error;

use super::{Capability, kind::LatticeError};

/// Why a capability is unusable or cannot be derived from another.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Failure {
    /// The capability does not fit its type's resource matcher or `nb` schema.
    #[error("malformed capability {capability}: {reason}")]
    Malformed {
        /// The offending capability.
        capability: Box<Capability>,
        /// Human-readable explanation.
        reason: String,
    },

    /// The claimed capability is not covered by the delegated one.
    #[error("cannot derive {claimed} from {delegated}: {reason}")]
    Derivation {
        /// What the caller asked for.
        claimed: Box<Capability>,
        /// What the delegation grants.
        delegated: Box<Capability>,
        /// Human-readable explanation.
        reason: String,
    },

    /// The derivation table itself is broken.
    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

impl Failure {
    pub(crate) fn malformed(capability: &Capability, reason: impl Into<String>) -> Self {
        Failure::Malformed {
            capability: Box::new(capability.clone()),
            reason: reason.into(),
        }
    }

    pub(crate) fn derivation(
        claimed: &Capability,
        delegated: &Capability,
        reason: impl Into<String>,
    ) -> Self {
        Failure::Derivation {
            claimed: Box::new(claimed.clone()),
            delegated: Box::new(delegated.clone()),
            reason: reason.into(),
        }
    }

    /// The human-readable explanation carried by this failure.
    pub fn reason(&self) -> String {
        match self {
            Failure::Malformed { reason, .. } | Failure::Derivation { reason, .. } => reason.clone(),
            Failure::Lattice(error) => error.to_string(),
        }
    }
}

//! UCAN delegations and the capability algebra they carry.
//!
//! # Overview
//!
//! - [`capability`] decides whether a claimed capability can be derived from
//!   a delegated one.
//! - [`delegation`] models signed, content-addressed delegations and their
//!   proofs, and builds new ones.
//! - [`car`] serializes bundles of delegations as CAR files.
//! - [`revocation`] checks that a revoked delegation travels with the
//!   invocation revoking it.
//!
//! # Example
//!
//! ```ignore
//! use mandate_ucan::{Capability, Delegation, car};
//!
//! let delegation = Delegation::builder()
//!     .issuer(space_signer)
//!     .audience(&agent)
//!     .capability(Capability::new("store/add", space.as_str()))
//!     .try_build()
//!     .await?;
//!
//! let bytes = car::encode(&[delegation])?;
//! let decoded = car::decode(&bytes)?;
//! ```

pub mod block;
pub mod capability;
pub mod car;
pub mod delegation;
pub mod issuer;
pub mod revocation;
pub mod time;

mod sealed;
mod unset;

pub use block::{Block, Blocks};
pub use capability::{Capability, CapabilityKind, Failure, derives};
pub use delegation::{Delegation, DelegationBuilder, Proof};
pub use issuer::Issuer;
pub use revocation::{RevocationError, check_revocation};
pub use time::{TimeRange, Timestamp};
pub use unset::Unset;

//! An agent that holds delegations and proves its authority with them.
//!
//! An [`Agent`] owns an ed25519 key, a set of spaces and a
//! [`DelegationStore`], all persisted as one dag-cbor profile through a
//! [`StorageBackend`]. To invoke a capability it selects proofs from its
//! store with [`resolve_proofs`]. Delegations from keyless email accounts
//! are usable once an [`AccessService`] attests them; see [`session`].

pub mod access;
mod agent;
pub mod data;
mod error;
pub mod proofs;
pub mod session;
mod storage;
pub mod store;

pub use access::AccessService;
pub use agent::*;
pub use error::*;
pub use proofs::{Rejection, ResolutionContext, ResolutionError, resolve_proofs};
pub use session::{SessionError, SessionIndex, resolve_session, scan_attestations};
pub use storage::*;
pub use store::DelegationStore;

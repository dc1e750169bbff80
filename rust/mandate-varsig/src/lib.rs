//! Principals and signatures.
//!
//! This crate holds the narrow interface the authorization engine uses to
//! talk about identities and cryptography without implementing any of it:
//! [`Did`] identifiers, the [`Principal`] trait, an algorithm-tagged
//! [`Signature`] envelope and the [`Signer`], [`Verifier`] and [`Resolver`]
//! traits that concrete key types implement.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod did;
pub mod principal;
pub mod resolver;
pub mod signature;

pub use did::*;
pub use principal::*;
pub use resolver::*;
pub use signature::*;

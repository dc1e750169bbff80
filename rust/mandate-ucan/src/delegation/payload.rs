//! The on-the-wire shape of a delegation.

use std::collections::BTreeMap;

use ipld_core::{cid::Cid, ipld::Ipld};
use mandate_varsig::{Did, Signature};
use serde::{Deserialize, Serialize};

use crate::{block::EncodeError, capability::Capability, time::Timestamp};

/// Token format version written into every delegation.
pub const VERSION: &str = "0.9.1";

/// An arbitrary fact attached to a delegation.
pub type Fact = BTreeMap<String, Ipld>;

/// A decoded delegation token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ucan {
    #[serde(rename = "v")]
    pub(crate) version: String,

    #[serde(rename = "iss")]
    pub(crate) issuer: Did,

    #[serde(rename = "aud")]
    pub(crate) audience: Did,

    #[serde(rename = "att")]
    pub(crate) capabilities: Vec<Capability>,

    #[serde(rename = "exp")]
    pub(crate) expiration: Option<Timestamp>,

    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub(crate) not_before: Option<Timestamp>,

    #[serde(rename = "nnc", default, skip_serializing_if = "Option::is_none")]
    pub(crate) nonce: Option<String>,

    #[serde(rename = "fct", default)]
    pub(crate) facts: Vec<Fact>,

    #[serde(rename = "prf", default)]
    pub(crate) proofs: Vec<Cid>,

    #[serde(rename = "s")]
    pub(crate) signature: Signature,
}

/// Everything in a [`Ucan`] except the signature; this is what gets signed.
#[derive(Debug, Serialize)]
pub(crate) struct SignedPayload<'a> {
    #[serde(rename = "v")]
    pub version: &'a str,

    #[serde(rename = "iss")]
    pub issuer: &'a Did,

    #[serde(rename = "aud")]
    pub audience: &'a Did,

    #[serde(rename = "att")]
    pub capabilities: &'a [Capability],

    #[serde(rename = "exp")]
    pub expiration: Option<Timestamp>,

    #[serde(rename = "nbf", skip_serializing_if = "Option::is_none")]
    pub not_before: Option<Timestamp>,

    #[serde(rename = "nnc", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<&'a str>,

    #[serde(rename = "fct")]
    pub facts: &'a [Fact],

    #[serde(rename = "prf")]
    pub proofs: &'a [Cid],
}

impl SignedPayload<'_> {
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        serde_ipld_dagcbor::to_vec(self).map_err(|error| EncodeError(error.to_string()))
    }
}

impl Ucan {
    pub(crate) fn payload(&self) -> SignedPayload<'_> {
        SignedPayload {
            version: &self.version,
            issuer: &self.issuer,
            audience: &self.audience,
            capabilities: &self.capabilities,
            expiration: self.expiration,
            not_before: self.not_before,
            nonce: self.nonce.as_deref(),
            facts: &self.facts,
            proofs: &self.proofs,
        }
    }
}

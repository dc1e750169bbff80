//! Algorithm-tagged signatures and the traits that produce and check them.
//!
//! A [`Signature`] is serialized as a single byte string: the multicodec code
//! of the signing algorithm as an unsigned LEB128 varint, followed by the raw
//! signature bytes. Principals that cannot sign (accounts identified by an
//! email address) produce the [non-standard](Signature::non_standard) empty
//! signature, which no verifier accepts.

use std::{fmt, future::Future};

use mandate_common::ConditionalSend;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multicodec code of Ed25519 signatures.
pub const EDDSA: u64 = 0xed;

/// Multicodec code of the signature used by absentee principals.
pub const NON_STANDARD: u64 = 0xd000;

/// A signature together with the code of the algorithm that produced it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    code: u64,
    raw: Vec<u8>,
}

impl Signature {
    /// Wraps raw signature bytes produced by the algorithm `code`.
    pub fn new(code: u64, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            raw: raw.into(),
        }
    }

    /// The empty signature of a principal that has no key.
    pub fn non_standard() -> Self {
        Self::new(NON_STANDARD, Vec::new())
    }

    /// Multicodec code of the signing algorithm.
    pub fn code(&self) -> u64 {
        self.code
    }

    /// Raw signature bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Whether this is an absentee signature.
    pub fn is_non_standard(&self) -> bool {
        self.code == NON_STANDARD
    }

    /// Encodes as `varint(code) ++ raw`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.raw.len() + 3);
        // Writing into a Vec cannot fail.
        let _ = leb128::write::unsigned(&mut bytes, self.code);
        bytes.extend_from_slice(&self.raw);
        bytes
    }

    /// Decodes the output of [`Signature::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureDecodeError> {
        let mut cursor = bytes;
        let code = leb128::read::unsigned(&mut cursor)
            .map_err(|error| SignatureDecodeError(error.to_string()))?;
        Ok(Self::new(code, cursor))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("code", &format_args!("{:#x}", self.code))
            .field("len", &self.raw.len())
            .finish()
    }
}

/// Error decoding a [`Signature`] from bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid signature encoding: {0}")]
pub struct SignatureDecodeError(pub String);

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes::Bytes::new(&self.to_bytes()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        Signature::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Produces a cryptographic signature over a payload.
pub trait Signer {
    /// Sign `payload` and return the signature.
    fn sign(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<Signature, signature::Error>> + ConditionalSend;
}

/// Verifies that a cryptographic signature is valid for a given payload.
pub trait Verifier {
    /// Verify that `signature` is valid for `payload`.
    fn verify(
        &self,
        payload: &[u8],
        signature: &Signature,
    ) -> impl Future<Output = Result<(), signature::Error>> + ConditionalSend;
}

impl<S: Signer> Signer for &S {
    fn sign(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<Signature, signature::Error>> + ConditionalSend {
        (**self).sign(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn it_prefixes_raw_bytes_with_the_algorithm_code() -> TestResult {
        let signature = Signature::new(EDDSA, vec![7u8; 64]);
        let bytes = signature.to_bytes();
        // 0xed needs two varint bytes
        assert_eq!(&bytes[..2], &[0xed, 0x01]);
        assert_eq!(bytes.len(), 66);
        assert_eq!(Signature::from_bytes(&bytes)?, signature);
        Ok(())
    }

    #[test]
    fn it_encodes_the_absentee_signature_as_just_a_code() -> TestResult {
        let signature = Signature::non_standard();
        assert!(signature.is_non_standard());
        assert!(signature.raw().is_empty());
        assert_eq!(Signature::from_bytes(&signature.to_bytes())?, signature);
        Ok(())
    }

    #[test]
    fn it_serializes_as_a_cbor_byte_string() -> TestResult {
        let signature = Signature::new(EDDSA, vec![1, 2, 3]);
        let encoded = serde_ipld_dagcbor::to_vec(&signature)?;
        // major type 2 (bytes), length 5
        assert_eq!(encoded[0], 0x45);
        let decoded: Signature = serde_ipld_dagcbor::from_slice(&encoded)?;
        assert_eq!(decoded, signature);
        Ok(())
    }

    #[test]
    fn it_rejects_empty_input() {
        assert!(Signature::from_bytes(&[]).is_err());
    }
}

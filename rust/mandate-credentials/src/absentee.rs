use mandate_varsig::{Did, DidParseError, Principal, Signature, Signer};

/// A principal that has no key of its own, such as an email account.
///
/// An absentee "signs" with the empty [non-standard](Signature::non_standard)
/// signature. Delegations issued this way only become usable once a service
/// vouches for them with an attestation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Absentee {
    did: Did,
}

impl Absentee {
    /// Wraps an arbitrary DID.
    pub fn new(did: Did) -> Self {
        Self { did }
    }

    /// The `did:mailto` absentee for an email address.
    pub fn from_email(email: &str) -> Result<Self, DidParseError> {
        Ok(Self::new(Did::mailto(email)?))
    }
}

impl From<Did> for Absentee {
    fn from(did: Did) -> Self {
        Self::new(did)
    }
}

impl Principal for Absentee {
    fn did(&self) -> Did {
        self.did.clone()
    }
}

impl Signer for Absentee {
    async fn sign(&self, _payload: &[u8]) -> Result<Signature, signature::Error> {
        Ok(Signature::non_standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[tokio::test]
    async fn it_signs_with_an_empty_signature() -> TestResult {
        let account = Absentee::from_email("alice@example.com")?;
        assert_eq!(account.did().as_str(), "did:mailto:example.com:alice");

        let signature = account.sign(b"anything").await?;
        assert!(signature.is_non_standard());
        assert!(signature.raw().is_empty());
        Ok(())
    }
}

//! DID (Decentralized Identifier) types.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A [Decentralized Identifier][did-core] string.
///
/// Wraps a raw DID string like `did:key:z6Mk...`, `did:web:example.com` or
/// `did:mailto:example.com:alice`. Use [`method()`][Did::method] to inspect
/// the DID method at runtime.
///
/// [did-core]: https://www.w3.org/TR/did-core/
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Did(String);

impl Did {
    /// Get the raw DID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the DID method name (e.g. `"key"` for `did:key:...`,
    /// `"mailto"` for `did:mailto:...`).
    #[must_use]
    pub fn method(&self) -> &str {
        self.split().0
    }

    /// Returns everything after the method segment.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.split().1
    }

    /// Derives the `did:mailto` identifier of an email address.
    ///
    /// `alice@example.com` becomes `did:mailto:example.com:alice`.
    pub fn mailto(email: &str) -> Result<Self, DidParseError> {
        let (local, domain) = email
            .rsplit_once('@')
            .filter(|(local, domain)| !local.is_empty() && !domain.is_empty())
            .ok_or_else(|| DidParseError(format!("expected user@domain, got: {email}")))?;
        format!("did:mailto:{domain}:{local}").parse()
    }

    fn split(&self) -> (&str, &str) {
        // FromStr guarantees `did:method:identifier`.
        self.0["did:".len()..].split_once(':').unwrap_or(("", ""))
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&Did> for Did {
    fn from(did: &Did) -> Self {
        did.clone()
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error when parsing a DID string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid DID: {0}")]
pub struct DidParseError(pub String);

impl FromStr for Did {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix("did:") else {
            return Err(DidParseError(format!("expected did: prefix, got: {s}")));
        };
        match rest.split_once(':') {
            Some((method, identifier)) if !method.is_empty() && !identifier.is_empty() => {
                Ok(Did(s.to_string()))
            }
            _ => Err(DidParseError(format!(
                "expected did:method:identifier, got: {s}"
            ))),
        }
    }
}

impl TryFrom<String> for Did {
    type Error = DidParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Serialize for Did {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Creates a [`Did`] from a string literal, validated at compile time.
///
/// The `"did:"` prefix is added automatically; pass `"method:identifier"`.
///
/// ```
/// use mandate_varsig::did;
///
/// let w = did!("web:upload.example");
/// assert_eq!(w.method(), "web");
///
/// let m = did!("mailto:example.com:alice");
/// assert_eq!(m.identifier(), "example.com:alice");
/// ```
///
/// Invalid literals fail at compile time:
/// ```compile_fail
/// use mandate_varsig::did;
/// let _bad = did!("nocolon");
/// ```
#[macro_export]
macro_rules! did {
    ($s:literal) => {{
        const _: () = {
            let b = $s.as_bytes();
            let mut i = 0;
            let mut found_colon = false;
            while i < b.len() {
                if b[i] == b':' {
                    assert!(i > 0, "DID method must not be empty");
                    assert!(i + 1 < b.len(), "DID identifier must not be empty");
                    found_colon = true;
                    break;
                }
                i += 1;
            }
            assert!(found_colon, "expected \"method:identifier\"");
        };
        #[allow(clippy::expect_used)]
        format!("did:{}", $s)
            .parse::<$crate::did::Did>()
            // The const block above validated the format
            .expect("literal was validated at compile time")
    }};
}

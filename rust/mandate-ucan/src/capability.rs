//! Capabilities and the rules for deriving one from another.
//!
//! A [`Capability`] names an ability (`can`) on a resource (`with`), narrowed
//! by optional `nb` constraints. The set of abilities is closed: every
//! ability maps to a [`CapabilityKind`] that knows which coarser kinds it can
//! be derived from and how each of its `nb` fields may be refined.
//!
//! [`derives`] is the single predicate the rest of the engine relies on: it
//! succeeds when a delegated capability covers a claimed one.

mod failure;
mod kind;
mod schema;

use std::{collections::BTreeMap, fmt};

use ipld_core::ipld::Ipld;
use serde::{Deserialize, Serialize};

pub use failure::Failure;
pub use kind::{CapabilityKind, LatticeError, UnknownAbility};

/// Resource of a capability that stands for "whatever my proofs grant".
pub const SESSION_RESOURCE: &str = "ucan:*";

/// The ability that covers every other ability.
pub const ANY_ABILITY: &str = "*";

/// An ability on a resource, optionally narrowed by caveats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Ability, e.g. `store/add`.
    pub can: String,

    /// Resource URI, e.g. `did:key:z6Mk...`.
    pub with: String,

    /// Type-specific caveats.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nb: BTreeMap<String, Ipld>,
}

impl Capability {
    /// A capability without caveats.
    pub fn new(can: impl Into<String>, with: impl Into<String>) -> Self {
        Self {
            can: can.into(),
            with: with.into(),
            nb: BTreeMap::new(),
        }
    }

    /// Adds a caveat.
    #[must_use]
    pub fn with_nb(mut self, key: impl Into<String>, value: impl Into<Ipld>) -> Self {
        self.nb.insert(key.into(), value.into());
        self
    }

    /// The capability type named by `can`.
    pub fn kind(&self) -> Result<CapabilityKind, Failure> {
        self.can
            .parse()
            .map_err(|error: UnknownAbility| Failure::malformed(self, error.to_string()))
    }

    /// Whether the resource is the `ucan:*` session marker.
    pub fn is_session(&self) -> bool {
        self.with == SESSION_RESOURCE
    }

    /// Checks the resource matcher and `nb` schema of this capability.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::Malformed`] for unknown abilities, resources of the
    /// wrong scheme and caveats of the wrong shape.
    pub fn validate(&self) -> Result<CapabilityKind, Failure> {
        let kind = self.kind()?;
        let resource_ok = match kind {
            CapabilityKind::Top => self.with.starts_with("did:") || self.is_session(),
            _ => self.with.starts_with("did:"),
        };
        if !resource_ok {
            return Err(Failure::malformed(
                self,
                format!("expected a did: resource, got {}", self.with),
            ));
        }
        for field in kind.fields() {
            if let Some(value) = self.nb.get(field.name) {
                field
                    .check(value)
                    .map_err(|reason| Failure::malformed(self, reason))?;
            }
        }
        Ok(kind)
    }

    /// Whether `self.can` covers `other.can` (equal, or a coarser kind).
    ///
    /// Unknown abilities only cover themselves.
    pub fn covers_ability(&self, other: &Capability) -> bool {
        if self.can == other.can {
            return true;
        }
        match (self.can.parse::<CapabilityKind>(), other.can.parse::<CapabilityKind>()) {
            (Ok(mine), Ok(theirs)) => theirs.is_derivable_from(mine).unwrap_or(false),
            _ => false,
        }
    }

    /// Intersects a `ucan:*` capability with a capability `granted` by one
    /// of its proofs, yielding the concrete capability it stands for.
    ///
    /// Returns `None` when the abilities are unrelated.
    pub fn narrow(&self, granted: &Capability) -> Option<Capability> {
        if self.covers_ability(granted) {
            Some(granted.clone())
        } else if granted.covers_ability(self) {
            Some(Capability {
                can: self.can.clone(),
                with: granted.with.clone(),
                nb: self.nb.clone(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with {}", self.can, self.with)
    }
}

/// Checks that `delegated` covers `claimed`.
///
/// The claimed ability must be the delegated one or derivable from it
/// through the lattice, both must name the same resource, and when the
/// abilities are equal every `nb` field must respect its refinement rule.
///
/// # Errors
///
/// Returns [`Failure::Malformed`] when either side fails validation and
/// [`Failure::Derivation`] when the delegated capability is insufficient.
pub fn derives(claimed: &Capability, delegated: &Capability) -> Result<(), Failure> {
    let claimed_kind = claimed.validate()?;
    let delegated_kind = delegated.validate()?;

    if !claimed_kind.is_derivable_from(delegated_kind)? {
        return Err(Failure::derivation(
            claimed,
            delegated,
            format!("{} is not derivable from {}", claimed.can, delegated.can),
        ));
    }

    if claimed.with != delegated.with {
        return Err(Failure::derivation(
            claimed,
            delegated,
            format!(
                "Can not derive {} with {} from {}",
                claimed.can, claimed.with, delegated.with
            ),
        ));
    }

    if claimed_kind == delegated_kind {
        for field in claimed_kind.fields() {
            field
                .refine(claimed.nb.get(field.name), delegated.nb.get(field.name))
                .map_err(|reason| Failure::derivation(claimed, delegated, reason))?;
        }
    }

    Ok(())
}

//! The closed set of capability types and their derivation lattice.

use std::{fmt, str::FromStr, sync::LazyLock};

use thiserror::Error;

use super::schema::{Field, FieldType::*, Rule::*};

/// Every capability type this engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityKind {
    /// `*`
    Top,
    /// `store/*`
    Store,
    /// `store/add`
    StoreAdd,
    /// `store/remove`
    StoreRemove,
    /// `store/list`
    StoreList,
    /// `upload/*`
    Upload,
    /// `upload/add`
    UploadAdd,
    /// `upload/remove`
    UploadRemove,
    /// `upload/list`
    UploadList,
    /// `access/*`
    Access,
    /// `access/authorize`
    AccessAuthorize,
    /// `access/confirm`
    AccessConfirm,
    /// `access/claim`
    AccessClaim,
    /// `access/delegate`
    AccessDelegate,
    /// `ucan/attest`
    UcanAttest,
    /// `ucan/revoke`
    UcanRevoke,
    /// `voucher/*`
    Voucher,
    /// `voucher/claim`
    VoucherClaim,
    /// `voucher/redeem`
    VoucherRedeem,
}

use CapabilityKind::*;

impl CapabilityKind {
    /// All capability types, in declaration order.
    pub const ALL: [CapabilityKind; 19] = [
        Top,
        Store,
        StoreAdd,
        StoreRemove,
        StoreList,
        Upload,
        UploadAdd,
        UploadRemove,
        UploadList,
        Access,
        AccessAuthorize,
        AccessConfirm,
        AccessClaim,
        AccessDelegate,
        UcanAttest,
        UcanRevoke,
        Voucher,
        VoucherClaim,
        VoucherRedeem,
    ];

    /// The `can` string of this capability type.
    pub const fn ability(self) -> &'static str {
        match self {
            Top => "*",
            Store => "store/*",
            StoreAdd => "store/add",
            StoreRemove => "store/remove",
            StoreList => "store/list",
            Upload => "upload/*",
            UploadAdd => "upload/add",
            UploadRemove => "upload/remove",
            UploadList => "upload/list",
            Access => "access/*",
            AccessAuthorize => "access/authorize",
            AccessConfirm => "access/confirm",
            AccessClaim => "access/claim",
            AccessDelegate => "access/delegate",
            UcanAttest => "ucan/attest",
            UcanRevoke => "ucan/revoke",
            Voucher => "voucher/*",
            VoucherClaim => "voucher/claim",
            VoucherRedeem => "voucher/redeem",
        }
    }

    /// The coarser capability types this one may be derived from directly.
    pub const fn parents(self) -> &'static [CapabilityKind] {
        match self {
            Top => &[],
            Store | Upload | Access | Voucher => &[Top],
            AccessConfirm | UcanAttest | UcanRevoke => &[Top],
            StoreAdd | StoreRemove | StoreList => &[Store],
            UploadAdd | UploadRemove | UploadList => &[Upload],
            AccessAuthorize | AccessClaim | AccessDelegate => &[Access],
            VoucherClaim | VoucherRedeem => &[Voucher],
        }
    }

    /// The `nb` fields this capability type understands.
    pub(crate) fn fields(self) -> &'static [Field] {
        match self {
            Top | Store | Upload | Access | Voucher | AccessClaim => &[],
            StoreAdd => STORE_ADD,
            StoreRemove => STORE_REMOVE,
            StoreList | UploadList => LIST,
            UploadAdd => UPLOAD_ADD,
            UploadRemove => UPLOAD_REMOVE,
            AccessAuthorize => ACCESS_AUTHORIZE,
            AccessConfirm => ACCESS_CONFIRM,
            AccessDelegate => ACCESS_DELEGATE,
            UcanAttest => UCAN_ATTEST,
            UcanRevoke => UCAN_REVOKE,
            VoucherClaim => VOUCHER_CLAIM,
            VoucherRedeem => VOUCHER_REDEEM,
        }
    }

    /// Whether a delegated capability of type `delegated` covers this type.
    ///
    /// Every type is derivable from itself.
    ///
    /// # Errors
    ///
    /// Fails if the derivation lattice is inconsistent.
    pub fn is_derivable_from(self, delegated: CapabilityKind) -> Result<bool, LatticeError> {
        let lattice = LATTICE.as_ref().map_err(Clone::clone)?;
        Ok(lattice.covers(delegated, self))
    }

    const fn index(self) -> usize {
        self as usize
    }
}

const STORE_ADD: &[Field] = &[
    Field::new("link", Link, Pinned),
    Field::new("size", Uint, AtMost),
    Field::new("origin", Link, Pinned),
];
const STORE_REMOVE: &[Field] = &[Field::new("link", Link, Pinned)];
const LIST: &[Field] = &[
    Field::new("cursor", Text, Free),
    Field::new("size", Uint, Free),
    Field::new("pre", Bool, Free),
];
const UPLOAD_ADD: &[Field] = &[
    Field::new("root", Link, Pinned),
    Field::new("shards", Links, Pinned),
];
const UPLOAD_REMOVE: &[Field] = &[Field::new("root", Link, Pinned)];
const ACCESS_AUTHORIZE: &[Field] = &[
    Field::new("iss", Mailto, Pinned),
    Field::new("att", Abilities, Free),
];
const ACCESS_CONFIRM: &[Field] = &[
    Field::new("iss", Did, Pinned),
    Field::new("aud", Did, Pinned),
    Field::new("att", Abilities, Free),
    Field::new("cause", Link, Pinned),
];
const ACCESS_DELEGATE: &[Field] = &[Field::new("delegations", LinkMap, Subset)];
const UCAN_ATTEST: &[Field] = &[Field::new("proof", Link, Pinned)];
const UCAN_REVOKE: &[Field] = &[
    Field::new("ucan", Link, Pinned),
    Field::new("proof", Links, Free),
];
const VOUCHER_CLAIM: &[Field] = &[
    Field::new("product", DidPattern, Pattern),
    Field::new("identity", UriPattern, Pattern),
    Field::new("service", Did, Pinned),
];
const VOUCHER_REDEEM: &[Field] = &[
    Field::new("product", DidPattern, Pattern),
    Field::new("identity", UriPattern, Pattern),
    Field::new("space", Did, Pinned),
];

impl FromStr for CapabilityKind {
    type Err = UnknownAbility;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.ability() == s)
            .ok_or_else(|| UnknownAbility(s.to_owned()))
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ability())
    }
}

/// The ability string does not name a known capability type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ability {0:?}")]
pub struct UnknownAbility(pub String);

/// The static derivation table does not form a lattice rooted at `*`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("capability lattice is inconsistent: {0}")]
pub struct LatticeError(pub String);

static LATTICE: LazyLock<Result<Lattice, LatticeError>> = LazyLock::new(Lattice::build);

/// Transitive closure of [`CapabilityKind::parents`], one bit set per type.
struct Lattice {
    ancestors: [u32; CapabilityKind::ALL.len()],
}

impl Lattice {
    fn build() -> Result<Self, LatticeError> {
        let mut ancestors = [0u32; CapabilityKind::ALL.len()];
        for kind in CapabilityKind::ALL {
            let mut stack: Vec<(CapabilityKind, usize)> = vec![(kind, 0)];
            let mut reached = 1u32 << kind.index();
            while let Some((current, depth)) = stack.pop() {
                if depth > CapabilityKind::ALL.len() {
                    return Err(LatticeError(format!("cycle through {current}")));
                }
                for parent in current.parents() {
                    reached |= 1 << parent.index();
                    stack.push((*parent, depth + 1));
                }
            }
            if reached & (1 << Top.index()) == 0 {
                return Err(LatticeError(format!("{kind} does not derive from *")));
            }
            ancestors[kind.index()] = reached;
        }
        tracing::trace!("capability lattice built");
        Ok(Self { ancestors })
    }

    fn covers(&self, delegated: CapabilityKind, claimed: CapabilityKind) -> bool {
        self.ancestors[claimed.index()] & (1 << delegated.index()) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn it_builds_a_lattice_rooted_at_top() -> TestResult {
        for kind in CapabilityKind::ALL {
            assert!(kind.is_derivable_from(Top)?, "{kind} should derive from *");
            assert!(kind.is_derivable_from(kind)?);
        }
        Ok(())
    }

    #[test]
    fn it_derives_operations_from_their_namespace_wildcard() -> TestResult {
        assert!(StoreAdd.is_derivable_from(Store)?);
        assert!(UploadList.is_derivable_from(Upload)?);
        assert!(AccessDelegate.is_derivable_from(Access)?);
        assert!(VoucherRedeem.is_derivable_from(Voucher)?);

        assert!(!StoreAdd.is_derivable_from(Upload)?);
        assert!(!Store.is_derivable_from(StoreAdd)?);
        assert!(!AccessConfirm.is_derivable_from(Access)?);
        assert!(!UcanAttest.is_derivable_from(Access)?);
        Ok(())
    }

    #[test]
    fn it_parses_every_ability_it_prints() -> TestResult {
        for kind in CapabilityKind::ALL {
            assert_eq!(kind.ability().parse::<CapabilityKind>()?, kind);
        }
        assert!("store/teleport".parse::<CapabilityKind>().is_err());
        Ok(())
    }
}

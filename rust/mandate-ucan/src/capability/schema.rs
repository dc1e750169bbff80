//! Per-field `nb` schemas and refinement rules.
//!
//! Each capability type lists its fields in [`super::CapabilityKind`]. A
//! field has a value shape, checked when a capability is validated, and a
//! rule that decides whether a claimed value stays within a delegated one.

use std::collections::BTreeMap;

use ipld_core::ipld::Ipld;
use mandate_varsig::Did;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub rule: Rule,
}

impl Field {
    pub const fn new(name: &'static str, ty: FieldType, rule: Rule) -> Self {
        Self { name, ty, rule }
    }
}

/// Shape of an `nb` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldType {
    Link,
    Links,
    Uint,
    Text,
    Bool,
    Did,
    Mailto,
    /// List of `{can}` maps.
    Abilities,
    /// Map of string keys to links.
    LinkMap,
    /// A DID, or a DID prefix ending in `*`.
    DidPattern,
    /// A URI, or a URI prefix ending in `*`.
    UriPattern,
}

/// How a claimed value must relate to the delegated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rule {
    /// Unconstrained.
    Free,
    /// Equal to the delegated value when one is set.
    Pinned,
    /// At most the delegated value when one is set.
    AtMost,
    /// Matches the delegated value, which may end in `*`.
    Pattern,
    /// Every claimed map entry appears among the delegated entries.
    Subset,
}

impl Field {
    /// Checks the shape of `value`. `null` and `"*"` count as unset.
    pub fn check(&self, value: &Ipld) -> Result<(), String> {
        let ok = match (self.ty, value) {
            (_, value) if is_unset(value) => true,
            (FieldType::Link, Ipld::Link(_)) => true,
            (FieldType::Links, Ipld::List(items)) => {
                items.iter().all(|item| matches!(item, Ipld::Link(_)))
            }
            (FieldType::Uint, Ipld::Integer(n)) => *n >= 0,
            (FieldType::Text, Ipld::String(_)) => true,
            (FieldType::Bool, Ipld::Bool(_)) => true,
            (FieldType::Did, Ipld::String(s)) => s.parse::<Did>().is_ok(),
            (FieldType::Mailto, Ipld::String(s)) => s
                .parse::<Did>()
                .is_ok_and(|did| did.method() == "mailto"),
            (FieldType::Abilities, Ipld::List(items)) => items.iter().all(|item| {
                matches!(item, Ipld::Map(entry) if matches!(entry.get("can"), Some(Ipld::String(_))))
            }),
            (FieldType::LinkMap, Ipld::Map(entries)) => {
                entries.values().all(|item| matches!(item, Ipld::Link(_)))
            }
            (FieldType::DidPattern, Ipld::String(s)) => s.starts_with("did:"),
            (FieldType::UriPattern, Ipld::String(s)) => s.contains(':'),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "nb.{} expected {:?}, got {}",
                self.name,
                self.ty,
                display(value)
            ))
        }
    }

    /// Checks that `claimed` stays within `delegated`.
    pub fn refine(&self, claimed: Option<&Ipld>, delegated: Option<&Ipld>) -> Result<(), String> {
        let Some(delegated) = unset_as_none(delegated) else {
            return Ok(());
        };
        let claimed = unset_as_none(claimed);
        let name = self.name;

        match self.rule {
            Rule::Free => Ok(()),
            Rule::Pinned => match claimed {
                Some(claimed) if claimed == delegated => Ok(()),
                _ => Err(format!(
                    "{name} constraint violation: {} violates imposed {name} constraint {}",
                    claimed.map_or_else(|| "unset".to_owned(), display),
                    display(delegated)
                )),
            },
            Rule::AtMost => match (claimed, delegated) {
                (None, _) => Ok(()),
                (Some(Ipld::Integer(claimed)), Ipld::Integer(limit)) if claimed <= limit => Ok(()),
                (Some(Ipld::Integer(claimed)), Ipld::Integer(limit)) => Err(format!(
                    "{name} constraint violation: {claimed} > {limit}"
                )),
                (Some(claimed), limit) => Err(format!(
                    "{name} constraint violation: {} is not comparable to {}",
                    display(claimed),
                    display(limit)
                )),
            },
            Rule::Pattern => match (claimed, delegated) {
                (Some(Ipld::String(value)), Ipld::String(pattern)) if matches_pattern(value, pattern) => {
                    Ok(())
                }
                (claimed, pattern) => Err(format!(
                    "{name} constraint violation: {} does not match {}",
                    claimed.map_or_else(|| "unset".to_owned(), display),
                    display(pattern)
                )),
            },
            Rule::Subset => {
                let empty = BTreeMap::new();
                let claimed = match claimed {
                    Some(Ipld::Map(entries)) => entries,
                    None => &empty,
                    Some(other) => {
                        return Err(format!("{name} expected a map, got {}", display(other)));
                    }
                };
                let Ipld::Map(delegated) = delegated else {
                    return Err(format!("{name} expected a map, got {}", display(delegated)));
                };
                for (key, value) in claimed {
                    if !delegated.values().any(|allowed| allowed == value) {
                        return Err(format!(
                            "{name} constraint violation: {key} ({}) was not delegated",
                            display(value)
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

/// `value` equals `pattern`, or starts with `pattern` minus a trailing `*`.
pub(crate) fn matches_pattern(value: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => value == pattern,
    }
}

fn is_unset(value: &Ipld) -> bool {
    match value {
        Ipld::Null => true,
        Ipld::String(s) => s == "*",
        _ => false,
    }
}

fn unset_as_none(value: Option<&Ipld>) -> Option<&Ipld> {
    value.filter(|value| !is_unset(value))
}

pub(crate) fn display(value: &Ipld) -> String {
    match value {
        Ipld::Link(cid) => cid.to_string(),
        Ipld::String(s) => s.clone(),
        Ipld::Integer(n) => n.to_string(),
        Ipld::Bool(b) => b.to_string(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_matches_trailing_wildcards() {
        assert!(matches_pattern("did:mailto:example.com:alice", "did:mailto:example.com:*"));
        assert!(matches_pattern("did:mailto:example.com:alice", "did:mailto:example.com:alice"));
        assert!(!matches_pattern("did:mailto:other.com:alice", "did:mailto:example.com:*"));
        assert!(!matches_pattern("did:mailto:example.com", "did:mailto:example.com:alice"));
    }

    #[test]
    fn it_treats_null_and_wildcard_as_unset() {
        let field = Field::new("size", FieldType::Uint, Rule::AtMost);
        let wildcard = Ipld::String("*".into());
        assert!(field.refine(Some(&Ipld::Integer(10)), Some(&Ipld::Null)).is_ok());
        assert!(field.refine(Some(&Ipld::Integer(10)), Some(&wildcard)).is_ok());
        assert!(field.check(&Ipld::Null).is_ok());
        assert!(field.check(&wildcard).is_ok());

        let link = Field::new("root", FieldType::Link, Rule::Pinned);
        assert!(link.check(&wildcard).is_ok());
        assert!(link.refine(Some(&Ipld::String("anything".into())), Some(&wildcard)).is_ok());
    }

    #[test]
    fn it_bounds_sizes_only_when_both_sides_set_one() {
        let field = Field::new("size", FieldType::Uint, Rule::AtMost);
        assert!(field.refine(None, Some(&Ipld::Integer(50))).is_ok());
        assert!(field.refine(Some(&Ipld::String("*".into())), Some(&Ipld::Integer(50))).is_ok());
        assert!(field.refine(Some(&Ipld::Integer(51)), Some(&Ipld::Integer(50))).is_err());
    }

    #[test]
    fn it_rejects_negative_sizes() {
        let field = Field::new("size", FieldType::Uint, Rule::AtMost);
        assert!(field.check(&Ipld::Integer(-1)).is_err());
        assert!(field.check(&Ipld::String("1".into())).is_err());
    }
}

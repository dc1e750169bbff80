use crate::{issuer::Issuer, unset::Unset};
use mandate_varsig::Did;

#[doc(hidden)]
pub trait IssuerOrUnset {}
impl IssuerOrUnset for Unset {}
impl<I: Issuer> IssuerOrUnset for I {}

#[doc(hidden)]
pub trait DidOrUnset {}
impl DidOrUnset for Unset {}
impl DidOrUnset for Did {}

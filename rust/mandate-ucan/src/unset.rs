/// Placeholder for a builder field that has not been provided yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Unset;

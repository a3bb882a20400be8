//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two
/// instances with the same values are the same value. `Money` and `Rate` are
/// the canonical examples in this workspace; entities (products, firms,
/// orders) are compared by identifier instead.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

//! Element identifiers and typed arena indices.
//!
//! Everything the remote service hands out is addressed by a string id;
//! internally each property kind lives in an append-only table addressed by
//! a dense typed index. Indices stay valid for the whole import session.

use std::fmt;

/// A 3D model element id, decoded from the service's hexadecimal encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl ElementId {
    /// Sentinel for "not an element" (parse failure).
    pub const INVALID: Self = Self(u64::MAX);

    /// Check this is a real element id.
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Parse a hexadecimal element id string.
    ///
    /// Accepts an optional surrounding `[...]` wrapper and an optional
    /// `0x` prefix. Returns None on any other shape.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(s);
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if s.is_empty() {
            return None;
        }
        u64::from_str_radix(s, 16).ok().map(Self).filter(|id| id.is_valid())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId(0x{:x})", self.0)
    }
}

/// Common interface of the typed arena indices below; lets the property
/// tables stay generic over which index type addresses them.
pub trait ArenaIndex: Copy + Eq + std::hash::Hash {
    /// Sentinel for "not yet known".
    const INVALID: Self;

    /// Wrap a table position.
    fn new(index: usize) -> Self;

    /// The table position this index addresses.
    fn index(self) -> usize;

    /// Check this index has been assigned.
    #[inline]
    fn is_valid(self) -> bool
    where
        Self: Sized,
    {
        self != Self::INVALID
    }
}

macro_rules! arena_index {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
        pub struct $name(u32);

        impl ArenaIndex for $name {
            const INVALID: Self = Self(u32::MAX);

            #[inline]
            fn new(index: usize) -> Self {
                debug_assert!(index < u32::MAX as usize);
                Self(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_index!(
    /// Index into a schedule's task table.
    TaskIdx
);
arena_index!(
    /// Index into a schedule's appearance-profile table.
    ProfileIdx
);
arena_index!(
    /// Index into a schedule's transform-assignment table.
    TransformIdx
);
arena_index!(
    /// Index into a schedule's 3D-path table.
    PathIdx
);
arena_index!(
    /// Index into a schedule's elements-group table.
    GroupIdx
);
arena_index!(
    /// Index into a schedule's binding table.
    BindingIdx
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_hex() {
        assert_eq!(ElementId::parse("20"), Some(ElementId(0x20)));
        assert_eq!(ElementId::parse("0x20"), Some(ElementId(0x20)));
        assert_eq!(ElementId::parse("0X1aF"), Some(ElementId(0x1af)));
    }

    #[test]
    fn test_parse_bracketed() {
        assert_eq!(ElementId::parse("[0x20]"), Some(ElementId(0x20)));
        assert_eq!(ElementId::parse("[ff]"), Some(ElementId(0xff)));
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(ElementId::parse(""), None);
        assert_eq!(ElementId::parse("[]"), None);
        assert_eq!(ElementId::parse("not-hex"), None);
        assert_eq!(ElementId::parse("0x"), None);
        // The sentinel value itself is not a valid id.
        assert_eq!(ElementId::parse("ffffffffffffffff"), None);
    }

    #[test]
    fn test_index_sentinel() {
        assert!(!<TaskIdx as ArenaIndex>::INVALID.is_valid());
        let idx = TaskIdx::new(3);
        assert!(idx.is_valid());
        assert_eq!(idx.index(), 3);
    }
}

//! Two-phase deferred values.
//!
//! Some timeline data (anchor offsets, cutting-plane distances) depends on
//! element bounding boxes that are only known once geometry is loaded. A
//! [`Deferred`] value makes the pending-until-finalized state explicit and
//! the pending -> resolved transition one-way.

/// A value that may not be computable yet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Deferred<T> {
    /// Not yet computable; the finalizer will fill it in.
    Pending,
    /// Final value.
    Resolved(T),
}

impl<T> Deferred<T> {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The resolved value, if any.
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Self::Resolved(v) => Some(v),
            Self::Pending => None,
        }
    }

    /// Resolve a pending value. Returns false (and keeps the stored value)
    /// if already resolved; finalization is idempotent.
    pub fn resolve(&mut self, value: T) -> bool {
        match self {
            Self::Pending => {
                *self = Self::Resolved(value);
                true
            }
            Self::Resolved(_) => false,
        }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_way_resolution() {
        let mut d: Deferred<f64> = Deferred::Pending;
        assert!(d.is_pending());
        assert!(d.resolve(1.5));
        assert_eq!(d.resolved(), Some(&1.5));

        // A second resolution does not overwrite.
        assert!(!d.resolve(9.0));
        assert_eq!(d.resolved(), Some(&1.5));
    }
}

//! Scheduled tasks: activities with a planned time range.

use crate::util::TimePoint;

use super::Waiters;

/// A half-open time range `[start, end)` in absolute seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub start: TimePoint,
    pub end: TimePoint,
}

impl TimeRange {
    /// Empty range at time zero.
    pub const ZERO: Self = Self { start: 0.0, end: 0.0 };

    /// Create a range; `end` is exclusive.
    #[inline]
    pub const fn new(start: TimePoint, end: TimePoint) -> Self {
        Self { start, end }
    }

    /// Length of the range in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Check a time point falls inside the range.
    #[inline]
    pub fn contains(&self, t: TimePoint) -> bool {
        t >= self.start && t < self.end
    }

    /// Check the range has positive duration.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() && other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A scheduled activity fetched from the remote service.
///
/// Created as an empty shell when first referenced by a binding; the name
/// and planned range are filled in when the detail fetch completes.
#[derive(Clone, Debug)]
pub struct Task {
    /// Server-assigned id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Planned `[start, end)` range, absolute seconds.
    pub range: TimeRange,
    /// Whether the detail fetch has completed.
    pub resolved: bool,
    /// Bindings waiting for this task's details.
    pub(crate) waiters: Waiters,
}

impl Task {
    /// Create an unresolved shell for a freshly discovered id.
    pub fn shell(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            range: TimeRange::ZERO,
            resolved: false,
            waiters: Waiters::new(),
        }
    }

    /// Fill in fetched details.
    pub fn apply_details(&mut self, name: String, range: TimeRange) {
        self.name = name;
        self.range = range;
        self.resolved = true;
    }
}

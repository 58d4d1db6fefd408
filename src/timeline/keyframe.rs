//! Keyframe tracks and per-track value types.

use glam::DVec3;

use crate::core::{AnchorPoint, Rgb};
use crate::util::{RigidTransform, TimePoint};

use super::Deferred;

/// How a keyframe's value continues toward the next keyframe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interp {
    /// Hold this value until the next keyframe.
    Step,
    /// Interpolate linearly toward the next keyframe.
    Linear,
}

/// One keyframe: a timestamped value with an interpolation mode.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyframe<V> {
    pub time: TimePoint,
    pub interp: Interp,
    pub value: V,
}

/// An ordered-by-time keyframe track.
///
/// Multiple keyframes may share a time (a discontinuity at a task
/// boundary); insertion is stable, and floor lookup returns the last
/// keyframe at or before the queried time.
#[derive(Clone, Debug, Default)]
pub struct Track<V> {
    entries: Vec<Keyframe<V>>,
}

impl<V> Track<V> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Keyframe<V>] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Keyframe<V>] {
        &mut self.entries
    }

    /// Insert a keyframe, keeping the track ordered by time.
    ///
    /// Equal-time keyframes keep insertion order; the later insertion wins
    /// floor lookups at exactly that time.
    pub fn insert(&mut self, time: TimePoint, interp: Interp, value: V) {
        let pos = self
            .entries
            .partition_point(|k| k.time <= time);
        self.entries.insert(pos, Keyframe { time, interp, value });
    }

    /// Index of the last keyframe with `time <= t`.
    ///
    /// Times before the first keyframe clamp to index 0 (the first
    /// keyframe's value applies before it), matching sampled-animation
    /// floor semantics. None only for an empty track.
    pub fn floor_index(&self, t: TimePoint) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let after = self.entries.partition_point(|k| k.time <= t);
        Some(after.saturating_sub(1))
    }

    /// The keyframe governing time `t` (see [`Track::floor_index`]).
    pub fn floor(&self, t: TimePoint) -> Option<&Keyframe<V>> {
        self.floor_index(t).map(|i| &self.entries[i])
    }

    /// The keyframe pair `(floor, next)` around `t`, for interpolation.
    pub fn segment(&self, t: TimePoint) -> Option<(&Keyframe<V>, Option<&Keyframe<V>>)> {
        let i = self.floor_index(t)?;
        Some((&self.entries[i], self.entries.get(i + 1)))
    }

    /// First keyframe time.
    pub fn start_time(&self) -> Option<TimePoint> {
        self.entries.first().map(|k| k.time)
    }

    /// Last keyframe time.
    pub fn end_time(&self) -> Option<TimePoint> {
        self.entries.last().map(|k| k.time)
    }
}

/// Visibility track value: alpha in [0, 1]. 1.0 is the recognized
/// no-effect state.
pub type Alpha = f64;

/// Whether a visibility value changes nothing.
#[inline]
pub fn alpha_is_no_effect(alpha: Alpha) -> bool {
    alpha >= 1.0
}

/// Color track value; None is the no-effect state.
pub type ColorValue = Option<Rgb>;

/// Anchor of a transform keyframe: the reference point plus its
/// world-space offset, deferred until geometry is known for the
/// box-derived anchor points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorSpec {
    pub point: AnchorPoint,
    pub offset: Deferred<DVec3>,
}

impl AnchorSpec {
    /// An anchor resolved at binding-creation time.
    pub fn resolved(point: AnchorPoint, offset: DVec3) -> Self {
        Self {
            point,
            offset: Deferred::Resolved(offset),
        }
    }

    /// A box-derived anchor awaiting geometry.
    pub fn deferred(point: AnchorPoint) -> Self {
        Self {
            point,
            offset: Deferred::Pending,
        }
    }
}

/// Transform track payload when the keyframe has an effect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformEntry {
    pub transform: RigidTransform,
    pub anchor: AnchorSpec,
}

/// Transform track value; None is the no-effect state.
pub type TransformValue = Option<TransformEntry>;

/// Growth-simulation state of a cutting-plane keyframe.
///
/// `Deferred*` states mean the plane's distance term is not yet
/// computable because it depends on the animated elements' bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GrowthStatus {
    /// Time-varying intermediate growth; fraction grown in [0, 1].
    Partial(f64),
    FullyRemoved,
    DeferredFullyRemoved,
    FullyGrown,
    DeferredFullyGrown,
}

impl GrowthStatus {
    /// Whether the distance term still awaits geometry.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::DeferredFullyRemoved | Self::DeferredFullyGrown)
    }

    /// The non-deferred counterpart of a deferred state.
    pub fn finalized(&self) -> Self {
        match self {
            Self::DeferredFullyRemoved => Self::FullyRemoved,
            Self::DeferredFullyGrown => Self::FullyGrown,
            other => *other,
        }
    }
}

/// A cutting-plane keyframe: the growth-simulation plane state at one time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CuttingPlane {
    /// Plane normal; the grown side is the positive half-space.
    pub orientation: DVec3,
    /// Time of the coincident transform keyframe, when the plane rides a
    /// statically transformed element.
    pub transform_at: Option<TimePoint>,
    /// Plane distance term; meaningless while the growth status is
    /// deferred.
    pub distance: f64,
    pub growth: GrowthStatus,
}

impl CuttingPlane {
    /// Create a plane awaiting geometry-dependent finalization.
    pub fn deferred(orientation: DVec3, growth: GrowthStatus, transform_at: Option<TimePoint>) -> Self {
        Self {
            orientation,
            transform_at,
            distance: 0.0,
            growth,
        }
    }
}

/// Clipping track value; None is the no-effect state.
pub type ClippingValue = Option<CuttingPlane>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_ordered_insert() {
        let mut t: Track<f64> = Track::new();
        t.insert(2.0, Interp::Step, 0.2);
        t.insert(1.0, Interp::Step, 0.1);
        t.insert(3.0, Interp::Step, 0.3);
        let times: Vec<f64> = t.entries().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_track_floor_clamps_before_start() {
        let mut t: Track<f64> = Track::new();
        t.insert(10.0, Interp::Step, 1.0);
        t.insert(20.0, Interp::Step, 2.0);

        assert_eq!(t.floor(5.0).unwrap().value, 1.0);
        assert_eq!(t.floor(10.0).unwrap().value, 1.0);
        assert_eq!(t.floor(15.0).unwrap().value, 1.0);
        assert_eq!(t.floor(20.0).unwrap().value, 2.0);
        assert_eq!(t.floor(99.0).unwrap().value, 2.0);
    }

    #[test]
    fn test_track_equal_time_last_wins() {
        let mut t: Track<i32> = Track::new();
        t.insert(10.0, Interp::Step, 1);
        t.insert(10.0, Interp::Step, 2);
        // Floor at the shared time sees the later insertion.
        assert_eq!(t.floor(10.0).unwrap().value, 2);
        // Clamp-before sees the earlier one.
        assert_eq!(t.floor(0.0).unwrap().value, 1);
    }

    #[test]
    fn test_growth_finalized() {
        assert_eq!(
            GrowthStatus::DeferredFullyGrown.finalized(),
            GrowthStatus::FullyGrown
        );
        assert_eq!(
            GrowthStatus::DeferredFullyRemoved.finalized(),
            GrowthStatus::FullyRemoved
        );
        assert_eq!(GrowthStatus::Partial(0.5).finalized(), GrowthStatus::Partial(0.5));
        assert!(GrowthStatus::DeferredFullyGrown.is_deferred());
        assert!(!GrowthStatus::FullyGrown.is_deferred());
    }
}

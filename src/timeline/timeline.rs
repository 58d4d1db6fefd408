//! Per-element/per-group timelines: the final keyframe store the renderer
//! samples every frame.

use std::collections::HashMap;

use crate::core::{Rgb, TimeRange};
use crate::util::{BBox3d, ElementId, RigidTransform, TimePoint};

use super::finalize::{finalize_anchor_pos, finalize_cutting_plane};
use super::keyframe::{
    Alpha, ClippingValue, ColorValue, CuttingPlane, Interp, Track, TransformValue,
};

/// What a timeline animates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimelineKey {
    Element(ElementId),
    /// Keyed by the server's group id.
    Group(String),
}

/// The four keyframe tracks of one animated entity.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    pub visibility: Track<Alpha>,
    pub color: Track<ColorValue>,
    pub transform: Track<TransformValue>,
    pub clipping: Track<ClippingValue>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.visibility.is_empty()
            && self.color.is_empty()
            && self.transform.is_empty()
            && self.clipping.is_empty()
    }

    /// Covered time range across all tracks, None for an empty timeline.
    pub fn extent(&self) -> Option<TimeRange> {
        let mut start = f64::INFINITY;
        let mut end = f64::NEG_INFINITY;
        for (s, e) in [
            (self.visibility.start_time(), self.visibility.end_time()),
            (self.color.start_time(), self.color.end_time()),
            (self.transform.start_time(), self.transform.end_time()),
            (self.clipping.start_time(), self.clipping.end_time()),
        ] {
            if let (Some(s), Some(e)) = (s, e) {
                start = start.min(s);
                end = end.max(e);
            }
        }
        if start.is_finite() {
            Some(TimeRange::new(start, end))
        } else {
            None
        }
    }

    /// Visibility alpha at a time; 1.0 (no effect) when the track is empty.
    pub fn alpha_at(&self, t: TimePoint) -> Alpha {
        let Some((a, next)) = self.visibility.segment(t) else {
            return 1.0;
        };
        match (a.interp, next) {
            (Interp::Linear, Some(b)) if b.time > a.time && t > a.time => {
                let f = ((t - a.time) / (b.time - a.time)).clamp(0.0, 1.0);
                a.value + (b.value - a.value) * f
            }
            _ => a.value,
        }
    }

    /// Color override at a time; None = no effect.
    pub fn color_at(&self, t: TimePoint) -> Option<Rgb> {
        self.color.floor(t).and_then(|k| k.value)
    }

    /// Rigid transform at a time; None = no effect.
    ///
    /// Linear segments interpolate position and rotation between the
    /// surrounding keyframes.
    pub fn transform_at(&self, t: TimePoint) -> Option<RigidTransform> {
        let (a, next) = self.transform.segment(t)?;
        let entry = a.value?;
        if let (Interp::Linear, Some(b)) = (a.interp, next) {
            if let Some(bv) = b.value {
                if b.time > a.time && t > a.time {
                    let f = ((t - a.time) / (b.time - a.time)).clamp(0.0, 1.0);
                    return Some(RigidTransform::new(
                        entry.transform.position.lerp(bv.transform.position, f),
                        entry.transform.rotation.slerp(bv.transform.rotation, f),
                    ));
                }
            }
        }
        Some(entry.transform)
    }

    /// Cutting plane at a time; None = no effect.
    pub fn cutting_plane_at(&self, t: TimePoint) -> Option<CuttingPlane> {
        let (a, next) = self.clipping.segment(t)?;
        let plane = a.value?;
        if let (Interp::Linear, Some(b)) = (a.interp, next) {
            if let Some(bp) = b.value {
                if b.time > a.time && t > a.time && !plane.growth.is_deferred() && !bp.growth.is_deferred() {
                    let f = ((t - a.time) / (b.time - a.time)).clamp(0.0, 1.0);
                    let mut out = plane;
                    out.distance = plane.distance + (bp.distance - plane.distance) * f;
                    return Some(out);
                }
            }
        }
        Some(plane)
    }

    /// Resolve every geometry-dependent value on this timeline against the
    /// animated elements' bounding box.
    ///
    /// Runs once geometry is available, outside the per-frame hot path.
    /// Idempotent: already-finalized values are left untouched.
    pub fn finalize_geometry(&mut self, bbox: &BBox3d) {
        for kf in self.transform.entries_mut() {
            if let Some(entry) = kf.value.as_mut() {
                finalize_anchor_pos(&mut entry.anchor, bbox);
            }
        }
        // Planes may ride a statically transformed element; look that
        // transform up from the coincident transform keyframe.
        let rigids: Vec<Option<RigidTransform>> = self
            .clipping
            .entries()
            .iter()
            .map(|kf| {
                kf.value
                    .as_ref()
                    .and_then(|p| p.transform_at)
                    .and_then(|at| self.transform.floor(at).and_then(|t| t.value))
                    .map(|e| e.transform)
            })
            .collect();
        for (kf, rigid) in self.clipping.entries_mut().iter_mut().zip(rigids) {
            if let Some(plane) = kf.value.as_mut() {
                finalize_cutting_plane(plane, rigid.as_ref(), bbox);
            }
        }
    }
}

/// All timelines of an import session, keyed by element or group.
#[derive(Debug, Default)]
pub struct TimelineSet {
    timelines: HashMap<TimelineKey, Timeline>,
}

impl TimelineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }

    pub fn get(&self, key: &TimelineKey) -> Option<&Timeline> {
        self.timelines.get(key)
    }

    pub fn get_or_create(&mut self, key: TimelineKey) -> &mut Timeline {
        self.timelines.entry(key).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TimelineKey, &Timeline)> {
        self.timelines.iter()
    }

    /// Existing timeline extent for one element, if any.
    pub fn element_extent(&self, element: ElementId) -> Option<TimeRange> {
        self.get(&TimelineKey::Element(element))
            .and_then(|t| t.extent())
    }

    /// Finalize one entity's timeline against its bounding box.
    pub fn finalize_geometry(&mut self, key: &TimelineKey, bbox: &BBox3d) {
        if let Some(timeline) = self.timelines.get_mut(key) {
            timeline.finalize_geometry(bbox);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_across_tracks() {
        let mut tl = Timeline::new();
        assert!(tl.extent().is_none());

        tl.visibility.insert(10.0, Interp::Step, 0.0);
        tl.color.insert(5.0, Interp::Step, Some(Rgb::new(1, 2, 3)));
        tl.color.insert(30.0, Interp::Step, None);

        let extent = tl.extent().unwrap();
        assert_eq!(extent.start, 5.0);
        assert_eq!(extent.end, 30.0);
    }

    #[test]
    fn test_alpha_linear_interpolation() {
        let mut tl = Timeline::new();
        tl.visibility.insert(0.0, Interp::Linear, 0.0);
        tl.visibility.insert(10.0, Interp::Step, 1.0);

        assert_eq!(tl.alpha_at(-5.0), 0.0);
        assert!((tl.alpha_at(5.0) - 0.5).abs() < 1e-12);
        assert_eq!(tl.alpha_at(10.0), 1.0);
        assert_eq!(tl.alpha_at(50.0), 1.0);
    }

    #[test]
    fn test_empty_timeline_no_effect() {
        let tl = Timeline::new();
        assert_eq!(tl.alpha_at(0.0), 1.0);
        assert!(tl.color_at(0.0).is_none());
        assert!(tl.transform_at(0.0).is_none());
        assert!(tl.cutting_plane_at(0.0).is_none());
    }

    #[test]
    fn test_set_element_extent() {
        let mut set = TimelineSet::new();
        let key = TimelineKey::Element(ElementId(0x20));
        set.get_or_create(key.clone())
            .visibility
            .insert(3.0, Interp::Step, 0.5);
        set.get_or_create(key)
            .visibility
            .insert(9.0, Interp::Step, 1.0);

        let extent = set.element_extent(ElementId(0x20)).unwrap();
        assert_eq!(extent.start, 3.0);
        assert_eq!(extent.end, 9.0);
        assert!(set.element_extent(ElementId(0x99)).is_none());
    }
}

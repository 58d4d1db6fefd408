//! Geometry-dependent finalization of deferred timeline values.
//!
//! Anchor offsets and cutting-plane distance terms depend on the bounding
//! box of the animated elements, which is only known once their geometry
//! has loaded. These routines run at that point, outside the per-frame
//! evaluation path, and are idempotent.

use glam::DVec3;

use crate::core::AnchorPoint;
use crate::util::{BBox3d, RigidTransform};

use super::keyframe::{AnchorSpec, CuttingPlane, GrowthStatus};

/// Fraction the box is expanded by before a static transform is applied
/// to it; covers interpolation slop at the plane sweep boundaries.
const PLANE_BOX_MARGIN: f64 = 0.01;

/// Resolve a deferred anchor offset against the elements' bounding box.
///
/// Original/Static/Custom anchors were resolved at binding-creation time
/// and return immediately. Center anchors sit at the box center (zero
/// offset); Min*/Max* anchors are offset by the signed half extent along
/// their axis.
pub fn finalize_anchor_pos(anchor: &mut AnchorSpec, bbox: &BBox3d) {
    if anchor.offset.is_resolved() {
        return;
    }
    let half = bbox.size() * 0.5;
    let offset = match anchor.point {
        AnchorPoint::Center => DVec3::ZERO,
        AnchorPoint::MinX => DVec3::new(-half.x, 0.0, 0.0),
        AnchorPoint::MaxX => DVec3::new(half.x, 0.0, 0.0),
        AnchorPoint::MinY => DVec3::new(0.0, -half.y, 0.0),
        AnchorPoint::MaxY => DVec3::new(0.0, half.y, 0.0),
        AnchorPoint::MinZ => DVec3::new(0.0, 0.0, -half.z),
        AnchorPoint::MaxZ => DVec3::new(0.0, 0.0, half.z),
        // Resolved at creation; only reached if a pending anchor was
        // built for them, in which case the offset is zero.
        AnchorPoint::Original | AnchorPoint::Static | AnchorPoint::Custom => DVec3::ZERO,
    };
    anchor.offset.resolve(offset);
}

/// The box corner the plane rests on when the element is fully grown or
/// fully removed, chosen per axis by the sign of the orientation
/// component.
fn growth_corner(bbox: &BBox3d, orientation: DVec3, grown: bool) -> DVec3 {
    let pick = |min: f64, max: f64, component: f64| -> f64 {
        if component > 0.0 {
            if grown {
                max
            } else {
                min
            }
        } else if component < 0.0 {
            if grown {
                min
            } else {
                max
            }
        } else {
            // Orthogonal axis: contributes nothing to the distance term.
            min
        }
    };
    DVec3::new(
        pick(bbox.min.x, bbox.max.x, orientation.x),
        pick(bbox.min.y, bbox.max.y, orientation.y),
        pick(bbox.min.z, bbox.max.z, orientation.z),
    )
}

/// Resolve a deferred cutting-plane equation against the elements'
/// bounding box.
///
/// When the binding carries a static transform, the box is expanded by 1%
/// and transformed by it first (the box is transformed, not the exact
/// swept geometry). The distance term is the dot product of the chosen
/// corner with the orientation; deferred growth states flip to their
/// non-deferred counterparts. Calling this again on an already finalized
/// plane does not change the stored value.
pub fn finalize_cutting_plane(
    plane: &mut CuttingPlane,
    static_transform: Option<&RigidTransform>,
    bbox: &BBox3d,
) {
    let bbox = match static_transform {
        Some(t) => bbox.expanded(PLANE_BOX_MARGIN).transformed_by(t),
        None => *bbox,
    };
    match plane.growth {
        GrowthStatus::DeferredFullyGrown => {
            let corner = growth_corner(&bbox, plane.orientation, true);
            plane.distance = corner.dot(plane.orientation);
            plane.growth = GrowthStatus::FullyGrown;
        }
        GrowthStatus::DeferredFullyRemoved => {
            let corner = growth_corner(&bbox, plane.orientation, false);
            plane.distance = corner.dot(plane.orientation);
            plane.growth = GrowthStatus::FullyRemoved;
        }
        GrowthStatus::Partial(fraction) => {
            let removed = growth_corner(&bbox, plane.orientation, false).dot(plane.orientation);
            let grown = growth_corner(&bbox, plane.orientation, true).dot(plane.orientation);
            plane.distance = removed + (grown - removed) * fraction.clamp(0.0, 1.0);
        }
        // Already finalized; keep the stored value.
        GrowthStatus::FullyGrown | GrowthStatus::FullyRemoved => {}
    }
}

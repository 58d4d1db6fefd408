//! Timeline builder: turns a fully resolved animation binding into
//! keyframes on the bound entity's timeline.
//!
//! Runs inside the binding-added notification path. Performs the unit
//! conversions (transparency percentages to alpha, relative path time to
//! absolute time) and records the metadata the geometry-dependent
//! finalizer needs later.

use glam::DVec3;

use crate::core::{
    AnchorPoint, AnimatedEntity, Appearance, AppearanceProfile, PathAssignment, ProfileAction,
    Schedule, TimeRange, TransformKind,
};
use crate::util::{BindingIdx, RigidTransform, TimePoint};

use super::keyframe::{
    AnchorSpec, CuttingPlane, GrowthStatus, Interp, TransformEntry,
};
use super::timeline::{Timeline, TimelineKey, TimelineSet};

/// Write a resolved binding's keyframes into the timeline set.
///
/// The binding must be fully defined; callers reach this from the
/// resolver's at-most-once notification, so each binding contributes its
/// keyframes exactly once.
pub fn add_binding_keyframes(timelines: &mut TimelineSet, schedule: &Schedule, idx: BindingIdx) {
    use crate::util::ArenaIndex;

    let binding = schedule.binding(idx);
    if !binding.task.is_valid() || !binding.profile.is_valid() {
        return;
    }
    let task = schedule.tasks.get(binding.task);
    let profile = schedule.profiles.get(binding.profile);
    let range = task.range;

    let key = match &binding.key.entity {
        AnimatedEntity::Element(e) => TimelineKey::Element(*e),
        AnimatedEntity::Group(g) => TimelineKey::Group(schedule.groups.get(*g).id.clone()),
    };

    let transform = binding
        .transform
        .is_valid()
        .then(|| schedule.transforms.get(binding.transform))
        .and_then(|t| t.kind.as_ref());

    let timeline = timelines.get_or_create(key);
    write_appearance_keyframes(timeline, profile, range);

    let mut static_transform_at: Option<TimePoint> = None;
    match transform {
        Some(TransformKind::Static(t)) => {
            write_static_transform_keyframes(timeline, t, range);
            static_transform_at = Some(range.start);
        }
        Some(TransformKind::Path(pa)) => {
            write_path_keyframes(timeline, schedule, pa, range);
        }
        None => {}
    }

    write_growth_keyframes(timeline, profile, range, static_transform_at);
}

/// Effective before/during/after appearance states of a profile, with the
/// action's visibility semantics folded in.
fn action_states(profile: &AppearanceProfile) -> (Appearance, Appearance, Appearance) {
    let hidden = Appearance {
        visible: Some(false),
        ..Default::default()
    };
    let unchanged = Appearance::default();
    let (before, after) = match profile.action {
        ProfileAction::Install => (
            profile.start.overlaid_on(&hidden),
            profile.finish.overlaid_on(&unchanged),
        ),
        ProfileAction::Remove => (
            profile.start.overlaid_on(&unchanged),
            profile.finish.overlaid_on(&hidden),
        ),
        ProfileAction::Temporary => (
            profile.start.overlaid_on(&hidden),
            profile.finish.overlaid_on(&hidden),
        ),
        ProfileAction::Maintenance => (
            profile.start.overlaid_on(&unchanged),
            profile.finish.overlaid_on(&unchanged),
        ),
        // Neutral ignores the start/finish states: only the active
        // appearance is applied, then everything reverts.
        ProfileAction::Neutral => (unchanged, unchanged),
    };
    (before, profile.active, after)
}

fn write_appearance_keyframes(timeline: &mut Timeline, profile: &AppearanceProfile, range: TimeRange) {
    let (before, active, after) = action_states(profile);
    let (s, e) = (range.start, range.end);

    // Visibility. The keyframe at the task start doubles as the
    // clamp-before carrier: its value applies to all earlier times.
    let before_alpha = before.alpha();
    let active_alpha = active.alpha();
    let after_alpha = after.alpha();
    if before_alpha < 1.0 || active_alpha < 1.0 || after_alpha < 1.0 {
        timeline.visibility.insert(s, Interp::Step, before_alpha);
        timeline.visibility.insert(s, Interp::Step, active_alpha);
        timeline.visibility.insert(e, Interp::Step, after_alpha);
    }

    // Color. Absent values are recognized no-effect entries.
    if before.color.is_some() || active.color.is_some() || after.color.is_some() {
        timeline.color.insert(s, Interp::Step, before.color);
        timeline.color.insert(s, Interp::Step, active.color);
        timeline.color.insert(e, Interp::Step, after.color);
    }
}

fn write_static_transform_keyframes(
    timeline: &mut Timeline,
    transform: &RigidTransform,
    range: TimeRange,
) {
    let entry = TransformEntry {
        transform: *transform,
        anchor: AnchorSpec::resolved(AnchorPoint::Static, DVec3::ZERO),
    };
    // No effect before and after the task; the element is repositioned
    // only while the task runs.
    timeline.transform.insert(range.start, Interp::Step, None);
    timeline.transform.insert(range.start, Interp::Step, Some(entry));
    timeline.transform.insert(range.end, Interp::Step, None);
}

fn path_anchor_spec(pa: &PathAssignment) -> AnchorSpec {
    match pa.anchor {
        AnchorPoint::Custom => {
            AnchorSpec::resolved(AnchorPoint::Custom, pa.center.unwrap_or(DVec3::ZERO))
        }
        point if point.needs_geometry() => AnchorSpec::deferred(point),
        point => AnchorSpec::resolved(point, DVec3::ZERO),
    }
}

fn write_path_keyframes(
    timeline: &mut Timeline,
    schedule: &Schedule,
    pa: &PathAssignment,
    range: TimeRange,
) {
    use crate::util::ArenaIndex;

    if !pa.path.is_valid() {
        return;
    }
    let path = schedule.paths.get(pa.path);
    if path.keyframes.is_empty() {
        return;
    }
    let anchor = path_anchor_spec(pa);
    let duration = range.duration();

    timeline.transform.insert(range.start, Interp::Step, None);
    for kf in &path.keyframes {
        // Path control points are in relative [0, 1] time; a reversed
        // assignment traverses the path end to start.
        let rel = if pa.reverse {
            1.0 - kf.rel_time
        } else {
            kf.rel_time
        };
        let at = range.start + rel.clamp(0.0, 1.0) * duration;
        timeline.transform.insert(
            at,
            Interp::Linear,
            Some(TransformEntry {
                transform: kf.transform,
                anchor,
            }),
        );
    }
    timeline.transform.insert(range.end, Interp::Step, None);
}

fn write_growth_keyframes(
    timeline: &mut Timeline,
    profile: &AppearanceProfile,
    range: TimeRange,
    static_transform_at: Option<TimePoint>,
) {
    let Some(growth) = &profile.growth else {
        return;
    };
    let orientation = growth.orientation();
    if orientation == DVec3::ZERO {
        return;
    }

    // Initial states are always deferred: the distance term needs the
    // elements' bounding box. Remove sweeps from grown to removed; every
    // other action reveals the element over the task.
    let (start_status, end_status) = match profile.action {
        ProfileAction::Remove => (
            GrowthStatus::DeferredFullyGrown,
            GrowthStatus::DeferredFullyRemoved,
        ),
        _ => (
            GrowthStatus::DeferredFullyRemoved,
            GrowthStatus::DeferredFullyGrown,
        ),
    };

    let plane = |growth_status| {
        Some(CuttingPlane::deferred(
            orientation,
            growth_status,
            static_transform_at,
        ))
    };

    timeline
        .clipping
        .insert(range.start, Interp::Linear, plane(start_status));
    if growth.percent_complete && range.duration() > 0.0 {
        // Percent-coupled growth carries an explicit intermediate state.
        let mid = range.start + range.duration() * 0.5;
        timeline
            .clipping
            .insert(mid, Interp::Linear, plane(GrowthStatus::Partial(0.5)));
    }
    timeline
        .clipping
        .insert(range.end, Interp::Step, plane(end_status));
}

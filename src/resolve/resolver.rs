//! Dependency resolver: turns raw server items into binding-table and
//! property-store entries, decides which referenced properties still need
//! fetching, and determines when a binding becomes fully defined.
//!
//! The emplace/complete pair below is the whole protocol: `emplace`
//! registers a binding's interest in a property (issuing at most one fetch
//! per property id), and `completed_property` is the single notification
//! chokepoint every resolution path funnels through - task details,
//! profile details, static transforms, and, recursively, 3D paths whose
//! completion re-triggers the owning transform assignment's waiters.

use tracing::warn;

use crate::core::{
    AnchorPoint, AnimatedEntity, Animation3DPath, AppearanceProfile, BindingKey, ElementsGroup,
    NotifyState, PathAssignment, PendingWaiters, PropertyTable, Schedule, Task,
    TransformAssignment, TransformKind, Waiters,
};
use crate::util::{ArenaIndex, BindingIdx, ElementId, Error, GroupIdx, Result};

use super::protocol::{
    parse_transform3d, BindingItem, Page, PathAssignmentDoc, ProfileItem, TaskItem,
};
use super::queue::Document;

/// Which route resolves a transform-assignment id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformRoute {
    /// `animation3dTransforms/{id}`: a static rigid transform.
    Static,
    /// `animation3dPathAssignments/{id}`: a path assignment.
    PathAssignment,
}

/// A follow-up fetch for a newly discovered transform assignment.
#[derive(Clone, Debug)]
pub struct TransformFetch {
    pub id: String,
    pub route: TransformRoute,
}

/// Everything one bindings page asks the session to do next.
#[derive(Debug, Default)]
pub struct PageOutcome {
    /// Distinct task ids needing a detail fetch.
    pub fetch_tasks: Vec<String>,
    /// Distinct profile ids needing a detail fetch.
    pub fetch_profiles: Vec<String>,
    /// Distinct transform-assignment ids needing a detail fetch.
    pub fetch_transforms: Vec<TransformFetch>,
    /// Token of the next page, fetched before the page's unit completes.
    pub next_page_token: Option<String>,
    /// Bindings that became fully defined while processing this page.
    pub newly_defined: Vec<BindingIdx>,
    /// Groups that gained members on this page.
    pub groups_modified: Vec<GroupIdx>,
    pub parsed: usize,
    pub skipped: usize,
}

/// Register `binding` as interested in the property with `property_id`.
///
/// - Empty id: the binding has no such dependency; nothing to do.
/// - Unseen id: create the table entry, record the binding as its sole
///   waiter and ask the caller (via `pending_fetch`) to issue a fetch.
/// - Seen, fetch outstanding: append the binding to the waiter list.
/// - Seen, already resolved: nothing pending.
///
/// Returns the property index (INVALID for an empty id) and whether the
/// binding now waits on it.
pub(crate) fn emplace_property<T, I>(
    binding: BindingIdx,
    property_id: &str,
    table: &mut PropertyTable<T, I>,
    make: impl FnOnce(&str) -> T,
    pending_fetch: &mut Vec<String>,
) -> (I, bool)
where
    T: PendingWaiters,
    I: ArenaIndex,
{
    if property_id.is_empty() {
        return (I::INVALID, false);
    }
    let (idx, created) = table.get_or_insert_with(property_id, make);
    let entry = table.get_mut(idx);
    if created {
        entry.waiters_mut().push(binding);
        pending_fetch.push(property_id.to_string());
        (idx, true)
    } else if entry.is_pending() {
        entry.waiters_mut().push(binding);
        (idx, true)
    } else {
        (idx, false)
    }
}

/// Re-check a resolved property's waiters and collect the bindings that
/// just became fully defined.
///
/// Callers swap the waiter list out first; a binding is marked notified
/// here, at most once, whichever of its dependencies completes last.
pub(crate) fn completed_property(schedule: &mut Schedule, waiters: Waiters) -> Vec<BindingIdx> {
    let mut newly_defined = Vec::new();
    for binding in waiters {
        if schedule.binding(binding).notified == NotifyState::None
            && schedule.binding_fully_defined(binding)
        {
            schedule.binding_mut(binding).notified = NotifyState::Initial;
            newly_defined.push(binding);
        }
    }
    newly_defined
}

/// Process one page of a bindings query.
///
/// Items with an unparseable animated-entity id or without a task or
/// profile id are skipped individually; they never abort the page.
pub(crate) fn process_bindings_page(schedule: &mut Schedule, doc: Document) -> Result<PageOutcome> {
    let page: Page<BindingItem> = Page::from_document(doc)?;
    let mut out = PageOutcome {
        next_page_token: page.next_page_token,
        ..Default::default()
    };
    for item in &page.items {
        match add_binding_item(schedule, item, &mut out) {
            Ok(()) => out.parsed += 1,
            Err(err) => {
                warn!(schedule = %schedule.id, %err, "skipping binding item");
                out.skipped += 1;
            }
        }
    }
    Ok(out)
}

fn add_binding_item(
    schedule: &mut Schedule,
    item: &BindingItem,
    out: &mut PageOutcome,
) -> Result<()> {
    let entity_id = item.animated_entity_id.as_deref().ok_or(Error::MissingField {
        field: "animatedEntityId",
        context: "binding item",
    })?;
    let element = ElementId::parse(entity_id)
        .ok_or_else(|| Error::InvalidElementId(entity_id.to_string()))?;
    let task_id = item.task_id.clone().ok_or(Error::MissingField {
        field: "taskId",
        context: "binding item",
    })?;
    let profile_id = item.appearance_profile_id.clone().ok_or(Error::MissingField {
        field: "appearanceProfileId",
        context: "binding item",
    })?;

    // The two transform routes share one assignment table; an item names
    // at most one of them.
    let (transform_id, transform_route) = match (&item.transform_id, &item.path_assignment_id) {
        (Some(id), _) if !id.is_empty() => (id.clone(), TransformRoute::Static),
        (_, Some(id)) if !id.is_empty() => (id.clone(), TransformRoute::PathAssignment),
        _ => (String::new(), TransformRoute::Static),
    };

    let entity = match item.resource_group_id.as_deref().filter(|g| !g.is_empty()) {
        Some(group_id) => {
            let (gidx, _) = schedule
                .groups
                .get_or_insert_with(group_id, |id| ElementsGroup::new(id));
            if schedule.groups.get_mut(gidx).insert(element) {
                out.groups_modified.push(gidx);
            }
            AnimatedEntity::Group(gidx)
        }
        None => AnimatedEntity::Element(element),
    };

    let key = BindingKey {
        task_id: task_id.clone(),
        entity,
        profile_id: profile_id.clone(),
        transform_id: transform_id.clone(),
    };
    let (bidx, created) = schedule.get_or_insert_binding(key);
    if !created {
        // Same tuple on a later page; the existing binding already waits
        // on (or has received) everything it needs.
        return Ok(());
    }

    let (task_idx, _) = emplace_property(
        bidx,
        &task_id,
        &mut schedule.tasks,
        |id| Task::shell(id),
        &mut out.fetch_tasks,
    );
    let (profile_idx, _) = emplace_property(
        bidx,
        &profile_id,
        &mut schedule.profiles,
        |id| AppearanceProfile::shell(id),
        &mut out.fetch_profiles,
    );
    let mut transform_fetches = Vec::new();
    let (transform_idx, transform_pending) = emplace_property(
        bidx,
        &transform_id,
        &mut schedule.transforms,
        |id| TransformAssignment::shell(id),
        &mut transform_fetches,
    );
    for id in transform_fetches {
        out.fetch_transforms.push(TransformFetch {
            id,
            route: transform_route,
        });
    }

    // A transform that already resolved to a path whose keyframes are
    // still being fetched: the binding must wait on the path directly.
    if transform_idx.is_valid() && !transform_pending {
        if let Some(pa) = schedule.transforms.get(transform_idx).path_assignment() {
            let path = pa.path;
            if path.is_valid() && schedule.paths.get(path).is_pending() {
                schedule.paths.get_mut(path).waiters_mut().push(bidx);
            }
        }
    }

    {
        let binding = schedule.binding_mut(bidx);
        binding.task = task_idx;
        binding.profile = profile_idx;
        binding.transform = transform_idx;
    }

    // Every dependency may already be resolved (or absent); nothing will
    // re-check this binding later, so check now.
    if schedule.binding(bidx).notified == NotifyState::None && schedule.binding_fully_defined(bidx)
    {
        schedule.binding_mut(bidx).notified = NotifyState::Initial;
        out.newly_defined.push(bidx);
    }
    Ok(())
}

/// Apply a task detail document and complete its waiters.
pub(crate) fn apply_task_details(
    schedule: &mut Schedule,
    task_id: &str,
    doc: Document,
) -> Result<Vec<BindingIdx>> {
    let item: TaskItem = serde_json::from_value(doc)?;
    let range = item.time_range()?;
    let idx = schedule
        .tasks
        .lookup(task_id)
        .ok_or_else(|| Error::PropertyNotFound(task_id.to_string()))?;
    let task = schedule.tasks.get_mut(idx);
    task.apply_details(item.name.unwrap_or_default(), range);
    let waiters = task.take_waiters();
    Ok(completed_property(schedule, waiters))
}

/// Apply an appearance-profile detail document and complete its waiters.
pub(crate) fn apply_profile_details(
    schedule: &mut Schedule,
    profile_id: &str,
    doc: Document,
) -> Result<Vec<BindingIdx>> {
    let item: ProfileItem = serde_json::from_value(doc)?;
    let action = item.parsed_action()?;
    let idx = schedule
        .profiles
        .lookup(profile_id)
        .ok_or_else(|| Error::PropertyNotFound(profile_id.to_string()))?;
    let profile = schedule.profiles.get_mut(idx);
    profile.action = action;
    if let Some(doc) = &item.start_appearance {
        profile.start = doc.to_appearance();
    }
    if let Some(doc) = &item.active_appearance {
        profile.active = doc.to_appearance();
        profile.growth = doc.growth();
    }
    if let Some(doc) = &item.end_appearance {
        profile.finish = doc.to_appearance();
    }
    profile.resolved = true;
    let waiters = profile.take_waiters();
    Ok(completed_property(schedule, waiters))
}

/// Apply a static 3D transform document and complete its waiters.
pub(crate) fn apply_static_transform(
    schedule: &mut Schedule,
    transform_id: &str,
    doc: Document,
) -> Result<Vec<BindingIdx>> {
    let rigid = parse_transform3d(&doc)?;
    let idx = schedule
        .transforms
        .lookup(transform_id)
        .ok_or_else(|| Error::PropertyNotFound(transform_id.to_string()))?;
    let tr = schedule.transforms.get_mut(idx);
    tr.kind = Some(TransformKind::Static(rigid));
    tr.resolved = true;
    let waiters = tr.take_waiters();
    Ok(completed_property(schedule, waiters))
}

/// Resolve a transform assignment whose server id turned out not to
/// exist: the bindings are still notified, without a transform.
pub(crate) fn apply_transform_unresolvable(
    schedule: &mut Schedule,
    transform_id: &str,
) -> Vec<BindingIdx> {
    let Some(idx) = schedule.transforms.lookup(transform_id) else {
        return Vec::new();
    };
    warn!(schedule = %schedule.id, transform_id, "transform assignment not found; binding continues without it");
    let tr = schedule.transforms.get_mut(idx);
    tr.kind = None;
    tr.resolved = true;
    let waiters = tr.take_waiters();
    completed_property(schedule, waiters)
}

/// Apply a path-assignment document.
///
/// Resolves the owning transform assignment and hands its waiters to the
/// referenced path; returns the path id to fetch when the path is new.
pub(crate) fn apply_path_assignment(
    schedule: &mut Schedule,
    transform_id: &str,
    doc: Document,
) -> Result<(Option<String>, Vec<BindingIdx>)> {
    let item: PathAssignmentDoc = serde_json::from_value(doc)?;
    if item.path_id.is_empty() {
        return Err(Error::MissingField {
            field: "pathId",
            context: "path assignment",
        });
    }
    let idx = schedule
        .transforms
        .lookup(transform_id)
        .ok_or_else(|| Error::PropertyNotFound(transform_id.to_string()))?;

    let anchor = item
        .alignment
        .as_deref()
        .and_then(AnchorPoint::parse)
        .unwrap_or(AnchorPoint::Original);
    let (path_idx, path_created) = schedule
        .paths
        .get_or_insert_with(&item.path_id, |id| Animation3DPath::shell(id));

    let tr = schedule.transforms.get_mut(idx);
    tr.kind = Some(TransformKind::Path(PathAssignment {
        path_id: item.path_id.clone(),
        path: path_idx,
        anchor,
        center: item.center.as_ref().map(|c| c.to_dvec3()),
        reverse: item.reverse_direction.unwrap_or(false),
    }));
    tr.resolved = true;
    let waiters = tr.take_waiters();

    if path_created || schedule.paths.get(path_idx).is_pending() {
        // The path's own fetch gates these bindings now; they move into
        // its waiter list and are re-checked when the keyframes land.
        let path = schedule.paths.get_mut(path_idx);
        for w in waiters {
            path.waiters_mut().push(w);
        }
        let fetch = path_created.then(|| item.path_id.clone());
        Ok((fetch, Vec::new()))
    } else {
        Ok((None, completed_property(schedule, waiters)))
    }
}

/// Apply one page of path keyframes.
///
/// Returns the next page token while pagination continues; on the last
/// page the keyframes are sorted and the path's waiters complete -
/// recursively completing the owning transform assignments' bindings.
pub(crate) fn apply_path_keyframes_page(
    schedule: &mut Schedule,
    path_id: &str,
    doc: Document,
) -> Result<(Option<String>, Vec<BindingIdx>)> {
    let page: Page<super::protocol::PathKeyframeDoc> = Page::from_document(doc)?;
    let idx = schedule
        .paths
        .lookup(path_id)
        .ok_or_else(|| Error::PropertyNotFound(path_id.to_string()))?;
    let path = schedule.paths.get_mut(idx);
    path.extend_keyframes(page.items.iter().map(|item| item.to_keyframe()));
    if let Some(token) = page.next_page_token {
        return Ok((Some(token), Vec::new()));
    }
    path.finish_keyframes();
    let waiters = path.take_waiters();
    Ok((None, completed_property(schedule, waiters)))
}

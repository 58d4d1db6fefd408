//! The per-schedule aggregate: property tables, binding table, hash indices.

use std::collections::{HashMap, HashSet};

use crate::util::{
    ArenaIndex, BindingIdx, ElementId, GroupIdx, PathIdx, ProfileIdx, TaskIdx, TransformIdx,
};

use super::{
    Animation3DPath, AnimationBinding, AppearanceProfile, BindingKey, ElementsGroup,
    PendingWaiters, Task, TransformAssignment,
};

/// Which historical variant of the remote service a schedule came from.
///
/// The two generations differ in the query parameter naming and in whether
/// animated entities are addressed through a per-element user field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Generation {
    Legacy,
    NextGen,
}

impl Generation {
    /// Query parameter carrying the iTwin id in the schedules listing.
    pub fn context_param(&self) -> &'static str {
        match self {
            Self::Legacy => "projectId",
            Self::NextGen => "contextId",
        }
    }

    /// Whether binding queries must pass the animated-entity user field.
    pub fn uses_user_field(&self) -> bool {
        matches!(self, Self::Legacy)
    }
}

/// Append-only arena of one property kind, with a hash index from the
/// server-assigned string id to the dense table index.
///
/// An entry is created at most once per id; indices stay valid for the
/// whole import session because the table only grows.
#[derive(Debug)]
pub struct PropertyTable<T, I> {
    entries: Vec<T>,
    index: HashMap<String, I>,
}

impl<T, I: ArenaIndex> PropertyTable<T, I> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the index assigned to a server id.
    pub fn lookup(&self, id: &str) -> Option<I> {
        self.index.get(id).copied()
    }

    /// Get an entry; the index must have been assigned by this table.
    pub fn get(&self, idx: I) -> &T {
        &self.entries[idx.index()]
    }

    pub fn get_mut(&mut self, idx: I) -> &mut T {
        &mut self.entries[idx.index()]
    }

    /// Look up or create the entry for a server id.
    ///
    /// Returns the index and whether the entry was newly created.
    pub fn get_or_insert_with(&mut self, id: &str, make: impl FnOnce(&str) -> T) -> (I, bool) {
        if let Some(idx) = self.index.get(id) {
            return (*idx, false);
        }
        let idx = I::new(self.entries.len());
        self.entries.push(make(id));
        self.index.insert(id.to_string(), idx);
        (idx, true)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T, I: ArenaIndex> Default for PropertyTable<T, I> {
    fn default() -> Self {
        Self::new()
    }
}

/// All synchronization state of one remote schedule.
#[derive(Debug)]
pub struct Schedule {
    /// Server-assigned schedule id.
    pub id: String,
    pub name: String,
    pub generation: Generation,
    /// Animated-entity user field id, present on Legacy schedules.
    pub user_field_id: Option<String>,

    pub tasks: PropertyTable<Task, TaskIdx>,
    pub profiles: PropertyTable<AppearanceProfile, ProfileIdx>,
    pub transforms: PropertyTable<TransformAssignment, TransformIdx>,
    pub paths: PropertyTable<Animation3DPath, PathIdx>,
    pub groups: PropertyTable<ElementsGroup, GroupIdx>,

    bindings: Vec<AnimationBinding>,
    binding_index: HashMap<BindingKey, BindingIdx>,

    /// Elements a binding query has been issued for. Avoids re-querying;
    /// does not gate completeness.
    queried_elements: HashSet<ElementId>,
}

impl Schedule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        generation: Generation,
        user_field_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            generation,
            user_field_id,
            tasks: PropertyTable::new(),
            profiles: PropertyTable::new(),
            transforms: PropertyTable::new(),
            paths: PropertyTable::new(),
            groups: PropertyTable::new(),
            bindings: Vec::new(),
            binding_index: HashMap::new(),
            queried_elements: HashSet::new(),
        }
    }

    pub fn binding(&self, idx: BindingIdx) -> &AnimationBinding {
        &self.bindings[idx.index()]
    }

    pub fn binding_mut(&mut self, idx: BindingIdx) -> &mut AnimationBinding {
        &mut self.bindings[idx.index()]
    }

    pub fn bindings(&self) -> &[AnimationBinding] {
        &self.bindings
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Look up or create the binding for a uniqueness key.
    ///
    /// Returns the index and whether the binding was newly created.
    pub fn get_or_insert_binding(&mut self, key: BindingKey) -> (BindingIdx, bool) {
        if let Some(idx) = self.binding_index.get(&key) {
            return (*idx, false);
        }
        let idx = BindingIdx::new(self.bindings.len());
        self.binding_index.insert(key.clone(), idx);
        self.bindings.push(AnimationBinding::new(key));
        (idx, true)
    }

    /// Record that a binding query has been issued for an element.
    ///
    /// Returns false if the element had already been queried.
    pub fn mark_element_queried(&mut self, element: ElementId) -> bool {
        self.queried_elements.insert(element)
    }

    pub fn element_was_queried(&self, element: ElementId) -> bool {
        self.queried_elements.contains(&element)
    }

    /// Forget which elements were queried. Part of a same-target
    /// connection reset: resolved tables are preserved, progress flags
    /// are not.
    pub fn clear_queried_elements(&mut self) {
        self.queried_elements.clear();
    }

    /// The "fully defined" predicate gating binding notification.
    ///
    /// A binding is fully defined when every dependency it actually
    /// declares (a non-empty id) has resolved: the task with no
    /// outstanding waiters, the appearance profile, and the transform
    /// assignment with the referenced path, if any, fully fetched. An
    /// empty id is "no such dependency" and never gates.
    pub fn binding_fully_defined(&self, idx: BindingIdx) -> bool {
        let b = &self.bindings[idx.index()];
        if !b.key.task_id.is_empty() {
            if !b.task.is_valid() {
                return false;
            }
            let task = self.tasks.get(b.task);
            if !task.resolved || task.is_pending() {
                return false;
            }
        }
        if !b.key.profile_id.is_empty() {
            if !b.profile.is_valid() || !self.profiles.get(b.profile).resolved {
                return false;
            }
        }
        if b.has_transform_id() {
            if !b.transform.is_valid() {
                return false;
            }
            let tr = self.transforms.get(b.transform);
            if !tr.resolved {
                return false;
            }
            if let Some(pa) = tr.path_assignment() {
                if !pa.path.is_valid() || self.paths.get(pa.path).is_pending() {
                    return false;
                }
            }
        }
        true
    }

    /// Number of bindings that have been notified to the consumer.
    pub fn notified_binding_count(&self) -> usize {
        self.bindings
            .iter()
            .filter(|b| b.notified != super::NotifyState::None)
            .count()
    }
}

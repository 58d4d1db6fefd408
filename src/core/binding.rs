//! Animation bindings: the assignment of one task + appearance profile +
//! optional transform assignment to one element or elements group.

use crate::util::{ArenaIndex, ElementId, GroupIdx, ProfileIdx, TaskIdx, TransformIdx};

/// What a binding animates: a single element or a group of elements.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnimatedEntity {
    Element(ElementId),
    Group(GroupIdx),
}

/// Uniqueness key of a binding.
///
/// A binding is created at most once per key; the same tuple appearing on
/// further result pages resolves to the existing entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub task_id: String,
    pub entity: AnimatedEntity,
    pub profile_id: String,
    /// Transform-assignment id; empty when the binding has none.
    pub transform_id: String,
}

/// Notification state of a binding; gates re-notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyState {
    /// Not yet delivered to the consumer.
    None,
    /// The initial fully-resolved version has been delivered.
    Initial,
}

/// One task/profile/transform assignment bound to an animated entity.
///
/// Holds indices into the schedule's property tables rather than copies;
/// the indices are assigned once at creation and never change.
#[derive(Clone, Debug)]
pub struct AnimationBinding {
    pub key: BindingKey,
    pub task: TaskIdx,
    pub profile: ProfileIdx,
    /// Invalid when the binding has no transform assignment, or when its
    /// id could not be resolved on the server.
    pub transform: TransformIdx,
    pub notified: NotifyState,
}

impl AnimationBinding {
    /// Create a binding shell; indices are filled by the resolver.
    pub fn new(key: BindingKey) -> Self {
        Self {
            key,
            task: TaskIdx::INVALID,
            profile: ProfileIdx::INVALID,
            transform: TransformIdx::INVALID,
            notified: NotifyState::None,
        }
    }

    /// Whether this binding was declared without a transform assignment.
    pub fn has_transform_id(&self) -> bool {
        !self.key.transform_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ArenaIndex;

    fn key(task: &str, element: u64, profile: &str, transform: &str) -> BindingKey {
        BindingKey {
            task_id: task.into(),
            entity: AnimatedEntity::Element(ElementId(element)),
            profile_id: profile.into(),
            transform_id: transform.into(),
        }
    }

    #[test]
    fn test_key_equality() {
        assert_eq!(key("T1", 0x20, "A1", ""), key("T1", 0x20, "A1", ""));
        assert_ne!(key("T1", 0x20, "A1", ""), key("T1", 0x21, "A1", ""));
        assert_ne!(key("T1", 0x20, "A1", ""), key("T1", 0x20, "A1", "X1"));
    }

    #[test]
    fn test_group_key_distinct_from_element() {
        let element = key("T1", 0x20, "A1", "");
        let group = BindingKey {
            entity: AnimatedEntity::Group(GroupIdx::new(0)),
            ..key("T1", 0x20, "A1", "")
        };
        assert_ne!(element, group);
    }

    #[test]
    fn test_new_binding_unresolved() {
        let b = AnimationBinding::new(key("T1", 0x20, "A1", ""));
        assert!(!b.task.is_valid());
        assert!(!b.profile.is_valid());
        assert!(!b.has_transform_id());
        assert_eq!(b.notified, NotifyState::None);
    }
}

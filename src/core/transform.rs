//! Transform assignments: a static rigid transform or a 3D path that moves
//! bound elements during a task.

use glam::DVec3;

use crate::util::{PathIdx, RigidTransform};

use super::Waiters;

/// The reference point a transform keyframe's offset is expressed against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorPoint {
    /// Keep the element's original position as the anchor.
    Original,
    /// Anchor resolved from a static transform at binding creation.
    Static,
    /// Center of the elements' bounding box.
    Center,
    MinX,
    MaxX,
    MinY,
    MaxY,
    MinZ,
    MaxZ,
    /// Explicit anchor point supplied by the path assignment.
    Custom,
}

impl AnchorPoint {
    /// Decode the service's alignment string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "original" => Some(Self::Original),
            "center" => Some(Self::Center),
            "minX" => Some(Self::MinX),
            "maxX" => Some(Self::MaxX),
            "minY" => Some(Self::MinY),
            "maxY" => Some(Self::MaxY),
            "minZ" => Some(Self::MinZ),
            "maxZ" => Some(Self::MaxZ),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Whether the anchor offset needs the elements' bounding box.
    pub fn needs_geometry(&self) -> bool {
        matches!(
            self,
            Self::Center
                | Self::MinX
                | Self::MaxX
                | Self::MinY
                | Self::MaxY
                | Self::MinZ
                | Self::MaxZ
        )
    }
}

/// A path assignment: which 3D path to follow and how.
#[derive(Clone, Debug)]
pub struct PathAssignment {
    /// Server id of the path.
    pub path_id: String,
    /// Index into the schedule's path table.
    pub path: PathIdx,
    /// Anchor the element follows the path with.
    pub anchor: AnchorPoint,
    /// Explicit anchor point for [`AnchorPoint::Custom`].
    pub center: Option<DVec3>,
    /// Traverse the path end-to-start.
    pub reverse: bool,
}

/// What a transform assignment resolved to.
#[derive(Clone, Debug)]
pub enum TransformKind {
    /// One rigid transform applied for the task's whole range.
    Static(RigidTransform),
    /// Elements follow a 3D path over the task's range.
    Path(PathAssignment),
}

/// A transform assignment referenced by bindings.
///
/// Discovered as a shell; `kind` is filled when the per-id fetch completes.
/// The server uses distinct routes for static transforms and path
/// assignments, so the id alone does not tell which kind this will be.
#[derive(Clone, Debug)]
pub struct TransformAssignment {
    /// Server-assigned id.
    pub id: String,
    /// Resolved payload, if the fetch has completed.
    pub kind: Option<TransformKind>,
    /// Whether the detail fetch has completed.
    pub resolved: bool,
    /// Bindings waiting for this assignment's details.
    pub(crate) waiters: Waiters,
}

impl TransformAssignment {
    /// Create an unresolved shell for a freshly discovered id.
    pub fn shell(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: None,
            resolved: false,
            waiters: Waiters::new(),
        }
    }

    /// The static transform, if this assignment resolved to one.
    pub fn static_transform(&self) -> Option<&RigidTransform> {
        match &self.kind {
            Some(TransformKind::Static(t)) => Some(t),
            _ => None,
        }
    }

    /// The path assignment, if this assignment resolved to one.
    pub fn path_assignment(&self) -> Option<&PathAssignment> {
        match &self.kind {
            Some(TransformKind::Path(p)) => Some(p),
            _ => None,
        }
    }
}

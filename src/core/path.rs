//! Animation 3D paths: ordered rigid-transform keyframes in relative time.

use crate::util::RigidTransform;

use super::Waiters;

/// One control point of a path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathKeyframe {
    /// Position along the path in [0, 1].
    pub rel_time: f64,
    pub transform: RigidTransform,
}

/// A 3D path elements can follow during a task.
///
/// Control points arrive across pages, possibly out of order; they are
/// sorted by relative time when the last page completes, before any waiting
/// binding is notified.
#[derive(Clone, Debug)]
pub struct Animation3DPath {
    /// Server-assigned id.
    pub id: String,
    pub keyframes: Vec<PathKeyframe>,
    /// Whether all keyframe pages have arrived and sorting has run.
    pub resolved: bool,
    /// Bindings waiting for this path's keyframes.
    pub(crate) waiters: Waiters,
}

impl Animation3DPath {
    /// Create an unresolved shell for a freshly discovered id.
    pub fn shell(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keyframes: Vec::new(),
            resolved: false,
            waiters: Waiters::new(),
        }
    }

    /// Append control points from one page.
    pub fn extend_keyframes(&mut self, page: impl IntoIterator<Item = PathKeyframe>) {
        self.keyframes.extend(page);
    }

    /// Sort control points ascending by relative time and mark resolved.
    ///
    /// Must run once all pages have arrived; consumers only read the
    /// keyframes after this.
    pub fn finish_keyframes(&mut self) {
        self.keyframes
            .sort_by(|a, b| a.rel_time.total_cmp(&b.rel_time));
        self.resolved = true;
    }

    /// Interpolated transform at the given relative time.
    ///
    /// Clamps outside the keyframe range. Returns None for an empty path.
    pub fn sample(&self, rel_time: f64) -> Option<RigidTransform> {
        let kfs = &self.keyframes;
        if kfs.is_empty() {
            return None;
        }
        if rel_time <= kfs[0].rel_time {
            return Some(kfs[0].transform);
        }
        let last = &kfs[kfs.len() - 1];
        if rel_time >= last.rel_time {
            return Some(last.transform);
        }
        // Binary search for the floor keyframe.
        let mut lo = 0;
        let mut hi = kfs.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if kfs[mid].rel_time <= rel_time {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let a = &kfs[lo - 1];
        let b = &kfs[lo];
        let span = b.rel_time - a.rel_time;
        let f = if span > 0.0 { (rel_time - a.rel_time) / span } else { 0.0 };
        Some(RigidTransform::new(
            a.transform.position.lerp(b.transform.position, f),
            a.transform.rotation.slerp(b.transform.rotation, f),
        ))
    }
}

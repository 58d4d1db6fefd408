//! Math type re-exports and schedule-animation math utilities.
//!
//! This module re-exports types from `glam` and provides the additional
//! types the timeline layer needs (bounding boxes, rigid transforms).

// Re-export glam types
pub use glam::{
    // Single precision
    Vec2, Vec3, Vec4,
    // Double precision
    DVec2, DVec3, DVec4,
    // Matrices
    Mat3, Mat4, DMat3, DMat4,
    // Quaternions
    Quat, DQuat,
};

use std::fmt;

/// Time value: absolute seconds since the Unix epoch.
pub type TimePoint = f64;

/// 3D bounding box with double precision.
#[derive(Clone, Copy, PartialEq)]
pub struct BBox3d {
    pub min: DVec3,
    pub max: DVec3,
}

impl BBox3d {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create a bounding box from a single point.
    #[inline]
    pub fn from_point(p: DVec3) -> Self {
        Self { min: p, max: p }
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Return a copy grown by `fraction` of its size on every side.
    pub fn expanded(&self, fraction: f64) -> Self {
        if self.is_empty() {
            return *self;
        }
        let margin = self.size() * fraction;
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    /// All eight corners of the box.
    pub fn corners(&self) -> [DVec3; 8] {
        let (mn, mx) = (self.min, self.max);
        [
            DVec3::new(mn.x, mn.y, mn.z),
            DVec3::new(mx.x, mn.y, mn.z),
            DVec3::new(mn.x, mx.y, mn.z),
            DVec3::new(mx.x, mx.y, mn.z),
            DVec3::new(mn.x, mn.y, mx.z),
            DVec3::new(mx.x, mn.y, mx.z),
            DVec3::new(mn.x, mx.y, mx.z),
            DVec3::new(mx.x, mx.y, mx.z),
        ]
    }

    /// Axis-aligned box containing this box transformed by `t`.
    ///
    /// Transforms the corners, not the exact swept geometry.
    pub fn transformed_by(&self, t: &RigidTransform) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::EMPTY;
        for corner in self.corners() {
            out.expand_by_point(t.transform_point(corner));
        }
        out
    }
}

impl Default for BBox3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3d({:?} - {:?})", self.min, self.max)
    }
}

/// A rigid transform: rotation followed by translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidTransform {
    pub position: DVec3,
    pub rotation: DQuat,
}

impl RigidTransform {
    /// Identity transform.
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    /// Create from translation and rotation.
    #[inline]
    pub const fn new(position: DVec3, rotation: DQuat) -> Self {
        Self { position, rotation }
    }

    /// Create a pure translation.
    #[inline]
    pub fn from_translation(position: DVec3) -> Self {
        Self {
            position,
            rotation: DQuat::IDENTITY,
        }
    }

    /// Apply the transform to a point.
    #[inline]
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.rotation * p + self.position
    }

    /// Decode a 4x4 matrix delivered as 16 row-major numbers.
    ///
    /// The service stores matrices in math (row-vector) convention with the
    /// translation in the last row; glam uses column vectors, so the data
    /// must be transposed. Reading row-major storage as column-major is
    /// exactly that transpose, which moves the translation into the last
    /// column where glam expects it.
    pub fn from_row_major(values: &[f64; 16]) -> Self {
        let m = DMat4::from_cols_array(values);
        let (_, rotation, position) = m.to_scale_rotation_translation();
        Self { position, rotation }
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_expand() {
        let mut b = BBox3d::EMPTY;
        assert!(b.is_empty());

        b.expand_by_point(DVec3::new(-1.0, -1.0, -1.0));
        b.expand_by_point(DVec3::new(1.0, 1.0, 1.0));

        assert_eq!(b.center(), DVec3::ZERO);
        assert_eq!(b.size(), DVec3::splat(2.0));
    }

    #[test]
    fn test_bbox_expanded_fraction() {
        let b = BBox3d::new(DVec3::ZERO, DVec3::splat(10.0)).expanded(0.01);
        assert_eq!(b.min, DVec3::splat(-0.1));
        assert_eq!(b.max, DVec3::splat(10.1));
    }

    #[test]
    fn test_bbox_transformed() {
        let b = BBox3d::new(DVec3::ZERO, DVec3::ONE);
        let t = RigidTransform::from_translation(DVec3::new(5.0, 0.0, 0.0));
        let moved = b.transformed_by(&t);
        assert_eq!(moved.min, DVec3::new(5.0, 0.0, 0.0));
        assert_eq!(moved.max, DVec3::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn test_rigid_from_row_major_translation() {
        // Row-major with translation in the last row (row-vector convention).
        let mut vals = [0.0; 16];
        vals[0] = 1.0;
        vals[5] = 1.0;
        vals[10] = 1.0;
        vals[15] = 1.0;
        vals[12] = 3.0;
        vals[13] = 4.0;
        vals[14] = 5.0;
        let t = RigidTransform::from_row_major(&vals);
        assert_eq!(t.position, DVec3::new(3.0, 4.0, 5.0));
        let p = t.transform_point(DVec3::ZERO);
        assert_eq!(p, DVec3::new(3.0, 4.0, 5.0));
    }
}

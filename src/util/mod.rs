//! Utility types and functions for sync4d.
//!
//! This module contains fundamental types used throughout the library:
//! - [`Error`] / [`Result`] - Error handling
//! - [`ElementId`] and typed arena indices
//! - Math type re-exports from glam, plus [`BBox3d`] and [`RigidTransform`]

mod error;
mod ids;
mod math;

pub use error::*;
pub use ids::*;
pub use math::*;

//! Timeline layer: per-element/per-group keyframe tracks and their
//! geometry-dependent finalization.
//!
//! This module provides:
//! - [`Track`] / [`Keyframe`] / [`Interp`] - ordered keyframe storage
//! - [`Timeline`] / [`TimelineSet`] - the four tracks per animated entity
//! - [`Deferred`] - two-phase values resolved once geometry is known
//! - [`add_binding_keyframes`] - the builder consuming resolver
//!   notifications
//! - [`finalize_anchor_pos`] / [`finalize_cutting_plane`] - bounding-box
//!   dependent finalization

mod builder;
mod deferred;
mod finalize;
mod keyframe;
#[allow(clippy::module_inception)]
mod timeline;

pub use builder::add_binding_keyframes;
pub use deferred::Deferred;
pub use finalize::{finalize_anchor_pos, finalize_cutting_plane};
pub use keyframe::{
    alpha_is_no_effect, Alpha, AnchorSpec, ClippingValue, ColorValue, CuttingPlane, GrowthStatus,
    Interp, Keyframe, Track, TransformEntry, TransformValue,
};
pub use timeline::{Timeline, TimelineKey, TimelineSet};

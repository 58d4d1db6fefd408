//! Core data model: the per-schedule property store and binding table.
//!
//! This module provides:
//! - [`Task`], [`AppearanceProfile`], [`TransformAssignment`],
//!   [`Animation3DPath`], [`ElementsGroup`] - the five property kinds
//! - [`AnimationBinding`] / [`BindingKey`] - deduplicated bindings
//! - [`PropertyTable`] - append-only arena with a string-id hash index
//! - [`Schedule`] - the aggregate holding all tables for one schedule
//!
//! Everything is addressed by typed integer indices; references are never
//! held across a callback boundary.

mod appearance;
mod binding;
mod group;
mod path;
mod schedule;
mod task;
mod transform;

pub use appearance::{
    Appearance, AppearanceProfile, GrowthDirection, GrowthSimulation, ProfileAction, Rgb,
};
pub use binding::{AnimatedEntity, AnimationBinding, BindingKey, NotifyState};
pub use group::ElementsGroup;
pub use path::{Animation3DPath, PathKeyframe};
pub use schedule::{Generation, PropertyTable, Schedule};
pub use task::{Task, TimeRange};
pub use transform::{AnchorPoint, PathAssignment, TransformAssignment, TransformKind};

use crate::util::BindingIdx;
use smallvec::SmallVec;

/// Binding indices waiting for a property's detail fetch.
///
/// Non-empty exactly while the fetch is outstanding; drained once, when the
/// property resolves.
pub type Waiters = SmallVec<[BindingIdx; 4]>;

/// Access to a property's pending-waiter list.
///
/// Implemented by every property kind so the resolver's emplace/complete
/// routines can be written once instead of per kind.
pub trait PendingWaiters {
    /// The waiter list.
    fn waiters(&self) -> &Waiters;

    /// Mutable access for appending a newly discovered waiter.
    fn waiters_mut(&mut self) -> &mut Waiters;

    /// Whether a detail fetch is still outstanding.
    fn is_pending(&self) -> bool {
        !self.waiters().is_empty()
    }

    /// Swap the waiter list out for completion processing.
    fn take_waiters(&mut self) -> Waiters {
        std::mem::take(self.waiters_mut())
    }
}

macro_rules! pending_waiters {
    ($ty:ty) => {
        impl PendingWaiters for $ty {
            #[inline]
            fn waiters(&self) -> &Waiters {
                &self.waiters
            }

            #[inline]
            fn waiters_mut(&mut self) -> &mut Waiters {
                &mut self.waiters
            }
        }
    };
}

pending_waiters!(Task);
pending_waiters!(AppearanceProfile);
pending_waiters!(TransformAssignment);
pending_waiters!(Animation3DPath);

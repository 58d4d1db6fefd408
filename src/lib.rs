//! # sync4d
//!
//! 4D construction-schedule synchronization: connects a remote schedule
//! service to a local, render-ready animation model. Given a schedule tied
//! to a 3D model, it fetches tasks, appearance profiles, transform/path
//! assignments and the bindings linking them to elements, resolves the
//! cross-reference graph without redundant requests, and produces
//! per-element (or per-group) timelines - keyframe tracks of visibility,
//! color, rigid transform and cutting-plane state that a renderer samples
//! every frame to show construction progress over time.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (errors, ids, math)
//! - [`core`] - Property store, binding table, schedules
//! - [`timeline`] - Keyframe tracks and deferred finalization
//! - [`resolve`] - Remote protocol, dependency resolver, import session
//! - [`stats`] - Import statistics
//!
//! ## Example
//!
//! ```ignore
//! use sync4d::prelude::*;
//! use std::sync::Arc;
//!
//! let client = Arc::new(QueuedClient::new(transport));
//! let session = ImportSession::new(client.clone());
//! session.reset_connection("itwin-1", "model-1", "changeset-7");
//! session.query_entire_schedule(None, None, Box::new(|ok| {
//!     println!("import finished: {ok}");
//! }));
//! client.run_until_idle();
//! ```

pub mod core;
pub mod resolve;
pub mod stats;
pub mod timeline;
pub mod util;

// Re-export commonly used types
pub use resolve::{ImportSession, QueryClient, QueuedClient, Transport, WorkerPool};
pub use stats::ImportStats;
pub use timeline::{Timeline, TimelineKey, TimelineSet};
pub use util::{ElementId, Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        AnimatedEntity, AppearanceProfile, Generation, ProfileAction, Schedule, Task, TimeRange,
    };
    pub use crate::resolve::{
        BindingNotice, GroupNotice, ImportSession, QueryClient, QueuedClient, Request, Transport,
        WorkerPool,
    };
    pub use crate::stats::ImportStats;
    pub use crate::timeline::{GrowthStatus, Interp, Timeline, TimelineKey, TimelineSet};
    pub use crate::util::{BBox3d, ElementId, Error, Result, RigidTransform, TimePoint};
}

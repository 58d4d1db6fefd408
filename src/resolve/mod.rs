//! Resolver layer: the remote protocol, the request queue contract, the
//! dependency resolver, and the import session that orchestrates them.
//!
//! This module provides:
//! - [`Request`] / document DTOs - the remote schedule-service protocol
//! - [`QueryClient`] / [`Transport`] - the request/callback contract and
//!   the in-process [`WorkerPool`] / [`QueuedClient`] implementations
//! - [`ImportSession`] - the three public query operations, generation
//!   detection, completion callbacks and observers

mod protocol;
mod queue;
mod resolver;
mod session;

pub use protocol::{
    format_timestamp, parse_timestamp, parse_transform3d, AppearanceDoc, BindingItem,
    BindingsFilter, ColorDoc, GrowthDoc, Method, Page, PathAssignmentDoc, PathKeyframeDoc,
    ProfileItem, Request, RotationDoc, ScheduleItem, TaskItem, Vec3Doc, ELEMENT_BATCH_MAX,
    PAGE_SIZE,
};
pub use queue::{Document, QueryClient, QueuedClient, ResponseCallback, Transport, WorkerPool};
pub use resolver::{TransformFetch, TransformRoute};
pub use session::{
    BindingNotice, CompletionCallback, ConnectionInfo, GroupNotice, ImportSession, OnBindingAdded,
    OnGroupModified,
};

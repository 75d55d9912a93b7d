//! Content model orchestrator.
//!
//! A grid displays [`ContentNode`]s: static content, aligned groups,
//! storage-bound slots, and per-viewer dynamic queries. The sum type and the
//! shared binding machinery live in `core`; each polymorphic variant keeps
//! its own module.

mod core;
mod dynamic;
mod group;
mod storage;

pub use core::{ContentNode, DrawCtx, GridId, Stack, StaticNode};
pub use dynamic::{DynamicNode, DynamicQuery};
pub use group::{Alignment, GroupNode};
pub use storage::{ApplyStorage, Storage, StorageNode, Validator, ValidatorInfo, VecStorage};

pub(crate) use core::Binding;

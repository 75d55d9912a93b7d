//! Registry module orchestrator.
//!
//! Process-scoped lookup state: the owner→grid map and each viewer's
//! navigation history. A registry is created by the embedder and passed into
//! every grid; nothing here is ambient global state.

mod core;

pub use core::{OwnerId, UiRegistry};

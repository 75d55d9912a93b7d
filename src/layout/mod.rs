//! Layout module orchestrator.
//!
//! Compiles textual row templates into a fixed slot grid and picks the
//! smallest supported container shape that fits. Implementation details live
//! in the private `core` module.

mod core;

pub use core::{FILLER_CHAR, Shape, SlotTemplate};

//! Paginated, multi-viewer grid-UI engine.
//!
//! A [`GridUi`] compiles textual row templates into a fixed slot grid, binds
//! polymorphic [`ContentNode`]s to slot characters, resolves content per
//! viewer (with pagination and per-viewer dynamic caches), and turns the
//! host's raw click/drag/close events into well-defined outcomes, including
//! emulated multi-slot transfer semantics for validator-gated storage that
//! the hosting container does not handle on its own.
//!
//! The host side (containers, the event feed, scheduling, text
//! substitution) stays behind the traits in [`host`].

pub mod content;
pub mod error;
pub mod host;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod runtime;
pub mod session;

pub use content::{
    Alignment, ApplyStorage, ContentNode, DrawCtx, DynamicNode, DynamicQuery, GridId, GroupNode,
    Stack, StaticNode, Storage, StorageNode, Validator, ValidatorInfo, VecStorage,
};
pub use error::{Result, UiError};
pub use host::{
    Container, ContainerSpec, Host, HostHook, Scheduler, Task, TextFormat, ViewerId,
};
pub use layout::{FILLER_CHAR, Shape, SlotTemplate};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink, event_with_fields, json_kv,
};
pub use metrics::{MetricSnapshot, UiMetrics};
pub use registry::{OwnerId, UiRegistry};
pub use runtime::{
    Click, ClickAction, ClickEvent, ClickKind, ClickOutcome, Close, CloseAction, DragEvent,
    DragKind, DragOutcome, GridConfig, GridUi, InteractionKind, Position,
};
pub use session::Session;

#[cfg(test)]
pub(crate) mod testing;

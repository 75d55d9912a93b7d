//! Host-side collaborator traits.
//!
//! The engine produces (slot → content) pairs and interaction outcomes; the
//! host owns the real rendering container, the raw event feed, scheduling,
//! and text substitution. Everything the engine consumes from its embedder
//! goes through the traits in this module, so the core stays free of any
//! concrete backend.

use std::fmt;
use std::sync::Arc;

use crate::content::{Stack, Storage};
use crate::layout::Shape;

/// Opaque viewer identity. Hosts map their own user/session handles onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(pub u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}

/// Work scheduled onto a viewer's execution context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Viewer-affine scheduling collaborator.
///
/// `defer` always queues the task onto the viewer's own context;
/// `run_or_defer` may execute inline when the caller is already on that
/// context. Redraw broadcasts triggered by another viewer's event must go
/// through `defer` so they never run on the triggering context.
pub trait Scheduler: Send + Sync {
    fn defer(&self, viewer: ViewerId, task: Task);
    fn run_or_defer(&self, viewer: ViewerId, task: Task);
}

/// Text/placeholder substitution collaborator. The engine substitutes its
/// own `%...%` variables first and hands the result here.
pub trait TextFormat: Send + Sync {
    fn format(&self, viewer: Option<ViewerId>, raw: &str) -> String;
}

/// A rendered container bound to one grid session. Slot indices follow the
/// grid's slot numbering.
pub trait Container: Send + Sync {
    fn len(&self) -> usize;
    fn get(&self, slot: usize) -> Option<Stack>;
    fn set(&self, slot: usize, stack: Option<Stack>);
    fn clear(&self);
    fn viewers(&self) -> Vec<ViewerId>;
}

/// What the engine asks the host to materialize for a session.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub shape: Shape,
    /// Requested slot count. Equal to `shape.natural_len()` for templates
    /// that fill the shape exactly, otherwise the host should create a
    /// sized container of this length.
    pub len: usize,
    /// Title with all placeholder substitution already applied.
    pub title: String,
}

/// The hosting environment: container lifecycle, personal storage for
/// overflow, world effects, and feedback playback.
pub trait Host: Send + Sync {
    fn create_container(&self, viewer: ViewerId, spec: &ContainerSpec) -> Arc<dyn Container>;
    fn open_container(&self, viewer: ViewerId, container: &Arc<dyn Container>);
    fn close_container(&self, viewer: ViewerId);
    /// Whether the viewer currently has any engine-openable container on
    /// screen. Used to decide if an open must be deferred past the event
    /// that requested it.
    fn is_container_open(&self, viewer: ViewerId) -> bool;
    /// The viewer's own storage, used for drag overflow and the tail end of
    /// collect-to-cursor.
    fn personal_storage(&self, viewer: ViewerId) -> Arc<dyn Storage>;
    /// Last-resort effect when neither the cursor nor personal storage can
    /// hold a remainder.
    fn drop_at(&self, viewer: ViewerId, stack: Stack);
    /// Feedback (e.g. a click sound) keyed by an opaque host-defined name.
    fn play_feedback(&self, _viewer: ViewerId, _key: &str) {}
}

/// The host events a grid reacts to, statically enumerated. Hosts wire
/// exactly these; there is no runtime handler discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostHook {
    /// Raw click/interact events → [`crate::GridUi::handle_click`].
    Click,
    /// Raw drag events → [`crate::GridUi::handle_drag`].
    Drag,
    /// Container close notifications → [`crate::GridUi::handle_close`].
    Close,
    /// The grid owner's backing container changed externally
    /// → [`crate::GridUi::on_owner_mutated`].
    OwnerMutated,
    /// The grid owner ceased to exist → [`crate::GridUi::on_owner_destroyed`].
    OwnerDestroyed,
    /// The embedder is shutting down → [`crate::GridUi::destroy`].
    Shutdown,
}

impl HostHook {
    pub const ALL: [HostHook; 6] = [
        HostHook::Click,
        HostHook::Drag,
        HostHook::Close,
        HostHook::OwnerMutated,
        HostHook::OwnerDestroyed,
        HostHook::Shutdown,
    ];
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::host::ViewerId;
use crate::runtime::GridUi;

/// Opaque owner key. Hosts derive it from whatever owns the grid (an entity
/// id, a location, a path).
pub type OwnerId = String;

/// Owner-keyed grid lookup plus per-viewer navigation history.
///
/// Both maps sit behind their own `RwLock`; the locks are held only for the
/// individual map operation, so sessions of unrelated viewers never
/// serialize on registry access.
#[derive(Default)]
pub struct UiRegistry {
    by_owner: RwLock<HashMap<OwnerId, Arc<GridUi>>>,
    history: RwLock<HashMap<ViewerId, Vec<Arc<GridUi>>>>,
}

impl UiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_owner(&self, owner: OwnerId, grid: &Arc<GridUi>) {
        self.by_owner
            .write()
            .expect("registry lock poisoned")
            .insert(owner, grid.clone());
    }

    /// Remove the owner key, but only while it still points at `grid`.
    pub(crate) fn unregister_owner(&self, owner: &str, grid: &Arc<GridUi>) {
        let mut map = self.by_owner.write().expect("registry lock poisoned");
        if map.get(owner).is_some_and(|held| Arc::ptr_eq(held, grid)) {
            map.remove(owner);
        }
    }

    /// The grid registered for `owner`, if any.
    pub fn by_owner(&self, owner: &str) -> Option<Arc<GridUi>> {
        self.by_owner
            .read()
            .expect("registry lock poisoned")
            .get(owner)
            .cloned()
    }

    /// The grid currently on top of the viewer's history, i.e. the one they
    /// have open.
    pub fn open_grid(&self, viewer: ViewerId) -> Option<Arc<GridUi>> {
        self.history
            .read()
            .expect("registry lock poisoned")
            .get(&viewer)
            .and_then(|stack| stack.last().cloned())
    }

    pub fn history_len(&self, viewer: ViewerId) -> usize {
        self.history
            .read()
            .expect("registry lock poisoned")
            .get(&viewer)
            .map(|stack| stack.len())
            .unwrap_or(0)
    }

    /// Push a grid onto the viewer's history unless it already sits on top.
    pub(crate) fn push_history(&self, viewer: ViewerId, grid: &Arc<GridUi>) {
        let mut history = self.history.write().expect("registry lock poisoned");
        let stack = history.entry(viewer).or_default();
        if stack.last().is_some_and(|top| Arc::ptr_eq(top, grid)) {
            return;
        }
        stack.push(grid.clone());
    }

    /// Drop the current top of the viewer's history and reopen whatever is
    /// underneath. Returns whether a previous grid was shown.
    pub fn go_back(&self, viewer: ViewerId) -> bool {
        let previous = {
            let mut history = self.history.write().expect("registry lock poisoned");
            let Some(stack) = history.get_mut(&viewer) else {
                return false;
            };
            stack.pop();
            stack.last().cloned()
        };
        match previous {
            Some(grid) => {
                let _ = grid.show_checked(viewer, false);
                true
            }
            None => false,
        }
    }

    /// Clear the viewer's entire history, returning what was on it.
    pub fn clear_history(&self, viewer: ViewerId) -> Vec<Arc<GridUi>> {
        self.history
            .write()
            .expect("registry lock poisoned")
            .remove(&viewer)
            .unwrap_or_default()
    }
}

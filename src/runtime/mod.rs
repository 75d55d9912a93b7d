//! The grid instance and its lifecycle.
//!
//! A [`GridUi`] compiles its row templates once, owns the slot binding table
//! and every viewer session, and turns raw host events into content updates.
//! Interaction routing lives in the `dispatch` module, storage-transfer
//! emulation in `emulator`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::json;

use crate::content::{Binding, ContentNode, DrawCtx, GridId, Stack, StaticNode};
use crate::error::{Result, UiError};
use crate::host::{Container, ContainerSpec, Host, Scheduler, TextFormat, ViewerId};
use crate::layout::{FILLER_CHAR, Shape, SlotTemplate};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::UiMetrics;
use crate::registry::{OwnerId, UiRegistry};
use crate::session::{self, Session};

mod dispatch;
mod emulator;

pub use dispatch::{
    Click, ClickAction, ClickEvent, ClickKind, ClickOutcome, Close, CloseAction, DragEvent,
    DragKind, DragOutcome, InteractionKind, Position,
};

/// Per-grid configuration knobs.
#[derive(Clone)]
pub struct GridConfig {
    /// Structured logger receiving lifecycle events and contained failures.
    pub logger: Option<Logger>,
    /// Metrics accumulator shared with the embedder.
    pub metrics: Option<Arc<Mutex<UiMetrics>>>,
    /// Feedback key handed to the host on click feedback. `None` disables it.
    pub feedback_key: Option<String>,
    /// Suppress feedback playback without clearing the key.
    pub silent: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            logger: None,
            metrics: None,
            feedback_key: Some("ui.click".to_string()),
            silent: false,
        }
    }
}

impl GridConfig {
    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(UiMetrics::new())));
        }
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<UiMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

fn default_outside_action() -> ClickAction {
    Arc::new(|_click: &mut Click<'_>| Ok(false))
}

fn default_close_action() -> CloseAction {
    Arc::new(|_close: &Close<'_>| Ok(true))
}

/// A paginated, multi-viewer grid.
///
/// The slot grid is fixed at construction. Content nodes bind to slot
/// characters (or single slots), each viewer gets an independent session
/// with their own page and container, and every raw interaction is resolved
/// against the bound node of the touched slot.
pub struct GridUi {
    pub(crate) id: GridId,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    text: Arc<dyn TextFormat>,
    pub(crate) registry: Arc<UiRegistry>,
    pub(crate) template: SlotTemplate,
    title: RwLock<String>,
    title_updated: AtomicBool,
    owner: RwLock<Option<OwnerId>>,
    nodes: RwLock<HashMap<char, Arc<ContentNode>>>,
    slot_nodes: RwLock<Vec<Option<Arc<ContentNode>>>>,
    sessions: RwLock<HashMap<ViewerId, Arc<Mutex<Session>>>>,
    pub(crate) outside_action: RwLock<Option<ClickAction>>,
    pub(crate) close_action: RwLock<Option<CloseAction>>,
    config: GridConfig,
}

impl GridUi {
    pub fn new(
        host: Arc<dyn Host>,
        scheduler: Arc<dyn Scheduler>,
        text: Arc<dyn TextFormat>,
        registry: Arc<UiRegistry>,
        title: impl Into<String>,
        rows: &[&str],
        config: GridConfig,
    ) -> Result<Arc<Self>> {
        let template = SlotTemplate::compile(rows)?;
        let len = template.len();
        let grid = Arc::new(Self {
            id: GridId::next(),
            host,
            scheduler,
            text,
            registry,
            template,
            title: RwLock::new(title.into()),
            title_updated: AtomicBool::new(false),
            owner: RwLock::new(None),
            nodes: RwLock::new(HashMap::new()),
            slot_nodes: RwLock::new(vec![None; len]),
            sessions: RwLock::new(HashMap::new()),
            outside_action: RwLock::new(Some(default_outside_action())),
            close_action: RwLock::new(Some(default_close_action())),
            config,
        });
        grid.log_event(
            LogLevel::Info,
            "grid_constructed",
            [
                json_kv("width", json!(grid.template.width())),
                json_kv("slots", json!(grid.template.len())),
            ],
        );
        Ok(grid)
    }

    pub fn len(&self) -> usize {
        self.template.len()
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    pub fn width(&self) -> usize {
        self.template.width()
    }

    pub fn shape(&self) -> Shape {
        self.template.shape()
    }

    pub fn title(&self) -> String {
        self.title.read().expect("grid lock poisoned").clone()
    }

    /// Change the title. The container is recreated on the next `show` so
    /// the new title becomes visible.
    pub fn set_title(&self, title: impl Into<String>) {
        *self.title.write().expect("grid lock poisoned") = title.into();
        self.title_updated.store(true, Ordering::SeqCst);
    }

    /// Register this grid under an owner key. Replaces any previous owner
    /// assignment of this grid.
    pub fn set_owner(self: &Arc<Self>, owner: Option<OwnerId>) {
        let previous = {
            let mut slot = self.owner.write().expect("grid lock poisoned");
            std::mem::replace(&mut *slot, owner.clone())
        };
        if let Some(previous) = previous {
            self.registry.unregister_owner(&previous, self);
        }
        if let Some(owner) = owner {
            self.registry.register_owner(owner, self);
        }
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner.read().expect("grid lock poisoned").clone()
    }

    /// Bind a node to every slot carrying `slot_char` in the template.
    pub fn add_content(&self, slot_char: char, node: ContentNode) -> Result<()> {
        let slots = self.template.slots_for(slot_char);
        let node = Arc::new(node);
        if let Err(err) = node.bind(Binding {
            grid: self.id,
            width: self.template.width(),
            slots: slots.clone(),
        }) {
            if let Some(existing) = node.base().binding() {
                self.log_event(
                    LogLevel::Warn,
                    "binding_conflict",
                    [
                        json_kv("slot_char", json!(slot_char.to_string())),
                        json_kv("bound_grid", json!(format!("{:?}", existing.grid))),
                    ],
                );
            }
            return Err(err);
        }
        self.nodes
            .write()
            .expect("grid lock poisoned")
            .insert(slot_char, node.clone());
        let mut table = self.slot_nodes.write().expect("grid lock poisoned");
        for slot in slots {
            table[slot] = Some(node.clone());
        }
        Ok(())
    }

    /// Bind a node to one specific slot. Slot-bound nodes take part in
    /// display and dispatch but not in pagination or dynamic refresh, which
    /// work over character-bound nodes.
    pub fn set_content(&self, slot: usize, node: ContentNode) -> Result<()> {
        if slot >= self.template.len() {
            return Err(UiError::SlotOutOfRange {
                slot,
                len: self.template.len(),
            });
        }
        let node = Arc::new(node);
        node.bind(Binding {
            grid: self.id,
            width: self.template.width(),
            slots: vec![slot],
        })?;
        self.slot_nodes.write().expect("grid lock poisoned")[slot] = Some(node);
        Ok(())
    }

    /// Remove the node bound to `slot_char` from the character map and from
    /// every slot still pointing at it.
    pub fn remove_content(&self, slot_char: char) -> Option<Arc<ContentNode>> {
        let node = self
            .nodes
            .write()
            .expect("grid lock poisoned")
            .remove(&slot_char)?;
        let mut table = self.slot_nodes.write().expect("grid lock poisoned");
        for cell in table.iter_mut() {
            if cell.as_ref().is_some_and(|held| Arc::ptr_eq(held, &node)) {
                *cell = None;
            }
        }
        Some(node)
    }

    /// Remove whatever occupies one slot, leaving other slots of the same
    /// node untouched.
    pub fn remove_content_at(&self, slot: usize) -> Option<Arc<ContentNode>> {
        self.slot_nodes
            .write()
            .expect("grid lock poisoned")
            .get_mut(slot)?
            .take()
    }

    /// Set the content shown in unbound slots.
    pub fn set_filler(&self, stack: Stack) -> Result<()> {
        self.add_content(FILLER_CHAR, StaticNode::new(stack).with_text([" "]).into())
    }

    pub fn filler(&self) -> Option<Arc<ContentNode>> {
        self.nodes
            .read()
            .expect("grid lock poisoned")
            .get(&FILLER_CHAR)
            .cloned()
    }

    pub fn node_at(&self, slot: usize) -> Option<Arc<ContentNode>> {
        self.slot_nodes
            .read()
            .expect("grid lock poisoned")
            .get(slot)
            .cloned()
            .flatten()
    }

    pub fn node_for(&self, slot_char: char) -> Option<Arc<ContentNode>> {
        self.nodes
            .read()
            .expect("grid lock poisoned")
            .get(&slot_char)
            .cloned()
    }

    pub(crate) fn session(&self, viewer: ViewerId) -> Option<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .expect("grid lock poisoned")
            .get(&viewer)
            .cloned()
    }

    fn session_or_create(&self, viewer: ViewerId) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.write().expect("grid lock poisoned");
        let created = !sessions.contains_key(&viewer);
        let handle = sessions
            .entry(viewer)
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(self.template.len()))))
            .clone();
        drop(sessions);
        if created {
            self.log_event(
                LogLevel::Debug,
                "session_opened",
                [json_kv("viewer", json!(viewer.0))],
            );
        }
        handle
    }

    /// Viewers currently holding a session on this grid.
    pub fn viewers(&self) -> Vec<ViewerId> {
        self.sessions
            .read()
            .expect("grid lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    pub(crate) fn container(&self, viewer: ViewerId) -> Option<Arc<dyn Container>> {
        let handle = self.session(viewer)?;
        let session = handle.lock().expect("session mutex poisoned");
        session.container.clone()
    }

    /// The viewer's current page, counted from zero.
    pub fn page(&self, viewer: ViewerId) -> usize {
        self.session(viewer)
            .map(|handle| handle.lock().expect("session mutex poisoned").page())
            .unwrap_or(0)
    }

    /// The viewer's page count, at least one.
    pub fn pages(&self, viewer: ViewerId) -> usize {
        self.session(viewer)
            .map(|handle| handle.lock().expect("session mutex poisoned").pages())
            .unwrap_or(1)
    }

    /// Turn to a page for one viewer and redraw them. The page is clamped
    /// against the freshly computed page count during the draw.
    pub fn set_page(self: &Arc<Self>, viewer: ViewerId, page: usize) -> Result<()> {
        let handle = self.session_or_create(viewer);
        handle.lock().expect("session mutex poisoned").page = page;
        self.draw(viewer, false, false)
    }

    /// Turn every current session to the same page.
    pub fn set_page_all(self: &Arc<Self>, page: usize) {
        for viewer in self.viewers() {
            let grid = self.clone();
            self.scheduler.run_or_defer(
                viewer,
                Box::new(move || {
                    let _ = grid.set_page(viewer, page);
                }),
            );
        }
    }

    /// Draw the grid for one viewer: refresh dynamic content (when asked),
    /// recompute pagination, make sure a container exists, and push every
    /// slot's resolved content into it. Unchanged slots are skipped.
    pub fn draw(
        self: &Arc<Self>,
        viewer: ViewerId,
        refresh_dynamic: bool,
        recreate_container: bool,
    ) -> Result<()> {
        if refresh_dynamic {
            let nodes: Vec<_> = self
                .nodes
                .read()
                .expect("grid lock poisoned")
                .values()
                .cloned()
                .collect();
            for node in nodes {
                node.refresh_dynamic(viewer);
            }
        }

        let pages = {
            let nodes = self.nodes.read().expect("grid lock poisoned");
            session::page_count(nodes.values(), viewer)
        };

        let handle = self.session_or_create(viewer);
        let (page, needs_container) = {
            let mut session = handle.lock().expect("session mutex poisoned");
            session.pages = pages;
            if session.page >= pages {
                session.page = 0;
            }
            (
                session.page,
                session.container.is_none() || recreate_container,
            )
        };

        let vars = self.placeholder_vars(viewer, page, pages);
        let ctx = DrawCtx::new(viewer, page, &vars, self.text.as_ref());

        if needs_container {
            let spec = ContainerSpec {
                shape: self.template.shape(),
                len: self.template.len(),
                title: ctx.render(&self.title()),
            };
            let container = self.host.create_container(viewer, &spec);
            handle
                .lock()
                .expect("session mutex poisoned")
                .attach(container);
        }

        let resolved: Vec<Option<Stack>> = {
            let table = self.slot_nodes.read().expect("grid lock poisoned");
            let filler = self.filler();
            (0..self.template.len())
                .map(|slot| {
                    table
                        .get(slot)
                        .cloned()
                        .flatten()
                        .or_else(|| filler.clone())
                        .and_then(|node| node.resolve(&ctx, slot))
                })
                .collect()
        };

        let mut writes = 0;
        {
            let mut session = handle.lock().expect("session mutex poisoned");
            for (slot, stack) in resolved.into_iter().enumerate() {
                if session.write_slot(slot, stack) {
                    writes += 1;
                }
            }
        }

        self.record_draw(writes);
        self.log_event(
            LogLevel::Debug,
            "draw_completed",
            [
                json_kv("viewer", json!(viewer.0)),
                json_kv("page", json!(page)),
                json_kv("slot_writes", json!(writes)),
            ],
        );
        Ok(())
    }

    /// Redraw every session, refreshing dynamic content, each on its own
    /// viewer context.
    pub fn draw_all(self: &Arc<Self>) {
        for viewer in self.viewers() {
            let grid = self.clone();
            self.scheduler.run_or_defer(
                viewer,
                Box::new(move || {
                    let _ = grid.draw(viewer, true, false);
                }),
            );
        }
    }

    /// Show the grid to a viewer: draw, then open the container unless this
    /// grid is already the one they have open.
    pub fn show(self: &Arc<Self>, viewer: ViewerId) -> Result<()> {
        self.show_checked(viewer, true)
    }

    pub fn show_checked(self: &Arc<Self>, viewer: ViewerId, check_open: bool) -> Result<()> {
        let recreate = self.title_updated.load(Ordering::SeqCst);
        self.draw(viewer, true, recreate)?;

        let already_open = self
            .registry
            .open_grid(viewer)
            .is_some_and(|open| Arc::ptr_eq(&open, self));
        if recreate || !check_open || !already_open {
            if self.host.is_container_open(viewer) {
                // The viewer is inside another container; that container's
                // event is likely still being processed, so the open is
                // deferred onto the viewer's context.
                let grid = self.clone();
                self.scheduler.defer(
                    viewer,
                    Box::new(move || {
                        if let Some(container) = grid.container(viewer) {
                            grid.registry.push_history(viewer, &grid);
                            grid.host.open_container(viewer, &container);
                        }
                    }),
                );
            } else if let Some(container) = self.container(viewer) {
                self.registry.clear_history(viewer);
                self.registry.push_history(viewer, self);
                self.host.open_container(viewer, &container);
            }
        }
        self.title_updated.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Close one viewer's container, optionally wiping their history so no
    /// previous grid reopens.
    pub fn close(self: &Arc<Self>, viewer: ViewerId, clear_history: bool) {
        if clear_history {
            self.registry.clear_history(viewer);
        }
        self.host.close_container(viewer);
    }

    pub fn close_all(self: &Arc<Self>, clear_history: bool) {
        for viewer in self.viewers() {
            self.close(viewer, clear_history);
        }
    }

    /// Tear the grid down for good: close every session and drop the owner
    /// registration.
    pub fn destroy(self: &Arc<Self>) {
        self.teardown(true);
    }

    pub(crate) fn teardown(self: &Arc<Self>, close_containers: bool) {
        if close_containers {
            self.close_all(true);
        }
        let sessions: Vec<_> = {
            let mut map = self.sessions.write().expect("grid lock poisoned");
            map.drain().collect()
        };
        for (_, handle) in &sessions {
            let session = handle.lock().expect("session mutex poisoned");
            if let Some(container) = &session.container {
                container.clear();
            }
        }
        if let Some(owner) = self.owner() {
            self.registry.unregister_owner(&owner, self);
        }
        self.log_event(
            LogLevel::Info,
            "grid_destroyed",
            [json_kv("sessions", json!(sessions.len()))],
        );
    }

    pub fn set_outside_action(&self, action: Option<ClickAction>) {
        *self.outside_action.write().expect("grid lock poisoned") = action;
    }

    pub fn set_close_action(&self, action: Option<CloseAction>) {
        *self.close_action.write().expect("grid lock poisoned") = action;
    }

    /// Resolve what one slot currently shows for a viewer, without touching
    /// the container.
    pub fn content_at(&self, viewer: ViewerId, slot: usize) -> Option<Stack> {
        let page = self.page(viewer);
        let pages = self.pages(viewer);
        let vars = self.placeholder_vars(viewer, page, pages);
        let ctx = DrawCtx::new(viewer, page, &vars, self.text.as_ref());
        self.node_at(slot)
            .or_else(|| self.filler())
            .and_then(|node| node.resolve(&ctx, slot))
    }

    /// Substitute the grid's `%...%` variables and the host formatter into
    /// `raw` for a viewer.
    pub fn replace_vars(&self, viewer: ViewerId, raw: &str) -> String {
        let page = self.page(viewer);
        let pages = self.pages(viewer);
        let vars = self.placeholder_vars(viewer, page, pages);
        DrawCtx::new(viewer, page, &vars, self.text.as_ref()).render(raw)
    }

    fn placeholder_vars(&self, _viewer: ViewerId, page: usize, pages: usize) -> Vec<(String, String)> {
        vec![
            ("title".to_string(), self.title()),
            ("page".to_string(), (page + 1).to_string()),
            (
                "nextpage".to_string(),
                if page + 1 < pages {
                    (page + 2).to_string()
                } else {
                    "none".to_string()
                },
            ),
            (
                "prevpage".to_string(),
                if page > 0 {
                    page.to_string()
                } else {
                    "none".to_string()
                },
            ),
            ("pages".to_string(), pages.to_string()),
            ("owner".to_string(), self.owner().unwrap_or_default()),
        ]
    }

    /// Play the configured click feedback to every viewer of this grid.
    pub fn play_feedback(&self) {
        if self.config.silent {
            return;
        }
        let Some(key) = self.config.feedback_key.as_deref() else {
            return;
        };
        for viewer in self.viewers() {
            self.host.play_feedback(viewer, key);
        }
    }

    /// The owner's backing container changed outside this grid: redraw all
    /// sessions.
    pub fn on_owner_mutated(self: &Arc<Self>) {
        self.draw_all();
    }

    /// The owner ceased to exist: tear down.
    pub fn on_owner_destroyed(self: &Arc<Self>) {
        self.destroy();
    }

    /// Rewrite specific container slots to known values and mark them dirty
    /// for the next draw. Used to roll back rejected drag proposals.
    pub(crate) fn reset_slots(
        self: &Arc<Self>,
        viewer: ViewerId,
        resets: Vec<(usize, Option<Stack>)>,
    ) {
        let Some(handle) = self.session(viewer) else {
            return;
        };
        let mut session = handle.lock().expect("session mutex poisoned");
        let Some(container) = session.container.clone() else {
            return;
        };
        for (slot, value) in resets {
            container.set(slot, value);
            session.invalidate_slot(slot);
        }
    }

    /// Forget what was written and redraw the viewer from scratch.
    pub(crate) fn resync(self: &Arc<Self>, viewer: ViewerId) {
        if let Some(handle) = self.session(viewer) {
            handle.lock().expect("session mutex poisoned").invalidate();
        }
        let _ = self.draw(viewer, false, false);
    }

    pub(crate) fn log_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, "tessera::grid", message, fields);
            let _ = logger.log_event(event);
        }
    }

    pub(crate) fn record_event(&self) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_event();
            }
        }
    }

    pub(crate) fn record_draw(&self, slot_writes: usize) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_draw(slot_writes);
            }
        }
    }

    pub(crate) fn record_broadcast(&self, targets: usize) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_broadcast(targets);
            }
        }
    }

    pub(crate) fn record_rejection(&self) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                guard.record_rejection();
            }
        }
    }
}

//! Raw-event routing.
//!
//! Every raw interaction is resolved to the bound node of the touched
//! position and routed from there: static actions run directly, groups
//! resolve the effective child, storage nodes go through the emulator.
//! Failures inside actions are contained per event; they cancel, resync the
//! triggering viewer, and leave every session alive.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::content::{ContentNode, Stack};
use crate::error::Result;
use crate::host::ViewerId;
use crate::logging::{LogLevel, json_kv};

use super::{GridUi, emulator};

/// Where a raw interaction landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// A slot of this grid.
    Top(usize),
    /// Outside any container.
    Outside,
    /// A region the grid does not own (e.g. the viewer's own storage); the
    /// raw value is the host's slot id for diagnostics.
    Foreign(i32),
}

/// The button/gesture that produced a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Left,
    Right,
    ShiftLeft,
    ShiftRight,
    Middle,
    Double,
    Drop,
    ControlDrop,
    NumberKey(u8),
    Unknown,
}

/// The host's interpretation of what a click wants to do with storage.
/// The emulator recognizes exactly this table; anything it does not know
/// arrives as `Unknown` and is defensively cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Nothing,
    CloneStack,
    MoveToOtherContainer,
    HotbarMoveAndReadd,
    HotbarSwap,
    PickupOne,
    PickupHalf,
    PickupAll,
    DropOneSlot,
    DropAllSlot,
    PlaceOne,
    PlaceSome,
    PlaceAll,
    SwapWithCursor,
    CollectToCursor,
    Unknown,
}

/// A raw click as delivered by the host's event feed.
#[derive(Debug, Clone)]
pub struct ClickEvent {
    pub viewer: ViewerId,
    pub position: Position,
    pub kind: ClickKind,
    pub interaction: InteractionKind,
    /// What the viewer's cursor holds.
    pub cursor: Option<Stack>,
    /// What the clicked slot currently shows.
    pub current: Option<Stack>,
    /// The stack being swapped in for hotbar interactions.
    pub swap_with: Option<Stack>,
    pub(crate) from_drag: bool,
}

impl ClickEvent {
    pub fn new(
        viewer: ViewerId,
        position: Position,
        kind: ClickKind,
        interaction: InteractionKind,
    ) -> Self {
        Self {
            viewer,
            position,
            kind,
            interaction,
            cursor: None,
            current: None,
            swap_with: None,
            from_drag: false,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<Stack>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_current(mut self, current: Option<Stack>) -> Self {
        self.current = current;
        self
    }

    pub fn with_swap(mut self, swap_with: Option<Stack>) -> Self {
        self.swap_with = swap_with;
        self
    }
}

/// What the host must apply once a click event was processed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClickOutcome {
    /// Cancel the host's default handling of the raw event.
    pub cancel: bool,
    /// Outer `Some` means "rewrite the cursor to the inner value".
    pub new_cursor: Option<Option<Stack>>,
    /// Clear the clicked slot's view content.
    pub clear_current: bool,
}

/// The view of a click handed to bound actions.
pub struct Click<'a> {
    grid: &'a Arc<GridUi>,
    event: &'a ClickEvent,
    cursor: Option<Stack>,
    pub(crate) force_cancel: bool,
    pub(crate) clear_current: bool,
}

impl<'a> Click<'a> {
    fn new(grid: &'a Arc<GridUi>, event: &'a ClickEvent) -> Self {
        Self {
            grid,
            event,
            cursor: event.cursor.clone(),
            force_cancel: false,
            clear_current: false,
        }
    }

    pub fn grid(&self) -> &Arc<GridUi> {
        self.grid
    }

    pub fn viewer(&self) -> ViewerId {
        self.event.viewer
    }

    pub fn position(&self) -> Position {
        self.event.position
    }

    /// The grid slot that was clicked, when the click landed on one.
    pub fn slot(&self) -> Option<usize> {
        match self.event.position {
            Position::Top(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn kind(&self) -> ClickKind {
        self.event.kind
    }

    pub fn interaction(&self) -> InteractionKind {
        self.event.interaction
    }

    pub fn cursor(&self) -> Option<&Stack> {
        self.cursor.as_ref()
    }

    /// Rewrite the cursor; the change is surfaced to the host through the
    /// click outcome.
    pub fn set_cursor(&mut self, cursor: Option<Stack>) {
        self.cursor = cursor;
    }

    pub(crate) fn current(&self) -> Option<&Stack> {
        self.event.current.as_ref()
    }

    pub(crate) fn swap_with(&self) -> Option<&Stack> {
        self.event.swap_with.as_ref()
    }

    pub(crate) fn from_drag(&self) -> bool {
        self.event.from_drag
    }

    fn into_outcome(self, cancel: bool) -> ClickOutcome {
        let new_cursor = (self.cursor != self.event.cursor).then_some(self.cursor);
        ClickOutcome {
            cancel: cancel || self.force_cancel,
            new_cursor,
            clear_current: self.clear_current,
        }
    }
}

/// A bound click action. Returning `true` cancels the host's default
/// handling of the raw event.
pub type ClickAction = Arc<dyn Fn(&mut Click<'_>) -> Result<bool> + Send + Sync>;

/// A close notification handed to the close action.
pub struct Close<'a> {
    pub grid: &'a Arc<GridUi>,
    pub viewer: ViewerId,
}

/// Runs when a viewer closes the grid. Returning `true` reopens the
/// previous grid on their history.
pub type CloseAction = Arc<dyn Fn(&Close<'_>) -> Result<bool> + Send + Sync>;

/// The gesture behind a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragKind {
    /// One item per touched slot.
    Single,
    /// The cursor split evenly across the touched slots.
    Even,
}

/// A raw drag: the proposed content per touched slot plus the cursor before
/// and after, as computed by the host.
#[derive(Debug, Clone)]
pub struct DragEvent {
    pub viewer: ViewerId,
    pub kind: DragKind,
    pub added: BTreeMap<usize, Stack>,
    pub old_cursor: Option<Stack>,
    pub new_cursor: Option<Stack>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DragOutcome {
    pub cancel: bool,
    pub new_cursor: Option<Option<Stack>>,
}

/// Resolved action target for a clicked position.
enum Target {
    /// Nothing is bound; the event is cancelled without counting as handled.
    None,
    /// A node is bound but resolves to no runnable action; cancelled, but it
    /// counts as handled.
    Cancel,
    Action(ClickAction),
    Storage(Arc<ContentNode>),
}

fn leaf_target(node: &Arc<ContentNode>, viewer: ViewerId, slot: usize, page: usize) -> Target {
    match &**node {
        ContentNode::Static(static_node) => match &static_node.action {
            Some(action) => Target::Action(action.clone()),
            None => Target::None,
        },
        ContentNode::Storage(_) => Target::Storage(node.clone()),
        ContentNode::Group(group) => match group.child_for(slot, page) {
            Some(child) => match leaf_target(child, viewer, slot, page) {
                Target::None => Target::Cancel,
                target => target,
            },
            None => Target::Cancel,
        },
        ContentNode::Dynamic(dynamic) => match dynamic.cached(viewer) {
            Some(inner) => leaf_target(&inner, viewer, slot, page),
            None => Target::None,
        },
    }
}

impl GridUi {
    /// Route a raw click event. The returned outcome tells the host whether
    /// to cancel its default handling and how to rewrite the cursor.
    pub fn handle_click(self: &Arc<Self>, event: ClickEvent) -> Result<ClickOutcome> {
        self.record_event();
        match event.position {
            Position::Foreign(_) => self.handle_foreign(event),
            _ => self.dispatch_positioned(event),
        }
    }

    fn handle_foreign(self: &Arc<Self>, event: ClickEvent) -> Result<ClickOutcome> {
        match event.interaction {
            InteractionKind::CollectToCursor => {
                let mut click = Click::new(self, &event);
                emulator::collect_to_cursor(self, &mut click, None);
                Ok(click.into_outcome(false))
            }
            InteractionKind::MoveToOtherContainer => {
                // An uncontrolled cross-container move cannot be reconciled
                // against emulated storage; refuse it.
                self.log_event(
                    LogLevel::Debug,
                    "foreign_transfer_cancelled",
                    [json_kv("viewer", json!(event.viewer.0))],
                );
                Ok(ClickOutcome {
                    cancel: true,
                    ..ClickOutcome::default()
                })
            }
            _ => Ok(ClickOutcome::default()),
        }
    }

    fn dispatch_positioned(self: &Arc<Self>, event: ClickEvent) -> Result<ClickOutcome> {
        let page = self.page(event.viewer);
        let target = match event.position {
            Position::Top(slot) => match self.node_at(slot) {
                Some(node) => leaf_target(&node, event.viewer, slot, page),
                None => Target::None,
            },
            Position::Outside => {
                match self
                    .outside_action
                    .read()
                    .expect("grid lock poisoned")
                    .clone()
                {
                    Some(action) => Target::Action(action),
                    None => Target::None,
                }
            }
            Position::Foreign(_) => unreachable!("foreign events are routed separately"),
        };

        let mut click = Click::new(self, &event);
        let ran = match &target {
            Target::None => None,
            Target::Cancel => Some(Ok(true)),
            Target::Action(action) => Some(action(&mut click)),
            Target::Storage(node) => Some(emulator::storage_click(self, node, &mut click)),
        };

        let (handled, cancel) = match ran {
            None => (false, true),
            Some(Ok(flag)) => (true, flag),
            Some(Err(err)) => {
                self.log_event(
                    LogLevel::Error,
                    "action_failed",
                    [
                        json_kv("viewer", json!(event.viewer.0)),
                        json_kv("position", json!(format!("{:?}", event.position))),
                        json_kv("error", json!(err.to_string())),
                    ],
                );
                self.resync(event.viewer);
                (false, true)
            }
        };

        if handled {
            self.broadcast_content(event.viewer);
        }
        Ok(click.into_outcome(cancel))
    }

    /// Route a raw drag. Single-slot drags are treated as clicks with the
    /// gesture mapped to the equivalent button; multi-slot drags go through
    /// the distribution emulator.
    pub fn handle_drag(self: &Arc<Self>, event: DragEvent) -> Result<DragOutcome> {
        if event.added.len() == 1 {
            let &slot = event.added.keys().next().expect("one entry");
            if slot >= self.template.len() {
                return Ok(DragOutcome::default());
            }
            let kind = match event.kind {
                DragKind::Single => ClickKind::Right,
                DragKind::Even => ClickKind::Left,
            };
            let current = self.container(event.viewer).and_then(|c| c.get(slot));
            let mut click_event =
                ClickEvent::new(event.viewer, Position::Top(slot), kind, InteractionKind::Nothing)
                    .with_cursor(event.old_cursor.clone())
                    .with_current(current);
            click_event.from_drag = true;
            let outcome = self.handle_click(click_event)?;
            return Ok(DragOutcome {
                cancel: outcome.cancel,
                new_cursor: outcome.new_cursor,
            });
        }
        self.record_event();
        emulator::drag_distribute(self, &event)
    }

    /// A viewer closed this grid's container. Runs the close action, walks
    /// the history, and tears the grid down once its last session is gone.
    pub fn handle_close(self: &Arc<Self>, viewer: ViewerId) -> Result<()> {
        self.record_event();
        let is_open_here = self
            .registry
            .open_grid(viewer)
            .is_some_and(|open| Arc::ptr_eq(&open, self));
        if is_open_here {
            let action = self
                .close_action
                .read()
                .expect("grid lock poisoned")
                .clone();
            let return_to_previous = match action {
                Some(action) => match action(&Close { grid: self, viewer }) {
                    Ok(flag) => flag,
                    Err(err) => {
                        self.log_event(
                            LogLevel::Error,
                            "close_action_failed",
                            [
                                json_kv("viewer", json!(viewer.0)),
                                json_kv("error", json!(err.to_string())),
                            ],
                        );
                        true
                    }
                },
                None => true,
            };
            if return_to_previous {
                self.registry.go_back(viewer);
            } else {
                self.registry.clear_history(viewer);
            }
        }

        let remaining = self.viewers().len();
        if remaining <= 1 {
            self.teardown(false);
        } else {
            self.sessions
                .write()
                .expect("grid lock poisoned")
                .remove(&viewer);
            let nodes: Vec<_> = self
                .nodes
                .read()
                .expect("grid lock poisoned")
                .values()
                .cloned()
                .collect();
            for node in nodes {
                node.evict_viewer(viewer);
            }
            self.log_event(
                LogLevel::Debug,
                "session_closed",
                [json_kv("viewer", json!(viewer.0))],
            );
        }
        Ok(())
    }

    /// Content-only redraw for every other viewer of this grid, scheduled
    /// onto each viewer's own context.
    fn broadcast_content(self: &Arc<Self>, except: ViewerId) {
        let targets: Vec<ViewerId> = self
            .viewers()
            .into_iter()
            .filter(|viewer| *viewer != except)
            .collect();
        if targets.is_empty() {
            return;
        }
        self.record_broadcast(targets.len());
        for viewer in targets {
            let grid = self.clone();
            self.scheduler.defer(
                viewer,
                Box::new(move || {
                    let _ = grid.draw(viewer, false, false);
                }),
            );
        }
    }
}

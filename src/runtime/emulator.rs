//! Storage-transfer emulation.
//!
//! The host does not move content in and out of custom-bound storage by
//! itself, so clicks and drags touching storage slots are re-enacted here
//! against the backing [`Storage`]: the click state machine, multi-slot drag
//! distribution with a reconciled remainder, and collect-to-cursor.
//!
//! [`Storage`]: crate::content::Storage

use std::sync::Arc;

use serde_json::json;

use crate::content::{ContentNode, Stack};
use crate::error::Result;
use crate::logging::{LogLevel, json_kv};

use super::GridUi;
use super::dispatch::{Click, DragEvent, DragOutcome, InteractionKind};

/// Merge `add` into `base` up to the base's max stack size. Both quantities
/// are adjusted in place; returns whether the stacks were similar at all.
fn add_to_stack(base: &mut Stack, add: &mut Stack) -> bool {
    if !base.is_similar(add) {
        return false;
    }
    let total = base.quantity + add.quantity;
    if total >= base.max_stack {
        add.quantity = total - base.max_stack;
        base.quantity = base.max_stack;
    } else {
        base.quantity = total;
        add.quantity = 0;
    }
    true
}

/// Emulate a click on a storage-bound slot. Returns whether the host's
/// default handling must be cancelled.
pub(super) fn storage_click(
    grid: &Arc<GridUi>,
    node: &Arc<ContentNode>,
    click: &mut Click<'_>,
) -> Result<bool> {
    let ContentNode::Storage(storage) = &**node else {
        return Ok(true);
    };
    let Some(slot) = click.slot() else {
        return Ok(true);
    };
    let viewer = click.viewer();
    let page = grid.page(viewer);

    if storage.storage_slot(page, slot).is_none() {
        return Ok(true);
    }

    // The slot's view must agree with the backing storage before anything is
    // emulated on top of it; stale views are redrawn instead.
    let backing = storage.stack_at(page, slot);
    let view = grid.container(viewer).and_then(|c| c.get(slot));
    if backing != view {
        let _ = grid.draw(viewer, false, false);
        return Ok(true);
    }

    if click.from_drag() {
        // Drags are reconciled by the drag path; a drag routed here as a
        // click cannot be committed safely.
        return Ok(true);
    }

    let current = click.current().cloned();
    let cursor = click.cursor().cloned();
    let moved: Option<Stack> = match click.interaction() {
        InteractionKind::Nothing | InteractionKind::CloneStack => return Ok(false),
        InteractionKind::MoveToOtherContainer => {
            if grid.host.personal_storage(viewer).first_empty().is_none() {
                return Ok(true);
            }
            // The host moves the stack out; clear the backing slot and
            // refresh every view once the raw event settles.
            let g = grid.clone();
            grid.scheduler.defer(
                viewer,
                Box::new(move || {
                    g.draw_all();
                }),
            );
            None
        }
        InteractionKind::HotbarMoveAndReadd | InteractionKind::HotbarSwap => {
            click.swap_with().cloned()
        }
        InteractionKind::PickupOne | InteractionKind::DropOneSlot => current
            .and_then(|c| (c.quantity > 1).then(|| c.clone().with_quantity(c.quantity - 1))),
        InteractionKind::DropAllSlot => None,
        InteractionKind::PickupHalf => current.and_then(|c| {
            let half = c.quantity / 2;
            (half > 0).then(|| c.clone().with_quantity(half))
        }),
        InteractionKind::PlaceSome => match (current, cursor) {
            (None, cursor) => cursor,
            (Some(held), cursor) => {
                let added = cursor.map(|c| c.quantity).unwrap_or(0);
                let max = held.max_stack;
                Some(held.clone().with_quantity((held.quantity + added).min(max)))
            }
        },
        InteractionKind::PlaceOne => cursor.map(|c| {
            let quantity = current.map(|held| held.quantity + 1).unwrap_or(1);
            c.with_quantity(quantity)
        }),
        InteractionKind::PlaceAll => cursor.map(|c| {
            let quantity = c.quantity + current.map(|held| held.quantity).unwrap_or(0);
            c.with_quantity(quantity)
        }),
        InteractionKind::PickupAll | InteractionKind::SwapWithCursor => cursor,
        InteractionKind::CollectToCursor => {
            if click.cursor().is_none() || click.current().is_some() {
                return Ok(true);
            }
            collect_to_cursor(grid, click, Some((node.clone(), slot)));
            return Ok(false);
        }
        InteractionKind::Unknown => {
            grid.log_event(
                LogLevel::Warn,
                "unsupported_interaction",
                [
                    json_kv("viewer", json!(viewer.0)),
                    json_kv("slot", json!(slot)),
                ],
            );
            return Ok(true);
        }
    };

    let committed = storage.set_stack_at(page, slot, moved);
    if !committed {
        grid.record_rejection();
    }
    Ok(!committed)
}

/// Distribute a multi-slot drag. Slots that refuse their proposed content
/// accumulate the rejected quantity into a remainder, are scheduled to be
/// reset to their pre-drag view value, and the remainder merges back into
/// the cursor; whatever the cursor cannot hold goes to the viewer's
/// personal storage and finally to the ground.
pub(super) fn drag_distribute(grid: &Arc<GridUi>, event: &DragEvent) -> Result<DragOutcome> {
    let viewer = event.viewer;
    let page = grid.page(viewer);
    let container = grid.container(viewer);

    let mut rest: u32 = 0;
    let mut resets: Vec<(usize, Option<Stack>)> = Vec::new();
    for (&slot, proposed) in &event.added {
        if slot >= grid.len() {
            continue;
        }
        let accepted = match grid.node_at(slot).as_deref() {
            Some(ContentNode::Storage(storage)) => {
                storage.set_stack_at(page, slot, Some(proposed.clone()))
            }
            _ => false,
        };
        if accepted {
            continue;
        }
        grid.record_rejection();
        let view = container.as_ref().and_then(|c| c.get(slot));
        match &view {
            Some(held) if proposed.is_similar(held) => {
                rest += proposed.quantity.saturating_sub(held.quantity);
            }
            _ => rest += proposed.quantity,
        }
        resets.push((slot, view));
    }

    if !resets.is_empty() {
        let g = grid.clone();
        grid.scheduler.defer(
            viewer,
            Box::new(move || {
                g.reset_slots(viewer, resets);
            }),
        );
    }

    let mut outcome = DragOutcome::default();
    if rest > 0 {
        let kept_new = match (&event.old_cursor, &event.new_cursor) {
            (Some(old), Some(new)) => old.is_similar(new),
            _ => false,
        };
        let (template, base_quantity) = if kept_new {
            let quantity = event.new_cursor.as_ref().map(|c| c.quantity).unwrap_or(0);
            (event.new_cursor.clone(), quantity)
        } else {
            // The drag replaced the cursor with something else entirely;
            // restore the old cursor before merging the remainder into it.
            (event.old_cursor.clone(), 0)
        };
        let Some(template) = template else {
            return Ok(outcome);
        };
        let total = base_quantity + rest;
        if total <= template.max_stack {
            outcome.new_cursor = Some(Some(template.with_quantity(total)));
        } else {
            let overflow = template.clone().with_quantity(total - template.max_stack);
            let max = template.max_stack;
            outcome.new_cursor = Some(Some(template.with_quantity(max)));
            if let Some(leftover) = grid.host.personal_storage(viewer).insert(overflow) {
                grid.host.drop_at(viewer, leftover);
            }
        }
    }
    Ok(outcome)
}

/// Gather every stack similar to the cursor from the grid's storage slots
/// (and then the viewer's personal storage) into the cursor, up to its max
/// stack size.
pub(super) fn collect_to_cursor(
    grid: &Arc<GridUi>,
    click: &mut Click<'_>,
    origin: Option<(Arc<ContentNode>, usize)>,
) {
    let viewer = click.viewer();
    let Some(mut cursor) = click.cursor().cloned() else {
        return;
    };
    let Some(container) = grid.container(viewer) else {
        return;
    };
    let page = grid.page(viewer);
    let origin_slot = click.slot();

    let mut seen_in_grid = false;
    for slot in 0..grid.len() {
        if Some(slot) == origin_slot {
            continue;
        }
        let view = container.get(slot);
        if view.as_ref().is_some_and(|held| cursor.is_similar(held)) {
            seen_in_grid = true;
        }
        if let Some(node) = grid.node_at(slot) {
            if let ContentNode::Storage(storage) = &*node {
                if let Some(mut other) = storage.stack_at(page, slot) {
                    if add_to_stack(&mut cursor, &mut other) {
                        let write = (other.quantity > 0).then_some(other);
                        storage.set_stack_at(page, slot, write);
                        if cursor.quantity >= cursor.max_stack {
                            break;
                        }
                    }
                }
            }
        }
    }

    if !seen_in_grid {
        return;
    }
    click.clear_current = true;
    click.force_cancel = true;

    if let Some((node, slot)) = origin {
        if let ContentNode::Storage(storage) = &*node {
            storage.set_stack_at(page, slot, None);
        }
    }

    if cursor.quantity < cursor.max_stack {
        let personal = grid.host.personal_storage(viewer);
        for index in 0..personal.len() {
            if let Some(mut held) = personal.get(index) {
                if add_to_stack(&mut cursor, &mut held) {
                    personal.set(index, (held.quantity > 0).then_some(held));
                    if cursor.quantity >= cursor.max_stack {
                        break;
                    }
                }
            }
        }
    }

    click.set_cursor(Some(cursor));
    grid.draw_all();
}

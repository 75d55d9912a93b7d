//! Per-viewer session state.
//!
//! A session exists from a viewer's first draw until their container closes:
//! current page, computed page count, the rendered container handle, and a
//! content hash per slot so consecutive draws skip writes whose rendered
//! value did not change.

use std::sync::Arc;

use crate::content::{ContentNode, Stack};
use crate::host::{Container, ViewerId};

pub struct Session {
    pub(crate) page: usize,
    pub(crate) pages: usize,
    pub(crate) container: Option<Arc<dyn Container>>,
    slot_hashes: Vec<Option<blake3::Hash>>,
}

impl Session {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            page: 0,
            pages: 1,
            container: None,
            slot_hashes: vec![None; len],
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Swap in a (re)created container; every slot becomes dirty.
    pub(crate) fn attach(&mut self, container: Arc<dyn Container>) {
        self.container = Some(container);
        self.invalidate();
    }

    /// Forget all written hashes so the next draw rewrites every slot.
    pub(crate) fn invalidate(&mut self) {
        self.slot_hashes.fill(None);
    }

    pub(crate) fn invalidate_slot(&mut self, slot: usize) {
        if let Some(cell) = self.slot_hashes.get_mut(slot) {
            *cell = None;
        }
    }

    /// Write `stack` into the container slot unless the identical content
    /// was already written by a previous draw. Returns whether a write
    /// happened.
    pub(crate) fn write_slot(&mut self, slot: usize, stack: Option<Stack>) -> bool {
        let hash = stack_hash(&stack);
        if self.slot_hashes.get(slot).copied().flatten() == Some(hash) {
            return false;
        }
        if let Some(container) = &self.container {
            container.set(slot, stack);
        }
        if let Some(cell) = self.slot_hashes.get_mut(slot) {
            *cell = Some(hash);
        }
        true
    }
}

pub(crate) fn stack_hash(stack: &Option<Stack>) -> blake3::Hash {
    let bytes = serde_json::to_vec(stack).unwrap_or_default();
    blake3::hash(&bytes)
}

/// Page count for a viewer: the largest `ceil(content size / bound slots)`
/// over all character-bound nodes, never less than one.
pub(crate) fn page_count<'a>(
    nodes: impl Iterator<Item = &'a Arc<ContentNode>>,
    viewer: ViewerId,
) -> usize {
    let mut pages = 0;
    for node in nodes {
        let slots = node
            .base()
            .binding()
            .map(|binding| binding.slots.len())
            .unwrap_or(0);
        if slots == 0 {
            continue;
        }
        let amount = node.content_size(viewer);
        if amount > 0 {
            pages = pages.max(amount.div_ceil(slots));
        }
    }
    pages.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Binding, GridId, StaticNode, StorageNode, VecStorage};
    use crate::testing::MemContainer;

    fn storage_node(entries: usize, slots: Vec<usize>) -> Arc<ContentNode> {
        let storage = Arc::new(VecStorage::new(entries));
        let node: ContentNode = StorageNode::new(storage).into();
        node.bind(Binding {
            grid: GridId::next(),
            width: 9,
            slots,
        })
        .unwrap();
        Arc::new(node)
    }

    #[test]
    fn storage_capacity_drives_page_count() {
        let node = storage_node(23, (0..9).collect());
        assert_eq!(page_count([&node].into_iter(), ViewerId(1)), 3);
    }

    #[test]
    fn page_count_never_drops_below_one() {
        let node: ContentNode = StaticNode::new(Stack::new("gem")).into();
        node.bind(Binding {
            grid: GridId::next(),
            width: 9,
            slots: vec![0],
        })
        .unwrap();
        let node = Arc::new(node);
        assert_eq!(page_count([&node].into_iter(), ViewerId(1)), 1);
        assert_eq!(page_count([].into_iter(), ViewerId(1)), 1);
    }

    #[test]
    fn unchanged_slot_writes_are_suppressed() {
        let container = Arc::new(MemContainer::new(9));
        let mut session = Session::new(9);
        session.attach(container.clone());

        let stack = Some(Stack::new("gem").with_quantity(2));
        assert!(session.write_slot(0, stack.clone()));
        assert!(!session.write_slot(0, stack.clone()));
        assert_eq!(container.writes(), 1);

        session.invalidate_slot(0);
        assert!(session.write_slot(0, stack));
        assert_eq!(container.writes(), 2);
    }

    #[test]
    fn changed_content_is_rewritten() {
        let container = Arc::new(MemContainer::new(3));
        let mut session = Session::new(3);
        session.attach(container.clone());

        session.write_slot(1, Some(Stack::new("a")));
        assert!(session.write_slot(1, Some(Stack::new("a").with_quantity(2))));
        assert!(session.write_slot(1, None));
        assert_eq!(container.get(1), None);
    }
}
